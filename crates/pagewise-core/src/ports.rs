//! Seams between the controller and its environment.
//!
//! # Design
//! - `ListBackend` abstracts the list endpoint plus item mutations; mutation
//!   methods default to `Unsupported` so read-only backends stay small.
//! - Preference and location ports are synchronous and infallible from the
//!   controller's point of view; implementations log their own failures.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::SourceError;
use crate::model::ListItem;
use crate::query::QueryKey;

/// One list request issued by the fetch coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Monotonic sequence number of the request.
    pub seq: u64,
    /// Key the request was built from.
    pub key: QueryKey,
    /// Encoded request query with paging always present.
    pub query: String,
}

/// Result of one delete inside a bulk request.
pub type DeleteResult<Id> = (Id, Result<(), SourceError>);

/// Remote list endpoint and item mutations for a resource.
#[async_trait]
pub trait ListBackend<T: ListItem>: Send + Sync {
    /// Fetch one page; must return promptly with
    /// [`SourceError::Cancelled`] once `cancel` fires.
    ///
    /// The payload is the raw list envelope
    /// (`{"items": [...], "totalPages": n, "totalCount": n}`).
    async fn fetch_page(
        &self,
        request: &PageRequest,
        cancel: CancellationToken,
    ) -> Result<Value, SourceError>;

    /// Create a new item.
    async fn create(&self, _item: &T) -> Result<(), SourceError> {
        Err(SourceError::Unsupported {
            operation: "create",
        })
    }

    /// Replace an existing item.
    async fn update(&self, _item: &T) -> Result<(), SourceError> {
        Err(SourceError::Unsupported {
            operation: "update",
        })
    }

    /// Delete one item by identifier.
    async fn delete(&self, _id: &T::Id) -> Result<(), SourceError> {
        Err(SourceError::Unsupported {
            operation: "delete",
        })
    }

    /// Delete several items concurrently, one result per identifier.
    async fn delete_batch(&self, ids: &[T::Id]) -> Vec<DeleteResult<T::Id>> {
        join_all(
            ids.iter()
                .map(|id| async move { (id.clone(), self.delete(id).await) }),
        )
        .await
    }
}

/// Key/value storage for per-resource preferences.
pub trait PreferenceStore: Send + Sync {
    /// Previously stored value for `key`.
    fn load(&self, key: &str) -> Option<String>;

    /// Persist `value` under `key`.
    fn save(&self, key: &str, value: &str);
}

/// Sink for the shareable query of the current view.
pub trait LocationSink: Send + Sync {
    /// Replace the current location query without adding a history entry.
    fn replace(&self, query: &str);
}

/// In-process preference store.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    /// Store seeded with existing entries.
    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: Mutex::new(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect(),
            ),
        }
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self, key: &str) -> Option<String> {
        self.values().get(key).cloned()
    }

    fn save(&self, key: &str, value: &str) {
        self.values().insert(key.to_string(), value.to_string());
    }
}

/// Location sink that remembers the latest query.
#[derive(Debug, Default)]
pub struct MemoryLocation {
    current: Mutex<String>,
}

impl MemoryLocation {
    /// Latest query written by the controller.
    #[must_use]
    pub fn current(&self) -> String {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LocationSink for MemoryLocation {
    fn replace(&self, query: &str) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = query.to_string();
    }
}

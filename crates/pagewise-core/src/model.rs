//! Item contract, collection snapshots, and loading states.

use std::fmt::{Debug, Display};
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ControllerError;

/// Contract implemented by every row type a controller can manage.
pub trait ListItem: Clone + Debug + Send + Sync + DeserializeOwned + 'static {
    /// Stable identifier used for selection, updates, and deletes.
    type Id: Clone
        + Debug
        + Display
        + Eq
        + Hash
        + Ord
        + Send
        + Sync
        + Serialize
        + DeserializeOwned
        + 'static;

    /// Identifier of this row.
    fn id(&self) -> Self::Id;

    /// Client-side validation run before create/update reaches the backend.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message describing the invalid input.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Last-known-good page of items.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceCollection<T> {
    /// Items of the current page in server order.
    pub items: Vec<T>,
    /// Total number of matching items across every page.
    pub total_count: u64,
    /// Number of pages; never below 1.
    pub total_pages: u64,
    /// When the collection was produced.
    pub fetched_at: DateTime<Utc>,
}

impl<T> ResourceCollection<T> {
    /// Empty collection with a single (empty) page.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
            total_pages: 1,
            fetched_at: Utc::now(),
        }
    }

    /// Number of items on the current page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the current page holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: ListItem> ResourceCollection<T> {
    /// Identifiers of the current page in display order.
    #[must_use]
    pub fn ids(&self) -> Vec<T::Id> {
        self.items.iter().map(ListItem::id).collect()
    }

    /// Look up an item of the current page.
    #[must_use]
    pub fn find(&self, id: &T::Id) -> Option<&T> {
        self.items.iter().find(|item| &item.id() == id)
    }
}

/// Page count for `total_count` items split into pages of `page_size`.
#[must_use]
pub fn page_count(total_count: u64, page_size: u32) -> u64 {
    total_count.div_ceil(u64::from(page_size.max(1))).max(1)
}

/// Fetch lifecycle of a list view.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadingState {
    /// Nothing has been requested yet.
    #[default]
    Idle,
    /// First fetch in flight; no collection has been loaded yet.
    InitialLoading,
    /// A collection exists and a newer fetch is in flight.
    Refreshing,
    /// The latest fetch settled successfully.
    Ready,
    /// The latest fetch failed.
    Failed(ControllerError),
}

impl LoadingState {
    /// Whether a fetch is in flight.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::InitialLoading | Self::Refreshing)
    }

    /// Error of the latest fetch, if it failed.
    #[must_use]
    pub const fn error(&self) -> Option<&ControllerError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Machine-friendly discriminator for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::InitialLoading => "initial_loading",
            Self::Refreshing => "refreshing",
            Self::Ready => "ready",
            Self::Failed(_) => "failed",
        }
    }
}

//! Resource cache with optimistic overlay support.
//!
//! # Design
//! - The collection lives behind an `Arc` so snapshots are cheap and a
//!   rollback restores the exact snapshot that was captured.
//! - Optimistic changes are pure transforms; the cache enforces the page-size
//!   bound after every transform.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::ControllerError;
use crate::model::{ListItem, LoadingState, ResourceCollection, page_count};

/// Shared handle to an immutable collection snapshot.
pub type CollectionSnapshot<T> = Arc<ResourceCollection<T>>;

/// What the cache does with the current page when a fetch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Replace the page with an empty collection.
    #[default]
    ClearItems,
    /// Keep the previous page visible next to the error.
    KeepStale,
}

/// Optimistic edit applied before the backend confirms a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimisticChange<T: ListItem> {
    /// Prepend a new item and bump the total.
    Insert(T),
    /// Replace the item sharing the same identifier.
    Replace(T),
    /// Drop every item whose identifier is listed.
    Remove(Vec<T::Id>),
}

impl<T: ListItem> OptimisticChange<T> {
    /// Apply the change to `current`, returning the next collection.
    #[must_use]
    pub fn apply(&self, current: &ResourceCollection<T>, page_size: u32) -> ResourceCollection<T> {
        let mut next = current.clone();
        match self {
            Self::Insert(item) => {
                next.items.insert(0, item.clone());
                next.total_count = next.total_count.saturating_add(1);
            }
            Self::Replace(item) => {
                let id = item.id();
                if let Some(slot) = next.items.iter_mut().find(|row| row.id() == id) {
                    *slot = item.clone();
                }
            }
            Self::Remove(ids) => {
                let doomed: HashSet<&T::Id> = ids.iter().collect();
                let before = next.items.len();
                next.items.retain(|row| !doomed.contains(&row.id()));
                let removed = (before - next.items.len()) as u64;
                next.total_count = next.total_count.saturating_sub(removed);
            }
        }
        next.total_pages = page_count(next.total_count, page_size);
        next
    }

    /// Undo this change on `current`, which may carry other changes applied
    /// after it. `before` is the collection the change was originally applied
    /// to and supplies the rows it replaced or dropped.
    #[must_use]
    pub fn revert(
        &self,
        current: &ResourceCollection<T>,
        before: &ResourceCollection<T>,
        page_size: u32,
    ) -> ResourceCollection<T> {
        let mut next = current.clone();
        match self {
            Self::Insert(item) => {
                let id = item.id();
                next.items.retain(|row| row.id() != id);
                next.total_count = next.total_count.saturating_sub(1);
            }
            Self::Replace(item) => {
                let id = item.id();
                if let Some(original) = before.items.iter().find(|row| row.id() == id)
                    && let Some(slot) = next.items.iter_mut().find(|row| row.id() == id)
                {
                    *slot = original.clone();
                }
            }
            Self::Remove(ids) => {
                let doomed: HashSet<&T::Id> = ids.iter().collect();
                for (index, row) in before.items.iter().enumerate() {
                    let id = row.id();
                    if !doomed.contains(&id) || next.items.iter().any(|kept| kept.id() == id) {
                        continue;
                    }
                    // Re-insert after the nearest earlier row that is still shown.
                    let at = before.items[..index]
                        .iter()
                        .rev()
                        .find_map(|prev| {
                            let prev_id = prev.id();
                            next.items.iter().position(|kept| kept.id() == prev_id)
                        })
                        .map_or(0, |position| position + 1);
                    next.items.insert(at, row.clone());
                    next.total_count = next.total_count.saturating_add(1);
                }
            }
        }
        next.total_pages = page_count(next.total_count, page_size);
        next
    }
}

/// Authoritative collection plus loading state for one list view.
#[derive(Debug)]
pub struct ResourceCache<T> {
    collection: CollectionSnapshot<T>,
    loading: LoadingState,
    loaded_once: bool,
    page_size: u32,
    generation: u64,
}

impl<T: ListItem> ResourceCache<T> {
    /// Empty cache bounded by `page_size`.
    #[must_use]
    pub fn new(page_size: u32) -> Self {
        Self {
            collection: Arc::new(ResourceCollection::empty()),
            loading: LoadingState::Idle,
            loaded_once: false,
            page_size: page_size.max(1),
            generation: 0,
        }
    }

    /// Current collection snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CollectionSnapshot<T> {
        Arc::clone(&self.collection)
    }

    /// Current loading state.
    #[must_use]
    pub const fn loading(&self) -> &LoadingState {
        &self.loading
    }

    /// Whether a fetch has ever settled successfully.
    #[must_use]
    pub const fn has_loaded(&self) -> bool {
        self.loaded_once
    }

    /// Counter bumped whenever a fetch result (or a failed fetch) replaces the
    /// collection. Optimistic writes and rollbacks leave it alone.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Page-size bound applied to optimistic inserts.
    #[must_use]
    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Update the page-size bound for subsequent writes.
    pub fn set_page_size(&mut self, page_size: u32) {
        self.page_size = page_size.max(1);
    }

    /// Enter the appropriate loading state for a new fetch.
    pub fn begin_fetch(&mut self) -> &LoadingState {
        self.loading = if self.loaded_once {
            LoadingState::Refreshing
        } else {
            LoadingState::InitialLoading
        };
        &self.loading
    }

    /// Replace the collection wholesale after a successful fetch.
    pub fn replace(&mut self, mut collection: ResourceCollection<T>) {
        collection.items.truncate(self.page_size as usize);
        self.collection = Arc::new(collection);
        self.loading = LoadingState::Ready;
        self.loaded_once = true;
        self.generation += 1;
    }

    /// Record a failed fetch according to `policy`.
    pub fn fail(&mut self, error: ControllerError, policy: FailurePolicy) {
        if policy == FailurePolicy::ClearItems || !self.loaded_once {
            self.collection = Arc::new(ResourceCollection::empty());
        }
        self.loading = LoadingState::Failed(error);
        self.generation += 1;
    }

    /// Return to `Ready` after a cancelled fetch when nothing else is pending.
    pub fn settle_cancelled(&mut self) {
        if self.loading.is_loading() {
            self.loading = if self.loaded_once {
                LoadingState::Ready
            } else {
                LoadingState::Idle
            };
        }
    }

    /// Apply a pure transform and return the snapshot it replaced.
    pub fn apply_optimistic<F>(&mut self, mutator: F) -> CollectionSnapshot<T>
    where
        F: FnOnce(&ResourceCollection<T>) -> ResourceCollection<T>,
    {
        let previous = self.snapshot();
        let mut next = mutator(&previous);
        next.items.truncate(self.page_size as usize);
        self.collection = Arc::new(next);
        previous
    }

    /// Apply an [`OptimisticChange`] and return the snapshot it replaced.
    pub fn apply_change(&mut self, change: &OptimisticChange<T>) -> CollectionSnapshot<T> {
        let page_size = self.page_size;
        self.apply_optimistic(|current| change.apply(current, page_size))
    }

    /// Restore a snapshot captured before an optimistic change.
    pub fn rollback(&mut self, snapshot: CollectionSnapshot<T>) {
        self.collection = snapshot;
    }
}

//! Mutation engine: optimistic create/update/delete with snapshot rollback.
//!
//! # Design
//! - Every mutation captures the collection snapshot it replaced; failures
//!   restore that exact snapshot, successes discard it and refresh.
//! - A failure only restores its snapshot while nothing else has touched the
//!   collection. When other optimistic changes are stacked on top, only this
//!   mutation's change is undone; when a fetch has landed since, the fetched
//!   page is already server state and is left alone.
//! - Conflicts mean the server state moved on, so the list is refreshed instead
//!   of rolled back.
//! - Bulk deletes keep succeeded deletions and restore only the failed items.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CollectionSnapshot, OptimisticChange};
use crate::controller::ListController;
use crate::error::{ControllerError, ControllerResult, SourceError};
use crate::events::{ControllerEvent, Notice};
use crate::model::ListItem;

/// Kind of a mutation, used for notices and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// New item.
    Create,
    /// Replacement of an existing item.
    Update,
    /// Removal of a single item.
    Delete,
    /// Removal of several items at once.
    BulkDelete,
}

impl MutationKind {
    /// Machine-friendly discriminator for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::BulkDelete => "bulk_delete",
        }
    }
}

/// A single-item mutation request.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation<T: ListItem> {
    /// Create `T`; it is shown at the top of the page until the refresh.
    Create(T),
    /// Replace the item with the same identifier.
    Update(T),
    /// Delete the item with this identifier.
    Delete(T::Id),
}

impl<T: ListItem> Mutation<T> {
    /// Kind of this mutation.
    #[must_use]
    pub const fn kind(&self) -> MutationKind {
        match self {
            Self::Create(_) => MutationKind::Create,
            Self::Update(_) => MutationKind::Update,
            Self::Delete(_) => MutationKind::Delete,
        }
    }

    fn validate(&self) -> ControllerResult<()> {
        match self {
            Self::Create(item) | Self::Update(item) => {
                item.validate().map_err(ControllerError::validation)
            }
            Self::Delete(_) => Ok(()),
        }
    }

    fn optimistic_change(&self) -> OptimisticChange<T> {
        match self {
            Self::Create(item) => OptimisticChange::Insert(item.clone()),
            Self::Update(item) => OptimisticChange::Replace(item.clone()),
            Self::Delete(id) => OptimisticChange::Remove(vec![id.clone()]),
        }
    }

    fn target(&self) -> MutationTarget<T> {
        match self {
            Self::Create(item) | Self::Update(item) => MutationTarget::Item(item.clone()),
            Self::Delete(id) => MutationTarget::Ids(vec![id.clone()]),
        }
    }
}

/// What a pending mutation acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationTarget<T: ListItem> {
    /// A full item (create or update).
    Item(T),
    /// One or more identifiers (delete).
    Ids(Vec<T::Id>),
}

/// A mutation whose backend call has not settled yet.
#[derive(Debug, Clone)]
pub struct PendingMutation<T: ListItem> {
    /// Opaque token identifying the mutation.
    pub request_id: Uuid,
    /// Kind of mutation.
    pub kind: MutationKind,
    /// Item or identifiers the mutation acts on.
    pub target: MutationTarget<T>,
    /// Collection captured immediately before the optimistic change.
    pub snapshot: CollectionSnapshot<T>,
    /// Collection produced by the optimistic change.
    pub applied: CollectionSnapshot<T>,
    /// Cache generation when the change was applied.
    pub generation: u64,
}

/// Identifier that could not be deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFailure<Id> {
    /// Identifier of the failed item.
    pub id: Id,
    /// Classified failure.
    pub error: ControllerError,
}

/// Partial-success report of a bulk delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkDeleteReport<Id> {
    /// Identifiers deleted successfully.
    pub deleted: Vec<Id>,
    /// Identifiers that failed, with their errors.
    pub failed: Vec<BulkFailure<Id>>,
}

impl<Id> Default for BulkDeleteReport<Id> {
    fn default() -> Self {
        Self {
            deleted: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<Id: Clone> BulkDeleteReport<Id> {
    /// Whether every requested deletion succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Identifiers of failed deletions.
    #[must_use]
    pub fn failed_ids(&self) -> Vec<Id> {
        self.failed.iter().map(|failure| failure.id.clone()).collect()
    }
}

impl<T: ListItem> ListController<T> {
    /// Create an item optimistically.
    ///
    /// # Errors
    ///
    /// See [`ListController::mutate`].
    pub async fn create(&self, item: T) -> ControllerResult<()> {
        self.mutate(Mutation::Create(item)).await
    }

    /// Update an item optimistically.
    ///
    /// # Errors
    ///
    /// See [`ListController::mutate`].
    pub async fn update(&self, item: T) -> ControllerResult<()> {
        self.mutate(Mutation::Update(item)).await
    }

    /// Delete one item optimistically.
    ///
    /// # Errors
    ///
    /// See [`ListController::mutate`].
    pub async fn delete(&self, id: T::Id) -> ControllerResult<()> {
        self.mutate(Mutation::Delete(id)).await
    }

    /// Apply `mutation` optimistically, call the backend, and reconcile.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::Validation`] when client-side validation fails; no
    ///   backend call is made and the collection is untouched.
    /// - [`ControllerError::Conflict`] when the target changed server-side; the
    ///   list is refreshed.
    /// - Any other backend failure; the optimistic change is undone unless a
    ///   fetch has replaced the collection since.
    pub async fn mutate(&self, mutation: Mutation<T>) -> ControllerResult<()> {
        mutation.validate()?;
        let kind = mutation.kind();
        let request_id = Uuid::new_v4();
        let applied = {
            let mut state = self.state();
            if state.torn_down {
                return Err(ControllerError::Cancelled);
            }
            let snapshot = state.cache.apply_change(&mutation.optimistic_change());
            let applied = state.cache.snapshot();
            let generation = state.cache.generation();
            state.pending.insert(
                request_id,
                PendingMutation {
                    request_id,
                    kind,
                    target: mutation.target(),
                    snapshot,
                    applied: Arc::clone(&applied),
                    generation,
                },
            );
            applied
        };
        self.emit_collection(&applied);

        let backend = Arc::clone(&self.inner.backend);
        let result = match &mutation {
            Mutation::Create(item) => backend.create(item).await,
            Mutation::Update(item) => backend.update(item).await,
            Mutation::Delete(id) => backend.delete(id).await,
        }
        .map_err(ControllerError::from);

        let pending = self.state().pending.remove(&request_id);
        match result {
            Ok(()) => {
                info!(resource = %self.inner.resource, %request_id, kind = kind.label(), "mutation confirmed");
                if let Mutation::Delete(id) = &mutation {
                    self.forget_selected(std::slice::from_ref(id));
                }
                self.refresh().await;
                Ok(())
            }
            Err(ControllerError::Conflict { message }) => {
                warn!(resource = %self.inner.resource, %request_id, kind = kind.label(), message = %message, "mutation conflicted; refreshing");
                self.emit(ControllerEvent::Notice(Notice::MutationConflict {
                    kind,
                    message: message.clone(),
                }));
                self.refresh().await;
                Err(ControllerError::Conflict { message })
            }
            Err(error) => {
                warn!(resource = %self.inner.resource, %request_id, kind = kind.label(), error = %error, "mutation failed; undoing optimistic change");
                if let Some(pending) = pending
                    && let Some(restored) =
                        self.undo_failed(&pending, &mutation.optimistic_change(), true)
                {
                    self.emit_collection(&restored);
                }
                self.emit(ControllerEvent::Notice(Notice::MutationFailed {
                    kind,
                    error: error.clone(),
                }));
                Err(error)
            }
        }
    }

    /// Delete several items; succeeded deletions stay deleted even when others
    /// fail.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Cancelled`] after teardown. Per-item failures
    /// are reported in the [`BulkDeleteReport`], not as an error.
    pub async fn delete_many<I>(&self, ids: I) -> ControllerResult<BulkDeleteReport<T::Id>>
    where
        I: IntoIterator<Item = T::Id>,
    {
        let mut seen = BTreeSet::new();
        let ids: Vec<T::Id> = ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        if ids.is_empty() {
            return Ok(BulkDeleteReport::default());
        }

        let request_id = Uuid::new_v4();
        let applied = {
            let mut state = self.state();
            if state.torn_down {
                return Err(ControllerError::Cancelled);
            }
            let snapshot = state
                .cache
                .apply_change(&OptimisticChange::Remove(ids.clone()));
            let applied = state.cache.snapshot();
            let generation = state.cache.generation();
            state.pending.insert(
                request_id,
                PendingMutation {
                    request_id,
                    kind: MutationKind::BulkDelete,
                    target: MutationTarget::Ids(ids.clone()),
                    snapshot,
                    applied: Arc::clone(&applied),
                    generation,
                },
            );
            applied
        };
        self.emit_collection(&applied);

        let backend = Arc::clone(&self.inner.backend);
        let outcomes = backend.delete_batch(&ids).await;
        let report = collect_report(&ids, outcomes);

        let pending = self.state().pending.remove(&request_id);
        if !report.is_complete()
            && let Some(pending) = pending
            && let Some(restored) = self.undo_failed(
                &pending,
                &OptimisticChange::Remove(report.failed_ids()),
                report.deleted.is_empty(),
            )
        {
            self.emit_collection(&restored);
        }

        if !report.deleted.is_empty() {
            self.forget_selected(&report.deleted);
        }
        info!(
            resource = %self.inner.resource,
            %request_id,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "bulk delete settled"
        );
        if !report.is_complete() {
            warn!(resource = %self.inner.resource, %request_id, failed = report.failed.len(), "bulk delete partially failed");
            self.emit(ControllerEvent::Notice(Notice::BulkDeletePartial {
                deleted: report.deleted.len(),
                failed: report.failed.len(),
            }));
        }
        if !report.deleted.is_empty() {
            self.refresh().await;
        }
        Ok(report)
    }

    /// Delete every selected identifier.
    ///
    /// # Errors
    ///
    /// See [`ListController::delete_many`].
    pub async fn delete_selected(&self) -> ControllerResult<BulkDeleteReport<T::Id>> {
        let ids = self.selected_ids();
        self.delete_many(ids).await
    }

    /// Mutations whose backend call has not settled yet.
    #[must_use]
    pub fn pending_mutations(&self) -> Vec<PendingMutation<T>> {
        self.state().pending.values().cloned().collect()
    }

    /// Undo `change` after its backend call failed.
    ///
    /// `whole` says the change covers everything `pending` applied, so the
    /// exact snapshot can come back when nothing else touched the collection.
    /// Returns `None` when a fetch has replaced the collection since.
    fn undo_failed(
        &self,
        pending: &PendingMutation<T>,
        change: &OptimisticChange<T>,
        whole: bool,
    ) -> Option<CollectionSnapshot<T>> {
        let mut state = self.state();
        if state.cache.generation() != pending.generation {
            debug!(resource = %self.inner.resource, request_id = %pending.request_id, "collection refetched since the optimistic change; nothing to undo");
            return None;
        }
        if whole && Arc::ptr_eq(&state.cache.snapshot(), &pending.applied) {
            state.cache.rollback(Arc::clone(&pending.snapshot));
        } else {
            let page_size = state.cache.page_size();
            state
                .cache
                .apply_optimistic(|current| change.revert(current, &pending.snapshot, page_size));
        }
        Some(state.cache.snapshot())
    }

    fn forget_selected(&self, ids: &[T::Id]) {
        let remaining = {
            let mut state = self.state();
            let before = state.selection.len();
            state.selection.remove_many(ids);
            (state.selection.len() != before).then(|| state.selection.ids())
        };
        if let Some(remaining) = remaining {
            self.selection_changed(&remaining);
        }
    }
}

/// Pair each requested id with its outcome; ids the backend did not report on
/// count as failed.
fn collect_report<Id: Clone + Eq + std::hash::Hash>(
    requested: &[Id],
    outcomes: Vec<(Id, Result<(), SourceError>)>,
) -> BulkDeleteReport<Id> {
    let mut report = BulkDeleteReport::default();
    let mut reported = HashSet::new();
    for (id, outcome) in outcomes {
        if !reported.insert(id.clone()) {
            continue;
        }
        match outcome {
            Ok(()) => report.deleted.push(id),
            Err(error) => report.failed.push(BulkFailure {
                id,
                error: error.into(),
            }),
        }
    }
    for id in requested {
        if !reported.contains(id) {
            report.failed.push(BulkFailure {
                id: id.clone(),
                error: ControllerError::Network {
                    message: "backend did not report a result".to_string(),
                },
            });
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_marks_unreported_ids_as_failed() {
        let outcomes = vec![
            (1, Ok(())),
            (
                2,
                Err(SourceError::Transport {
                    operation: "delete",
                    message: "reset".into(),
                }),
            ),
            (1, Ok(())),
        ];
        let report = collect_report(&[1, 2, 3], outcomes);
        assert_eq!(report.deleted, vec![1]);
        assert_eq!(report.failed_ids(), vec![2, 3]);
        assert!(!report.is_complete());
        assert!(matches!(
            report.failed[0].error,
            ControllerError::Network { .. }
        ));
    }

    #[test]
    fn kinds_have_stable_labels() {
        assert_eq!(MutationKind::Create.label(), "create");
        assert_eq!(MutationKind::BulkDelete.label(), "bulk_delete");
        assert_eq!(Mutation::<Row>::Delete(4).kind(), MutationKind::Delete);
    }

    #[test]
    fn validation_runs_before_anything_else() {
        let invalid = Mutation::Create(Row { id: 0 });
        assert_eq!(
            invalid.validate(),
            Err(ControllerError::validation("id must be positive"))
        );
        assert!(Mutation::<Row>::Delete(0).validate().is_ok());
    }

    #[derive(Debug, Clone, PartialEq, serde::Deserialize)]
    struct Row {
        id: u32,
    }

    impl ListItem for Row {
        type Id = u32;

        fn id(&self) -> u32 {
            self.id
        }

        fn validate(&self) -> Result<(), String> {
            if self.id == 0 {
                Err("id must be positive".into())
            } else {
                Ok(())
            }
        }
    }
}

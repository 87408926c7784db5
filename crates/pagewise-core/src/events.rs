//! Change notifications emitted by a list controller.
//!
//! The hub wraps `tokio::broadcast` with a bounded buffer; slow observers lose
//! the oldest events instead of stalling the controller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::{self, Receiver, Sender};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::error::ControllerError;
use crate::model::LoadingState;
use crate::mutation::MutationKind;

/// Identifier assigned to each emitted event.
pub type EventId = u64;

/// Observable state changes of a list view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// The visible collection was replaced (fetch, optimistic change, or rollback).
    CollectionChanged {
        /// Items on the visible page.
        items: usize,
        /// Total matching items reported for the query.
        total_count: u64,
    },
    /// The loading state moved.
    LoadingChanged(LoadingState),
    /// The selected identifiers changed.
    SelectionChanged {
        /// Number of selected identifiers.
        selected: usize,
    },
    /// The committed query changed; carries the shareable query string.
    QueryChanged {
        /// Encoded query without defaults.
        query: String,
    },
    /// A user-facing notice for a failure the view should surface.
    Notice(Notice),
}

impl ControllerEvent {
    /// Machine-friendly discriminator for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CollectionChanged { .. } => "collection_changed",
            Self::LoadingChanged(_) => "loading_changed",
            Self::SelectionChanged { .. } => "selection_changed",
            Self::QueryChanged { .. } => "query_changed",
            Self::Notice(_) => "notice",
        }
    }
}

/// Failure surfaced next to the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The latest fetch failed; `retryable` drives the retry affordance.
    FetchFailed {
        /// Classified failure.
        error: ControllerError,
        /// Whether a retry may succeed.
        retryable: bool,
    },
    /// A mutation failed and its optimistic change was rolled back.
    MutationFailed {
        /// Which mutation failed.
        kind: MutationKind,
        /// Classified failure.
        error: ControllerError,
    },
    /// The mutation target changed server-side; the list was refreshed.
    MutationConflict {
        /// Which mutation conflicted.
        kind: MutationKind,
        /// Server-provided description.
        message: String,
    },
    /// Part of a bulk delete failed.
    BulkDeletePartial {
        /// Items deleted successfully.
        deleted: usize,
        /// Items that failed and were restored.
        failed: usize,
    },
}

/// Metadata wrapper around events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: ControllerEvent,
}

/// Broadcast hub owned by a controller.
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: Sender<EventEnvelope>,
    next_id: Arc<AtomicU64>,
}

impl EventHub {
    /// Hub buffering up to `capacity` events per observer.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Emit an event to every current observer.
    pub fn emit(&self, event: ControllerEvent) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };
        // No observers is not an error.
        let _ = self.sender.send(envelope);
        id
    }

    /// Observe events emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiving half handed to observers.
#[derive(Debug)]
pub struct EventStream {
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Wait for the next event, skipping over dropped ones.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next buffered event without waiting.
    pub fn try_next(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.receiver.try_recv() {
                Ok(envelope) => return Some(envelope),
                Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drain every buffered event.
    pub fn drain(&mut self) -> Vec<ControllerEvent> {
        std::iter::from_fn(|| self.try_next())
            .map(|envelope| envelope.event)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn observers_receive_events_in_order() {
        let hub = EventHub::with_capacity(8);
        let mut stream = hub.subscribe();
        let first = hub.emit(ControllerEvent::SelectionChanged { selected: 1 });
        let second = hub.emit(ControllerEvent::QueryChanged {
            query: "page=2".into(),
        });
        assert!(second > first);

        let envelope = stream.next().await.expect("first event");
        assert_eq!(envelope.id, first);
        assert_eq!(envelope.event.kind(), "selection_changed");
        assert_eq!(
            stream.drain(),
            vec![ControllerEvent::QueryChanged {
                query: "page=2".into()
            }]
        );
    }

    #[test]
    fn emitting_without_observers_is_fine() {
        let hub = EventHub::with_capacity(2);
        assert_eq!(hub.observer_count(), 0);
        hub.emit(ControllerEvent::LoadingChanged(LoadingState::Ready));
    }

    #[test]
    fn lagging_observers_skip_to_newest() {
        let hub = EventHub::with_capacity(2);
        let mut stream = hub.subscribe();
        for selected in 0..5 {
            hub.emit(ControllerEvent::SelectionChanged { selected });
        }
        assert_eq!(
            stream.drain(),
            vec![
                ControllerEvent::SelectionChanged { selected: 3 },
                ControllerEvent::SelectionChanged { selected: 4 },
            ]
        );
    }
}

//! Fetch coordination: sequencing, cancellation, and response decoding.
//!
//! # Design
//! - Every request gets a monotonically increasing sequence number; starting a
//!   new one cancels the token of the previous request.
//! - Only the latest sequence may write to the cache. Older results are
//!   dropped by the caller after comparing against [`FetchTracker::is_latest`].
//! - A request is held until `min_loading` has elapsed so quick replies do not
//!   flash the loading indicator.

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ControllerError, ControllerResult};
use crate::model::{ListItem, ResourceCollection, page_count};
use crate::ports::{ListBackend, PageRequest};

/// How a fetch settled from the caller's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The response became the visible collection.
    Applied,
    /// A newer request was issued before this one settled.
    Superseded,
    /// The request was cancelled (newer request or teardown).
    Cancelled,
    /// The request failed and the failure is now visible.
    Failed(ControllerError),
}

impl FetchOutcome {
    /// Whether the response was applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Machine-friendly discriminator for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Superseded => "superseded",
            Self::Cancelled => "cancelled",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug)]
struct InFlight {
    seq: u64,
    token: CancellationToken,
}

/// Sequence and cancellation bookkeeping for one list view.
#[derive(Debug, Default)]
pub(crate) struct FetchTracker {
    issued: u64,
    in_flight: Option<InFlight>,
}

impl FetchTracker {
    /// Start a new request, cancelling whichever one is in flight.
    pub(crate) fn begin(&mut self) -> (u64, CancellationToken) {
        if let Some(previous) = self.in_flight.take() {
            previous.token.cancel();
        }
        self.issued += 1;
        let token = CancellationToken::new();
        self.in_flight = Some(InFlight {
            seq: self.issued,
            token: token.clone(),
        });
        (self.issued, token)
    }

    /// Whether `seq` is the most recently issued request.
    pub(crate) const fn is_latest(&self, seq: u64) -> bool {
        seq == self.issued
    }

    /// Mark `seq` as settled.
    pub(crate) fn finish(&mut self, seq: u64) {
        if self.in_flight.as_ref().is_some_and(|flight| flight.seq == seq) {
            self.in_flight = None;
        }
    }

    /// Cancel the in-flight request; returns whether one was live.
    pub(crate) fn cancel_in_flight(&mut self) -> bool {
        self.in_flight.take().is_some_and(|flight| {
            flight.token.cancel();
            true
        })
    }

    /// Whether a request is awaiting its result.
    pub(crate) const fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }
}

/// Issue `request`, honour cancellation, and keep the loading state visible for
/// at least `min_loading`.
pub(crate) async fn run_fetch<T: ListItem>(
    backend: &dyn ListBackend<T>,
    request: &PageRequest,
    cancel: &CancellationToken,
    min_loading: Duration,
) -> ControllerResult<ResourceCollection<T>> {
    let started = Instant::now();
    // The backend is polled first so it can observe the token itself; the
    // second branch covers backends that ignore it.
    let reply = tokio::select! {
        biased;
        result = backend.fetch_page(request, cancel.clone()) => result,
        () = cancel.cancelled() => return Err(ControllerError::Cancelled),
    };

    // Failed replies wait out the minimum too.
    let remaining = min_loading.saturating_sub(started.elapsed());
    if !remaining.is_zero() {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ControllerError::Cancelled),
            () = sleep(remaining) => {}
        }
    }
    if cancel.is_cancelled() {
        return Err(ControllerError::Cancelled);
    }

    let collection = decode_page(reply?, request.key.page_size)?;
    debug!(
        seq = request.seq,
        items = collection.len(),
        total_count = collection.total_count,
        elapsed_ms = started.elapsed().as_millis(),
        "list page decoded"
    );
    Ok(collection)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEnvelope {
    #[serde(default)]
    items: Option<Value>,
    #[serde(default)]
    total_pages: Option<u64>,
    #[serde(default)]
    total_count: Option<u64>,
}

/// Decode a list envelope.
///
/// Missing `totalCount` falls back to the number of items; missing
/// `totalPages` is derived from the count and `page_size`.
pub(crate) fn decode_page<T: ListItem>(
    payload: Value,
    page_size: u32,
) -> ControllerResult<ResourceCollection<T>> {
    let envelope: ListEnvelope =
        serde_json::from_value(payload).map_err(|err| ControllerError::Malformed {
            message: err.to_string(),
        })?;
    let Some(Value::Array(raw)) = envelope.items else {
        return Err(ControllerError::Malformed {
            message: "`items` is missing or not an array".to_string(),
        });
    };
    let items = raw
        .into_iter()
        .map(serde_json::from_value::<T>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| ControllerError::Malformed {
            message: format!("invalid item: {err}"),
        })?;
    let total_count = envelope.total_count.unwrap_or(items.len() as u64);
    let total_pages = envelope
        .total_pages
        .map_or_else(|| page_count(total_count, page_size), |pages| pages.max(1));
    Ok(ResourceCollection {
        items,
        total_count,
        total_pages,
        fetched_at: Utc::now(),
    })
}

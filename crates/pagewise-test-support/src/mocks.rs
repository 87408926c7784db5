//! In-memory backend with scripted latency and failures, plus recording ports.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use pagewise_core::{
    ListBackend, ListItem, LocationSink, MutationKind, PageRequest, QueryKey, SourceError,
    page_count,
};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

/// Server-side search/filter/sort applied before paging.
pub type ViewFn<T> = Arc<dyn Fn(&[T], &QueryKey) -> Vec<T> + Send + Sync>;

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How a recorded list call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// Still waiting for its latency to elapse.
    Pending,
    /// Answered with a payload.
    Answered,
    /// Abandoned because the cancellation token fired.
    Cancelled,
    /// Answered with an injected failure.
    Failed,
}

/// One list request observed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    /// Sequence number stamped by the controller.
    pub seq: u64,
    /// Request query string.
    pub query: String,
    /// Requested page.
    pub page: u32,
    /// When the call arrived.
    pub started_at: Instant,
    /// How the call ended.
    pub outcome: CallOutcome,
}

/// One mutation observed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationCall {
    /// Mutation kind.
    pub kind: MutationKind,
    /// Identifier of the target, rendered.
    pub id: String,
}

/// Scripted list backend over an in-memory dataset.
pub struct ScriptedBackend<T: ListItem> {
    items: Mutex<Vec<T>>,
    view: Option<ViewFn<T>>,
    default_latency: Duration,
    mutation_latency: Duration,
    latencies: Mutex<VecDeque<Duration>>,
    mutation_latencies: Mutex<VecDeque<Duration>>,
    fetch_failures: Mutex<VecDeque<SourceError>>,
    page_failures: Mutex<HashMap<u32, SourceError>>,
    mutation_failures: Mutex<VecDeque<SourceError>>,
    delete_failures: Mutex<HashMap<T::Id, SourceError>>,
    payload_override: Mutex<Option<Value>>,
    omit_totals: AtomicBool,
    calls: Mutex<Vec<FetchCall>>,
    mutations: Mutex<Vec<MutationCall>>,
}

impl<T: ListItem + Serialize> ScriptedBackend<T> {
    /// Backend serving `items` in order with no latency.
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: Mutex::new(items),
            view: None,
            default_latency: Duration::ZERO,
            mutation_latency: Duration::ZERO,
            latencies: Mutex::new(VecDeque::new()),
            mutation_latencies: Mutex::new(VecDeque::new()),
            fetch_failures: Mutex::new(VecDeque::new()),
            page_failures: Mutex::new(HashMap::new()),
            mutation_failures: Mutex::new(VecDeque::new()),
            delete_failures: Mutex::new(HashMap::new()),
            payload_override: Mutex::new(None),
            omit_totals: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            mutations: Mutex::new(Vec::new()),
        }
    }

    /// Apply `view` (search, filters, sort) before paging.
    #[must_use]
    pub fn with_view<F>(mut self, view: F) -> Self
    where
        F: Fn(&[T], &QueryKey) -> Vec<T> + Send + Sync + 'static,
    {
        self.view = Some(Arc::new(view));
        self
    }

    /// Latency applied to list calls without a queued latency.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.default_latency = latency;
        self
    }

    /// Latency applied to every mutation call.
    #[must_use]
    pub const fn with_mutation_latency(mut self, latency: Duration) -> Self {
        self.mutation_latency = latency;
        self
    }

    /// Queue a latency for the next list call.
    pub fn push_latency(&self, latency: Duration) {
        lock(&self.latencies).push_back(latency);
    }

    /// Queue a latency for the next mutation call, ahead of the fixed one.
    pub fn push_mutation_latency(&self, latency: Duration) {
        lock(&self.mutation_latencies).push_back(latency);
    }

    /// Fail the next list call with `error`.
    pub fn fail_next_fetch(&self, error: SourceError) {
        lock(&self.fetch_failures).push_back(error);
    }

    /// Fail every list call for `page` with `error`.
    pub fn fail_page(&self, page: u32, error: SourceError) {
        lock(&self.page_failures).insert(page, error);
    }

    /// Fail the next create or update with `error`.
    pub fn fail_next_mutation(&self, error: SourceError) {
        lock(&self.mutation_failures).push_back(error);
    }

    /// Fail every delete of `id` with `error`.
    pub fn fail_delete(&self, id: T::Id, error: SourceError) {
        lock(&self.delete_failures).insert(id, error);
    }

    /// Answer list calls with `payload` verbatim.
    pub fn respond_with(&self, payload: Value) {
        *lock(&self.payload_override) = Some(payload);
    }

    /// Stop answering verbatim payloads.
    pub fn clear_response(&self) {
        *lock(&self.payload_override) = None;
    }

    /// Leave `totalCount` and `totalPages` out of responses.
    pub fn omit_totals(&self, omit: bool) {
        self.omit_totals.store(omit, Ordering::SeqCst);
    }

    /// Current dataset.
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        lock(&self.items).clone()
    }

    /// Every list call so far.
    #[must_use]
    pub fn calls(&self) -> Vec<FetchCall> {
        lock(&self.calls).clone()
    }

    /// Number of list calls so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Number of list calls abandoned through cancellation.
    #[must_use]
    pub fn cancelled_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.outcome == CallOutcome::Cancelled)
            .count()
    }

    /// Every mutation call so far.
    #[must_use]
    pub fn mutation_calls(&self) -> Vec<MutationCall> {
        lock(&self.mutations).clone()
    }

    fn record_call(&self, request: &PageRequest) -> usize {
        let mut calls = lock(&self.calls);
        calls.push(FetchCall {
            seq: request.seq,
            query: request.query.clone(),
            page: request.key.page,
            started_at: Instant::now(),
            outcome: CallOutcome::Pending,
        });
        calls.len() - 1
    }

    fn settle_call(&self, index: usize, outcome: CallOutcome) {
        if let Some(call) = lock(&self.calls).get_mut(index) {
            call.outcome = outcome;
        }
    }

    fn record_mutation(&self, kind: MutationKind, id: &T::Id) {
        lock(&self.mutations).push(MutationCall {
            kind,
            id: id.to_string(),
        });
    }

    fn next_mutation_latency(&self) -> Duration {
        lock(&self.mutation_latencies)
            .pop_front()
            .unwrap_or(self.mutation_latency)
    }

    fn injected_fetch_failure(&self, page: u32) -> Option<SourceError> {
        lock(&self.fetch_failures)
            .pop_front()
            .or_else(|| lock(&self.page_failures).get(&page).cloned())
    }

    fn render_page(&self, key: &QueryKey) -> Result<Value, SourceError> {
        let items = lock(&self.items);
        let matching = self
            .view
            .as_ref()
            .map_or_else(|| items.clone(), |view| view(items.as_slice(), key));
        drop(items);
        let total = matching.len() as u64;
        let size = key.page_size.max(1) as usize;
        let offset = (key.page.max(1) as usize - 1).saturating_mul(size);
        let page = matching
            .iter()
            .skip(offset)
            .take(size)
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| SourceError::Transport {
                operation: "list",
                message: err.to_string(),
            })?;
        if self.omit_totals.load(Ordering::SeqCst) {
            return Ok(json!({ "items": page }));
        }
        Ok(json!({
            "items": page,
            "totalCount": total,
            "totalPages": page_count(total, key.page_size),
        }))
    }
}

#[async_trait]
impl<T: ListItem + Serialize> ListBackend<T> for ScriptedBackend<T> {
    async fn fetch_page(
        &self,
        request: &PageRequest,
        cancel: CancellationToken,
    ) -> Result<Value, SourceError> {
        let index = self.record_call(request);
        let latency = lock(&self.latencies)
            .pop_front()
            .unwrap_or(self.default_latency);
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                self.settle_call(index, CallOutcome::Cancelled);
                return Err(SourceError::Cancelled);
            }
            () = sleep(latency) => {}
        }
        if let Some(error) = self.injected_fetch_failure(request.key.page) {
            self.settle_call(index, CallOutcome::Failed);
            return Err(error);
        }
        let payload = lock(&self.payload_override).clone();
        let result = payload.map_or_else(|| self.render_page(&request.key), Ok);
        self.settle_call(
            index,
            if result.is_ok() {
                CallOutcome::Answered
            } else {
                CallOutcome::Failed
            },
        );
        result
    }

    async fn create(&self, item: &T) -> Result<(), SourceError> {
        let id = item.id();
        self.record_mutation(MutationKind::Create, &id);
        sleep(self.next_mutation_latency()).await;
        if let Some(error) = lock(&self.mutation_failures).pop_front() {
            return Err(error);
        }
        let mut items = lock(&self.items);
        if items.iter().any(|row| row.id() == id) {
            return Err(SourceError::Conflict {
                operation: "create",
                message: format!("{id} already exists"),
            });
        }
        items.insert(0, item.clone());
        Ok(())
    }

    async fn update(&self, item: &T) -> Result<(), SourceError> {
        let id = item.id();
        self.record_mutation(MutationKind::Update, &id);
        sleep(self.next_mutation_latency()).await;
        if let Some(error) = lock(&self.mutation_failures).pop_front() {
            return Err(error);
        }
        let mut items = lock(&self.items);
        let Some(slot) = items.iter_mut().find(|row| row.id() == id) else {
            return Err(SourceError::Conflict {
                operation: "update",
                message: format!("{id} no longer exists"),
            });
        };
        *slot = item.clone();
        Ok(())
    }

    async fn delete(&self, id: &T::Id) -> Result<(), SourceError> {
        self.record_mutation(MutationKind::Delete, id);
        sleep(self.next_mutation_latency()).await;
        if let Some(error) = lock(&self.delete_failures).get(id).cloned() {
            return Err(error);
        }
        let mut items = lock(&self.items);
        let before = items.len();
        items.retain(|row| &row.id() != id);
        if items.len() == before {
            return Err(SourceError::Conflict {
                operation: "delete",
                message: format!("{id} no longer exists"),
            });
        }
        Ok(())
    }
}

/// Location port that keeps every write.
#[derive(Debug, Default)]
pub struct RecordingLocation {
    history: Mutex<Vec<String>>,
}

impl RecordingLocation {
    /// Every query written, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        lock(&self.history).clone()
    }

    /// Latest query written, if any.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        lock(&self.history).last().cloned()
    }
}

impl LocationSink for RecordingLocation {
    fn replace(&self, query: &str) {
        lock(&self.history).push(query.to_string());
    }
}

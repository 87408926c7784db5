//! List controller: the orchestration point for one paginated resource view.
//!
//! # Design
//! - All shared state lives behind one mutex; every cache write is a short
//!   critical section and no guard is held across an await point.
//! - Navigation operations commit a new [`QueryKey`], write the shareable
//!   query to the location port, and run the fetch pipeline.
//! - Observers learn about changes through the [`EventHub`]; the controller
//!   never calls back into presentation code.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CollectionSnapshot, ResourceCache};
use crate::config::ControllerConfig;
use crate::debounce::Debouncer;
use crate::error::{ConfigError, ControllerError, ControllerResult, ExportError};
use crate::events::{ControllerEvent, EventHub, EventStream, Notice};
use crate::export::{ExportColumn, to_csv};
use crate::fetch::{FetchOutcome, FetchTracker, run_fetch};
use crate::model::{ListItem, LoadingState, ResourceCollection};
use crate::mutation::PendingMutation;
use crate::ports::{
    ListBackend, LocationSink, MemoryLocation, MemoryPreferenceStore, PageRequest,
    PreferenceStore,
};
use crate::query::{QueryCodec, QueryKey, Sort, Vocabulary};
use crate::selection::SelectionTracker;

/// Mutable view state guarded by the controller mutex.
pub(crate) struct ViewState<T: ListItem> {
    pub(crate) key: QueryKey,
    search_draft: String,
    search_evaluated: bool,
    pub(crate) cache: ResourceCache<T>,
    pub(crate) selection: SelectionTracker<T::Id>,
    fetches: FetchTracker,
    pub(crate) pending: HashMap<Uuid, PendingMutation<T>>,
    pub(crate) torn_down: bool,
}

pub(crate) struct Shared<T: ListItem> {
    pub(crate) resource: String,
    pub(crate) config: ControllerConfig,
    codec: QueryCodec,
    pub(crate) backend: Arc<dyn ListBackend<T>>,
    preferences: Arc<dyn PreferenceStore>,
    location: Arc<dyn LocationSink>,
    pub(crate) events: EventHub,
    debouncer: Debouncer,
    state: Mutex<ViewState<T>>,
}

/// Synchronization controller for one paginated resource.
///
/// Cloning yields another handle to the same view.
pub struct ListController<T: ListItem> {
    pub(crate) inner: Arc<Shared<T>>,
}

impl<T: ListItem> Clone for ListController<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ListItem> fmt::Debug for ListController<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListController")
            .field("resource", &self.inner.resource)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Builder wiring a controller to its backend and ports.
pub struct ListControllerBuilder<T: ListItem> {
    resource: String,
    backend: Arc<dyn ListBackend<T>>,
    vocabulary: Vocabulary,
    config: ControllerConfig,
    preferences: Option<Arc<dyn PreferenceStore>>,
    location: Option<Arc<dyn LocationSink>>,
    initial_query: String,
}

impl<T: ListItem> ListControllerBuilder<T> {
    /// Filter and sort vocabulary of the resource.
    #[must_use]
    pub fn vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    /// Controller tunables.
    #[must_use]
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Preference storage; defaults to an in-memory store.
    #[must_use]
    pub fn preferences(mut self, preferences: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    /// Location port; defaults to an in-memory location.
    #[must_use]
    pub fn location(mut self, location: Arc<dyn LocationSink>) -> Self {
        self.location = Some(location);
        self
    }

    /// Query string the view was opened with (e.g. from a shared link).
    #[must_use]
    pub fn initial_query(mut self, query: impl Into<String>) -> Self {
        self.initial_query = query.into();
        self
    }

    /// Validate the configuration and assemble the controller.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration is invalid.
    pub fn build(self) -> Result<ListController<T>, ConfigError> {
        self.config.validate()?;
        let codec = QueryCodec::new(
            self.vocabulary,
            self.config.default_page_size,
            self.config.max_page_size,
        );
        let preferences = self
            .preferences
            .unwrap_or_else(|| Arc::new(MemoryPreferenceStore::default()));
        let location = self
            .location
            .unwrap_or_else(|| Arc::new(MemoryLocation::default()));

        let page_size_key = preference_key(&self.config, &self.resource, "page_size");
        let selection_key = preference_key(&self.config, &self.resource, "selection");

        let mut key = codec.decode(&self.initial_query);
        if codec.explicit_page_size(&self.initial_query).is_none()
            && let Some(stored) = preferences
                .load(&page_size_key)
                .and_then(|raw| raw.trim().parse::<u32>().ok())
                .filter(|size| self.config.accepts_page_size(*size))
        {
            key.page_size = stored;
        }
        let selection = preferences
            .load(&selection_key)
            .map_or_else(SelectionTracker::default, |raw| {
                serde_json::from_str::<Vec<T::Id>>(&raw).map_or_else(
                    |err| {
                        warn!(resource = %self.resource, error = %err, "ignoring unreadable stored selection");
                        SelectionTracker::default()
                    },
                    SelectionTracker::restore,
                )
            });

        let state = ViewState {
            search_draft: key.search.clone(),
            search_evaluated: false,
            cache: ResourceCache::new(key.page_size),
            selection,
            fetches: FetchTracker::default(),
            pending: HashMap::new(),
            torn_down: false,
            key,
        };
        debug!(resource = %self.resource, query = %codec.encode(&state.key), "controller initialised");
        Ok(ListController {
            inner: Arc::new(Shared {
                events: EventHub::with_capacity(self.config.event_capacity),
                debouncer: Debouncer::new(self.config.debounce()),
                resource: self.resource,
                config: self.config,
                codec,
                backend: self.backend,
                preferences,
                location,
                state: Mutex::new(state),
            }),
        })
    }
}

fn preference_key(config: &ControllerConfig, resource: &str, name: &str) -> String {
    format!("{}.{resource}.{name}", config.storage_namespace)
}

impl<T: ListItem> ListController<T> {
    /// Start building a controller for `resource` backed by `backend`.
    pub fn builder(
        resource: impl Into<String>,
        backend: Arc<dyn ListBackend<T>>,
    ) -> ListControllerBuilder<T> {
        ListControllerBuilder {
            resource: resource.into(),
            backend,
            vocabulary: Vocabulary::default(),
            config: ControllerConfig::default(),
            preferences: None,
            location: None,
            initial_query: String::new(),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ViewState<T>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn emit(&self, event: ControllerEvent) {
        debug!(resource = %self.inner.resource, event = event.kind(), "controller event");
        self.inner.events.emit(event);
    }

    pub(crate) fn emit_collection(&self, collection: &ResourceCollection<T>) {
        self.emit(ControllerEvent::CollectionChanged {
            items: collection.len(),
            total_count: collection.total_count,
        });
    }

    /// Resource name used for logs and preference keys.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.inner.resource
    }

    /// Codec translating keys to and from query strings.
    #[must_use]
    pub fn codec(&self) -> &QueryCodec {
        &self.inner.codec
    }

    /// Observe controller events emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        self.inner.events.subscribe()
    }

    /// Committed query key.
    #[must_use]
    pub fn query(&self) -> QueryKey {
        self.state().key.clone()
    }

    /// Shareable form of the committed key.
    #[must_use]
    pub fn shareable_query(&self) -> String {
        let key = self.query();
        self.inner.codec.encode(&key)
    }

    /// Raw search input, which may be ahead of the committed key.
    #[must_use]
    pub fn search_draft(&self) -> String {
        self.state().search_draft.clone()
    }

    /// Visible collection snapshot.
    #[must_use]
    pub fn collection(&self) -> CollectionSnapshot<T> {
        self.state().cache.snapshot()
    }

    /// Current loading state.
    #[must_use]
    pub fn loading(&self) -> LoadingState {
        self.state().cache.loading().clone()
    }

    /// Whether a list request is awaiting its result.
    #[must_use]
    pub fn is_fetching(&self) -> bool {
        self.state().fetches.has_in_flight()
    }

    /// First evaluation after construction: fetch the initial key without
    /// resetting its page.
    pub async fn start(&self) -> FetchOutcome {
        let key = {
            let mut state = self.state();
            state.search_evaluated = true;
            state.key.clone()
        };
        self.request(key).await
    }

    /// Commit `key` and fetch it, superseding any in-flight request.
    pub async fn request(&self, key: QueryKey) -> FetchOutcome {
        let page_size = key.page_size;
        let query = self.inner.codec.request_query(&key);
        let shareable = self.inner.codec.encode(&key);
        let (seq, token, loading, key_changed) = {
            let mut state = self.state();
            if state.torn_down {
                return FetchOutcome::Cancelled;
            }
            let key_changed = state.key != key;
            state.key = key.clone();
            state.cache.set_page_size(page_size);
            let (seq, token) = state.fetches.begin();
            let loading = state.cache.begin_fetch().clone();
            (seq, token, loading, key_changed)
        };

        self.inner.location.replace(&shareable);
        if key_changed {
            info!(resource = %self.inner.resource, query = %shareable, "query committed");
            self.emit(ControllerEvent::QueryChanged { query: shareable });
        }
        self.emit(ControllerEvent::LoadingChanged(loading));
        debug!(resource = %self.inner.resource, seq, query = %query, "list request issued");

        let request = PageRequest { seq, key, query };
        let result = run_fetch(
            self.inner.backend.as_ref(),
            &request,
            &token,
            self.inner.config.min_loading(),
        )
        .await;
        self.settle(seq, result)
    }

    fn settle(
        &self,
        seq: u64,
        result: ControllerResult<ResourceCollection<T>>,
    ) -> FetchOutcome {
        let mut state = self.state();
        if !state.fetches.is_latest(seq) {
            drop(state);
            let outcome = if matches!(result, Err(ControllerError::Cancelled)) {
                FetchOutcome::Cancelled
            } else {
                FetchOutcome::Superseded
            };
            debug!(resource = %self.inner.resource, seq, outcome = outcome.label(), "stale list response discarded");
            return outcome;
        }
        state.fetches.finish(seq);
        if state.torn_down {
            return FetchOutcome::Cancelled;
        }

        match result {
            Ok(collection) => {
                state.cache.replace(collection);
                let snapshot = state.cache.snapshot();
                drop(state);
                debug!(resource = %self.inner.resource, seq, items = snapshot.len(), outcome = "applied", "list request settled");
                self.emit_collection(&snapshot);
                self.emit(ControllerEvent::LoadingChanged(LoadingState::Ready));
                FetchOutcome::Applied
            }
            Err(ControllerError::Cancelled) => {
                state.cache.settle_cancelled();
                let loading = state.cache.loading().clone();
                drop(state);
                debug!(resource = %self.inner.resource, seq, outcome = "cancelled", "list request settled");
                self.emit(ControllerEvent::LoadingChanged(loading));
                FetchOutcome::Cancelled
            }
            Err(error) => {
                state.cache.fail(error.clone(), self.inner.config.failure_policy);
                let snapshot = state.cache.snapshot();
                drop(state);
                warn!(resource = %self.inner.resource, seq, error = %error, outcome = "failed", "list request failed");
                self.emit_collection(&snapshot);
                self.emit(ControllerEvent::LoadingChanged(LoadingState::Failed(
                    error.clone(),
                )));
                self.emit(ControllerEvent::Notice(Notice::FetchFailed {
                    retryable: error.is_retryable(),
                    error: error.clone(),
                }));
                FetchOutcome::Failed(error)
            }
        }
    }

    /// Re-fetch the committed key.
    pub async fn refresh(&self) -> FetchOutcome {
        let key = self.query();
        self.request(key).await
    }

    /// Re-issue the last committed key after a failure.
    pub async fn retry(&self) -> FetchOutcome {
        debug!(resource = %self.inner.resource, "retrying list request");
        self.refresh().await
    }

    /// Move to `page` (clamped to at least 1).
    pub async fn set_page(&self, page: u32) -> FetchOutcome {
        let key = self.query().with_page(page);
        self.request(key).await
    }

    /// Change the page size, persist the preference, and return to page 1.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Validation`] when the size is outside the
    /// configured bounds.
    pub async fn set_page_size(&self, page_size: u32) -> ControllerResult<FetchOutcome> {
        if !self.inner.config.accepts_page_size(page_size) {
            return Err(ControllerError::validation(format!(
                "page size must be between 1 and {}",
                self.inner.config.max_page_size
            )));
        }
        self.inner.preferences.save(
            &preference_key(&self.inner.config, &self.inner.resource, "page_size"),
            &page_size.to_string(),
        );
        let key = self.query().with_page_size(page_size);
        Ok(self.request(key).await)
    }

    /// Replace every value of a filter field and return to page 1.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Validation`] when `field` is not part of the
    /// resource vocabulary.
    pub async fn set_filter<I, V>(&self, field: &str, values: I) -> ControllerResult<FetchOutcome>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        if !self.inner.codec.vocabulary().accepts_filter(field) {
            return Err(ControllerError::validation(format!(
                "unknown filter field `{field}`"
            )));
        }
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        let key = self.query().with_filter_values(field, values);
        Ok(self.request(key).await)
    }

    /// Drop every filter and return to page 1.
    pub async fn clear_filters(&self) -> FetchOutcome {
        let mut key = self.query();
        key.filters.clear();
        self.request(key.with_page(1)).await
    }

    /// Replace the sort and return to page 1.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Validation`] when the field is not sortable.
    pub async fn set_sort(&self, sort: Option<Sort>) -> ControllerResult<FetchOutcome> {
        if let Some(sort) = &sort
            && !self.inner.codec.vocabulary().accepts_sort(&sort.field)
        {
            return Err(ControllerError::validation(format!(
                "unknown sort field `{}`",
                sort.field
            )));
        }
        let key = self.query().with_sort(sort);
        Ok(self.request(key).await)
    }

    /// Record raw search input; it commits once input has been quiet for the
    /// configured debounce period.
    pub fn set_search(&self, raw: impl Into<String>) {
        let raw = raw.into();
        {
            let mut state = self.state();
            if state.torn_down {
                return;
            }
            state.search_draft.clone_from(&raw);
        }
        let handle = Arc::downgrade(&self.inner);
        self.inner.debouncer.schedule(async move {
            if let Some(inner) = handle.upgrade() {
                let controller = Self { inner };
                let _ = controller.commit_search(raw).await;
            }
        });
    }

    /// Commit search input immediately, discarding any pending debounce.
    pub async fn submit_search(&self, raw: impl Into<String>) -> Option<FetchOutcome> {
        self.inner.debouncer.cancel();
        self.commit_search(raw.into()).await
    }

    /// Whether search input is waiting for the debounce period.
    #[must_use]
    pub fn search_pending(&self) -> bool {
        self.inner.debouncer.is_pending()
    }

    async fn commit_search(&self, term: String) -> Option<FetchOutcome> {
        let key = {
            let mut state = self.state();
            if state.torn_down {
                return None;
            }
            state.search_draft.clone_from(&term);
            let first_evaluation = !state.search_evaluated;
            state.search_evaluated = true;
            if state.key.search == term {
                return None;
            }
            let key = state.key.clone().with_search(term);
            if first_evaluation { key } else { key.with_page(1) }
        };
        Some(self.request(key).await)
    }

    /// Apply an inbound location change.
    pub async fn navigate(&self, query: &str) -> FetchOutcome {
        self.inner.debouncer.cancel();
        let key = self.inner.codec.decode(query);
        {
            let mut state = self.state();
            state.search_draft.clone_from(&key.search);
            state.search_evaluated = true;
        }
        self.request(key).await
    }

    /// Toggle one identifier; returns whether it is now selected.
    pub fn toggle_selected(&self, id: T::Id) -> bool {
        let (selected, ids) = {
            let mut state = self.state();
            let selected = state.selection.toggle(id);
            (selected, state.selection.ids())
        };
        self.selection_changed(&ids);
        selected
    }

    /// Select exactly the items of the visible page.
    pub fn select_all(&self) {
        let ids = {
            let mut state = self.state();
            let page = state.cache.snapshot().ids();
            state.selection.select_all(&page);
            state.selection.ids()
        };
        self.selection_changed(&ids);
    }

    /// Header-checkbox toggle for the visible page.
    pub fn toggle_all(&self) {
        let ids = {
            let mut state = self.state();
            let page = state.cache.snapshot().ids();
            state.selection.toggle_all(&page);
            state.selection.ids()
        };
        self.selection_changed(&ids);
    }

    /// Clear the selection.
    pub fn clear_selection(&self) {
        self.state().selection.clear();
        self.selection_changed(&[]);
    }

    /// Selected identifiers in ascending order.
    #[must_use]
    pub fn selected_ids(&self) -> Vec<T::Id> {
        self.state().selection.ids()
    }

    /// Whether `id` is selected.
    #[must_use]
    pub fn is_selected(&self, id: &T::Id) -> bool {
        self.state().selection.contains(id)
    }

    /// Whether every item of the (non-empty) visible page is selected.
    #[must_use]
    pub fn is_all_selected(&self) -> bool {
        let state = self.state();
        state.selection.is_all_selected(&state.cache.snapshot().ids())
    }

    /// Whether something is selected but not the whole visible page.
    #[must_use]
    pub fn is_indeterminate(&self) -> bool {
        let state = self.state();
        state.selection.is_indeterminate(&state.cache.snapshot().ids())
    }

    pub(crate) fn selection_changed(&self, ids: &[T::Id]) {
        self.persist_selection(ids);
        self.emit(ControllerEvent::SelectionChanged {
            selected: ids.len(),
        });
    }

    fn persist_selection(&self, ids: &[T::Id]) {
        match serde_json::to_string(ids) {
            Ok(raw) => self.inner.preferences.save(
                &preference_key(&self.inner.config, &self.inner.resource, "selection"),
                &raw,
            ),
            Err(err) => {
                warn!(resource = %self.inner.resource, error = %err, "failed to serialise selection");
            }
        }
    }

    /// Render the visible page as CSV.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError`] when the CSV writer fails.
    pub fn export_csv(&self, columns: &[ExportColumn<T>]) -> Result<String, ExportError> {
        let snapshot = self.collection();
        to_csv(&snapshot.items, columns)
    }

    /// Cancel pending timers and requests; the controller ignores every
    /// subsequent input.
    pub fn teardown(&self) {
        let debounce_cancelled = self.inner.debouncer.cancel();
        let (fetch_cancelled, ids) = {
            let mut state = self.state();
            if state.torn_down {
                return;
            }
            state.torn_down = true;
            let cancelled = state.fetches.cancel_in_flight();
            state.cache.settle_cancelled();
            (cancelled, state.selection.ids())
        };
        self.persist_selection(&ids);
        debug!(
            resource = %self.inner.resource,
            debounce_cancelled,
            fetch_cancelled,
            "controller torn down"
        );
    }

    /// Whether [`ListController::teardown`] has run.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.state().torn_down
    }
}

#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Paginated-resource synchronization engine.
//!
//! A [`ListController`] keeps one list view (items, paging, filters, sort,
//! selection) consistent with a remote collection: it debounces search input,
//! cancels superseded fetches, applies optimistic mutations with exact
//! rollback, and mirrors the committed query into a shareable location.
//!
//! Layout: query.rs (key + codec), debounce.rs (search timer), fetch.rs
//! (sequencing + decoding), cache.rs (collection + optimistic overlay),
//! mutation.rs (create/update/delete), selection.rs (multi-select), export.rs
//! (CSV), events.rs (observer stream), ports.rs (backend, preferences,
//! location), config.rs, error.rs, controller.rs (orchestration).

pub mod cache;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod error;
pub mod events;
pub mod export;
pub mod fetch;
pub mod model;
pub mod mutation;
pub mod ports;
pub mod query;
pub mod selection;

pub use cache::{CollectionSnapshot, FailurePolicy, OptimisticChange, ResourceCache};
pub use config::ControllerConfig;
pub use controller::{ListController, ListControllerBuilder};
pub use debounce::Debouncer;
pub use error::{
    CodecError, ConfigError, ControllerError, ControllerResult, ExportError, SourceError,
};
pub use events::{ControllerEvent, EventEnvelope, EventHub, EventStream, Notice};
pub use export::{ExportColumn, to_csv};
pub use fetch::FetchOutcome;
pub use model::{ListItem, LoadingState, ResourceCollection, page_count};
pub use mutation::{
    BulkDeleteReport, BulkFailure, Mutation, MutationKind, MutationTarget, PendingMutation,
};
pub use ports::{
    DeleteResult, ListBackend, LocationSink, MemoryLocation, MemoryPreferenceStore,
    PageRequest, PreferenceStore,
};
pub use query::{Filter, QueryCodec, QueryKey, Sort, SortDirection, Vocabulary};
pub use selection::SelectionTracker;

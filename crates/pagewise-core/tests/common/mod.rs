//! Wiring shared by the controller suites.
#![allow(dead_code)]

use std::sync::Arc;

use pagewise_core::{
    ControllerConfig, ListController, MemoryPreferenceStore, PreferenceStore,
};
use pagewise_test_support::fixtures::{Subscriber, subscriber_view, subscriber_vocabulary, subscribers};
use pagewise_test_support::mocks::{RecordingLocation, ScriptedBackend};

pub struct Harness {
    pub backend: Arc<ScriptedBackend<Subscriber>>,
    pub location: Arc<RecordingLocation>,
    pub preferences: Arc<MemoryPreferenceStore>,
    pub controller: ListController<Subscriber>,
}

pub fn backend(count: u32) -> Arc<ScriptedBackend<Subscriber>> {
    Arc::new(ScriptedBackend::new(subscribers(count)).with_view(subscriber_view))
}

pub fn harness(backend: Arc<ScriptedBackend<Subscriber>>, query: &str) -> Harness {
    harness_with(
        backend,
        query,
        ControllerConfig::default(),
        Arc::new(MemoryPreferenceStore::default()),
    )
}

pub fn harness_with(
    backend: Arc<ScriptedBackend<Subscriber>>,
    query: &str,
    config: ControllerConfig,
    preferences: Arc<MemoryPreferenceStore>,
) -> Harness {
    let location = Arc::new(RecordingLocation::default());
    let controller = ListController::<Subscriber>::builder("subscribers", backend.clone())
        .vocabulary(subscriber_vocabulary())
        .config(config)
        .preferences(Arc::clone(&preferences) as Arc<dyn PreferenceStore>)
        .location(location.clone())
        .initial_query(query)
        .build()
        .expect("controller builds");
    Harness {
        backend,
        location,
        preferences,
        controller,
    }
}

pub fn ids(controller: &ListController<Subscriber>) -> Vec<u32> {
    controller.collection().ids()
}

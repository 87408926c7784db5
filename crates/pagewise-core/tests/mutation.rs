mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{backend, harness, harness_with, ids};
use pagewise_core::{
    ControllerConfig, ControllerError, ControllerEvent, FetchOutcome, ListBackend,
    MemoryPreferenceStore, MutationKind, Notice, PreferenceStore, SourceError,
};
use pagewise_test_support::fixtures::{
    Subscriber, subscriber, subscriber_columns, subscriber_view, subscribers,
};
use pagewise_test_support::mocks::ScriptedBackend;
use tokio::time::sleep;

fn slow_mutations(count: u32) -> Arc<ScriptedBackend<Subscriber>> {
    Arc::new(
        ScriptedBackend::new(subscribers(count))
            .with_view(subscriber_view)
            .with_mutation_latency(Duration::from_millis(100)),
    )
}

fn newcomer() -> Subscriber {
    Subscriber {
        id: 99,
        name: "Zed Newcomer".into(),
        plan: "fiber-100".into(),
        status: "active".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn failed_create_restores_the_exact_snapshot() -> anyhow::Result<()> {
    let harness = harness(slow_mutations(50), "");
    let controller = harness.controller.clone();
    controller.start().await;
    let before = controller.collection();
    let mut events = controller.subscribe();

    harness.backend.fail_next_mutation(SourceError::Transport {
        operation: "create",
        message: "503 unavailable".into(),
    });
    let pending = tokio::spawn({
        let controller = controller.clone();
        async move { controller.create(newcomer()).await }
    });
    sleep(Duration::from_millis(10)).await;

    let optimistic = controller.collection();
    assert_eq!(optimistic.ids()[0], 99);
    assert_eq!(optimistic.len(), 10);
    assert_eq!(optimistic.total_count, 51);
    assert!(optimistic.find(&10).is_none());
    let in_flight = controller.pending_mutations();
    assert_eq!(in_flight.len(), 1);
    assert_eq!(in_flight[0].kind, MutationKind::Create);
    assert!(Arc::ptr_eq(&in_flight[0].snapshot, &before));

    let result = pending.await?;
    assert!(matches!(result, Err(ControllerError::Network { .. })));
    assert!(Arc::ptr_eq(&controller.collection(), &before));
    assert!(controller.pending_mutations().is_empty());
    assert_eq!(harness.backend.fetch_count(), 1);
    assert!(events.drain().iter().any(|event| matches!(
        event,
        ControllerEvent::Notice(Notice::MutationFailed {
            kind: MutationKind::Create,
            ..
        })
    )));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn confirmed_create_is_followed_by_a_refresh() -> anyhow::Result<()> {
    let harness = harness(backend(12), "");
    harness.controller.start().await;

    harness.controller.create(newcomer()).await?;
    assert_eq!(harness.backend.fetch_count(), 2);
    assert_eq!(ids(&harness.controller)[..3], [99, 1, 2]);
    assert_eq!(harness.controller.collection().total_count, 13);
    assert!(harness.controller.pending_mutations().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn invalid_input_never_reaches_the_backend() {
    let harness = harness(backend(5), "");
    harness.controller.start().await;
    let before = harness.controller.collection();

    let mut blank = subscriber(3);
    blank.name = "   ".into();
    let result = harness.controller.update(blank).await;

    assert!(matches!(result, Err(ControllerError::Validation { .. })));
    assert!(harness.backend.mutation_calls().is_empty());
    assert!(Arc::ptr_eq(&harness.controller.collection(), &before));
    assert_eq!(harness.backend.fetch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn updating_a_vanished_row_refreshes_instead_of_rolling_back() -> anyhow::Result<()> {
    let harness = harness(backend(10), "");
    let controller = harness.controller.clone();
    controller.start().await;
    ListBackend::<Subscriber>::delete(harness.backend.as_ref(), &5).await?;
    let mut events = controller.subscribe();

    let mut renamed = subscriber(5);
    renamed.name = "Renamed".into();
    let result = controller.update(renamed).await;

    assert!(matches!(result, Err(ControllerError::Conflict { .. })));
    assert_eq!(harness.backend.fetch_count(), 2);
    assert!(controller.collection().find(&5).is_none());
    assert_eq!(controller.collection().total_count, 9);
    assert!(events.drain().iter().any(|event| matches!(
        event,
        ControllerEvent::Notice(Notice::MutationConflict {
            kind: MutationKind::Update,
            ..
        })
    )));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn confirmed_update_shows_the_server_copy() -> anyhow::Result<()> {
    let harness = harness(backend(4), "");
    harness.controller.start().await;
    let mut upgraded = subscriber(2);
    upgraded.plan = "fiber-500".into();

    harness.controller.update(upgraded.clone()).await?;
    assert_eq!(harness.controller.collection().find(&2), Some(&upgraded));
    assert_eq!(ids(&harness.controller), vec![1, 2, 3, 4]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn deleting_a_selected_row_drops_it_from_the_selection() -> anyhow::Result<()> {
    let harness = harness(backend(6), "");
    let controller = harness.controller.clone();
    controller.start().await;
    controller.toggle_selected(2);
    controller.toggle_selected(4);

    controller.delete(2).await?;
    assert_eq!(controller.selected_ids(), vec![4]);
    assert_eq!(ids(&controller), vec![1, 3, 4, 5, 6]);
    assert_eq!(
        harness
            .preferences
            .load("pagewise.subscribers.selection")
            .as_deref(),
        Some("[4]")
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn bulk_delete_keeps_what_succeeded_and_restores_what_failed() -> anyhow::Result<()> {
    let harness = harness(slow_mutations(20), "");
    let controller = harness.controller.clone();
    controller.start().await;
    for id in [1, 2, 3] {
        controller.toggle_selected(id);
    }
    harness.backend.fail_delete(
        2,
        SourceError::Transport {
            operation: "delete",
            message: "502 bad gateway".into(),
        },
    );
    let mut events = controller.subscribe();

    let pending = tokio::spawn({
        let controller = controller.clone();
        async move { controller.delete_selected().await }
    });
    sleep(Duration::from_millis(10)).await;
    assert_eq!(ids(&controller)[..2], [4, 5]);

    sleep(Duration::from_millis(100)).await;
    let reconciled = controller.collection();
    assert_eq!(reconciled.ids(), vec![2, 4, 5, 6, 7, 8, 9, 10]);
    assert_eq!(reconciled.total_count, 18);

    let report = pending.await??;
    assert_eq!(report.deleted, vec![1, 3]);
    assert_eq!(report.failed_ids(), vec![2]);
    assert!(!report.is_complete());
    assert_eq!(controller.selected_ids(), vec![2]);
    assert_eq!(ids(&controller), vec![2, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    assert_eq!(harness.backend.mutation_calls().len(), 3);
    assert!(events.drain().contains(&ControllerEvent::Notice(
        Notice::BulkDeletePartial {
            deleted: 2,
            failed: 1,
        }
    )));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn bulk_delete_that_fails_entirely_rolls_back() -> anyhow::Result<()> {
    let harness = harness(backend(5), "");
    let controller = harness.controller.clone();
    controller.start().await;
    let before = controller.collection();
    for id in [1, 5] {
        harness
            .backend
            .fail_delete(id, SourceError::Timeout { operation: "delete" });
    }

    let report = controller.delete_many([5, 1, 5]).await?;
    assert!(report.deleted.is_empty());
    assert_eq!(report.failed_ids(), vec![5, 1]);
    assert!(Arc::ptr_eq(&controller.collection(), &before));
    assert_eq!(harness.backend.fetch_count(), 1);
    Ok(())
}

fn paged_backend(mutation_latency: Duration) -> Arc<ScriptedBackend<Subscriber>> {
    Arc::new(
        ScriptedBackend::new(subscribers(30))
            .with_view(subscriber_view)
            .with_mutation_latency(mutation_latency),
    )
}

#[tokio::test(start_paused = true)]
async fn failed_delete_does_not_overwrite_a_newer_page() -> anyhow::Result<()> {
    let harness = harness(paged_backend(Duration::from_secs(1)), "");
    let controller = harness.controller.clone();
    controller.start().await;
    harness.backend.fail_delete(
        3,
        SourceError::Transport {
            operation: "delete",
            message: "boom".into(),
        },
    );

    let pending = tokio::spawn({
        let controller = controller.clone();
        async move { controller.delete(3).await }
    });
    sleep(Duration::from_millis(10)).await;
    assert!(controller.collection().find(&3).is_none());

    controller.set_page(2).await;
    let page_two: Vec<u32> = (11..=20).collect();
    assert_eq!(ids(&controller), page_two);

    let result = pending.await?;
    assert!(matches!(result, Err(ControllerError::Network { .. })));
    assert_eq!(controller.query().page, 2);
    assert_eq!(ids(&controller), page_two);
    assert_eq!(controller.collection().total_count, 30);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_bulk_delete_does_not_overwrite_a_newer_page() -> anyhow::Result<()> {
    let harness = harness(paged_backend(Duration::from_secs(1)), "");
    let controller = harness.controller.clone();
    controller.start().await;
    for id in [1, 2] {
        harness
            .backend
            .fail_delete(id, SourceError::Timeout { operation: "delete" });
    }

    let pending = tokio::spawn({
        let controller = controller.clone();
        async move { controller.delete_many([1, 2]).await }
    });
    sleep(Duration::from_millis(10)).await;
    controller.set_page(3).await;

    let report = pending.await??;
    assert!(report.deleted.is_empty());
    assert_eq!(controller.query().page, 3);
    assert_eq!(ids(&controller), (21..=30).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn filter_set_during_a_mutation_survives_its_refresh() -> anyhow::Result<()> {
    let harness = harness(slow_mutations(30), "");
    let controller = harness.controller.clone();
    controller.start().await;

    let created = tokio::spawn({
        let controller = controller.clone();
        async move { controller.create(newcomer()).await }
    });
    sleep(Duration::from_millis(10)).await;
    let filtered = tokio::spawn({
        let controller = controller.clone();
        async move { controller.set_filter("status", ["active"]).await }
    });

    created.await??;
    filtered.await??;
    let key = controller.query();
    assert_eq!(key.filter_values("status").collect::<Vec<_>>(), vec!["active"]);
    assert_eq!(key.page, 1);
    let collection = controller.collection();
    assert_eq!(
        collection.ids(),
        vec![99, 2, 4, 6, 8, 10, 12, 14, 16, 18]
    );
    assert_eq!(collection.total_count, 16);
    let last_call = harness.backend.calls().pop().expect("list calls recorded");
    assert!(last_call.query.contains("status=active"));
    assert!(
        harness
            .location
            .current()
            .is_some_and(|query| query.contains("status=active"))
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn paging_during_the_reconciling_refresh_wins() -> anyhow::Result<()> {
    let harness = harness(slow_mutations(30), "");
    let controller = harness.controller.clone();
    controller.start().await;

    let deleted = tokio::spawn({
        let controller = controller.clone();
        async move { controller.delete(1).await }
    });
    // The delete confirms at 100ms; its refresh is still held at 150ms.
    sleep(Duration::from_millis(150)).await;
    assert!(controller.is_fetching());
    assert_eq!(controller.set_page(2).await, FetchOutcome::Applied);

    deleted.await??;
    assert_eq!(controller.query().page, 2);
    assert_eq!(ids(&controller), (12..=21).collect::<Vec<_>>());
    assert_eq!(controller.collection().total_count, 29);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn concurrent_mutations_may_confirm_out_of_order() -> anyhow::Result<()> {
    let harness = harness(backend(30), "");
    let controller = harness.controller.clone();
    controller.start().await;
    let before = controller.collection();
    harness.backend.push_mutation_latency(Duration::from_millis(600));
    harness.backend.push_mutation_latency(Duration::from_millis(50));
    let mut renamed = subscriber(2);
    renamed.name = "Renamed".into();

    let updated = tokio::spawn({
        let controller = controller.clone();
        let renamed = renamed.clone();
        async move { controller.update(renamed).await }
    });
    sleep(Duration::from_millis(10)).await;
    let created = tokio::spawn({
        let controller = controller.clone();
        async move { controller.create(newcomer()).await }
    });
    sleep(Duration::from_millis(10)).await;

    let in_flight = controller.pending_mutations();
    assert_eq!(in_flight.len(), 2);
    let update = in_flight
        .iter()
        .find(|pending| pending.kind == MutationKind::Update)
        .expect("update pending");
    let create = in_flight
        .iter()
        .find(|pending| pending.kind == MutationKind::Create)
        .expect("create pending");
    assert!(Arc::ptr_eq(&update.snapshot, &before));
    assert_eq!(create.snapshot.find(&2), Some(&renamed));
    assert!(create.snapshot.find(&99).is_none());
    assert_eq!(ids(&controller)[..3], [99, 1, 2]);

    created.await??;
    let in_flight = controller.pending_mutations();
    assert_eq!(in_flight.len(), 1);
    assert_eq!(in_flight[0].kind, MutationKind::Update);
    assert_eq!(ids(&controller)[0], 99);
    updated.await??;
    assert!(controller.pending_mutations().is_empty());
    let collection = controller.collection();
    assert_eq!(collection.ids()[..3], [99, 1, 2]);
    assert_eq!(collection.find(&2), Some(&renamed));
    assert_eq!(collection.total_count, 31);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failing_one_of_two_mutations_keeps_the_other() -> anyhow::Result<()> {
    let harness = harness(backend(30), "");
    let controller = harness.controller.clone();
    controller.start().await;
    harness.backend.push_mutation_latency(Duration::from_millis(200));
    harness.backend.push_mutation_latency(Duration::from_millis(300));
    harness.backend.fail_next_mutation(SourceError::Transport {
        operation: "create",
        message: "503 unavailable".into(),
    });

    let created = tokio::spawn({
        let controller = controller.clone();
        async move { controller.create(newcomer()).await }
    });
    sleep(Duration::from_millis(10)).await;
    let deleted = tokio::spawn({
        let controller = controller.clone();
        async move { controller.delete(5).await }
    });
    sleep(Duration::from_millis(10)).await;
    assert_eq!(ids(&controller), vec![99, 1, 2, 3, 4, 6, 7, 8, 9]);

    let result = created.await?;
    assert!(matches!(result, Err(ControllerError::Network { .. })));
    let collection = controller.collection();
    assert_eq!(collection.ids(), vec![1, 2, 3, 4, 6, 7, 8, 9]);
    assert_eq!(collection.total_count, 29);
    assert_eq!(controller.pending_mutations().len(), 1);

    deleted.await??;
    assert_eq!(ids(&controller), vec![1, 2, 3, 4, 6, 7, 8, 9, 10, 11]);
    assert_eq!(controller.collection().total_count, 29);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn selection_survives_paging_until_select_all() {
    let harness = harness(backend(30), "");
    let controller = harness.controller.clone();
    controller.start().await;
    controller.toggle_selected(1);
    controller.toggle_selected(2);

    controller.set_page(2).await;
    assert_eq!(controller.selected_ids(), vec![1, 2]);
    assert!(!controller.is_all_selected());

    controller.select_all();
    assert_eq!(controller.selected_ids(), (11..=20).collect::<Vec<_>>());
    assert!(controller.is_all_selected());
    assert!(!controller.is_indeterminate());
}

#[tokio::test(start_paused = true)]
async fn selection_is_restored_from_preferences() {
    let preferences = Arc::new(MemoryPreferenceStore::default());
    let first = harness_with(
        backend(10),
        "",
        ControllerConfig::default(),
        Arc::clone(&preferences),
    );
    first.controller.start().await;
    first.controller.toggle_selected(7);
    first.controller.toggle_selected(3);
    first.controller.teardown();

    let second = harness_with(backend(10), "", ControllerConfig::default(), preferences);
    assert_eq!(second.controller.selected_ids(), vec![3, 7]);
    assert!(second.controller.is_selected(&7));
}

#[tokio::test(start_paused = true)]
async fn mutations_after_teardown_are_cancelled() {
    let harness = harness(backend(3), "");
    harness.controller.start().await;
    harness.controller.teardown();
    assert_eq!(
        harness.controller.delete(1).await,
        Err(ControllerError::Cancelled)
    );
    assert_eq!(
        harness.controller.delete_many([1, 2]).await.map(|report| report.deleted),
        Err(ControllerError::Cancelled)
    );
    assert!(harness.backend.mutation_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn export_renders_the_visible_page() -> anyhow::Result<()> {
    let harness = harness(backend(2), "");
    harness.controller.start().await;
    let csv = harness.controller.export_csv(&subscriber_columns())?;
    assert_eq!(
        csv,
        "id,name,plan,status\r\n\
         1,Subscriber 001,fiber-500,suspended\r\n\
         2,Subscriber 002,dsl-20,active\r\n"
    );
    Ok(())
}

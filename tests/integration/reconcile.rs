//! Reconciliation runs through the service API

use super::test_utils::{harness, live_tab, seed, session_with};
use serde_json::{json, Map};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tabpin::concurrency::OperationKind;
use tabpin::error::{ApiError, HostError};
use tabpin::host::{WindowInfo, WindowKind};
use tabpin::reconcile::{EntryOutcome, ReconcileSummary};
use tabpin::types::TabConfig;

#[tokio::test(start_paused = true)]
async fn test_second_run_changes_nothing() {
    let h = harness(session_with(vec![]));
    seed(
        &h.api,
        vec![
            TabConfig::new("https://a.example.com/").with_order(1.0),
            TabConfig::new("https://b.example.com/").with_order(2.0),
            TabConfig::new("https://c.example.com/").with_order(3.0),
        ],
    )
    .await;

    let first = h.api.open_all_tabs(None).await.unwrap();
    assert_eq!(first.opened, 3);
    assert_eq!(first.summary, ReconcileSummary::SomeOpened);

    let creates = h.host.creates.load(Ordering::SeqCst);
    let second = h.api.open_all_tabs(None).await.unwrap();
    assert_eq!(second.opened, 0);
    assert_eq!(second.pinned_now, 0);
    assert_eq!(second.already_open_or_skipped, 3);
    assert_eq!(second.summary, ReconcileSummary::AllAlreadyOpen);
    assert_eq!(h.host.creates.load(Ordering::SeqCst), creates);
    assert_eq!(h.host.updates.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_tabs_open_in_configured_order() {
    let h = harness(session_with(vec![]));
    seed(
        &h.api,
        vec![
            TabConfig::new("https://two.example.com/").with_order(2.0),
            TabConfig::new("https://none.example.com/"),
            TabConfig::new("https://one.example.com/").with_order(1.0),
        ],
    )
    .await;

    h.api.open_all_tabs(None).await.unwrap();
    assert_eq!(
        h.host.created_urls(),
        vec![
            "https://one.example.com/",
            "https://two.example.com/",
            "https://none.example.com/",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_run_is_rejected_without_touching_tabs() {
    let h = harness(session_with(vec![]));
    seed(&h.api, vec![TabConfig::new("https://a.example.com/")]).await;
    let (entered, release) = h.host.block_next_query();

    let api = Arc::clone(&h.api);
    let first = tokio::spawn(async move { api.open_all_tabs(None).await });
    entered.notified().await;
    assert!(h.api.engine().guard().is_running(OperationKind::All));

    let err = h.api.open_all_tabs(None).await.unwrap_err();
    assert!(matches!(err, ApiError::AlreadyInProgress(OperationKind::All)));
    assert_eq!(err.kind(), "alreadyInProgress");
    assert_eq!(h.host.queries.load(Ordering::SeqCst), 1);
    assert_eq!(h.host.tab_operations(), 0);

    release.notify_one();
    let result = first.await.unwrap().unwrap();
    assert_eq!(result.opened, 1);
    assert!(!h.api.engine().guard().is_running(OperationKind::All));
}

#[tokio::test(start_paused = true)]
async fn test_recent_decision_suppresses_duplicate_create() {
    let h = harness(session_with(vec![]));
    h.host.hide_created_tabs();
    seed(&h.api, vec![TabConfig::new("https://slow.example.com/")]).await;

    let first = h.api.open_all_tabs(None).await.unwrap();
    assert_eq!(first.opened, 1);

    let second = h.api.open_all_tabs(None).await.unwrap();
    assert_eq!(second.opened, 0);
    assert_eq!(second.already_open_or_skipped, 1);
    assert_eq!(second.entries[0].outcome, EntryOutcome::RecentlyHandled);
    assert_eq!(h.host.creates.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_millis(2001)).await;
    let third = h.api.open_all_tabs(None).await.unwrap();
    assert_eq!(third.opened, 1);
    assert_eq!(h.host.creates.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_mixed_pin_and_create() {
    let h = harness(session_with(vec![live_tab(1, "https://a.com", false)]));
    seed(
        &h.api,
        vec![
            TabConfig::new("https://a.com/").with_order(1.0),
            TabConfig::new("https://b.com/").with_order(2.0),
        ],
    )
    .await;

    let result = h.api.open_all_tabs(None).await.unwrap();
    assert_eq!(result.pinned_now, 1);
    assert_eq!(result.opened, 1);
    assert_eq!(result.summary, ReconcileSummary::Mixed);
    assert_eq!(h.host.created_urls(), vec!["https://b.com/"]);

    let session = h.host.snapshot();
    let a = session.tabs.iter().find(|t| t.id == 1).unwrap();
    assert!(a.pinned);
    assert!(session.tabs.iter().all(|t| t.pinned));
}

#[tokio::test(start_paused = true)]
async fn test_login_redirect_matches_open_target() {
    let h = harness(session_with(vec![live_tab(
        1,
        "https://mail.example.com/",
        true,
    )]));
    seed(
        &h.api,
        vec![TabConfig::new(
            "https://accounts.google.com/ServiceLogin?continue=https%3A%2F%2Fmail.example.com%2F",
        )],
    )
    .await;

    let result = h.api.open_all_tabs(None).await.unwrap();
    assert_eq!(result.entries[0].outcome, EntryOutcome::AlreadyOpen);
    assert_eq!(result.entries[0].live_tab_id, Some(1));
    assert_eq!(h.host.creates.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pin_failure_does_not_abort_run() {
    let h = harness(session_with(vec![live_tab(1, "https://a.example.com/", false)]));
    h.host
        .fail_updates_with(HostError::PermissionDenied("tabs".to_string()));
    seed(
        &h.api,
        vec![
            TabConfig::new("https://a.example.com/").with_order(1.0),
            TabConfig::new("https://b.example.com/").with_order(2.0),
        ],
    )
    .await;

    let result = h.api.open_all_tabs(None).await.unwrap();
    assert_eq!(result.pinned_now, 0);
    assert_eq!(result.opened, 1);
    assert_eq!(result.failed, 0);
    let failed: Vec<_> = result.entries_with(EntryOutcome::PinFailed).collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error.as_deref().unwrap().contains("permission"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_create_is_retried_on_next_run() {
    let h = harness(session_with(vec![]));
    h.host.fail_create_for("https://b.example.com/");
    seed(
        &h.api,
        vec![
            TabConfig::new("https://a.example.com/").with_order(1.0),
            TabConfig::new("https://b.example.com/").with_order(2.0),
        ],
    )
    .await;

    let first = h.api.open_all_tabs(None).await.unwrap();
    assert_eq!(first.opened, 1);
    assert_eq!(first.failed, 1);
    let b_key = h.api.engine().key_for("https://b.example.com/");
    assert!(!h.api.engine().guard().is_recently_decided(&b_key));

    h.host.stop_failing_creates();
    let second = h.api.open_all_tabs(None).await.unwrap();
    assert_eq!(second.opened, 1);
    assert_eq!(second.failed, 0);
    assert_eq!(
        h.host.created_urls(),
        vec!["https://a.example.com/", "https://b.example.com/"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_entries_open_once() {
    let h = harness(session_with(vec![]));
    seed(
        &h.api,
        vec![
            TabConfig::new("https://a.example.com/page?utm_source=x").with_order(1.0),
            TabConfig::new("https://A.example.com/page/").with_order(2.0),
        ],
    )
    .await;

    let result = h.api.open_all_tabs(None).await.unwrap();
    assert_eq!(result.opened, 1);
    assert_eq!(result.already_open_or_skipped, 1);
    assert_eq!(result.entries[1].outcome, EntryOutcome::Duplicate);
}

#[tokio::test(start_paused = true)]
async fn test_preconditions() {
    let h = harness(session_with(vec![]));
    assert!(matches!(
        h.api.open_all_tabs(None).await,
        Err(ApiError::NoTabsConfigured)
    ));

    seed(
        &h.api,
        vec![TabConfig::new("https://a.example.com/").with_category("work")],
    )
    .await;
    assert!(matches!(
        h.api.open_category_tabs("social", None).await,
        Err(ApiError::NoTabsInCategory(c)) if c == "social"
    ));
    assert!(matches!(
        h.api.open_category_tabs("nope", None).await,
        Err(ApiError::NotFound(_))
    ));
    assert!(matches!(
        h.api.open_category_tabs("  ", None).await,
        Err(ApiError::Validation(_))
    ));
    assert_eq!(h.host.queries.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_category_run_opens_only_that_category() {
    let h = harness(session_with(vec![]));
    seed(
        &h.api,
        vec![
            TabConfig::new("https://work.example.com/").with_category("work"),
            TabConfig::new("https://fun.example.com/").with_category("entertainment"),
        ],
    )
    .await;

    let result = h.api.open_category_tabs("work", None).await.unwrap();
    assert_eq!(result.opened, 1);
    assert_eq!(h.host.created_urls(), vec!["https://work.example.com/"]);
}

#[tokio::test(start_paused = true)]
async fn test_target_window_scopes_live_tabs() {
    let h = harness(session_with(vec![live_tab(1, "https://a.example.com/", true)]));
    seed(&h.api, vec![TabConfig::new("https://a.example.com/")]).await;

    let result = h.api.open_all_tabs(Some(2)).await.unwrap();
    assert_eq!(result.opened, 1);
    let created = h
        .host
        .snapshot()
        .tabs
        .into_iter()
        .find(|t| t.id != 1)
        .unwrap();
    assert_eq!(created.window_id, Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_partition_tags_follow_host_support() {
    let mut session = session_with(vec![]);
    session.supports_partitions = false;
    let h = harness(session);
    seed(
        &h.api,
        vec![
            TabConfig::new("https://a.example.com/").with_partition_tag("firefox-container-1"),
            TabConfig::new("https://b.example.com/").with_partition_tag("firefox-default"),
        ],
    )
    .await;

    let result = h.api.open_all_tabs(None).await.unwrap();
    assert_eq!(result.opened, 2);
    assert!(h
        .host
        .snapshot()
        .tabs
        .iter()
        .all(|t| t.partition_tag.is_none()));
}

#[tokio::test(start_paused = true)]
async fn test_partitioned_tab_keeps_its_partition() {
    let h = harness(session_with(vec![]));
    seed(
        &h.api,
        vec![TabConfig::new("https://a.example.com/").with_partition_tag("firefox-container-1")],
    )
    .await;

    let result = h.api.open_all_tabs(None).await.unwrap();
    assert_eq!(result.opened, 1);
    let tab = h.host.snapshot().tabs.remove(0);
    assert_eq!(tab.partition_tag.as_deref(), Some("firefox-container-1"));
    assert!(tab.pinned);
}

#[tokio::test(start_paused = true)]
async fn test_run_records_last_opened() {
    let h = harness(session_with(vec![]));
    seed(&h.api, vec![TabConfig::new("https://a.example.com/")]).await;

    let result = h.api.open_all_tabs(None).await.unwrap();
    assert!(result.last_opened_persisted);
    let settings = h.api.get_tabs_data().await.unwrap().settings;
    assert!(settings.last_opened.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_new_window_auto_opens_when_enabled() {
    let h = harness(session_with(vec![]));
    seed(&h.api, vec![TabConfig::new("https://a.example.com/")]).await;

    assert!(h
        .api
        .handle_window_created(&WindowInfo::normal(2))
        .await
        .is_none());

    let mut enable = Map::new();
    enable.insert("autoOpenTabs".to_string(), json!(true));
    h.api.update_settings(&enable).await.unwrap();

    let mut popup = WindowInfo::normal(3);
    popup.kind = WindowKind::Popup;
    assert!(h.api.handle_window_created(&popup).await.is_none());
    assert!(h
        .api
        .handle_window_created(&WindowInfo::normal(4).with_size(200, 800))
        .await
        .is_none());
    assert_eq!(h.host.creates.load(Ordering::SeqCst), 0);

    let result = h
        .api
        .handle_window_created(&WindowInfo::normal(2).with_size(1280, 800))
        .await
        .unwrap();
    assert_eq!(result.opened, 1);
    assert_eq!(h.host.snapshot().tabs[0].window_id, Some(2));
}

//! Catalog operations, migrations and change notifications

use super::test_utils::{harness, seed, session_with};
use serde_json::{json, Map};
use std::sync::Arc;
use tabpin::api::{DataChange, TabPinApi};
use tabpin::config::TabpinConfig;
use tabpin::error::ApiError;
use tabpin::host::{Session, SessionFileHost};
use tabpin::store::{KeyValueBackend, SledBackend, ValueMap};
use tabpin::types::{Category, TabConfig, PINNED_TABS_KEY};
use tempfile::TempDir;

#[tokio::test(start_paused = true)]
async fn test_legacy_entries_are_backfilled_and_persisted() {
    let h = harness(session_with(vec![]));
    let mut legacy = ValueMap::new();
    legacy.insert(
        PINNED_TABS_KEY.to_string(),
        json!([
            {"url": "https://a.example.com/", "title": "A", "category": "work"},
            {"title": "no url"},
            "garbage"
        ]),
    );
    h.backend.set(legacy).await.unwrap();

    let data = h.api.get_tabs_data().await.unwrap();
    assert_eq!(data.tabs.len(), 1);
    assert!(data.tabs[0].id.starts_with("tab_"));
    assert!(data.tabs[0].enabled);
    assert!(data.tabs[0].date_added.is_some());
    assert_eq!(data.categories.len(), 6);

    let stored = h.backend.peek(PINNED_TABS_KEY).unwrap();
    assert_eq!(stored[0]["id"], json!(data.tabs[0].id));
    assert_eq!(stored[1], json!({"title": "no url"}));
    assert_eq!(stored[2], json!("garbage"));
}

#[tokio::test(start_paused = true)]
async fn test_save_validates_and_defaults() {
    let h = harness(session_with(vec![]));

    for bad in ["", "not a url", "ftp://files.example.com/", "javascript:alert(1)"] {
        let err = h.api.save_tab(TabConfig::new(bad)).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)), "{bad} should be rejected");
    }

    let saved = h
        .api
        .save_tab(TabConfig::new("https://a.example.com/"))
        .await
        .unwrap();
    assert!(saved.id.starts_with("tab_"));
    assert_eq!(saved.category, "work");
    assert!(saved.date_added.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_update_merges_over_existing_tab() {
    let h = harness(session_with(vec![]));
    let saved = seed(
        &h.api,
        vec![TabConfig::new("https://a.example.com/").with_category("tools")],
    )
    .await
    .remove(0);

    let mut update = saved.clone();
    update.title = "Renamed".to_string();
    update.order = Some(4.0);
    let updated = h.api.update_tab(update).await.unwrap();
    assert_eq!(updated.id, saved.id);
    assert_eq!(updated.title, "Renamed");
    assert_eq!(updated.category, "tools");
    assert_eq!(updated.date_added, saved.date_added);

    let data = h.api.get_tabs_data().await.unwrap();
    assert_eq!(data.tabs.len(), 1);
    assert_eq!(data.tabs[0].order, Some(4.0));
}

#[tokio::test(start_paused = true)]
async fn test_delete_unknown_tab_is_not_found() {
    let h = harness(session_with(vec![]));
    let saved = seed(&h.api, vec![TabConfig::new("https://a.example.com/")]).await;

    let err = h.api.delete_tab("tab_missing").await.unwrap_err();
    assert_eq!(err.kind(), "notFound");

    h.api.delete_tab(&saved[0].id).await.unwrap();
    assert!(h.api.get_tabs_data().await.unwrap().tabs.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_categories_require_every_field() {
    let h = harness(session_with(vec![]));
    let err = h
        .api
        .save_categories(vec![Category::new("news", "", "N")])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let saved = h
        .api
        .save_categories(vec![Category::new("news", "News", "N")])
        .await
        .unwrap();
    assert_eq!(h.api.get_tabs_data().await.unwrap().categories, saved);
}

#[tokio::test(start_paused = true)]
async fn test_mutations_broadcast_changes() {
    let h = harness(session_with(vec![]));
    let mut changes = h.api.subscribe();

    let saved = h
        .api
        .save_tab(TabConfig::new("https://a.example.com/"))
        .await
        .unwrap();
    match changes.recv().await.unwrap() {
        DataChange::TabsChanged(tabs) => assert_eq!(tabs, vec![saved]),
        other => panic!("unexpected change {other:?}"),
    }

    let mut partial = Map::new();
    partial.insert("theme".to_string(), json!("dark"));
    h.api.update_settings(&partial).await.unwrap();
    match changes.recv().await.unwrap() {
        DataChange::SettingsChanged(settings) => {
            assert_eq!(settings.flags.get("theme"), Some(&json!("dark")))
        }
        other => panic!("unexpected change {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_reset_restores_defaults() {
    let h = harness(session_with(vec![]));
    seed(&h.api, vec![TabConfig::new("https://a.example.com/")]).await;
    h.api
        .save_categories(vec![Category::new("only", "Only", "O")])
        .await
        .unwrap();

    let data = h.api.reset().await.unwrap();
    assert!(data.tabs.is_empty());
    assert_eq!(data.categories.len(), 6);
    assert_eq!(h.api.get_tabs_data().await.unwrap(), data);
}

#[tokio::test]
async fn test_sled_backed_catalog_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let config = TabpinConfig::default();

    {
        let backend = Arc::new(SledBackend::new(dir.path().join("store")).unwrap());
        let api = TabPinApi::from_config(
            backend,
            Arc::new(SessionFileHost::in_memory(Session::default())),
            &config,
        );
        api.save_tab(TabConfig::new("https://kept.example.com/"))
            .await
            .unwrap();
    }

    let backend = Arc::new(SledBackend::new(dir.path().join("store")).unwrap());
    let api = TabPinApi::from_config(
        backend,
        Arc::new(SessionFileHost::in_memory(Session::default())),
        &config,
    );
    let data = api.get_tabs_data().await.unwrap();
    assert_eq!(data.tabs.len(), 1);
    assert_eq!(data.tabs[0].url, "https://kept.example.com/");
}

//! Message protocol over JSON lines

use super::test_utils::{harness, session_with};
use serde_json::{json, Value};
use tabpin::message::{handle_message, serve_lines};
use tokio::io::BufReader;

async fn send(h: &super::test_utils::Harness, message: Value) -> Value {
    let response = handle_message(&h.api, &message).await;
    serde_json::to_value(response).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_ping_and_unknown_action() {
    let h = harness(session_with(vec![]));
    assert_eq!(
        send(&h, json!({"action": "ping"})).await,
        json!({"success": true, "data": "pong"})
    );
    assert_eq!(
        send(&h, json!({"action": "selfDestruct"})).await,
        json!({"success": false, "error": "Unknown action", "errorKind": "unknownAction"})
    );
    let missing = send(&h, json!({"tabId": "x"})).await;
    assert_eq!(missing["error"], "Unknown action");
}

#[tokio::test(start_paused = true)]
async fn test_bad_payload_is_a_validation_failure() {
    let h = harness(session_with(vec![]));
    let response = send(&h, json!({"action": "deleteTab"})).await;
    assert_eq!(response["success"], false);
    assert_eq!(response["errorKind"], "validation");
}

#[tokio::test(start_paused = true)]
async fn test_save_then_open_over_messages() {
    let h = harness(session_with(vec![]));
    let saved = send(
        &h,
        json!({"action": "saveTab", "tab": {"url": "https://a.example.com/", "title": "A"}}),
    )
    .await;
    assert_eq!(saved["success"], true);
    assert_eq!(saved["data"]["category"], "work");

    let opened = send(&h, json!({"action": "openAllTabs"})).await;
    assert_eq!(opened["success"], true);
    assert_eq!(opened["data"]["opened"], 1);
    assert_eq!(opened["data"]["summary"], "some-opened");

    let data = send(&h, json!({"action": "getTabsData"})).await;
    assert_eq!(data["data"]["tabs"].as_array().unwrap().len(), 1);
    assert!(data["data"]["settings"]["lastOpened"].is_string());
}

#[tokio::test(start_paused = true)]
async fn test_errors_cross_the_boundary_as_data() {
    let h = harness(session_with(vec![]));
    let response = send(&h, json!({"action": "openAllTabs"})).await;
    assert_eq!(
        response,
        json!({"success": false, "error": "No tabs configured", "errorKind": "noTabsConfigured"})
    );

    let response = send(&h, json!({"action": "deleteTab", "tabId": "tab_x"})).await;
    assert_eq!(response["errorKind"], "notFound");

    let response = send(
        &h,
        json!({"action": "openCategoryTabs", "categoryId": "work"}),
    )
    .await;
    assert_eq!(response["errorKind"], "noTabsInCategory");
}

#[tokio::test(start_paused = true)]
async fn test_window_created_without_auto_open_returns_no_data() {
    let h = harness(session_with(vec![]));
    let response = send(
        &h,
        json!({"action": "windowCreated", "window": {"id": 2, "type": "normal", "state": "normal"}}),
    )
    .await;
    assert_eq!(response, json!({"success": true}));
}

#[tokio::test(start_paused = true)]
async fn test_serve_lines_answers_each_line() {
    let h = harness(session_with(vec![]));
    let input = concat!(
        "{\"action\":\"ping\"}\n",
        "\n",
        "not json\n",
        "{\"action\":\"updateSettings\",\"settings\":{\"autoOpenTabs\":true}}\n",
    );
    let mut output = Vec::new();

    let handled = serve_lines(&h.api, BufReader::new(input.as_bytes()), &mut output)
        .await
        .unwrap();
    assert_eq!(handled, 3);

    let lines: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["data"], "pong");
    assert_eq!(lines[1]["errorKind"], "validation");
    assert_eq!(lines[2]["data"]["autoOpenTabs"], true);
}

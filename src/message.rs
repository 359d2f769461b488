//! Message protocol
//!
//! One JSON object per request, tagged by `action`; one JSON object per response:
//! `{success, data?, error?, errorKind?}`. Every error crossing this boundary is
//! returned as data.

use crate::api::TabPinApi;
use crate::error::ApiError;
use crate::host::{WindowId, WindowInfo};
use crate::types::{Category, TabConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Actions understood by [`dispatch`]
pub const ACTIONS: &[&str] = &[
    "openAllTabs",
    "openCategoryTabs",
    "getTabsData",
    "saveTab",
    "updateTab",
    "deleteTab",
    "saveCategories",
    "updateSettings",
    "ping",
    "windowCreated",
    "healthCheck",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    OpenAllTabs {
        #[serde(default, rename = "windowId")]
        window_id: Option<WindowId>,
    },
    OpenCategoryTabs {
        #[serde(rename = "categoryId")]
        category_id: String,
        #[serde(default, rename = "windowId")]
        window_id: Option<WindowId>,
    },
    GetTabsData,
    SaveTab {
        tab: TabConfig,
    },
    UpdateTab {
        tab: TabConfig,
    },
    DeleteTab {
        #[serde(rename = "tabId")]
        tab_id: String,
    },
    SaveCategories {
        categories: Vec<Category>,
    },
    UpdateSettings {
        settings: Map<String, Value>,
    },
    Ping,
    WindowCreated {
        window: WindowInfo,
    },
    HealthCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl Response {
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(error: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            error_kind: Some(kind.into()),
        }
    }

    pub fn from_error(err: &ApiError) -> Self {
        Self::failure(err.to_string(), err.kind())
    }

    fn from_result<T: Serialize>(result: Result<T, ApiError>) -> Self {
        match result.and_then(|value| {
            serde_json::to_value(value).map_err(|e| ApiError::Store(e.into()))
        }) {
            Ok(Value::Null) => Self::ok(None),
            Ok(value) => Self::ok(Some(value)),
            Err(e) => Self::from_error(&e),
        }
    }
}

/// Parse a raw message into a [`Request`].
///
/// An unrecognized `action` is reported as `Unknown action`; a known action with a
/// bad payload is a validation failure.
pub fn parse_request(raw: &Value) -> Result<Request, Response> {
    let action = raw.get("action").and_then(Value::as_str);
    match serde_json::from_value::<Request>(raw.clone()) {
        Ok(request) => Ok(request),
        Err(e) => match action {
            Some(action) if ACTIONS.contains(&action) => Err(Response::failure(
                format!("Invalid {action} request: {e}"),
                "validation",
            )),
            _ => Err(Response::failure("Unknown action", "unknownAction")),
        },
    }
}

/// Run one request against the service.
pub async fn dispatch(api: &TabPinApi, request: Request) -> Response {
    match request {
        Request::OpenAllTabs { window_id } => Response::from_result(api.open_all_tabs(window_id).await),
        Request::OpenCategoryTabs {
            category_id,
            window_id,
        } => Response::from_result(api.open_category_tabs(&category_id, window_id).await),
        Request::GetTabsData => Response::from_result(api.get_tabs_data().await),
        Request::SaveTab { tab } => Response::from_result(api.save_tab(tab).await),
        Request::UpdateTab { tab } => Response::from_result(api.update_tab(tab).await),
        Request::DeleteTab { tab_id } => Response::from_result(api.delete_tab(&tab_id).await),
        Request::SaveCategories { categories } => {
            Response::from_result(api.save_categories(categories).await)
        }
        Request::UpdateSettings { settings } => {
            Response::from_result(api.update_settings(&settings).await)
        }
        Request::Ping => Response::ok(Some(Value::from(api.ping()))),
        Request::WindowCreated { window } => {
            Response::from_result(Ok(api.handle_window_created(&window).await))
        }
        Request::HealthCheck => Response::from_result(Ok(api.storage_health().await)),
    }
}

/// Parse and run one raw message.
pub async fn handle_message(api: &TabPinApi, raw: &Value) -> Response {
    match parse_request(raw) {
        Ok(request) => {
            debug!(request = ?request, "Handling message");
            dispatch(api, request).await
        }
        Err(response) => {
            warn!(message = %raw, error = ?response.error, "Rejected message");
            response
        }
    }
}

/// Serve requests as JSON lines until the reader is exhausted.
///
/// Blank lines are ignored; lines that are not JSON get a failure response.
pub async fn serve_lines<R, W>(api: &TabPinApi, reader: R, mut writer: W) -> Result<usize, ApiError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut handled = 0;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Value>(line) {
            Ok(raw) => handle_message(api, &raw).await,
            Err(e) => Response::failure(format!("Invalid JSON: {e}"), "validation"),
        };
        let mut encoded = serde_json::to_vec(&response).map_err(|e| ApiError::Store(e.into()))?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        handled += 1;
    }
    Ok(handled)
}

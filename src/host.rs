//! Tab host
//!
//! The browser side of reconciliation: listing open tabs, pinning them and creating
//! new ones. [`TabHost`] is the seam; [`SessionFileHost`] is a host backed by a JSON
//! session description, used by the CLI and in tests.

use crate::error::HostError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub type TabId = u64;
pub type WindowId = u64;

/// A tab currently open in the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveTab {
    pub id: TabId,
    pub url: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<WindowId>,
    #[serde(
        default,
        alias = "cookieStoreId",
        skip_serializing_if = "Option::is_none"
    )]
    pub partition_tag: Option<String>,
}

/// Parameters for opening a new tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTabRequest {
    pub url: String,
    pub pinned: bool,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<WindowId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_tag: Option<String>,
}

/// Changes applied to an existing tab.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabUpdate {
    pub pinned: Option<bool>,
}

impl TabUpdate {
    pub fn pin() -> Self {
        Self { pinned: Some(true) }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    #[default]
    Normal,
    Popup,
    Panel,
    Devtools,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowState {
    #[default]
    Normal,
    Minimized,
    Maximized,
    Fullscreen,
}

/// A host window, as reported when it is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    pub id: WindowId,
    #[serde(default, rename = "type")]
    pub kind: WindowKind,
    #[serde(default)]
    pub state: WindowState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default)]
    pub incognito: bool,
}

impl WindowInfo {
    pub fn normal(id: WindowId) -> Self {
        Self {
            id,
            kind: WindowKind::Normal,
            state: WindowState::Normal,
            width: None,
            height: None,
            incognito: false,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Whether this is a regular browsing window worth auto-opening tabs into.
    ///
    /// Popups, panels, devtools and minimized windows are excluded, as are windows
    /// smaller than `min_width` x `min_height` when their size is known.
    pub fn is_normal_browser_window(&self, min_width: u32, min_height: u32) -> bool {
        if self.kind != WindowKind::Normal || self.state == WindowState::Minimized {
            return false;
        }
        if let (Some(width), Some(height)) = (self.width, self.height) {
            if width < min_width || height < min_height {
                return false;
            }
        }
        true
    }
}

/// Browser tab operations used by reconciliation.
#[async_trait]
pub trait TabHost: Send + Sync {
    /// Open tabs, in one window or across all of them.
    async fn query_tabs(&self, window: Option<WindowId>) -> Result<Vec<LiveTab>, HostError>;

    /// Current state of one tab; `InvalidTab` once it is gone.
    async fn get_tab(&self, id: TabId) -> Result<LiveTab, HostError>;

    async fn update_tab(&self, id: TabId, update: TabUpdate) -> Result<LiveTab, HostError>;

    async fn create_tab(&self, request: CreateTabRequest) -> Result<LiveTab, HostError>;

    /// Whether tabs can be opened into a partition (container).
    fn supports_partitions(&self) -> bool {
        true
    }
}

/// Serializable session: windows and their tabs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub windows: Vec<WindowInfo>,
    #[serde(default)]
    pub tabs: Vec<LiveTab>,
    #[serde(default = "default_supports_partitions")]
    pub supports_partitions: bool,
}

fn default_supports_partitions() -> bool {
    true
}

impl Session {
    fn next_tab_id(&self) -> Result<TabId, HostError> {
        self.tabs
            .iter()
            .map(|t| t.id)
            .max()
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| HostError::Failed("session has no free tab id".to_string()))
    }

    /// Window new tabs land in when the request names none.
    fn focused_window(&self) -> WindowId {
        self.windows
            .iter()
            .find(|w| w.kind == WindowKind::Normal)
            .or_else(|| self.windows.first())
            .map(|w| w.id)
            .unwrap_or(1)
    }
}

/// Host backed by a [`Session`], optionally persisted to a JSON file after every
/// change.
#[derive(Debug)]
pub struct SessionFileHost {
    path: Option<PathBuf>,
    session: Mutex<Session>,
}

impl SessionFileHost {
    /// Session kept only in memory.
    pub fn in_memory(session: Session) -> Self {
        Self {
            path: None,
            session: Mutex::new(session),
        }
    }

    /// Load the session at `path`; a missing file starts an empty single-window session.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let path = path.as_ref().to_path_buf();
        let session = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| HostError::Failed(format!("reading {}: {}", path.display(), e)))?;
            serde_json::from_str(&raw)
                .map_err(|e| HostError::Failed(format!("parsing {}: {}", path.display(), e)))?
        } else {
            info!(path = %path.display(), "No session file, starting an empty session");
            Session {
                windows: vec![WindowInfo::normal(1)],
                ..Session::default()
            }
        };
        Ok(Self {
            path: Some(path),
            session: Mutex::new(session),
        })
    }

    pub fn snapshot(&self) -> Session {
        self.session.lock().clone()
    }

    fn persist(&self, session: &Session) -> Result<(), HostError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| HostError::Failed(e.to_string()))?;
            }
        }
        let raw = serde_json::to_string_pretty(session).map_err(|e| HostError::Failed(e.to_string()))?;
        std::fs::write(path, raw)
            .map_err(|e| HostError::Failed(format!("writing {}: {}", path.display(), e)))
    }
}

#[async_trait]
impl TabHost for SessionFileHost {
    async fn query_tabs(&self, window: Option<WindowId>) -> Result<Vec<LiveTab>, HostError> {
        let session = self.session.lock();
        Ok(session
            .tabs
            .iter()
            .filter(|t| window.map_or(true, |w| t.window_id == Some(w)))
            .cloned()
            .collect())
    }

    async fn get_tab(&self, id: TabId) -> Result<LiveTab, HostError> {
        self.session
            .lock()
            .tabs
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(HostError::InvalidTab(id))
    }

    async fn update_tab(&self, id: TabId, update: TabUpdate) -> Result<LiveTab, HostError> {
        let mut session = self.session.lock();
        let tab = session
            .tabs
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(HostError::InvalidTab(id))?;
        if let Some(pinned) = update.pinned {
            tab.pinned = pinned;
        }
        let updated = tab.clone();
        self.persist(&session)?;
        debug!(tab_id = id, pinned = updated.pinned, "Session tab updated");
        Ok(updated)
    }

    async fn create_tab(&self, request: CreateTabRequest) -> Result<LiveTab, HostError> {
        let mut session = self.session.lock();
        if request.partition_tag.is_some() && !session.supports_partitions {
            return Err(HostError::Failed("containers are not supported".to_string()));
        }
        let window_id = request.window_id.unwrap_or_else(|| session.focused_window());
        let tab = LiveTab {
            id: session.next_tab_id()?,
            url: request.url,
            pinned: request.pinned,
            window_id: Some(window_id),
            partition_tag: request.partition_tag,
        };
        session.tabs.push(tab.clone());
        self.persist(&session)?;
        debug!(tab_id = tab.id, url = %tab.url, "Session tab created");
        Ok(tab)
    }

    fn supports_partitions(&self) -> bool {
        self.session.lock().supports_partitions
    }
}

//! Concurrency guard
//!
//! Two mechanisms keep overlapping reconciliation runs from opening the same tab
//! twice:
//! - an exclusive run lock per [`OperationKind`], acquired without waiting;
//! - a recent-decision cache remembering which normalized keys were recently
//!   decided as "create" or confirmed "already open".

use crate::error::ApiError;
use crate::normalize::NormalizedKey;
use crate::ttl::TtlMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Kind of reconciliation run holding the lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    All,
    Category,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::All => write!(f, "open-all"),
            OperationKind::Category => write!(f, "open-category"),
        }
    }
}

/// Guard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Lifetime of a recent-decision entry (milliseconds)
    #[serde(default = "default_recent_decision_ttl_ms")]
    pub recent_decision_ttl_ms: u64,
}

fn default_recent_decision_ttl_ms() -> u64 {
    2000
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            recent_decision_ttl_ms: default_recent_decision_ttl_ms(),
        }
    }
}

impl GuardConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.recent_decision_ttl_ms == 0 {
            return Err("recent_decision_ttl_ms must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[derive(Debug)]
struct GuardState {
    running: Mutex<HashSet<OperationKind>>,
    recent: Mutex<TtlMap<NormalizedKey, ()>>,
}

/// Run lock plus recent-decision cache, shared by every run in the process.
#[derive(Debug, Clone)]
pub struct ConcurrencyGuard {
    state: Arc<GuardState>,
}

impl ConcurrencyGuard {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            state: Arc::new(GuardState {
                running: Mutex::new(HashSet::new()),
                recent: Mutex::new(TtlMap::new(Duration::from_millis(
                    config.recent_decision_ttl_ms,
                ))),
            }),
        }
    }

    /// Take the run lock for `kind`, failing immediately when it is held.
    pub fn try_acquire(&self, kind: OperationKind) -> Result<RunPermit, ApiError> {
        let mut running = self.state.running.lock();
        if !running.insert(kind) {
            warn!(operation = %kind, "Run rejected, operation already in progress");
            return Err(ApiError::AlreadyInProgress(kind));
        }
        debug!(operation = %kind, "Run lock acquired");
        Ok(RunPermit {
            kind,
            state: Arc::clone(&self.state),
        })
    }

    pub fn is_running(&self, kind: OperationKind) -> bool {
        self.state.running.lock().contains(&kind)
    }

    /// Record (or refresh) a decision for `key`.
    pub fn record_decision(&self, key: &NormalizedKey) {
        self.state.recent.lock().insert(key.clone(), ());
    }

    /// Forget a decision, used when the create it guarded failed.
    pub fn evict_decision(&self, key: &NormalizedKey) {
        self.state.recent.lock().remove(key);
    }

    pub fn is_recently_decided(&self, key: &NormalizedKey) -> bool {
        self.state.recent.lock().contains_fresh(key)
    }

    /// Drop expired decisions.
    pub fn sweep(&self) -> usize {
        let dropped = self.state.recent.lock().sweep();
        if dropped > 0 {
            debug!(dropped, "Swept expired recent decisions");
        }
        dropped
    }

    pub fn recent_decision_count(&self) -> usize {
        self.state.recent.lock().len()
    }
}

/// Held for the duration of a run; dropping it releases the lock.
#[derive(Debug)]
pub struct RunPermit {
    kind: OperationKind,
    state: Arc<GuardState>,
}

impl RunPermit {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.state.running.lock().remove(&self.kind);
        debug!(operation = %self.kind, "Run lock released");
    }
}

//! Client-side application state touched by the channel, and the
//! notification sink handlers report terminal outcomes to.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Activation progress meaning indexing finished successfully.
pub const ACTIVATION_DONE: i64 = 100;
/// Activation progress meaning indexing finished with errors.
pub const ACTIVATION_FAILED: i64 = -2;

/// Whether an activation progress value is final.
pub fn is_terminal_progress(progress: i64) -> bool {
    progress == ACTIVATION_DONE || progress == ACTIVATION_FAILED
}

/// UI version announced by the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiVersion {
    pub version: String,
    pub start: Option<Value>,
    pub message: Option<String>,
    /// Set when the server announced a version different from the first one seen.
    pub reload_recommended: bool,
}

#[derive(Debug, Default)]
struct Inner {
    initialized: bool,
    activations: BTreeMap<u64, Option<i64>>,
    session_statuses: HashMap<String, Value>,
    ui_version: Option<UiVersion>,
    last_server_error: Option<String>,
}

/// Shared application store. Cheap to clone; all clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct ClientStore {
    inner: Arc<RwLock<Inner>>,
}

impl ClientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_initialized(&self) {
        self.inner.write().initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.read().initialized
    }

    // ── KG activations ──────────────────────────────────────────────

    /// Start tracking an activation job that has not reported progress yet.
    pub fn track_activation(&self, project_id: u64) {
        self.inner
            .write()
            .activations
            .entry(project_id)
            .or_insert(Some(0));
    }

    pub fn update_activation(&self, project_id: u64, progress: Option<i64>) {
        self.inner.write().activations.insert(project_id, progress);
    }

    pub fn activation_progress(&self, project_id: u64) -> Option<i64> {
        self.inner.read().activations.get(&project_id).copied().flatten()
    }

    /// Ids of activations still running, ascending.
    pub fn pending_activations(&self) -> Vec<u64> {
        self.inner
            .read()
            .activations
            .iter()
            .filter_map(|(id, progress)| match progress {
                Some(p) if !is_terminal_progress(*p) => Some(*id),
                _ => None,
            })
            .collect()
    }

    // ── Sessions ────────────────────────────────────────────────────

    pub fn replace_session_statuses(&self, statuses: HashMap<String, Value>) {
        self.inner.write().session_statuses = statuses;
    }

    pub fn session_statuses(&self) -> HashMap<String, Value> {
        self.inner.read().session_statuses.clone()
    }

    // ── Version and errors ──────────────────────────────────────────

    /// Record the server's UI version. Returns the stored record.
    pub fn record_ui_version(
        &self,
        version: String,
        start: Option<Value>,
        message: Option<String>,
    ) -> UiVersion {
        let mut inner = self.inner.write();
        let reload_recommended = match &inner.ui_version {
            Some(prev) => prev.reload_recommended || prev.version != version,
            None => false,
        };
        let record = UiVersion {
            version,
            start,
            message,
            reload_recommended,
        };
        inner.ui_version = Some(record.clone());
        record
    }

    pub fn ui_version(&self) -> Option<UiVersion> {
        self.inner.read().ui_version.clone()
    }

    pub fn set_server_error(&self, message: Option<String>) {
        self.inner.write().last_server_error = message;
    }

    pub fn last_server_error(&self) -> Option<String> {
        self.inner.read().last_server_error.clone()
    }
}

// ── Notifications ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    KgActivation,
    UiVersion,
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topic::KgActivation => write!(f, "Knowledge Graph activation"),
            Topic::UiVersion => write!(f, "UI version"),
        }
    }
}

/// Presentation service for user-facing outcomes.
pub trait Notifier: Send + Sync {
    fn add_success(&self, topic: Topic, message: &str);
    fn add_error(&self, topic: Topic, message: &str);
}

/// Notifier that writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn add_success(&self, topic: Topic, message: &str) {
        tracing::info!(topic = %topic, "{}", message);
    }

    fn add_error(&self, topic: Topic, message: &str) {
        tracing::warn!(topic = %topic, "{}", message);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: Level,
    pub topic: Topic,
    pub message: String,
}

/// Notifier that keeps every notification in memory, oldest first.
#[derive(Debug, Default)]
pub struct NotificationLog {
    entries: Mutex<Vec<Notification>>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Notification> {
        self.entries.lock().clone()
    }

    fn push(&self, level: Level, topic: Topic, message: &str) {
        self.entries.lock().push(Notification {
            level,
            topic,
            message: message.to_owned(),
        });
    }
}

impl Notifier for NotificationLog {
    fn add_success(&self, topic: Topic, message: &str) {
        self.push(Level::Success, topic, message);
    }

    fn add_error(&self, topic: Topic, message: &str) {
        self.push(Level::Error, topic, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_activations_skip_terminal_and_unknown() {
        let store = ClientStore::new();
        store.track_activation(5);
        store.update_activation(1, Some(40));
        store.update_activation(2, Some(ACTIVATION_DONE));
        store.update_activation(3, Some(ACTIVATION_FAILED));
        store.update_activation(4, None);
        assert_eq!(store.pending_activations(), vec![1, 5]);
    }

    #[test]
    fn track_does_not_reset_existing_progress() {
        let store = ClientStore::new();
        store.update_activation(7, Some(60));
        store.track_activation(7);
        assert_eq!(store.activation_progress(7), Some(60));
    }

    #[test]
    fn clones_share_state() {
        let store = ClientStore::new();
        let other = store.clone();
        other.mark_initialized();
        assert!(store.is_initialized());
    }

    #[test]
    fn version_change_recommends_reload() {
        let store = ClientStore::new();
        let first = store.record_ui_version("3.0.0".into(), None, None);
        assert!(!first.reload_recommended);
        let same = store.record_ui_version("3.0.0".into(), None, None);
        assert!(!same.reload_recommended);
        let changed = store.record_ui_version("3.1.0".into(), None, None);
        assert!(changed.reload_recommended);
        // Stays set once raised.
        let again = store.record_ui_version("3.1.0".into(), None, None);
        assert!(again.reload_recommended);
    }

    #[test]
    fn notification_log_keeps_order_and_level() {
        let log = NotificationLog::new();
        log.add_success(Topic::KgActivation, "ok");
        log.add_error(Topic::KgActivation, "bad");
        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, Level::Success);
        assert_eq!(entries[1].level, Level::Error);
        assert_eq!(entries[1].message, "bad");
    }
}

//! The persistent notification channel.
//!
//! [`NotificationChannel`] configures and spawns the socket task;
//! [`ChannelHandle`] is what the rest of the application keeps: read-only
//! state snapshots, a fire-and-forget sender, and shutdown.

mod connection;
pub mod manager;
pub mod resume;
pub mod state;

pub use manager::{is_abnormal, CloseAction, ConnectionManager};
pub use state::{ConnectionState, ReconnectPolicy, ReconnectState};

use futures::FutureExt;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::config::{validate_ws_url, ChannelConfig};
use crate::dispatch::{panic_message, HandlerRegistry};
use crate::error::ChannelError;
use crate::handlers::default_registry;
use crate::message::ClientMessage;
use crate::store::{ClientStore, Notifier, TracingNotifier};

/// Fire-and-forget access to the current socket.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<ClientMessage>,
    state: Arc<RwLock<ConnectionState>>,
}

impl ChannelSender {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<ClientMessage>,
        state: Arc<RwLock<ConnectionState>>,
    ) -> Self {
        Self { tx, state }
    }

    /// A sender with no socket behind it; every send fails with `NotOpen`.
    pub fn disconnected() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self::new(tx, Arc::new(RwLock::new(ConnectionState::default())))
    }

    /// Queue a message for the open socket. No reply is tracked.
    pub fn send(&self, msg: ClientMessage) -> Result<(), ChannelError> {
        if !self.state.read().is_open {
            return Err(ChannelError::NotOpen);
        }
        self.tx.send(msg).map_err(|_| ChannelError::NotOpen)
    }
}

/// Builder for the channel task.
pub struct NotificationChannel {
    config: ChannelConfig,
    registry: Arc<HandlerRegistry>,
    store: ClientStore,
    notifier: Arc<dyn Notifier>,
}

impl NotificationChannel {
    /// Channel with the default handlers, a fresh store and log notifications.
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            registry: Arc::new(default_registry()),
            store: ClientStore::new(),
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn store(mut self, store: ClientStore) -> Self {
        self.store = store;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Validate the endpoint and start connecting. Must run inside a tokio runtime.
    pub fn spawn(self) -> Result<ChannelHandle, ChannelError> {
        let url = self.config.url.clone().ok_or_else(|| ChannelError::InvalidUrl {
            url: String::new(),
            reason: "no url configured".into(),
        })?;
        validate_ws_url(&url)?;

        let (manager, outbound_rx) = ConnectionManager::new(
            self.registry,
            self.store.clone(),
            self.notifier,
            self.config.reconnect_policy(),
        );
        let state = manager.shared_state();
        let reconnect = manager.shared_reconnect();
        let sender = manager.sender();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let connection = connection::connection_loop(
            url.clone(),
            manager,
            outbound_rx,
            self.config.ping_interval(),
            shutdown_rx,
        );
        let task_state = state.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = AssertUnwindSafe(connection).catch_unwind().await {
                let message = panic_message(e.as_ref());
                tracing::error!(error = %message, "notification channel task panicked");
                let mut state = task_state.write();
                state.is_open = false;
                state.error = true;
                state.error_object = Some(ChannelError::Transport(format!(
                    "channel task panicked: {}",
                    message
                )));
            }
        });

        Ok(ChannelHandle {
            url,
            state,
            reconnect,
            sender,
            store: self.store,
            shutdown_tx,
            task,
            finished: false,
        })
    }
}

/// Handle to a running channel.
pub struct ChannelHandle {
    url: String,
    state: Arc<RwLock<ConnectionState>>,
    reconnect: Arc<RwLock<ReconnectState>>,
    sender: ChannelSender,
    store: ClientStore,
    shutdown_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
    finished: bool,
}

impl ChannelHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.read().clone()
    }

    pub fn reconnect_state(&self) -> ReconnectState {
        self.reconnect.read().clone()
    }

    pub fn sender(&self) -> ChannelSender {
        self.sender.clone()
    }

    pub fn store(&self) -> &ClientStore {
        &self.store
    }

    /// True once the task has stopped (normal close or shutdown).
    pub fn is_finished(&self) -> bool {
        self.finished || self.task.is_finished()
    }

    /// Resolves when the task stops. Cancel-safe; `join` may follow.
    pub async fn finished(&mut self) {
        if !self.finished {
            let _ = (&mut self.task).await;
            self.finished = true;
        }
    }

    /// Signal the channel to close the socket and stop reconnecting.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for the channel task to complete. Consumes the handle.
    pub async fn join(self) {
        if !self.finished {
            let _ = self.task.await;
        }
    }
}

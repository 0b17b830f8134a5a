use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::channel::resume::resume_requests;
use crate::channel::state::{ConnectionState, ReconnectPolicy, ReconnectState};
use crate::channel::ChannelSender;
use crate::dispatch::{HandlerContext, HandlerRegistry};
use crate::error::ChannelError;
use crate::message::{self, ClientMessage};
use crate::store::{ClientStore, Notifier};

/// Close code of a connection that dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Application close code: the server dropped this client.
pub const SERVER_DROPPED: u16 = 4000;
/// Close code of an orderly shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close frame received without a status code.
pub const NO_STATUS: u16 = 1005;

/// Whether a close code should trigger a reconnect.
pub fn is_abnormal(code: u16) -> bool {
    code == ABNORMAL_CLOSURE || code == SERVER_DROPPED
}

/// What the socket task should do after a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    Reconnect(Duration),
    Stop,
}

/// Lifecycle state machine of the channel.
///
/// The socket task calls one `on_*` method per transport event; this type
/// owns the resulting state and decides what to send and whether to
/// reconnect. It never touches the network itself.
pub struct ConnectionManager {
    state: Arc<RwLock<ConnectionState>>,
    reconnect: Arc<RwLock<ReconnectState>>,
    policy: ReconnectPolicy,
    registry: Arc<HandlerRegistry>,
    store: ClientStore,
    notifier: Arc<dyn Notifier>,
    sender: ChannelSender,
}

impl ConnectionManager {
    /// Returns the manager and the queue of messages handlers send.
    pub fn new(
        registry: Arc<HandlerRegistry>,
        store: ClientStore,
        notifier: Arc<dyn Notifier>,
        policy: ReconnectPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<ClientMessage>) {
        let state = Arc::new(RwLock::new(ConnectionState::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = ChannelSender::new(tx, state.clone());
        let manager = Self {
            state,
            reconnect: Arc::new(RwLock::new(ReconnectState::default())),
            policy,
            registry,
            store,
            notifier,
            sender,
        };
        (manager, rx)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.read().clone()
    }

    pub fn reconnect_state(&self) -> ReconnectState {
        self.reconnect.read().clone()
    }

    pub(crate) fn shared_state(&self) -> Arc<RwLock<ConnectionState>> {
        self.state.clone()
    }

    pub(crate) fn shared_reconnect(&self) -> Arc<RwLock<ReconnectState>> {
        self.reconnect.clone()
    }

    pub fn sender(&self) -> ChannelSender {
        self.sender.clone()
    }

    pub fn store(&self) -> &ClientStore {
        &self.store
    }

    /// The socket opened. Returns the resume requests to send first.
    pub fn on_open(&self) -> Vec<ClientMessage> {
        {
            let mut state = self.state.write();
            state.is_open = true;
            state.error = false;
            state.error_object = None;
            state.last_received_at = None;
        }
        self.reconnect.write().retrying = false;
        resume_requests(&self.store)
    }

    /// A text frame arrived. Failures are recorded, never propagated.
    pub fn on_message(&self, text: &str) {
        self.state.write().last_received_at = Some(Utc::now());

        let envelope = match message::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(error = %e, "dropping undecodable frame");
                self.record_error(e.into());
                return;
            }
        };

        let ctx = HandlerContext {
            sender: &self.sender,
            store: &self.store,
            notifier: self.notifier.as_ref(),
        };
        if let Err(e) = self.registry.dispatch(&envelope, &ctx) {
            tracing::warn!(
                scope = %envelope.scope,
                kind = %envelope.kind,
                error = %e,
                "dispatch failed"
            );
            self.record_error(e.into());
        }
    }

    /// A frame the channel does not speak (binary, raw frame).
    pub fn on_unexpected(&self, what: &str) {
        self.record_error(ChannelError::Transport(format!("Unexpected message: {}", what)));
    }

    /// The transport reported an error. Reconnecting is left to `on_close`.
    pub fn on_error(&self, err: ChannelError) {
        let mut state = self.state.write();
        state.is_open = false;
        state.error = true;
        state.error_object = Some(err);
        state.last_received_at = Some(Utc::now());
    }

    pub fn on_close(&self, code: u16) -> CloseAction {
        self.on_close_at(code, Utc::now())
    }

    pub fn on_close_at(&self, code: u16, now: DateTime<Utc>) -> CloseAction {
        let mut state = self.state.write();
        state.is_open = false;
        if !is_abnormal(code) {
            state.error = false;
            state.error_object = None;
            return CloseAction::Stop;
        }
        state.error = true;
        state.error_object = Some(ChannelError::AbnormalClose(code));
        drop(state);

        let delay = self.reconnect.write().register_failure(now, &self.policy);
        CloseAction::Reconnect(delay)
    }

    /// Liveness tick. Yields a ping only while the socket is open.
    pub fn on_ping(&self) -> Option<ClientMessage> {
        let mut state = self.state.write();
        if !state.is_open {
            return None;
        }
        let ping = ClientMessage::ping();
        state.last_ping_at = ping.timestamp;
        Some(ping)
    }

    fn record_error(&self, err: ChannelError) {
        let mut state = self.state.write();
        state.error = true;
        state.error_object = Some(err);
    }
}

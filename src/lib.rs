//! renku-notify - the RenkuLab real-time notification channel.
//!
//! Keeps a persistent WebSocket connection to the UI-server gateway, decodes
//! the typed JSON envelopes it pushes, and dispatches them to handlers
//! registered per scope and type. While connected the channel pings the
//! server; on abnormal closure it reconnects with exponential backoff and
//! re-requests any state the client is still waiting on.

pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod message;
pub mod store;

pub use channel::{ChannelHandle, ChannelSender, NotificationChannel};
pub use config::ChannelConfig;
pub use dispatch::HandlerRegistry;
pub use error::{ChannelError, CodecError, DispatchError};
pub use message::{ClientMessage, Envelope};
pub use store::{ClientStore, NotificationLog, Notifier, Topic, TracingNotifier};

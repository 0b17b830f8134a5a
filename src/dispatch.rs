//! Handler registry and dispatcher.
//!
//! Handlers are registered per `(scope, type)`. One pair may carry several
//! registrations that differ by the field set they accept on `data`; the
//! first registration (in registration order) whose field set matches the
//! keys of the incoming `data` wins. Overlapping field sets are allowed and
//! resolved by that order.

use serde_json::{Map, Value};
use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;

use crate::channel::ChannelSender;
use crate::error::DispatchError;
use crate::message::Envelope;
use crate::store::{ClientStore, Notifier};

/// The only scope the server currently emits.
pub const USER_SCOPE: &str = "user";

/// Everything a handler may touch while processing a message.
pub struct HandlerContext<'a> {
    pub sender: &'a ChannelSender,
    pub store: &'a ClientStore,
    pub notifier: &'a dyn Notifier,
}

pub type Handler =
    Arc<dyn Fn(&Map<String, Value>, &HandlerContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Known message types of the `user` scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserMessage {
    Init,
    Version,
    Activation,
    Ack,
    Error,
    Test,
    SessionStatus,
}

impl UserMessage {
    pub const ALL: [UserMessage; 7] = [
        UserMessage::Init,
        UserMessage::Version,
        UserMessage::Activation,
        UserMessage::Ack,
        UserMessage::Error,
        UserMessage::Test,
        UserMessage::SessionStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserMessage::Init => "init",
            UserMessage::Version => "version",
            UserMessage::Activation => "activation",
            UserMessage::Ack => "ack",
            UserMessage::Error => "error",
            UserMessage::Test => "test",
            UserMessage::SessionStatus => "sessionStatus",
        }
    }
}

impl FromStr for UserMessage {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UserMessage::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| DispatchError::UnsupportedType {
                scope: USER_SCOPE.into(),
                kind: s.to_owned(),
            })
    }
}

/// Keys a registration accepts on `data`.
///
/// `None` for either set behaves like an empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    required: Option<BTreeSet<String>>,
    optional: Option<BTreeSet<String>>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, fields: &[&str]) -> Self {
        self.required = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn optional(mut self, fields: &[&str]) -> Self {
        self.optional = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    fn is_required(&self, key: &str) -> bool {
        self.required.as_ref().is_some_and(|r| r.contains(key))
    }

    fn is_optional(&self, key: &str) -> bool {
        self.optional.as_ref().is_some_and(|o| o.contains(key))
    }

    /// All required keys present, and no key outside required ∪ optional.
    pub fn matches<'k>(&self, keys: impl IntoIterator<Item = &'k str>) -> bool {
        let keys: Vec<&str> = keys.into_iter().collect();
        if let Some(required) = &self.required {
            if !required.iter().all(|r| keys.contains(&r.as_str())) {
                return false;
            }
        }
        keys.iter()
            .all(|k| self.is_required(k) || self.is_optional(k))
    }
}

struct Registration {
    fields: FieldSet,
    handler: Handler,
}

/// Static `scope → type → [registration]` table.
///
/// Built once at startup and shared read-only behind an `Arc`.
#[derive(Default)]
pub struct HandlerRegistry {
    scopes: HashMap<String, HashMap<String, Vec<Registration>>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (scope, types) in &self.scopes {
            for (kind, regs) in types {
                map.entry(&format!("{}/{}", scope, kind), &regs.len());
            }
        }
        map.finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a registration. Earlier registrations take precedence.
    pub fn register<F>(
        &mut self,
        scope: &str,
        kind: &str,
        fields: FieldSet,
        handler: F,
    ) -> &mut Self
    where
        F: Fn(&Map<String, Value>, &HandlerContext<'_>) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.scopes
            .entry(scope.to_owned())
            .or_default()
            .entry(kind.to_owned())
            .or_default()
            .push(Registration {
                fields,
                handler: Arc::new(handler),
            });
        self
    }

    /// Register a handler for a known `user` message type.
    pub fn register_user<F>(
        &mut self,
        kind: UserMessage,
        fields: FieldSet,
        handler: F,
    ) -> &mut Self
    where
        F: Fn(&Map<String, Value>, &HandlerContext<'_>) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.register(USER_SCOPE, kind.as_str(), fields, handler)
    }

    /// Find the handler for an envelope without running it.
    pub fn resolve(&self, envelope: &Envelope) -> Result<Handler, DispatchError> {
        let types = self
            .scopes
            .get(&envelope.scope)
            .ok_or_else(|| DispatchError::UnsupportedScope(envelope.scope.clone()))?;
        let candidates = types
            .get(&envelope.kind)
            .ok_or_else(|| DispatchError::UnsupportedType {
                scope: envelope.scope.clone(),
                kind: envelope.kind.clone(),
            })?;

        candidates
            .iter()
            .find(|reg| reg.fields.matches(envelope.data.keys().map(String::as_str)))
            .map(|reg| reg.handler.clone())
            .ok_or_else(|| DispatchError::NoMatchingHandler {
                kind: envelope.kind.clone(),
                keys: envelope.data_keys(),
            })
    }

    /// Resolve and run the handler for an envelope.
    ///
    /// A panicking handler is reported as `HandlerFailed` like any other
    /// handler error.
    pub fn dispatch(
        &self,
        envelope: &Envelope,
        ctx: &HandlerContext<'_>,
    ) -> Result<(), DispatchError> {
        let handler = self.resolve(envelope)?;
        let failed = |message: String| DispatchError::HandlerFailed {
            kind: envelope.kind.clone(),
            message,
        };
        match catch_unwind(AssertUnwindSafe(|| handler(&envelope.data, ctx))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(failed(format!("{:#}", e))),
            Err(payload) => {
                tracing::error!(kind = %envelope.kind, "handler panicked");
                Err(failed(format!("handler panicked: {}", panic_message(payload.as_ref()))))
            }
        }
    }
}

/// Text of a panic payload, when it carries one.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

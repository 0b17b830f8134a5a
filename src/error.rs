use thiserror::Error;

/// Failure to turn a raw text frame into an [`Envelope`](crate::message::Envelope).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The frame body is not valid JSON.
    #[error("Incoming message bad formed: {0}")]
    MalformedJson(String),
    /// Valid JSON, but not shaped like `{scope, type, data}`.
    #[error("WebSocket message is a valid JSON object but not a server message: {0}")]
    InvalidEnvelope(String),
}

/// No handler could process an envelope, or the handler itself failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Scope '{0}' is not supported.")]
    UnsupportedScope(String),

    #[error("Type '{kind}' is not supported for the scope '{scope}'.")]
    UnsupportedType { scope: String, kind: String },

    #[error("Could not find a proper handler; data is wrong for a '{kind}' instruction. (keys: {keys:?})")]
    NoMatchingHandler { kind: String, keys: Vec<String> },

    #[error("Error while executing the '{kind}' command: {message}")]
    HandlerFailed { kind: String, message: String },
}

/// Everything the notification channel can record as its last error.
///
/// Errors never escape the channel task; they land in
/// [`ConnectionState::error_object`](crate::channel::ConnectionState) so
/// callers can inspect them. All variants are `Clone` for that reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("WebSocket channel error {0}")]
    AbnormalClose(u16),

    #[error("invalid WebSocket url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("WebSocket channel is not open")]
    NotOpen,
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ChannelError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_type_message_names_scope_and_type() {
        let err: ChannelError = DispatchError::UnsupportedType {
            scope: "user".into(),
            kind: "bogus".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Type 'bogus' is not supported for the scope 'user'."
        );
    }

    #[test]
    fn no_matching_handler_lists_offending_keys() {
        let err = DispatchError::NoMatchingHandler {
            kind: "version".into(),
            keys: vec!["start".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'version' instruction"));
        assert!(msg.contains("\"start\""));
    }

    #[test]
    fn abnormal_close_message() {
        assert_eq!(
            ChannelError::AbnormalClose(1006).to_string(),
            "WebSocket channel error 1006"
        );
    }
}

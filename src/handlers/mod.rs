//! Default handlers for the `user` scope.

mod activation;
mod session_status;
mod user;

pub use activation::handle_kg_activation_status;
pub use session_status::handle_sessions_status;
pub use user::{handle_user_error, handle_user_init, handle_user_ui_version};

use crate::dispatch::{FieldSet, HandlerRegistry, UserMessage};

/// Field set shared by the types whose only payload is an optional message.
fn message_only() -> FieldSet {
    FieldSet::new().optional(&["message"])
}

/// Registry with every handler the UI server may address.
pub fn default_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register_user(UserMessage::Init, message_only(), handle_user_init)
        .register_user(
            UserMessage::Version,
            FieldSet::new()
                .required(&["version"])
                .optional(&["start", "message"]),
            handle_user_ui_version,
        )
        .register_user(UserMessage::Activation, message_only(), handle_kg_activation_status)
        .register_user(UserMessage::Ack, message_only(), |_, _| Ok(()))
        .register_user(UserMessage::Error, message_only(), handle_user_error)
        .register_user(UserMessage::Test, message_only(), |_, _| Ok(()))
        .register_user(UserMessage::SessionStatus, message_only(), handle_sessions_status);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Envelope;
    use serde_json::Map;

    #[test]
    fn every_user_type_is_registered() {
        let registry = default_registry();
        for kind in UserMessage::ALL {
            let data = if kind == UserMessage::Version {
                let mut m = Map::new();
                m.insert("version".into(), "1.0.0".into());
                m
            } else {
                Map::new()
            };
            let env = Envelope::new("user", kind.as_str(), data);
            assert!(registry.resolve(&env).is_ok(), "{:?} unresolved", kind);
        }
    }

    #[test]
    fn version_without_version_field_has_no_handler() {
        let registry = default_registry();
        let mut data = Map::new();
        data.insert("message".into(), "hello".into());
        let env = Envelope::new("user", "version", data);
        assert!(registry.resolve(&env).is_err());
    }
}

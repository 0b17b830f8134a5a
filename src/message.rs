//! JSON wire format of the notification channel.
//!
//! Server → client frames are envelopes: `{"scope": .., "type": .., "data": {..}}`.
//! Client → server frames are requests: `{"data": {..}, "type": .., "timestamp": ..}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CodecError;

/// Message type sent by the liveness prober.
pub const PING: &str = "ping";
/// Request for the current status of the user's interactive sessions.
pub const PULL_SESSION_STATUS: &str = "pullSessionStatus";
/// Request for the progress of knowledge-graph activations.
pub const PULL_KG_ACTIVATION_STATUS: &str = "pullKgActivationStatus";

// ── Server → client ────────────────────────────────────────────────

/// A decoded server message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub scope: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Map<String, Value>,
}

impl Envelope {
    pub fn new(
        scope: impl Into<String>,
        kind: impl Into<String>,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            scope: scope.into(),
            kind: kind.into(),
            data,
        }
    }

    /// Serialize to the text form the server sends.
    pub fn encode(&self) -> String {
        // A struct of strings and a JSON map always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Keys present in `data`, sorted.
    pub fn data_keys(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }
}

/// Decode a raw text frame into an [`Envelope`].
///
/// The structural check is done by hand rather than through `Deserialize`
/// so the error can say exactly which field is wrong, and so empty
/// `scope`/`type` strings are rejected.
pub fn decode(text: &str) -> Result<Envelope, CodecError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| CodecError::MalformedJson(e.to_string()))?;

    let Value::Object(mut obj) = value else {
        return Err(CodecError::InvalidEnvelope("expected a JSON object".into()));
    };

    let scope = take_non_empty_string(&mut obj, "scope")?;
    let kind = take_non_empty_string(&mut obj, "type")?;
    let data = match obj.remove("data") {
        Some(Value::Object(map)) => map,
        Some(_) => return Err(CodecError::InvalidEnvelope("'data' must be an object".into())),
        None => return Err(CodecError::InvalidEnvelope("missing 'data'".into())),
    };

    Ok(Envelope { scope, kind, data })
}

fn take_non_empty_string(obj: &mut Map<String, Value>, field: &str) -> Result<String, CodecError> {
    match obj.remove(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(Value::String(_)) => Err(CodecError::InvalidEnvelope(format!(
            "'{}' must not be empty",
            field
        ))),
        Some(_) => Err(CodecError::InvalidEnvelope(format!(
            "'{}' must be a string",
            field
        ))),
        None => Err(CodecError::InvalidEnvelope(format!("missing '{}'", field))),
    }
}

// ── Client → server ────────────────────────────────────────────────

/// A client request. Fire-and-forget: nothing correlates it with a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    pub data: Map<String, Value>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ClientMessage {
    /// Build a message stamped with the current time.
    pub fn new(kind: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            data,
            kind: kind.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn ping() -> Self {
        Self::new(PING, Map::new())
    }

    pub fn pull_session_status() -> Self {
        Self::new(PULL_SESSION_STATUS, Map::new())
    }

    /// Ask for the activation progress of the given knowledge-graph projects.
    pub fn pull_kg_activation_status(project_ids: &[u64]) -> Self {
        let mut data = Map::new();
        data.insert("projects".into(), Value::from(project_ids.to_vec()));
        Self::new(PULL_KG_ACTIVATION_STATUS, data)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn decode_valid_envelope() {
        let env = decode(r#"{"scope":"user","type":"sessionStatus","data":{"message":"{}"}}"#)
            .unwrap();
        assert_eq!(env.scope, "user");
        assert_eq!(env.kind, "sessionStatus");
        assert_eq!(env.data.get("message"), Some(&json!("{}")));
    }

    #[test]
    fn decode_ignores_extra_top_level_fields() {
        let env = decode(r#"{"scope":"user","type":"ack","data":{},"timestamp":"x"}"#).unwrap();
        assert_eq!(env.kind, "ack");
        assert!(env.data.is_empty());
    }

    #[test]
    fn encode_then_decode_preserves_envelope() {
        let env = Envelope::new(
            "user",
            "version",
            map(json!({"version": "3.1.0", "start": true, "nested": {"a": [1, 2]}})),
        );
        assert_eq!(decode(&env.encode()).unwrap(), env);
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = decode("{not json").unwrap_err();
        assert!(matches!(err, CodecError::MalformedJson(_)));
        assert!(err.to_string().starts_with("Incoming message bad formed"));
    }

    #[test]
    fn non_object_is_invalid_envelope() {
        assert!(matches!(decode("[1,2]"), Err(CodecError::InvalidEnvelope(_))));
        assert!(matches!(decode("\"user\""), Err(CodecError::InvalidEnvelope(_))));
    }

    #[test]
    fn missing_fields_are_invalid_envelope() {
        for text in [
            r#"{"type":"ack","data":{}}"#,
            r#"{"scope":"user","data":{}}"#,
            r#"{"scope":"user","type":"ack"}"#,
        ] {
            let err = decode(text).unwrap_err();
            assert!(
                matches!(err, CodecError::InvalidEnvelope(ref d) if d.starts_with("missing")),
                "{text}: {err:?}"
            );
        }
    }

    #[test]
    fn wrong_field_shapes_are_invalid_envelope() {
        assert!(decode(r#"{"scope":"","type":"ack","data":{}}"#).is_err());
        assert!(decode(r#"{"scope":"user","type":7,"data":{}}"#).is_err());
        assert!(decode(r#"{"scope":"user","type":"ack","data":[]}"#).is_err());
        assert!(decode(r#"{"scope":"user","type":"ack","data":null}"#).is_err());
    }

    #[test]
    fn ping_wire_shape() {
        let text = ClientMessage::ping().to_json().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "ping");
        assert_eq!(value["data"], json!({}));
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn kg_activation_request_carries_project_ids() {
        let msg = ClientMessage::pull_kg_activation_status(&[12, 40]);
        assert_eq!(msg.kind, PULL_KG_ACTIVATION_STATUS);
        assert_eq!(msg.data.get("projects"), Some(&json!([12, 40])));
    }

    #[test]
    fn client_message_without_timestamp_omits_field() {
        let msg = ClientMessage {
            data: Map::new(),
            kind: PULL_SESSION_STATUS.into(),
            timestamp: None,
        };
        assert_eq!(
            msg.to_json().unwrap(),
            r#"{"data":{},"type":"pullSessionStatus"}"#
        );
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn json_value() -> impl Strategy<Value = Value> {
            let leaf = prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(Value::from),
                ".*".prop_map(Value::String),
            ];
            leaf.prop_recursive(3, 24, 4, |inner| {
                prop_oneof![
                    proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                    proptest::collection::btree_map(".*", inner, 0..4)
                        .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            })
        }

        fn envelope() -> impl Strategy<Value = Envelope> {
            (
                ".+",
                ".+",
                proptest::collection::btree_map("[a-zA-Z_]{1,12}", json_value(), 0..6),
            )
                .prop_map(|(scope, kind, data)| {
                    Envelope::new(scope, kind, data.into_iter().collect())
                })
        }

        proptest! {
            #[test]
            fn encoded_envelopes_decode_unchanged(env in envelope()) {
                prop_assert_eq!(decode(&env.encode()).unwrap(), env);
            }

            #[test]
            fn non_json_text_is_malformed(text in "[^\\[{\"0-9tfn\\s-]\\PC*") {
                prop_assert!(matches!(decode(&text), Err(CodecError::MalformedJson(_))));
            }
        }
    }
}

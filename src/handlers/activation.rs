use anyhow::Context;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::dispatch::HandlerContext;
use crate::store::{Topic, ACTIVATION_DONE, ACTIVATION_FAILED};

/// `activation`: progress of knowledge-graph project activations.
///
/// `message` is a JSON-encoded object mapping project ids to their progress
/// (an integer percentage, `-2` for "done with errors", or null). Ids that
/// are not positive integers are ignored.
pub fn handle_kg_activation_status(
    data: &Map<String, Value>,
    ctx: &HandlerContext<'_>,
) -> anyhow::Result<()> {
    let Some(message) = data.get("message").and_then(Value::as_str) else {
        return Ok(());
    };
    let statuses: BTreeMap<String, Option<i64>> =
        serde_json::from_str(message).context("invalid activation status payload")?;

    for (project_id, progress) in statuses {
        let Ok(id) = project_id.parse::<u64>() else {
            continue;
        };
        if id == 0 {
            continue;
        }
        ctx.store.update_activation(id, progress);
        tracing::debug!(project = id, progress = ?progress, "activation progress");

        match progress {
            Some(ACTIVATION_DONE) => ctx
                .notifier
                .add_success(Topic::KgActivation, "Project indexing has been activated."),
            Some(ACTIVATION_FAILED) => ctx.notifier.add_error(
                Topic::KgActivation,
                "Project indexing has been activated, but with errors.",
            ),
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelSender;
    use crate::store::{ClientStore, Level, NotificationLog};
    use serde_json::json;

    fn run(data: Value, store: &ClientStore, notifier: &NotificationLog) -> anyhow::Result<()> {
        let sender = ChannelSender::disconnected();
        let ctx = HandlerContext { sender: &sender, store, notifier };
        handle_kg_activation_status(data.as_object().unwrap(), &ctx)
    }

    #[test]
    fn updates_progress_and_notifies_terminal_states() {
        let store = ClientStore::new();
        store.track_activation(1);
        store.track_activation(2);
        store.track_activation(3);
        let log = NotificationLog::new();

        let message = json!({"1": 100, "2": -2, "3": 45}).to_string();
        run(json!({"message": message}), &store, &log).unwrap();

        assert_eq!(store.activation_progress(1), Some(100));
        assert_eq!(store.activation_progress(2), Some(-2));
        assert_eq!(store.pending_activations(), vec![3]);

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, Level::Success);
        assert_eq!(entries[0].message, "Project indexing has been activated.");
        assert_eq!(entries[1].level, Level::Error);
    }

    #[test]
    fn ignores_non_positive_and_non_numeric_ids() {
        let store = ClientStore::new();
        let log = NotificationLog::new();
        let message = json!({"0": 100, "abc": 100, "-4": 100}).to_string();
        run(json!({"message": message}), &store, &log).unwrap();
        assert!(log.entries().is_empty());
        assert!(store.pending_activations().is_empty());
    }

    #[test]
    fn null_progress_is_stored() {
        let store = ClientStore::new();
        store.track_activation(9);
        let log = NotificationLog::new();
        run(json!({"message": json!({"9": null}).to_string()}), &store, &log).unwrap();
        assert_eq!(store.activation_progress(9), None);
        assert!(store.pending_activations().is_empty());
    }

    #[test]
    fn missing_message_is_a_no_op() {
        let store = ClientStore::new();
        let log = NotificationLog::new();
        run(json!({}), &store, &log).unwrap();
        assert!(log.entries().is_empty());
    }

    #[test]
    fn invalid_payload_fails() {
        let store = ClientStore::new();
        let log = NotificationLog::new();
        assert!(run(json!({"message": "not json"}), &store, &log).is_err());
    }
}

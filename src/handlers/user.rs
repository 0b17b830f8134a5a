use anyhow::Context;
use serde_json::{Map, Value};

use crate::dispatch::HandlerContext;
use crate::store::Topic;

fn message_of(data: &Map<String, Value>) -> Option<String> {
    match data.get("message") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}

/// `init`: the server accepted the channel for this user.
pub fn handle_user_init(data: &Map<String, Value>, ctx: &HandlerContext<'_>) -> anyhow::Result<()> {
    ctx.store.mark_initialized();
    tracing::info!(message = ?message_of(data), "notification channel initialized");
    Ok(())
}

/// `version`: the server reports the UI version it currently serves.
pub fn handle_user_ui_version(
    data: &Map<String, Value>,
    ctx: &HandlerContext<'_>,
) -> anyhow::Result<()> {
    let version = data
        .get("version")
        .and_then(Value::as_str)
        .context("'version' must be a string")?
        .to_owned();

    let was_flagged = ctx
        .store
        .ui_version()
        .is_some_and(|v| v.reload_recommended);
    let record = ctx
        .store
        .record_ui_version(version, data.get("start").cloned(), message_of(data));

    if record.reload_recommended && !was_flagged {
        ctx.notifier.add_success(
            Topic::UiVersion,
            &format!(
                "A new version of the UI ({}) is available. Reload the page to use it.",
                record.version
            ),
        );
    }
    Ok(())
}

/// `error`: the server reports a problem with this channel.
pub fn handle_user_error(
    data: &Map<String, Value>,
    ctx: &HandlerContext<'_>,
) -> anyhow::Result<()> {
    let message = message_of(data);
    tracing::warn!(message = ?message, "server reported an error");
    ctx.store.set_server_error(Some(message.unwrap_or_default()));
    Ok(())
}

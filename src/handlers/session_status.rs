use anyhow::Context;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::dispatch::HandlerContext;

/// `sessionStatus`: the full set of the user's interactive sessions.
///
/// `message` is a JSON-encoded object keyed by session name. The stored set
/// is replaced wholesale, so sessions missing from the message are dropped.
pub fn handle_sessions_status(
    data: &Map<String, Value>,
    ctx: &HandlerContext<'_>,
) -> anyhow::Result<()> {
    let Some(message) = data.get("message").and_then(Value::as_str) else {
        return Ok(());
    };
    let statuses: HashMap<String, Value> =
        serde_json::from_str(message).context("invalid session status payload")?;
    tracing::debug!(sessions = statuses.len(), "session status update");
    ctx.store.replace_session_statuses(statuses);
    Ok(())
}

use crate::message::ClientMessage;
use crate::store::ClientStore;

/// Requests to send right after every successful (re)connect.
///
/// The server only pushes state for requests it has seen on the current
/// connection, so interest in outstanding work is re-asserted each time.
pub fn resume_requests(store: &ClientStore) -> Vec<ClientMessage> {
    let mut requests = vec![ClientMessage::pull_session_status()];
    let pending = store.pending_activations();
    if !pending.is_empty() {
        requests.push(ClientMessage::pull_kg_activation_status(&pending));
    }
    requests
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{PULL_KG_ACTIVATION_STATUS, PULL_SESSION_STATUS};
    use serde_json::json;

    #[test]
    fn session_status_only_without_pending_jobs() {
        let store = ClientStore::new();
        store.update_activation(3, Some(100));
        let requests = resume_requests(&store);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].kind, PULL_SESSION_STATUS);
    }

    #[test]
    fn pending_jobs_are_requested_together() {
        let store = ClientStore::new();
        store.track_activation(8);
        store.update_activation(2, Some(30));
        store.update_activation(5, Some(-2));
        let requests = resume_requests(&store);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].kind, PULL_KG_ACTIVATION_STATUS);
        assert_eq!(requests[1].data["projects"], json!([2, 8]));
    }
}

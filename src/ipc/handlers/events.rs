use crate::ipc::error::{respond, HandlerResult};
use crate::ipc::helpers::{authorize, to_json};
use crate::ipc::types::{AppState, Request};
use crate::roles::Capability;
use serde_json::json;

/// Hands queued notifications to the host for delivery and forgets them.
fn handle_events_drain(state: &mut AppState, req: &Request) -> HandlerResult {
    authorize(req, Capability::ManageUsers, "drain notifications")?;
    let events = state.outbox.drain();
    tracing::debug!(count = events.len(), "outbox drained");
    Ok(json!({ "events": to_json(&events)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "events.drain" => handle_events_drain(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

type Handler = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const HANDLERS: &[Handler] = &[
    handlers::core::try_handle,
    handlers::setup::try_handle,
    handlers::users::try_handle,
    handlers::ledger::try_handle,
    handlers::rewards::try_handle,
    handlers::claims::try_handle,
    handlers::courses::try_handle,
    handlers::views::try_handle,
    handlers::events::try_handle,
    handlers::backup::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "request");
    for handler in HANDLERS {
        if let Some(resp) = handler(state, &req) {
            return resp;
        }
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}

use crate::ipc::error::{respond, HandlerErr, HandlerResult};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use crate::service::Amist;
use crate::store::SqliteStore;
use anyhow::Context;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Opens (creating if needed) the workspace database and applies its saved
/// settings. Replaces any workspace that was open before.
pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<()> {
    state.core = None;
    let store = SqliteStore::open(path)
        .with_context(|| format!("failed to open workspace {}", path.to_string_lossy()))?;
    let settings = setup::load_runtime_settings(store.conn())?;
    state
        .outbox
        .configure(settings.notifications_enabled, settings.outbox_limit);
    let events = Arc::clone(&state.outbox);
    state.core = Some(Amist::new(store).with_events(events).with_config(settings.core));
    state.workspace = Some(path.to_path_buf());
    tracing::info!(workspace = %path.to_string_lossy(), "workspace opened");
    Ok(())
}

fn handle_health(state: &mut AppState, _req: &Request) -> HandlerResult {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        "pendingEvents": state.outbox.len(),
    }))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> HandlerResult {
    let path = PathBuf::from(required_str(req, "path")?);
    open_workspace(state, &path).map_err(|e| {
        tracing::error!(error = ?e, "workspace open failed");
        HandlerErr::new("db_open_failed", format!("{e:#}"))
    })?;
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

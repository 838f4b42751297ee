use crate::backup;
use crate::ipc::error::{respond, HandlerErr, HandlerResult};
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::helpers::{authorize, opt_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::roles::Capability;
use serde_json::json;
use std::path::PathBuf;

fn target_workspace(state: &AppState, req: &Request) -> Result<PathBuf, HandlerErr> {
    opt_str(req, "workspacePath")?
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn handle_export_bundle(state: &mut AppState, req: &Request) -> HandlerResult {
    authorize(req, Capability::ManageUsers, "export backups")?;
    let out_path = required_str(req, "outPath")?;
    let workspace_path = target_workspace(state, req)?;
    let export = backup::export_workspace_bundle(&workspace_path, &PathBuf::from(&out_path))
        .map_err(|e| {
            HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": out_path }))
        })?;
    Ok(json!({
        "ok": true,
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "dbSha256": export.db_sha256,
    }))
}

fn handle_import_bundle(state: &mut AppState, req: &Request) -> HandlerResult {
    authorize(req, Capability::ManageUsers, "import backups")?;
    let in_path = required_str(req, "inPath")?;
    let workspace_path = target_workspace(state, req)?;
    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr::new("not_found", "bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    // Close the open connection before its file is replaced.
    let previous = state.workspace.clone();
    state.core = None;
    let import = match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            if let Some(prev) = previous {
                if let Err(reopen) = open_workspace(state, &prev) {
                    tracing::error!(error = ?reopen, "failed to reopen workspace after import error");
                }
            }
            return Err(HandlerErr::new("io_failed", format!("{e:#}"))
                .with_details(json!({ "path": in_path })));
        }
    };
    open_workspace(state, &workspace_path)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:#}")))?;
    Ok(json!({
        "ok": true,
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.exportBundle" => handle_export_bundle(state, req),
        "backup.importBundle" => handle_import_bundle(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

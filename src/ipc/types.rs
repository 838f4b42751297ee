use crate::events::Outbox;
use crate::service::Amist;
use crate::store::SqliteStore;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_OUTBOX_LIMIT: usize = 500;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub core: Option<Amist<SqliteStore>>,
    /// Outlives workspace switches so undrained events are not lost.
    pub outbox: Arc<Outbox>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            core: None,
            outbox: Arc::new(Outbox::new(DEFAULT_OUTBOX_LIMIT)),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

//! Shared state handed to every API handler

use std::sync::Arc;

use zkv_auth::AuthService;
use zkv_transfer::Ingestor;

use crate::metrics::DaemonMetrics;

pub struct AppState {
    pub auth: Arc<AuthService>,
    pub ingestor: Ingestor,
    pub metrics: DaemonMetrics,
    /// Largest accepted upload body
    pub max_upload_bytes: usize,
}

pub type SharedState = Arc<AppState>;

use std::sync::Arc;

use crate::dashboard::Dashboard;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Single engine instance; every handler acts on the same focal job.
    pub dashboard: Arc<Dashboard>,
}

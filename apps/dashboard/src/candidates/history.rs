//! History index: cached list of past analysis jobs.
//!
//! Readers always see a complete snapshot: `refresh` swaps the whole list in
//! one step and a failed refresh leaves the previous snapshot in place.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::models::job::HistoryEntry;
use crate::service_client::{AnalysisService, ServiceError};

/// Immutable view of the job history at one point in time.
#[derive(Debug, Clone, Default)]
pub struct HistorySnapshot {
    entries: Arc<Vec<HistoryEntry>>,
    version: u64,
}

impl HistorySnapshot {
    pub fn new(entries: Vec<HistoryEntry>) -> Self {
        Self {
            entries: Arc::new(entries),
            version: 0,
        }
    }

    /// Incremented on every successful refresh.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn find_by_job_id(&self, job_id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.job_id == job_id)
    }

    /// Jobs sharing `jd_identity`, excluding `exclude_job_id`, in history order.
    pub fn find_siblings(&self, jd_identity: &str, exclude_job_id: &str) -> Vec<&HistoryEntry> {
        self.entries
            .iter()
            .filter(|e| e.job_id != exclude_job_id && e.jd_identity() == Some(jd_identity))
            .collect()
    }

    /// Entries ordered newest first; entries without a timestamp go last.
    pub fn newest_first(&self) -> Vec<HistoryEntry> {
        let mut entries = self.entries.to_vec();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }
}

pub struct HistoryIndex {
    service: Arc<dyn AnalysisService>,
    snapshot: RwLock<HistorySnapshot>,
    last_error: RwLock<Option<String>>,
}

impl HistoryIndex {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self {
            service,
            snapshot: RwLock::new(HistorySnapshot::default()),
            last_error: RwLock::new(None),
        }
    }

    /// Fetches the full history and replaces the cache. On failure the previous
    /// snapshot stays available and the error is returned.
    pub async fn refresh(&self) -> Result<HistorySnapshot, ServiceError> {
        match self.service.history().await {
            Ok(entries) => {
                let count = entries.len();
                let snapshot = {
                    let mut current = self.snapshot.write();
                    *current = HistorySnapshot {
                        entries: Arc::new(entries),
                        version: current.version + 1,
                    };
                    current.clone()
                };
                *self.last_error.write() = None;
                info!(entries = count, "History refreshed");
                Ok(snapshot)
            }
            Err(e) => {
                warn!("History refresh failed, keeping cached snapshot: {e}");
                *self.last_error.write() = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        self.snapshot.read().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::timestamp;

/// Lifecycle of an analysis job as reported by the status service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// The backend reports freshly uploaded jobs as `uploaded`; they have not started yet.
    #[default]
    #[serde(alias = "uploaded")]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Response body of `GET /status/{job_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: i64,
    #[serde(default)]
    pub message: Option<String>,
}

/// One row of `GET /history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub job_id: String,
    /// Job description the analysis ran against. Equal values mark sibling jobs.
    #[serde(default)]
    pub jd_filename: Option<String>,
    /// Older rows only carry the uploaded file name.
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, with = "timestamp::lenient")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<String>,
}

impl HistoryEntry {
    /// The requisition identity used to correlate sibling jobs.
    /// Blank identities never match anything.
    pub fn jd_identity(&self) -> Option<&str> {
        self.jd_filename
            .as_deref()
            .map(str::trim)
            .filter(|jd| !jd.is_empty())
    }

    /// Title shown in the report switcher.
    pub fn display_title(&self) -> &str {
        self.jd_identity()
            .or(self.filename.as_deref())
            .unwrap_or("Untitled Analysis")
    }
}

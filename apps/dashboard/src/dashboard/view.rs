use serde::Serialize;

use crate::candidates::ranking::{FilterState, RankedRow, SkillCount};
use crate::candidates::selection::SelectionSet;
use crate::models::candidate::{CandidateKey, CandidateStatus, TaggedCandidate};
use crate::models::job::HistoryEntry;
use crate::notifications::NotificationSummary;
use crate::tracking::tracker::TrackerSnapshot;

/// Everything the presentation layer renders, derived in one pass.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    /// Bumped on every state change; lets the UI skip redundant renders.
    pub revision: u64,
    pub job: TrackerSnapshot,
    /// Job description of the focal job, for the report switcher header.
    pub report_title: Option<String>,
    pub history: Vec<HistoryEntry>,
    /// Bumped on every successful history refresh.
    pub history_version: u64,
    pub history_error: Option<String>,
    pub filters: FilterState,
    /// Any toggle on or search text present; drives the "clear filters" control.
    pub filters_active: bool,
    pub total_candidates: usize,
    pub relevant_matches: usize,
    pub candidates: Vec<RankedRow>,
    pub top_skills: Vec<SkillCount>,
    pub selection: SelectionSet,
    /// Selected filenames currently hidden by the search or filter toggles.
    pub hidden_selected: usize,
    pub notifications: NotificationSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonEntry {
    #[serde(flatten)]
    pub candidate: TaggedCandidate,
    /// Highest score among the compared candidates.
    pub top_match: bool,
}

/// Result of one candidate status mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationOutcome {
    #[serde(flatten)]
    pub key: CandidateKey,
    pub status: CandidateStatus,
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<MutationOutcome>,
}

impl BulkOutcome {
    pub fn from_items(items: Vec<MutationOutcome>) -> Self {
        let succeeded = items.iter().filter(|o| o.ok).count();
        Self {
            succeeded,
            failed: items.len() - succeeded,
            items,
        }
    }
}

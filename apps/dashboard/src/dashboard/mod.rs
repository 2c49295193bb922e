//! Dashboard engine: wires the tracker, history index, merger, ranked view and
//! selection together and exposes the actions the presentation layer calls.
//!
//! The merged list and ranked view are recomputed from scratch whenever the
//! focal job, its results, or the history snapshot change. A merge generation
//! token makes the most recently issued merge win.

pub mod handlers;
pub mod view;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::candidates::export::{export_filename, render_csv, rows_for_scope, ExportScope};
use crate::candidates::history::HistoryIndex;
use crate::candidates::merger::merge_candidates;
use crate::candidates::ranking::{derive_view, FilterKey, FilterState, RankedView};
use crate::candidates::selection::{SelectionSet, ToggleOutcome};
use crate::errors::AppError;
use crate::models::candidate::{CandidateKey, CandidateStatus, TaggedCandidate};
use crate::notifications::NotificationFeed;
use crate::service_client::AnalysisService;
use crate::tracking::tracker::{JobStatusTracker, TrackerSnapshot};

use self::view::{BulkOutcome, ComparisonEntry, DashboardView, MutationOutcome};

#[derive(Debug, Clone)]
pub struct DashboardOptions {
    pub status_poll_interval: Duration,
    pub notification_poll_interval: Duration,
    pub notification_limit: usize,
    pub top_skills_limit: usize,
}

#[derive(Default)]
struct DashboardState {
    focal_job_id: Option<String>,
    merged: Vec<TaggedCandidate>,
    filters: FilterState,
    selection: SelectionSet,
    /// Statuses confirmed by the mutation service since the last results fetch.
    status_overrides: HashMap<CandidateKey, CandidateStatus>,
    ranked: RankedView,
}

impl DashboardState {
    fn rerank(&mut self, top_skills_limit: usize) {
        self.ranked = derive_view(&self.merged, &self.filters, top_skills_limit);
    }

    fn find_mut(&mut self, key: &CandidateKey) -> Option<&mut TaggedCandidate> {
        self.merged.iter_mut().find(|c| c.matches(key))
    }
}

pub struct Dashboard {
    service: Arc<dyn AnalysisService>,
    options: DashboardOptions,
    tracker: JobStatusTracker,
    history: HistoryIndex,
    notifications: NotificationFeed,
    state: Mutex<DashboardState>,
    merge_generation: AtomicU64,
    revision: watch::Sender<u64>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Dashboard {
    pub fn new(service: Arc<dyn AnalysisService>, options: DashboardOptions) -> Arc<Self> {
        let (revision, _) = watch::channel(0);
        Arc::new(Self {
            tracker: JobStatusTracker::new(Arc::clone(&service), options.status_poll_interval),
            history: HistoryIndex::new(Arc::clone(&service)),
            notifications: NotificationFeed::new(Arc::clone(&service), options.notification_limit),
            service,
            options,
            state: Mutex::new(DashboardState::default()),
            merge_generation: AtomicU64::new(0),
            revision,
            listener: Mutex::new(None),
        })
    }

    /// Starts the notification poller and the tracker listener.
    pub fn start(self: &Arc<Self>) {
        self.notifications
            .start(self.options.notification_poll_interval);

        let weak = Arc::downgrade(self);
        let mut changes = self.tracker.subscribe();
        let handle = tokio::spawn(async move {
            let mut last = TrackerSnapshot::default();
            while changes.changed().await.is_ok() {
                let current = changes.borrow_and_update().clone();
                let Some(dashboard) = Weak::upgrade(&weak) else {
                    break;
                };
                if results_changed(&last, &current) {
                    if last.job_id == current.job_id && current.results.is_some() {
                        dashboard.forget_overrides();
                    }
                    dashboard.remerge().await;
                } else {
                    dashboard.bump();
                }
                last = current;
            }
        });
        *self.listener.lock() = Some(handle);
        info!("Dashboard started");
    }

    /// Stops both timers and the listener. In-flight fetches finish but are ignored.
    pub fn shutdown(&self) {
        self.tracker.stop();
        self.notifications.stop();
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
        info!("Dashboard stopped");
    }

    /// Fresh results carry the backend's own statuses, which supersede
    /// anything confirmed against the previous fetch.
    fn forget_overrides(&self) {
        let mut state = self.state.lock();
        if !state.status_overrides.is_empty() {
            debug!(count = state.status_overrides.len(), "Clearing status overrides after results refetch");
            state.status_overrides.clear();
        }
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    fn rerank_and_bump(&self, state: &mut DashboardState) {
        state.rerank(self.options.top_skills_limit);
        self.bump();
    }

    fn require_focal(&self) -> Result<String, AppError> {
        self.state
            .lock()
            .focal_job_id
            .clone()
            .ok_or(AppError::NoActiveJob)
    }

    // ── job selection ────────────────────────────────────────────────────────

    /// Switches the focal job: resets everything tied to the previous job,
    /// starts polling the new one and refreshes history.
    pub async fn select_job(&self, job_id: &str) -> Result<(), AppError> {
        let job_id = job_id.trim();
        if job_id.is_empty() {
            return Err(AppError::Validation("job_id must not be empty".to_string()));
        }
        {
            let mut state = self.state.lock();
            self.merge_generation.fetch_add(1, Ordering::SeqCst);
            state.focal_job_id = Some(job_id.to_string());
            state.merged.clear();
            state.selection.clear();
            state.status_overrides.clear();
            self.rerank_and_bump(&mut state);
        }
        self.tracker.track(job_id);
        info!(job_id, "Focal job selected");

        // A failed refresh keeps the cached history; merging still runs against it.
        let _ = self.refresh_history().await;
        Ok(())
    }

    pub async fn retry_results(&self) -> Result<(), AppError> {
        self.require_focal()?;
        if self.tracker.retry_results().await {
            Ok(())
        } else {
            Err(AppError::Conflict(
                "Results can only be retried after a failed fetch of a completed job".to_string(),
            ))
        }
    }

    pub async fn refresh_history(&self) -> Result<(), AppError> {
        let outcome = self.history.refresh().await;
        self.remerge().await;
        outcome.map(|_| ()).map_err(AppError::from)
    }

    /// Recomputes the merged set from the tracker's current results and the history snapshot.
    async fn remerge(&self) {
        let generation = self.merge_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let tracker = self.tracker.snapshot();
        let focal = self.state.lock().focal_job_id.clone();
        let (Some(job_id), Some(tracked)) = (focal, tracker.job_id) else {
            self.bump();
            return;
        };
        if job_id != tracked {
            return;
        }

        let merged = match &tracker.results {
            Some(results) => {
                let history = self.history.snapshot();
                merge_candidates(&self.service, &job_id, results, &history).await
            }
            None => Vec::new(),
        };

        let mut state = self.state.lock();
        if self.merge_generation.load(Ordering::SeqCst) != generation
            || state.focal_job_id.as_deref() != Some(job_id.as_str())
        {
            debug!(job_id, "Discarding superseded merge");
            return;
        }
        let mut merged = merged;
        for candidate in merged.iter_mut() {
            if let Some(status) = state.status_overrides.get(&candidate.key()) {
                candidate.candidate.status = status.clone();
            }
        }
        let dropped = state
            .selection
            .retain_present(|f| merged.iter().any(|c| c.candidate.filename == f));
        state.merged = merged;
        if dropped > 0 {
            debug!(dropped, "Dropped selections no longer in the merged set");
        }
        self.rerank_and_bump(&mut state);
    }

    // ── filters & search ─────────────────────────────────────────────────────

    pub fn toggle_filter(&self, key: FilterKey) -> FilterState {
        let mut state = self.state.lock();
        state.filters.toggle(key);
        self.rerank_and_bump(&mut state);
        state.filters.clone()
    }

    pub fn clear_filters(&self) -> FilterState {
        let mut state = self.state.lock();
        state.filters.clear_toggles();
        self.rerank_and_bump(&mut state);
        state.filters.clone()
    }

    pub fn set_search(&self, text: &str) -> FilterState {
        let mut state = self.state.lock();
        state.filters.search = text.to_string();
        self.rerank_and_bump(&mut state);
        state.filters.clone()
    }

    // ── selection ────────────────────────────────────────────────────────────

    /// Toggles `filename` in the selection. Only filenames present in the
    /// current ranked list can be added; removal is always allowed.
    pub fn toggle_selection(&self, filename: &str) -> Result<ToggleOutcome, AppError> {
        let mut state = self.state.lock();
        if !state.selection.contains(filename) && !state.ranked.contains_filename(filename) {
            return Err(AppError::NotFound(format!(
                "Candidate '{filename}' is not in the current list"
            )));
        }
        let outcome = state.selection.toggle(filename);
        if outcome != ToggleOutcome::Full {
            self.bump();
        }
        Ok(outcome)
    }

    pub fn clear_selection(&self) {
        self.state.lock().selection.clear();
        self.bump();
    }

    /// Selected candidates in pick order. A filename present in several jobs
    /// yields one entry per job.
    pub fn comparison(&self) -> Vec<ComparisonEntry> {
        let state = self.state.lock();
        let merged = &state.merged;
        let picked: Vec<TaggedCandidate> = state
            .selection
            .filenames()
            .iter()
            .flat_map(|f| merged.iter().filter(move |c| &c.candidate.filename == f))
            .cloned()
            .collect();
        let best = picked
            .iter()
            .map(|c| c.candidate.final_score)
            .fold(f64::NEG_INFINITY, f64::max);
        picked
            .into_iter()
            .map(|candidate| ComparisonEntry {
                top_match: candidate.candidate.final_score == best,
                candidate,
            })
            .collect()
    }

    // ── status mutations ─────────────────────────────────────────────────────

    /// Optimistically applies each update, calls the mutation service for each
    /// independently, and rolls back the ones that failed.
    async fn apply_statuses(&self, updates: Vec<(CandidateKey, CandidateStatus)>) -> Vec<MutationOutcome> {
        let mut previous = HashMap::new();
        {
            let mut state = self.state.lock();
            for (key, status) in &updates {
                if let Some(candidate) = state.find_mut(key) {
                    let old = std::mem::replace(&mut candidate.candidate.status, status.clone());
                    previous.insert(key.clone(), old);
                }
            }
            self.rerank_and_bump(&mut state);
        }

        let mut calls = JoinSet::new();
        for (idx, (key, status)) in updates.iter().enumerate() {
            let service = Arc::clone(&self.service);
            let key = key.clone();
            let status = status.clone();
            calls.spawn(async move {
                let result = service
                    .update_candidate_status(&key.job_id, &key.filename, &status)
                    .await;
                (idx, result)
            });
        }
        let mut results: Vec<Option<Result<(), String>>> = vec![None; updates.len()];
        while let Some(joined) = calls.join_next().await {
            match joined {
                Ok((idx, result)) => results[idx] = Some(result.map_err(|e| e.to_string())),
                Err(e) => warn!("Status update task failed: {e}"),
            }
        }

        let mut state = self.state.lock();
        let outcomes = updates
            .into_iter()
            .zip(results)
            .map(|((key, status), result)| {
                let result = result.unwrap_or_else(|| Err("update task aborted".to_string()));
                match result {
                    Ok(()) => {
                        info!(job_id = %key.job_id, filename = %key.filename, %status, "Candidate status updated");
                        state.status_overrides.insert(key.clone(), status.clone());
                        // A remerge may have rebuilt the row from cached results meanwhile.
                        if let Some(candidate) = state.find_mut(&key) {
                            candidate.candidate.status = status.clone();
                        }
                        MutationOutcome {
                            key,
                            status,
                            ok: true,
                            error: None,
                        }
                    }
                    Err(error) => {
                        warn!(job_id = %key.job_id, filename = %key.filename, "Status update failed, rolling back: {error}");
                        if let (Some(old), Some(candidate)) =
                            (previous.get(&key), state.find_mut(&key))
                        {
                            // Only roll back if nothing newer has been written meanwhile.
                            if candidate.candidate.status == status {
                                candidate.candidate.status = old.clone();
                            }
                        }
                        MutationOutcome {
                            key,
                            status,
                            ok: false,
                            error: Some(error),
                        }
                    }
                }
            })
            .collect();
        self.rerank_and_bump(&mut state);
        outcomes
    }

    fn require_candidate(&self, key: &CandidateKey) -> Result<CandidateStatus, AppError> {
        self.state
            .lock()
            .merged
            .iter()
            .find(|c| c.matches(key))
            .map(|c| c.candidate.status.clone())
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Candidate '{}' not found in job {}",
                    key.filename, key.job_id
                ))
            })
    }

    pub async fn set_candidate_status(
        &self,
        key: CandidateKey,
        status: CandidateStatus,
    ) -> Result<MutationOutcome, AppError> {
        self.require_candidate(&key)?;
        let mut outcomes = self.apply_statuses(vec![(key, status)]).await;
        outcomes
            .pop()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("status update produced no outcome")))
    }

    /// Flips one candidate between shortlisted and new.
    pub async fn toggle_shortlist(&self, key: CandidateKey) -> Result<MutationOutcome, AppError> {
        let next = match self.require_candidate(&key)? {
            CandidateStatus::Shortlisted => CandidateStatus::New,
            _ => CandidateStatus::Shortlisted,
        };
        self.set_candidate_status(key, next).await
    }

    /// Shortlists every selected candidate, each against its originating job.
    pub async fn bulk_shortlist_selected(&self) -> Result<BulkOutcome, AppError> {
        self.require_focal()?;
        let updates: Vec<(CandidateKey, CandidateStatus)> = {
            let state = self.state.lock();
            state
                .merged
                .iter()
                .filter(|c| state.selection.contains(&c.candidate.filename))
                .map(|c| (c.key(), CandidateStatus::Shortlisted))
                .collect()
        };
        if updates.is_empty() {
            return Ok(BulkOutcome::default());
        }
        let outcome = BulkOutcome::from_items(self.apply_statuses(updates).await);
        info!(
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "Bulk shortlist finished"
        );
        Ok(outcome)
    }

    // ── export ───────────────────────────────────────────────────────────────

    /// Returns `(file name, csv body)` for the visible rows in `scope`.
    pub fn export_csv(&self, scope: ExportScope) -> Result<(String, String), AppError> {
        let job_id = self.require_focal()?;
        let state = self.state.lock();
        let rows = rows_for_scope(&state.ranked.rows, &state.selection, scope);
        let body = render_csv(&rows)?;
        Ok((export_filename(&job_id), body))
    }

    // ── notifications ────────────────────────────────────────────────────────

    pub async fn mark_notifications_read(&self, ids: Option<Vec<i64>>) -> Result<(), AppError> {
        self.notifications.mark_read(ids).await?;
        self.bump();
        Ok(())
    }

    pub fn notifications(&self) -> crate::notifications::NotificationSummary {
        self.notifications.summary(Utc::now())
    }

    // ── view ─────────────────────────────────────────────────────────────────

    pub fn view(&self) -> DashboardView {
        let job = self.tracker.snapshot();
        let history = self.history.snapshot();
        let state = self.state.lock();
        let report_title = state
            .focal_job_id
            .as_deref()
            .and_then(|id| history.find_by_job_id(id))
            .map(|e| e.display_title().to_string());
        let hidden_selected = state
            .selection
            .filenames()
            .iter()
            .filter(|f| !state.ranked.contains_filename(f))
            .count();

        DashboardView {
            revision: *self.revision.borrow(),
            job,
            report_title,
            history: history.newest_first(),
            history_version: history.version(),
            history_error: self.history.last_error(),
            filters: state.filters.clone(),
            filters_active: state.filters.is_active(),
            total_candidates: state.ranked.total_candidates,
            relevant_matches: state.ranked.visible_count(),
            candidates: state.ranked.rows.clone(),
            top_skills: state.ranked.top_skills.clone(),
            selection: state.selection.clone(),
            hidden_selected,
            notifications: self.notifications.summary(Utc::now()),
        }
    }
}

/// True when the tracked job or its results differ between two snapshots.
fn results_changed(before: &TrackerSnapshot, after: &TrackerSnapshot) -> bool {
    if before.job_id != after.job_id {
        return true;
    }
    match (&before.results, &after.results) {
        (None, None) => false,
        (Some(a), Some(b)) => !Arc::ptr_eq(a, b),
        _ => true,
    }
}

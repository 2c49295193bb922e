//! Job status tracker: follows one analysis job from pending to a terminal state.
//!
//! State machine:
//!   pending → processing → completed | failed
//!   pending → completed | failed (fast jobs skip processing)
//!
//! Entering `completed` issues exactly one results fetch and stops polling.
//! Entering `failed` stops polling. Switching the tracked job resets everything.
//! Every response is applied only if it still belongs to the tracked job id.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::models::candidate::Candidate;
use crate::models::job::{JobStatus, JobStatusReport};
use crate::service_client::AnalysisService;
use crate::tracking::polling::PollingClock;

/// Observable state of the tracked job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackerSnapshot {
    pub job_id: Option<String>,
    pub status: JobStatus,
    pub progress: u8,
    /// Backend message attached to a failed job.
    pub failure_message: Option<String>,
    /// Last transient status poll failure, cleared by the next successful poll.
    pub poll_error: Option<String>,
    pub results_loading: bool,
    pub results_error: Option<String>,
    #[serde(skip)]
    pub results: Option<Arc<Vec<Candidate>>>,
}

/// Outcome of applying one status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Response for a job that is no longer tracked.
    Stale,
    /// Response arrived after a terminal state was reached.
    Ignored,
    Unchanged,
    Updated,
    /// Entered `completed`; the caller must issue the single results fetch.
    Completed,
    Failed,
}

/// Pure state machine; the async driver lives in `JobStatusTracker`.
#[derive(Debug, Default)]
pub struct TrackerState {
    snapshot: TrackerSnapshot,
}

impl TrackerState {
    pub fn snapshot(&self) -> TrackerSnapshot {
        self.snapshot.clone()
    }

    pub fn job_id(&self) -> Option<&str> {
        self.snapshot.job_id.as_deref()
    }

    fn is_tracking(&self, job_id: &str) -> bool {
        self.job_id() == Some(job_id)
    }

    /// Drops everything known about the previous job and starts over in `pending`.
    pub fn reset(&mut self, job_id: Option<String>) {
        self.snapshot = TrackerSnapshot {
            job_id,
            ..TrackerSnapshot::default()
        };
    }

    pub fn apply_status(&mut self, job_id: &str, report: &JobStatusReport) -> Transition {
        if !self.is_tracking(job_id) {
            return Transition::Stale;
        }
        let snap = &mut self.snapshot;
        if snap.status.is_terminal() {
            return Transition::Ignored;
        }
        let had_error = snap.poll_error.take().is_some();
        let progress = report.progress.clamp(0, 100) as u8;

        match (snap.status, report.status) {
            (_, JobStatus::Completed) => {
                snap.status = JobStatus::Completed;
                snap.progress = 100;
                snap.results_loading = true;
                Transition::Completed
            }
            (_, JobStatus::Failed) => {
                snap.status = JobStatus::Failed;
                snap.failure_message = report.message.clone();
                Transition::Failed
            }
            (JobStatus::Pending, JobStatus::Processing) => {
                snap.status = JobStatus::Processing;
                snap.progress = snap.progress.max(progress);
                Transition::Updated
            }
            (JobStatus::Processing, JobStatus::Processing) if progress > snap.progress => {
                snap.progress = progress;
                Transition::Updated
            }
            // Same status, stale lower progress, or an out-of-order `pending` after `processing`.
            _ if had_error => Transition::Updated,
            _ => Transition::Unchanged,
        }
    }

    pub fn apply_poll_error(&mut self, job_id: &str, error: String) -> Transition {
        if !self.is_tracking(job_id) {
            return Transition::Stale;
        }
        if self.snapshot.status.is_terminal() {
            return Transition::Ignored;
        }
        self.snapshot.poll_error = Some(error);
        Transition::Updated
    }

    /// Returns the job id to fetch if a manual results retry is allowed.
    pub fn begin_results_retry(&mut self) -> Option<String> {
        let snap = &mut self.snapshot;
        if snap.status != JobStatus::Completed || snap.results.is_some() || snap.results_loading {
            return None;
        }
        snap.results_loading = true;
        snap.results_error = None;
        snap.job_id.clone()
    }

    /// Returns false when the results belong to a job that is no longer tracked.
    pub fn apply_results(&mut self, job_id: &str, outcome: Result<Vec<Candidate>, String>) -> bool {
        if !self.is_tracking(job_id) || self.snapshot.status != JobStatus::Completed {
            return false;
        }
        let snap = &mut self.snapshot;
        snap.results_loading = false;
        match outcome {
            Ok(candidates) => {
                snap.results = Some(Arc::new(candidates));
                snap.results_error = None;
            }
            Err(e) => snap.results_error = Some(e),
        }
        true
    }
}

struct Shared {
    service: Arc<dyn AnalysisService>,
    state: Mutex<TrackerState>,
    clock: PollingClock,
    changes: watch::Sender<TrackerSnapshot>,
}

impl Shared {
    fn publish(&self) {
        let snapshot = self.state.lock().snapshot();
        self.changes.send_replace(snapshot);
    }

    async fn poll_once(&self, job_id: &str) {
        let outcome = self.service.job_status(job_id).await;
        let transition = {
            let mut state = self.state.lock();
            let transition = match outcome {
                Ok(report) => state.apply_status(job_id, &report),
                Err(e) => {
                    warn!(job_id, "Status poll failed: {e}");
                    state.apply_poll_error(job_id, e.to_string())
                }
            };
            if matches!(transition, Transition::Completed | Transition::Failed) {
                self.clock.stop();
            }
            transition
        };

        match transition {
            Transition::Stale | Transition::Ignored | Transition::Unchanged => {}
            Transition::Updated => self.publish(),
            Transition::Failed => {
                info!(job_id, "Job failed, polling stopped");
                self.publish();
            }
            Transition::Completed => {
                info!(job_id, "Job completed, fetching results");
                self.publish();
                self.fetch_results(job_id).await;
            }
        }
    }

    async fn fetch_results(&self, job_id: &str) {
        let outcome = match self.service.results(job_id).await {
            Ok(payload) => Ok(payload.candidates),
            Err(e) => {
                warn!(job_id, "Results fetch failed: {e}");
                Err(e.to_string())
            }
        };
        let applied = self.state.lock().apply_results(job_id, outcome);
        if applied {
            self.publish();
        }
    }
}

/// Async driver around `TrackerState`: owns the status poller and the results fetch.
pub struct JobStatusTracker {
    shared: Arc<Shared>,
    every: Duration,
}

impl JobStatusTracker {
    pub fn new(service: Arc<dyn AnalysisService>, every: Duration) -> Self {
        let (changes, _) = watch::channel(TrackerSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                service,
                state: Mutex::new(TrackerState::default()),
                clock: PollingClock::new("job-status"),
                changes,
            }),
            every,
        }
    }

    /// Starts tracking `job_id`, abandoning whatever was tracked before.
    pub fn track(&self, job_id: &str) {
        {
            let mut state = self.shared.state.lock();
            self.shared.clock.stop();
            state.reset(Some(job_id.to_string()));

            let shared = Arc::clone(&self.shared);
            let job_id = job_id.to_string();
            self.shared.clock.start(self.every, move || {
                let shared = Arc::clone(&shared);
                let job_id = job_id.clone();
                async move { shared.poll_once(&job_id).await }
            });
        }
        info!(job_id, "Tracking job");
        self.shared.publish();
    }

    /// Stops polling but keeps the current state visible.
    pub fn stop(&self) {
        self.shared.clock.stop();
    }

    /// Issues one status poll outside the schedule. Returns false (and issues
    /// nothing) when no job is tracked or the job is already terminal.
    pub async fn poll_now(&self) -> bool {
        let job_id = {
            let state = self.shared.state.lock();
            match state.job_id() {
                Some(id) if !state.snapshot.status.is_terminal() => id.to_string(),
                _ => return false,
            }
        };
        self.shared.poll_once(&job_id).await;
        true
    }

    /// Re-fetches results after a failed fetch. Returns false if there is nothing to retry.
    pub async fn retry_results(&self) -> bool {
        let Some(job_id) = self.shared.state.lock().begin_results_retry() else {
            return false;
        };
        self.shared.publish();
        self.shared.fetch_results(&job_id).await;
        true
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.shared.state.lock().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackerSnapshot> {
        self.shared.changes.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.shared.clock.is_running()
    }
}

impl Drop for JobStatusTracker {
    fn drop(&mut self) {
        self.shared.clock.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service_client::fake::{candidate, report, FakeAnalysisService};

    fn tracking(job_id: &str) -> TrackerState {
        let mut state = TrackerState::default();
        state.reset(Some(job_id.to_string()));
        state
    }

    #[test]
    fn test_pending_to_processing_updates_progress() {
        let mut state = tracking("a");
        assert_eq!(
            state.apply_status("a", &report(JobStatus::Pending, 0)),
            Transition::Unchanged
        );
        assert_eq!(
            state.apply_status("a", &report(JobStatus::Processing, 40)),
            Transition::Updated
        );
        let snap = state.snapshot();
        assert_eq!(snap.status, JobStatus::Processing);
        assert_eq!(snap.progress, 40);
    }

    #[test]
    fn test_stale_lower_progress_is_clamped() {
        let mut state = tracking("a");
        state.apply_status("a", &report(JobStatus::Processing, 60));
        assert_eq!(
            state.apply_status("a", &report(JobStatus::Processing, 30)),
            Transition::Unchanged
        );
        assert_eq!(state.snapshot().progress, 60);
        state.apply_status("a", &report(JobStatus::Processing, 250));
        assert_eq!(state.snapshot().progress, 100);
    }

    #[test]
    fn test_out_of_order_pending_does_not_regress() {
        let mut state = tracking("a");
        state.apply_status("a", &report(JobStatus::Processing, 30));
        state.apply_status("a", &report(JobStatus::Pending, 0));
        assert_eq!(state.snapshot().status, JobStatus::Processing);
    }

    #[test]
    fn test_response_for_other_job_is_stale() {
        let mut state = tracking("b");
        assert_eq!(
            state.apply_status("a", &report(JobStatus::Processing, 90)),
            Transition::Stale
        );
        assert_eq!(state.snapshot().progress, 0);
    }

    #[test]
    fn test_terminal_state_ignores_later_responses() {
        let mut state = tracking("a");
        assert_eq!(
            state.apply_status("a", &report(JobStatus::Completed, 100)),
            Transition::Completed
        );
        assert_eq!(
            state.apply_status("a", &report(JobStatus::Completed, 100)),
            Transition::Ignored
        );
        assert_eq!(
            state.apply_poll_error("a", "timeout".to_string()),
            Transition::Ignored
        );
    }

    #[test]
    fn test_failed_records_message() {
        let mut state = tracking("a");
        let mut failed = report(JobStatus::Failed, 0);
        failed.message = Some("No resumes found".to_string());
        assert_eq!(state.apply_status("a", &failed), Transition::Failed);
        assert_eq!(
            state.snapshot().failure_message.as_deref(),
            Some("No resumes found")
        );
    }

    #[test]
    fn test_poll_error_cleared_by_next_success() {
        let mut state = tracking("a");
        state.apply_poll_error("a", "503".to_string());
        assert!(state.snapshot().poll_error.is_some());
        assert_eq!(
            state.apply_status("a", &report(JobStatus::Pending, 0)),
            Transition::Updated
        );
        assert!(state.snapshot().poll_error.is_none());
    }

    #[test]
    fn test_retry_only_after_failed_fetch() {
        let mut state = tracking("a");
        assert!(state.begin_results_retry().is_none());
        state.apply_status("a", &report(JobStatus::Completed, 100));
        // Initial fetch still in flight.
        assert!(state.begin_results_retry().is_none());
        assert!(state.apply_results("a", Err("boom".to_string())));
        assert_eq!(state.begin_results_retry().as_deref(), Some("a"));
        assert!(state.snapshot().results_error.is_none());
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_transition_fetches_results_once_and_stops() {
        let fake = Arc::new(FakeAnalysisService::new());
        fake.script_status(
            "j1",
            vec![
                report(JobStatus::Pending, 0),
                report(JobStatus::Processing, 40),
                report(JobStatus::Completed, 100),
            ],
        );
        fake.set_results("j1", vec![candidate("r.pdf", 88.0, &["Rust"])]);

        let tracker = JobStatusTracker::new(fake.clone(), Duration::from_secs(2));
        tracker.track("j1");
        settle().await;
        assert_eq!(tracker.snapshot().status, JobStatus::Pending);

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        settle().await;
        let snap = tracker.snapshot();
        assert_eq!(snap.status, JobStatus::Processing);
        assert_eq!(snap.progress, 40);

        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        let snap = tracker.snapshot();
        assert_eq!(snap.status, JobStatus::Completed);
        assert_eq!(snap.results.as_ref().map(|r| r.len()), Some(1));
        assert!(!tracker.is_polling());
        assert_eq!(fake.results_calls("j1"), 1);

        let polls = fake.status_calls("j1");
        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert!(!tracker.poll_now().await);
        assert_eq!(fake.status_calls("j1"), polls);
        assert_eq!(fake.results_calls("j1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_never_fetches_results() {
        let fake = Arc::new(FakeAnalysisService::new());
        fake.script_status("j1", vec![report(JobStatus::Failed, 0)]);
        let tracker = JobStatusTracker::new(fake.clone(), Duration::from_secs(2));
        tracker.track("j1");
        settle().await;
        assert_eq!(tracker.snapshot().status, JobStatus::Failed);
        assert!(!tracker.is_polling());
        tokio::time::sleep(Duration::from_secs(6)).await;
        settle().await;
        assert_eq!(fake.results_calls("j1"), 0);
        assert_eq!(fake.status_calls("j1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_for_previous_job_is_discarded() {
        let fake = Arc::new(FakeAnalysisService::new());
        fake.script_status("a", vec![report(JobStatus::Processing, 90)]);
        fake.delay_status("a", Duration::from_secs(5));
        fake.script_status("b", vec![report(JobStatus::Processing, 10)]);

        let tracker = JobStatusTracker::new(fake.clone(), Duration::from_secs(2));
        tracker.track("a");
        settle().await;
        tracker.track("b");
        settle().await;
        assert_eq!(tracker.snapshot().progress, 10);

        // The first poll for "a" resolves now.
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        settle().await;
        let snap = tracker.snapshot();
        assert_eq!(snap.job_id.as_deref(), Some("b"));
        assert_eq!(snap.progress, 10);
        tracker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_failure_keeps_completed_and_retry_recovers() {
        let fake = Arc::new(FakeAnalysisService::new());
        fake.script_status("j1", vec![report(JobStatus::Completed, 100)]);
        fake.fail_results("j1");
        let tracker = JobStatusTracker::new(fake.clone(), Duration::from_secs(2));
        tracker.track("j1");
        settle().await;

        let snap = tracker.snapshot();
        assert_eq!(snap.status, JobStatus::Completed);
        assert!(snap.results_error.is_some());
        assert!(snap.results.is_none());

        // No automatic retry.
        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(fake.results_calls("j1"), 1);

        fake.set_results("j1", vec![candidate("r.pdf", 75.0, &[])]);
        assert!(tracker.retry_results().await);
        let snap = tracker.snapshot();
        assert!(snap.results_error.is_none());
        assert_eq!(snap.results.as_ref().map(|r| r.len()), Some(1));
        assert!(!tracker.retry_results().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_job_clears_previous_results() {
        let fake = Arc::new(FakeAnalysisService::new());
        fake.script_status("a", vec![report(JobStatus::Completed, 100)]);
        fake.set_results("a", vec![candidate("r.pdf", 75.0, &[])]);
        fake.script_status("b", vec![report(JobStatus::Processing, 5)]);
        let tracker = JobStatusTracker::new(fake.clone(), Duration::from_secs(2));
        tracker.track("a");
        settle().await;
        assert!(tracker.snapshot().results.is_some());

        tracker.track("b");
        let snap = tracker.snapshot();
        assert_eq!(snap.job_id.as_deref(), Some("b"));
        assert_eq!(snap.status, JobStatus::Pending);
        assert!(snap.results.is_none());
        assert!(tracker.is_polling());
        tracker.stop();
    }
}

//! In-memory `AnalysisService` used by engine tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{AnalysisService, ServiceError};
use crate::models::candidate::{Candidate, CandidateStatus, ResultsPayload};
use crate::models::job::{HistoryEntry, JobStatus, JobStatusReport};
use crate::models::notification::Notification;

#[derive(Default)]
struct Inner {
    /// Scripted status responses per job; the last one repeats once the queue drains.
    statuses: HashMap<String, VecDeque<JobStatusReport>>,
    status_delays: HashMap<String, Duration>,
    results: HashMap<String, Vec<Candidate>>,
    results_delays: HashMap<String, Duration>,
    failing_results: HashSet<String>,
    history: Option<Vec<HistoryEntry>>,
    failing_mutations: HashSet<(String, String)>,
    mutation_delay: Option<Duration>,
    notifications: Option<Vec<Notification>>,
    status_calls: HashMap<String, usize>,
    results_calls: HashMap<String, usize>,
    history_calls: usize,
    mutations: Vec<(String, String, CandidateStatus)>,
    marked_read: Vec<Option<Vec<i64>>>,
}

#[derive(Default)]
pub struct FakeAnalysisService {
    inner: Mutex<Inner>,
}

pub fn report(status: JobStatus, progress: i64) -> JobStatusReport {
    JobStatusReport {
        status,
        progress,
        message: None,
    }
}

pub fn candidate(filename: &str, score: f64, skills: &[&str]) -> Candidate {
    Candidate {
        filename: filename.to_string(),
        final_score: score,
        matched_skills: skills.iter().map(|s| s.to_string()).collect(),
        missing_skills: vec![],
        experience_years: None,
        status: CandidateStatus::New,
        extra: Default::default(),
    }
}

pub fn history_entry(job_id: &str, jd: &str) -> HistoryEntry {
    HistoryEntry {
        job_id: job_id.to_string(),
        jd_filename: Some(jd.to_string()),
        filename: None,
        timestamp: None,
        status: Some("completed".to_string()),
    }
}

impl FakeAnalysisService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_status(&self, job_id: &str, reports: Vec<JobStatusReport>) {
        self.inner
            .lock()
            .statuses
            .insert(job_id.to_string(), reports.into());
    }

    pub fn delay_status(&self, job_id: &str, delay: Duration) {
        self.inner
            .lock()
            .status_delays
            .insert(job_id.to_string(), delay);
    }

    pub fn set_results(&self, job_id: &str, candidates: Vec<Candidate>) {
        let mut inner = self.inner.lock();
        inner.failing_results.remove(job_id);
        inner.results.insert(job_id.to_string(), candidates);
    }

    pub fn delay_results(&self, job_id: &str, delay: Duration) {
        self.inner
            .lock()
            .results_delays
            .insert(job_id.to_string(), delay);
    }

    pub fn fail_results(&self, job_id: &str) {
        self.inner.lock().failing_results.insert(job_id.to_string());
    }

    /// `None` makes the history endpoint fail.
    pub fn set_history(&self, history: Option<Vec<HistoryEntry>>) {
        self.inner.lock().history = history;
    }

    pub fn fail_mutation(&self, job_id: &str, filename: &str) {
        self.inner
            .lock()
            .failing_mutations
            .insert((job_id.to_string(), filename.to_string()));
    }

    pub fn delay_mutations(&self, delay: Duration) {
        self.inner.lock().mutation_delay = Some(delay);
    }

    /// `None` makes the notifications endpoint fail.
    pub fn set_notifications(&self, notifications: Option<Vec<Notification>>) {
        self.inner.lock().notifications = notifications;
    }

    pub fn status_calls(&self, job_id: &str) -> usize {
        self.inner
            .lock()
            .status_calls
            .get(job_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn results_calls(&self, job_id: &str) -> usize {
        self.inner
            .lock()
            .results_calls
            .get(job_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn history_calls(&self) -> usize {
        self.inner.lock().history_calls
    }

    pub fn mutations(&self) -> Vec<(String, String, CandidateStatus)> {
        self.inner.lock().mutations.clone()
    }

    pub fn marked_read(&self) -> Vec<Option<Vec<i64>>> {
        self.inner.lock().marked_read.clone()
    }
}

fn unavailable() -> ServiceError {
    ServiceError::Api {
        status: 503,
        message: "unavailable".to_string(),
    }
}

#[async_trait]
impl AnalysisService for FakeAnalysisService {
    async fn job_status(&self, job_id: &str) -> Result<JobStatusReport, ServiceError> {
        let (delay, next) = {
            let mut inner = self.inner.lock();
            *inner.status_calls.entry(job_id.to_string()).or_default() += 1;
            let delay = inner.status_delays.get(job_id).copied();
            let next = inner.statuses.get_mut(job_id).and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            });
            (delay, next)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        next.ok_or_else(|| ServiceError::Api {
            status: 404,
            message: "Job not found".to_string(),
        })
    }

    async fn results(&self, job_id: &str) -> Result<ResultsPayload, ServiceError> {
        let (delay, outcome) = {
            let mut inner = self.inner.lock();
            *inner.results_calls.entry(job_id.to_string()).or_default() += 1;
            let delay = inner.results_delays.get(job_id).copied();
            let outcome = if inner.failing_results.contains(job_id) {
                None
            } else {
                inner.results.get(job_id).cloned()
            };
            (delay, outcome)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
            .map(|candidates| ResultsPayload { candidates })
            .ok_or_else(unavailable)
    }

    async fn history(&self) -> Result<Vec<HistoryEntry>, ServiceError> {
        let mut inner = self.inner.lock();
        inner.history_calls += 1;
        inner.history.clone().ok_or_else(unavailable)
    }

    async fn update_candidate_status(
        &self,
        job_id: &str,
        filename: &str,
        status: &CandidateStatus,
    ) -> Result<(), ServiceError> {
        let delay = self.inner.lock().mutation_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.inner.lock();
        if inner
            .failing_mutations
            .contains(&(job_id.to_string(), filename.to_string()))
        {
            return Err(unavailable());
        }
        inner
            .mutations
            .push((job_id.to_string(), filename.to_string(), status.clone()));
        if let Some(c) = inner
            .results
            .get_mut(job_id)
            .and_then(|cs| cs.iter_mut().find(|c| c.filename == filename))
        {
            c.status = status.clone();
        }
        Ok(())
    }

    async fn notifications(&self, limit: usize) -> Result<Vec<Notification>, ServiceError> {
        let inner = self.inner.lock();
        inner
            .notifications
            .clone()
            .map(|mut n| {
                n.truncate(limit);
                n
            })
            .ok_or_else(unavailable)
    }

    async fn mark_notifications_read(&self, ids: Option<Vec<i64>>) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock();
        if inner.notifications.is_none() {
            return Err(unavailable());
        }
        inner.marked_read.push(ids);
        Ok(())
    }
}

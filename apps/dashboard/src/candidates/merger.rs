//! Candidate merger: combines the focal job's results with every sibling job
//! that ran against the same job description.
//!
//! Algorithm:
//! 1. Resolve the focal job's jd identity from the history snapshot.
//!    Unknown job or blank identity ⇒ no siblings.
//! 2. Siblings = history entries with the same identity, minus the focal job.
//! 3. Fetch sibling results concurrently; a failed sibling contributes nothing.
//! 4. Tag every candidate with the job it came from.
//! 5. Concatenate focal then siblings (history order). Same filename in two
//!    jobs stays two entries; re-running an analysis never hides an old run.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::candidates::history::HistorySnapshot;
use crate::models::candidate::{Candidate, TaggedCandidate};
use crate::service_client::AnalysisService;

/// Fetched results of one sibling job; `None` when the fetch failed.
#[derive(Debug, Clone)]
pub struct SiblingResults {
    pub job_id: String,
    pub candidates: Option<Vec<Candidate>>,
}

/// Tags `candidates` with `job_id`, keeping only the first record per filename.
pub fn tag_candidates(job_id: &str, candidates: &[Candidate]) -> Vec<TaggedCandidate> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .filter(|c| {
            let fresh = seen.insert(c.filename.as_str());
            if !fresh {
                warn!(job_id, filename = %c.filename, "Duplicate filename in job results, keeping first");
            }
            fresh
        })
        .map(|c| TaggedCandidate {
            job_id: job_id.to_string(),
            candidate: c.clone(),
        })
        .collect()
}

/// Union of the focal candidates and the sibling results, in the order given.
pub fn union(
    focal_job_id: &str,
    focal: &[Candidate],
    siblings: &[SiblingResults],
) -> Vec<TaggedCandidate> {
    let mut merged = tag_candidates(focal_job_id, focal);
    for sibling in siblings {
        if sibling.job_id == focal_job_id {
            continue;
        }
        if let Some(candidates) = &sibling.candidates {
            merged.extend(tag_candidates(&sibling.job_id, candidates));
        }
    }
    merged
}

/// Sibling job ids of `focal_job_id` in history order.
pub fn sibling_job_ids(history: &HistorySnapshot, focal_job_id: &str) -> Vec<String> {
    history
        .find_by_job_id(focal_job_id)
        .and_then(|entry| entry.jd_identity())
        .map(|jd| {
            history
                .find_siblings(jd, focal_job_id)
                .into_iter()
                .map(|e| e.job_id.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// Fetches results for `job_ids` concurrently. Output follows the input order,
/// not completion order.
pub async fn fetch_siblings(
    service: &Arc<dyn AnalysisService>,
    job_ids: &[String],
) -> Vec<SiblingResults> {
    let mut set = JoinSet::new();
    for (idx, job_id) in job_ids.iter().enumerate() {
        let service = Arc::clone(service);
        let job_id = job_id.clone();
        set.spawn(async move {
            let outcome = service.results(&job_id).await;
            (idx, job_id, outcome)
        });
    }

    let mut slots: Vec<Option<SiblingResults>> = vec![None; job_ids.len()];
    while let Some(joined) = set.join_next().await {
        let Ok((idx, job_id, outcome)) = joined else {
            warn!("Sibling results task aborted");
            continue;
        };
        let candidates = match outcome {
            Ok(payload) => Some(payload.candidates),
            Err(e) => {
                warn!(job_id, "Sibling results fetch failed, excluding from merge: {e}");
                None
            }
        };
        slots[idx] = Some(SiblingResults { job_id, candidates });
    }

    slots
        .into_iter()
        .zip(job_ids)
        .map(|(slot, job_id)| {
            slot.unwrap_or_else(|| SiblingResults {
                job_id: job_id.clone(),
                candidates: None,
            })
        })
        .collect()
}

/// Full merge for one focal job.
pub async fn merge_candidates(
    service: &Arc<dyn AnalysisService>,
    focal_job_id: &str,
    focal: &[Candidate],
    history: &HistorySnapshot,
) -> Vec<TaggedCandidate> {
    let siblings = sibling_job_ids(history, focal_job_id);
    let fetched = fetch_siblings(service, &siblings).await;
    let merged = union(focal_job_id, focal, &fetched);
    debug!(
        focal_job_id,
        siblings = siblings.len(),
        candidates = merged.len(),
        "Merged candidate set"
    );
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::Duration;

    use crate::models::candidate::CandidateKey;
    use crate::service_client::fake::{candidate, history_entry, FakeAnalysisService};

    fn keys(merged: &[TaggedCandidate]) -> BTreeSet<CandidateKey> {
        merged.iter().map(TaggedCandidate::key).collect()
    }

    #[test]
    fn test_same_filename_in_two_jobs_is_kept_twice() {
        let focal = vec![candidate("r.pdf", 80.0, &[])];
        let siblings = vec![SiblingResults {
            job_id: "j2".to_string(),
            candidates: Some(vec![candidate("r.pdf", 70.0, &[])]),
        }];
        let merged = union("j1", &focal, &siblings);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].job_id, "j1");
        assert_eq!(merged[1].job_id, "j2");
        assert!(merged.iter().all(|c| c.candidate.filename == "r.pdf"));
    }

    #[test]
    fn test_union_is_order_independent_as_a_set() {
        let focal = vec![candidate("f.pdf", 80.0, &[])];
        let a = SiblingResults {
            job_id: "a".to_string(),
            candidates: Some(vec![candidate("x.pdf", 60.0, &[]), candidate("y.pdf", 50.0, &[])]),
        };
        let b = SiblingResults {
            job_id: "b".to_string(),
            candidates: Some(vec![candidate("x.pdf", 65.0, &[])]),
        };
        let ab = union("j1", &focal, &[a.clone(), b.clone()]);
        let ba = union("j1", &focal, &[b, a]);
        assert_eq!(keys(&ab), keys(&ba));
        assert_eq!(ab.len(), 4);
    }

    #[test]
    fn test_failed_sibling_contributes_nothing() {
        let focal = vec![candidate("f.pdf", 80.0, &[])];
        let siblings = vec![SiblingResults {
            job_id: "j2".to_string(),
            candidates: None,
        }];
        let merged = union("j1", &focal, &siblings);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_duplicate_filename_within_job_keeps_first() {
        let tagged = tag_candidates(
            "j1",
            &[candidate("r.pdf", 90.0, &[]), candidate("r.pdf", 10.0, &[])],
        );
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].candidate.final_score, 90.0);
    }

    #[test]
    fn test_unknown_focal_job_has_no_siblings() {
        let history = HistorySnapshot::new(vec![history_entry("j2", "backend.pdf")]);
        assert!(sibling_job_ids(&history, "j1").is_empty());
    }

    #[test]
    fn test_blank_jd_has_no_siblings() {
        let mut focal = history_entry("j1", "");
        focal.jd_filename = None;
        let mut other = history_entry("j2", "");
        other.jd_filename = None;
        let history = HistorySnapshot::new(vec![focal, other]);
        assert!(sibling_job_ids(&history, "j1").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_fetches_siblings_and_tolerates_failure() {
        let fake = Arc::new(FakeAnalysisService::new());
        fake.set_results("j2", vec![candidate("r.pdf", 70.0, &[])]);
        fake.fail_results("j3");
        fake.set_results("j4", vec![candidate("other.pdf", 40.0, &[])]);
        let history = HistorySnapshot::new(vec![
            history_entry("j1", "backend.pdf"),
            history_entry("j2", "backend.pdf"),
            history_entry("j3", "backend.pdf"),
            history_entry("j4", "frontend.pdf"),
        ]);
        let service: Arc<dyn AnalysisService> = fake.clone();
        let merged =
            merge_candidates(&service, "j1", &[candidate("r.pdf", 80.0, &[])], &history).await;

        let tags: Vec<(&str, &str)> = merged
            .iter()
            .map(|c| (c.job_id.as_str(), c.candidate.filename.as_str()))
            .collect();
        assert_eq!(tags, vec![("j1", "r.pdf"), ("j2", "r.pdf")]);
        assert_eq!(fake.results_calls("j3"), 1);
        assert_eq!(fake.results_calls("j4"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_output_ignores_completion_order() {
        let history = HistorySnapshot::new(vec![
            history_entry("j1", "backend.pdf"),
            history_entry("a", "backend.pdf"),
            history_entry("b", "backend.pdf"),
        ]);
        let focal = vec![candidate("f.pdf", 80.0, &[])];

        let mut runs = Vec::new();
        for (slow, fast) in [("a", "b"), ("b", "a")] {
            let fake = Arc::new(FakeAnalysisService::new());
            fake.set_results("a", vec![candidate("a.pdf", 60.0, &[])]);
            fake.set_results("b", vec![candidate("b.pdf", 60.0, &[])]);
            fake.delay_results(slow, Duration::from_secs(3));
            fake.delay_results(fast, Duration::from_millis(10));
            let service: Arc<dyn AnalysisService> = fake;
            runs.push(merge_candidates(&service, "j1", &focal, &history).await);
        }
        assert_eq!(runs[0], runs[1]);
    }
}

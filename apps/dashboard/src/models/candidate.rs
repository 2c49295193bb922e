use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Recruiting workflow state of a candidate. Unknown values from the backend
/// are carried through verbatim instead of failing the whole results payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CandidateStatus {
    #[default]
    New,
    Shortlisted,
    Rejected,
    InterviewScheduled,
    Other(String),
}

impl CandidateStatus {
    pub fn as_str(&self) -> &str {
        match self {
            CandidateStatus::New => "new",
            CandidateStatus::Shortlisted => "shortlisted",
            CandidateStatus::Rejected => "rejected",
            CandidateStatus::InterviewScheduled => "interview_scheduled",
            CandidateStatus::Other(s) => s,
        }
    }
}

impl From<String> for CandidateStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "new" => CandidateStatus::New,
            "shortlisted" => CandidateStatus::Shortlisted,
            "rejected" => CandidateStatus::Rejected,
            "interview_scheduled" => CandidateStatus::InterviewScheduled,
            _ => CandidateStatus::Other(value),
        }
    }
}

impl From<CandidateStatus> for String {
    fn from(value: CandidateStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scored candidate as returned by the results service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub filename: String,
    #[serde(default)]
    pub final_score: f64,
    #[serde(default)]
    pub matched_skills: Vec<String>,
    #[serde(default)]
    pub missing_skills: Vec<String>,
    #[serde(default)]
    pub experience_years: Option<f64>,
    #[serde(default)]
    pub status: CandidateStatus,
    /// Remaining scoring detail (semantic score, email, summary, ...) passed through to the UI.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response body of `GET /results/{job_id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultsPayload {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// Identity of a candidate across the merged set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateKey {
    pub job_id: String,
    pub filename: String,
}

/// A candidate tagged with the job that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedCandidate {
    pub job_id: String,
    #[serde(flatten)]
    pub candidate: Candidate,
}

impl TaggedCandidate {
    pub fn key(&self) -> CandidateKey {
        CandidateKey {
            job_id: self.job_id.clone(),
            filename: self.candidate.filename.clone(),
        }
    }

    pub fn matches(&self, key: &CandidateKey) -> bool {
        self.job_id == key.job_id && self.candidate.filename == key.filename
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_minimal_payload() {
        let json = r#"{"filename": "ada.pdf", "final_score": 91.5, "matched_skills": ["Rust"]}"#;
        let c: Candidate = serde_json::from_str(json).unwrap();
        assert_eq!(c.filename, "ada.pdf");
        assert_eq!(c.status, CandidateStatus::New);
        assert!(c.missing_skills.is_empty());
        assert!(c.experience_years.is_none());
    }

    #[test]
    fn test_candidate_keeps_extra_fields() {
        let json = r#"{"filename": "ada.pdf", "final_score": 80, "email": "ada@example.com", "status": "shortlisted"}"#;
        let c: Candidate = serde_json::from_str(json).unwrap();
        assert_eq!(c.status, CandidateStatus::Shortlisted);
        assert_eq!(c.extra.get("email").and_then(Value::as_str), Some("ada@example.com"));
    }

    #[test]
    fn test_unknown_status_round_trips() {
        let status: CandidateStatus = serde_json::from_str(r#""on_hold""#).unwrap();
        assert_eq!(status, CandidateStatus::Other("on_hold".to_string()));
        assert_eq!(serde_json::to_string(&status).unwrap(), r#""on_hold""#);
    }

    #[test]
    fn test_tagged_candidate_serializes_flat() {
        let tagged = TaggedCandidate {
            job_id: "j1".to_string(),
            candidate: serde_json::from_str(r#"{"filename": "r.pdf", "final_score": 70}"#).unwrap(),
        };
        let value = serde_json::to_value(&tagged).unwrap();
        assert_eq!(value["job_id"], "j1");
        assert_eq!(value["filename"], "r.pdf");
    }
}

//! Ranked view: pure derivation of the display list from the merged set.
//!
//! Pipeline, always in this order:
//! 1. Stable sort by `final_score` descending (ties keep merge order)
//! 2. Filter: search text AND score toggle AND experience toggle
//! 3. Top skills over the sorted, unfiltered set
//!
//! Ranks are assigned after filtering.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::candidate::TaggedCandidate;

pub const SCORE_CUTOFF: f64 = 85.0;
pub const EXPERIENCE_CUTOFF_YEARS: f64 = 5.0;
pub const TOP_SKILLS_LIMIT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKey {
    Score,
    Experience,
}

impl std::str::FromStr for FilterKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "score" => Ok(FilterKey::Score),
            "experience" => Ok(FilterKey::Experience),
            other => Err(format!("unknown filter '{other}'")),
        }
    }
}

/// Search text and filter toggles currently applied to the view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    pub search: String,
    pub score: bool,
    pub experience: bool,
}

impl FilterState {
    pub fn toggle(&mut self, key: FilterKey) {
        match key {
            FilterKey::Score => self.score = !self.score,
            FilterKey::Experience => self.experience = !self.experience,
        }
    }

    /// Turns off every toggle. Search text is left alone.
    pub fn clear_toggles(&mut self) {
        self.score = false;
        self.experience = false;
    }

    pub fn is_active(&self) -> bool {
        self.score || self.experience || !self.search.trim().is_empty()
    }

    /// True iff `candidate` passes every active predicate.
    pub fn accepts(&self, candidate: &TaggedCandidate) -> bool {
        let c = &candidate.candidate;
        let needle = self.search.trim().to_lowercase();
        let search_ok = needle.is_empty()
            || c.filename.to_lowercase().contains(&needle)
            || c
                .matched_skills
                .iter()
                .any(|s| s.to_lowercase().contains(&needle));
        let score_ok = !self.score || c.final_score >= SCORE_CUTOFF;
        let experience_ok = !self.experience
            || c
                .experience_years
                .is_some_and(|years| years >= EXPERIENCE_CUTOFF_YEARS);
        search_ok && score_ok && experience_ok
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRow {
    /// 1-based position within the filtered list.
    pub rank: usize,
    #[serde(flatten)]
    pub candidate: TaggedCandidate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillCount {
    pub skill: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankedView {
    pub rows: Vec<RankedRow>,
    /// Size of the merged set before filtering.
    pub total_candidates: usize,
    pub top_skills: Vec<SkillCount>,
}

impl RankedView {
    pub fn visible_count(&self) -> usize {
        self.rows.len()
    }

    pub fn contains_filename(&self, filename: &str) -> bool {
        self.rows.iter().any(|r| r.candidate.candidate.filename == filename)
    }
}

/// Stable sort by score, highest first. Input is left untouched.
pub fn sort_by_score(merged: &[TaggedCandidate]) -> Vec<TaggedCandidate> {
    let mut sorted = merged.to_vec();
    sorted.sort_by(|a, b| b.candidate.final_score.total_cmp(&a.candidate.final_score));
    sorted
}

/// Upper-cases the first letter of every space-separated word, keeping the rest.
pub fn title_case(skill: &str) -> String {
    skill
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Most frequent matched skills, bucketed case-insensitively.
/// Ties keep first-seen order; the display form comes from the first spelling seen.
pub fn top_skills(sorted: &[TaggedCandidate], limit: usize) -> Vec<SkillCount> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<(String, usize)> = Vec::new();

    for skill in sorted.iter().flat_map(|c| c.candidate.matched_skills.iter()) {
        let trimmed = skill.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        match index.get(&key) {
            Some(&i) => buckets[i].1 += 1,
            None => {
                index.insert(key, buckets.len());
                buckets.push((trimmed.to_string(), 1));
            }
        }
    }

    buckets.sort_by(|a, b| b.1.cmp(&a.1));
    buckets
        .into_iter()
        .take(limit)
        .map(|(skill, count)| SkillCount {
            skill: title_case(&skill),
            count,
        })
        .collect()
}

/// Runs the full sort → filter → aggregate pipeline.
pub fn derive_view(merged: &[TaggedCandidate], filters: &FilterState, skills_limit: usize) -> RankedView {
    let sorted = sort_by_score(merged);
    let top_skills = top_skills(&sorted, skills_limit);
    let total_candidates = sorted.len();
    let rows = sorted
        .into_iter()
        .filter(|c| filters.accepts(c))
        .enumerate()
        .map(|(i, candidate)| RankedRow {
            rank: i + 1,
            candidate,
        })
        .collect();

    RankedView {
        rows,
        total_candidates,
        top_skills,
    }
}

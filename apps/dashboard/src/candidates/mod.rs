// Candidate aggregation: history lookup, cross-job merge, ranking, selection, export.

pub mod export;
pub mod history;
pub mod merger;
pub mod ranking;
pub mod selection;

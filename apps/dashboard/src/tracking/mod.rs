// Job tracking: the polling timer and the per-job status state machine.

pub mod polling;
pub mod tracker;

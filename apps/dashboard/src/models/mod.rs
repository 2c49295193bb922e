pub mod candidate;
pub mod job;
pub mod notification;
pub mod timestamp;

//! Sequential job queue.

pub mod controller;
pub mod job;

pub use controller::{QueueAggregate, QueueController, QueueEvent, QueueHandle, QueueSummary};
pub use job::{Job, JobOutcome, JobReport, JobState};

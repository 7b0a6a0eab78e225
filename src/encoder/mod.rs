//! Encoder process supervision and progress estimation.

pub mod estimator;
pub mod ffmpeg;
pub mod progress;
pub mod reader;
pub mod runner;

pub use estimator::{Estimate, EstimateMode, ProgressEstimator};
pub use ffmpeg::{FfmpegInvocation, Invocation, InvocationBuilder};
pub use progress::{CycleAssembler, ProgressSample};
pub use reader::{SignalEvent, SignalReader};
pub use runner::{JobRunner, RunnerSettings, RunnerUpdate};

//! Conversion job definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// One source file queued for conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: String,

    /// Path to the source file.
    pub source_path: PathBuf,

    /// Path the converted file is written to.
    pub output_path: PathBuf,

    /// Expected total audio bitrate of the output in bits per second.
    pub target_bitrate_bits: u64,

    /// Source duration in seconds, if the pre-probe succeeded.
    pub duration_secs: Option<f64>,

    /// Number of audio streams in the source.
    pub audio_stream_count: usize,

    /// Current state of the job.
    pub state: JobState,

    /// Timestamp when the job was enqueued.
    pub created_at: DateTime<Utc>,

    /// Timestamp when the encoder was started.
    pub started_at: Option<DateTime<Utc>>,

    /// Timestamp when the job reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a pending job writing `<output_dir>/<source file name>`.
    pub fn new(source_path: PathBuf, output_dir: &Path) -> Self {
        let output_path = match source_path.file_name() {
            Some(name) => output_dir.join(name),
            None => output_dir.to_path_buf(),
        };

        Self {
            id: Uuid::new_v4().to_string(),
            source_path,
            output_path,
            target_bitrate_bits: 0,
            duration_secs: None,
            audio_stream_count: 0,
            state: JobState::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Known source duration.
    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(Duration::from_secs_f64)
    }

    /// Marks the job as running.
    pub fn start(&mut self) {
        self.state = JobState::Running;
        self.started_at = Some(Utc::now());
    }

    /// Moves the job into the terminal state matching `outcome`.
    pub fn finish(&mut self, outcome: JobOutcome) {
        self.state = outcome.into();
        self.finished_at = Some(Utc::now());
    }

    /// Returns true once the job reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self.state, JobState::Pending | JobState::Running)
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting in the queue.
    Pending,
    /// Encoder process is running.
    Running,
    /// Encoder exited successfully.
    Succeeded,
    /// Encoder could not be started or exited with an error.
    Failed,
    /// Terminated on request.
    Cancelled,
    /// Not encoded because the source has no audio.
    Skipped,
}

/// Terminal result of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded,
    Failed,
    Cancelled,
    Skipped,
}

impl From<JobOutcome> for JobState {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Succeeded => Self::Succeeded,
            JobOutcome::Failed => Self::Failed,
            JobOutcome::Cancelled => Self::Cancelled,
            JobOutcome::Skipped => Self::Skipped,
        }
    }
}

impl std::fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// What is retained about a job once it has finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    /// Identifier of the job.
    pub job_id: String,

    /// Source file.
    pub source: PathBuf,

    /// Output file (may be partial for failed or cancelled jobs).
    pub output: PathBuf,

    /// Terminal outcome.
    pub outcome: JobOutcome,

    /// Human-readable reason for anything other than success.
    pub message: Option<String>,

    /// Last diagnostic lines written by the encoder.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostic_tail: Vec<String>,

    /// Last fraction reported for the job.
    pub final_fraction: Option<f64>,

    /// Wall clock spent on the job in seconds.
    pub elapsed_secs: f64,

    /// Post-conversion audio stream summary lines.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_streams: Vec<String>,
}

impl JobReport {
    /// Creates a report with no diagnostics or stream details.
    pub fn new(job: &Job, outcome: JobOutcome) -> Self {
        Self {
            job_id: job.id.clone(),
            source: job.source_path.clone(),
            output: job.output_path.clone(),
            outcome,
            message: None,
            diagnostic_tail: Vec::new(),
            final_fraction: None,
            elapsed_secs: 0.0,
            output_streams: Vec::new(),
        }
    }

    /// Attaches a reason message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_uses_source_file_name() {
        let job = Job::new(PathBuf::from("/library/show/ep01.mkv"), Path::new("/tmp/out"));
        assert_eq!(job.output_path, PathBuf::from("/tmp/out/ep01.mkv"));
        assert_eq!(job.state, JobState::Pending);
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Job::new(PathBuf::from("a.mkv"), Path::new("out"));
        let b = Job::new(PathBuf::from("a.mkv"), Path::new("out"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_lifecycle_timestamps() {
        let mut job = Job::new(PathBuf::from("a.flac"), Path::new("out"));
        job.start();
        assert_eq!(job.state, JobState::Running);
        assert!(job.started_at.is_some());

        job.finish(JobOutcome::Cancelled);
        assert_eq!(job.state, JobState::Cancelled);
        assert!(job.finished_at.is_some());
        assert!(job.is_terminal());
    }

    #[test]
    fn test_duration_ignores_invalid_values() {
        let mut job = Job::new(PathBuf::from("a.flac"), Path::new("out"));
        assert_eq!(job.duration(), None);

        job.duration_secs = Some(0.0);
        assert_eq!(job.duration(), None);

        job.duration_secs = Some(f64::NAN);
        assert_eq!(job.duration(), None);

        job.duration_secs = Some(90.5);
        assert_eq!(job.duration(), Some(Duration::from_secs_f64(90.5)));
    }

    #[test]
    fn test_report_serializes_outcome_in_snake_case() {
        let job = Job::new(PathBuf::from("a.flac"), Path::new("out"));
        let report = JobReport::new(&job, JobOutcome::Skipped).with_message("no audio streams");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["message"], "no audio streams");
        assert!(json.get("diagnostic_tail").is_none());
    }
}

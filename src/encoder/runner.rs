//! Supervision of a single encoder process.

use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use super::estimator::{Estimate, ProgressEstimator};
use super::ffmpeg::Invocation;
use super::reader::{SignalEvent, SignalReader};
use crate::config::model::ProgressConfig;
use crate::error::EncoderError;
use crate::queue::job::{Job, JobOutcome, JobReport};

/// Upper bound on reading leftover output after the encoder exited.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Timing and retention settings for the runner.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Interval between output size polls.
    pub size_poll_interval: Duration,
    /// Time a terminated encoder gets before it is killed.
    pub cancel_grace: Duration,
    /// Number of diagnostic lines kept for failure reports.
    pub log_tail_lines: usize,
}

impl From<&ProgressConfig> for RunnerSettings {
    fn from(config: &ProgressConfig) -> Self {
        Self {
            // A zero interval would make the poll timer panic.
            size_poll_interval: config.size_poll_interval().max(Duration::from_millis(1)),
            cancel_grace: config.cancel_grace(),
            log_tail_lines: config.log_tail_lines,
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::from(&ProgressConfig::default())
    }
}

/// Per-file update emitted while a job runs.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerUpdate {
    /// New estimate after a progress cycle or size poll.
    Progress(Estimate),
    /// One diagnostic line from the encoder.
    Log(String),
}

/// Bounded buffer of the most recent diagnostic lines.
#[derive(Debug)]
struct DiagnosticTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DiagnosticTail {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn into_vec(self) -> Vec<String> {
        self.lines.into()
    }
}

/// Runs one encoder invocation at a time and reports its progress.
#[derive(Debug, Clone, Default)]
pub struct JobRunner {
    settings: RunnerSettings,
}

impl JobRunner {
    /// Creates a runner with the given settings.
    pub fn new(settings: RunnerSettings) -> Self {
        Self { settings }
    }

    /// Runs `invocation` for `job` until it exits or `cancelled` resolves.
    ///
    /// Every failure is folded into the returned report. After a non-zero
    /// exit no further progress updates are emitted; after a zero exit the
    /// last update is always a fraction of exactly 1.0.
    pub async fn run<C, F>(
        &self,
        job: &Job,
        invocation: &Invocation,
        cancelled: C,
        mut on_update: F,
    ) -> JobReport
    where
        C: Future<Output = ()>,
        F: FnMut(RunnerUpdate),
    {
        let started = Instant::now();

        let mut child = match self.spawn(job, invocation).await {
            Ok(child) => child,
            Err(e) => {
                debug!(job_id = %job.id, source = ?job.source_path, error = %e, "Encoder could not be started");
                let mut report = JobReport::new(job, JobOutcome::Failed).with_message(e.to_string());
                report.elapsed_secs = started.elapsed().as_secs_f64();
                return report;
            }
        };

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            (stdout, _) => {
                let stream = if stdout.is_none() { "progress" } else { "diagnostic" };
                let e = EncoderError::StreamUnavailable { stream };
                if let Err(kill_err) = child.kill().await {
                    debug!(error = %kill_err, "Failed to kill encoder without streams");
                }
                let mut report = JobReport::new(job, JobOutcome::Failed).with_message(e.to_string());
                report.elapsed_secs = started.elapsed().as_secs_f64();
                return report;
            }
        };

        let mut reader = SignalReader::spawn(stdout, stderr);
        let mut estimator = ProgressEstimator::new(job.duration(), job.target_bitrate_bits);
        let mut tail = DiagnosticTail::new(self.settings.log_tail_lines);

        let mut poll = tokio::time::interval(self.settings.size_poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::pin!(cancelled);
        let mut streams_open = true;

        let exit = loop {
            tokio::select! {
                event = reader.next(), if streams_open => match event {
                    Some(SignalEvent::Sample(sample)) => {
                        let estimate = estimator.observe_sample(&sample);
                        trace!(job_id = %job.id, mode = %estimate.mode, fraction = ?estimate.fraction, "Progress cycle");
                        on_update(RunnerUpdate::Progress(estimate));
                    }
                    Some(SignalEvent::Diagnostic(line)) => {
                        debug!(job_id = %job.id, line = %line, "Encoder output");
                        tail.push(line.clone());
                        on_update(RunnerUpdate::Log(line));
                    }
                    None => streams_open = false,
                },
                _ = poll.tick() => {
                    let bytes = output_size(&job.output_path).await;
                    on_update(RunnerUpdate::Progress(estimator.observe_size(bytes)));
                }
                status = child.wait() => break status.map_err(EncoderError::Wait),
                _ = &mut cancelled => {
                    info!(job_id = %job.id, source = ?job.source_path, "Cancelling encoder");
                    if let Err(e) = self.terminate(&mut child).await {
                        warn!(job_id = %job.id, error = %e, "Encoder did not shut down cleanly");
                    }
                    reader.abort();

                    let mut report = JobReport::new(job, JobOutcome::Cancelled)
                        .with_message("cancelled on request");
                    report.diagnostic_tail = tail.into_vec();
                    report.final_fraction = job.duration().map(|_| estimator.last_fraction());
                    report.elapsed_secs = started.elapsed().as_secs_f64();
                    return report;
                }
            }
        };

        // Pick up diagnostics the encoder wrote just before exiting.
        if streams_open {
            let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
                while let Some(event) = reader.next().await {
                    match event {
                        SignalEvent::Diagnostic(line) => {
                            debug!(job_id = %job.id, line = %line, "Encoder output");
                            tail.push(line.clone());
                            on_update(RunnerUpdate::Log(line));
                        }
                        SignalEvent::Sample(_) => trace!(job_id = %job.id, "Discarding progress cycle after exit"),
                    }
                }
            })
            .await;
            if drained.is_err() {
                debug!(job_id = %job.id, "Encoder streams still open after exit");
                reader.abort();
            }
        }

        let elapsed_secs = started.elapsed().as_secs_f64();
        match exit {
            Ok(status) if status.success() => {
                on_update(RunnerUpdate::Progress(estimator.complete()));
                info!(job_id = %job.id, output = ?job.output_path, elapsed_secs, "Encoder finished");

                let mut report = JobReport::new(job, JobOutcome::Succeeded);
                report.final_fraction = Some(1.0);
                report.elapsed_secs = elapsed_secs;
                report
            }
            Ok(status) => {
                let message = describe_exit(status);
                let tail = tail.into_vec();
                debug!(job_id = %job.id, source = ?job.source_path, %message, tail_lines = tail.len(), "Encoder failed");

                let mut report = JobReport::new(job, JobOutcome::Failed).with_message(message);
                report.diagnostic_tail = tail;
                report.final_fraction = job.duration().map(|_| estimator.last_fraction());
                report.elapsed_secs = elapsed_secs;
                report
            }
            Err(e) => {
                debug!(job_id = %job.id, error = %e, "Lost track of encoder process");
                let mut report = JobReport::new(job, JobOutcome::Failed).with_message(e.to_string());
                report.diagnostic_tail = tail.into_vec();
                report.final_fraction = job.duration().map(|_| estimator.last_fraction());
                report.elapsed_secs = elapsed_secs;
                report
            }
        }
    }

    /// Prepares the output location and starts the encoder.
    async fn spawn(&self, job: &Job, invocation: &Invocation) -> Result<Child, EncoderError> {
        if same_file(&job.source_path, &job.output_path).await {
            return Err(EncoderError::OutputIsSource {
                path: job.output_path.clone(),
            });
        }

        if let Some(parent) = job.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| EncoderError::OutputUnwritable {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        info!(
            job_id = %job.id,
            source = ?job.source_path,
            output = ?job.output_path,
            program = ?invocation.program,
            "Starting encoder"
        );
        debug!(args = ?invocation.args, "Encoder arguments");

        Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EncoderError::SpawnFailed {
                program: invocation.program.clone(),
                source,
            })
    }

    /// Asks the encoder to exit, killing it after the grace period.
    async fn terminate(&self, child: &mut Child) -> Result<ExitStatus, EncoderError> {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => match tokio::time::timeout(self.settings.cancel_grace, child.wait()).await {
                    Ok(status) => return status.map_err(EncoderError::Wait),
                    Err(_) => warn!(
                        grace_ms = self.settings.cancel_grace.as_millis() as u64,
                        "Encoder ignored termination request, killing"
                    ),
                },
                Err(e) => debug!(error = %e, "Failed to send SIGTERM, killing"),
            }
        }

        child.kill().await.map_err(|e| EncoderError::ControlFailed {
            action: "kill",
            message: e.to_string(),
        })?;
        child.wait().await.map_err(EncoderError::Wait)
    }
}

/// Current size of the output file; a missing file counts as empty.
async fn output_size(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

async fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("encoder exited with status {}", code),
        None => "encoder was terminated by a signal".to_string(),
    }
}

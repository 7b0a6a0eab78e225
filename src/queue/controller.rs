//! Sequential conversion queue.
//!
//! Jobs run one at a time in submission order. Progress and outcomes are
//! published as [`QueueEvent`]s; stop and cancel requests arrive through a
//! cloneable [`QueueHandle`].

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::job::{Job, JobOutcome, JobReport};
use crate::config::model::AppConfig;
use crate::encoder::estimator::Estimate;
use crate::encoder::ffmpeg::{target_bitrate_bits, FfmpegInvocation, InvocationBuilder};
use crate::encoder::runner::{JobRunner, RunnerSettings, RunnerUpdate};
use crate::media::probe::MediaProber;

/// Stop and cancel requests shared between the controller and its handles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ControlState {
    stop_requested: bool,
    cancel_epoch: u64,
}

/// Requests stop or cancellation of a running queue.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    control: Arc<watch::Sender<ControlState>>,
}

impl QueueHandle {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(ControlState::default());
        Self {
            control: Arc::new(tx),
        }
    }

    fn subscribe(&self) -> watch::Receiver<ControlState> {
        self.control.subscribe()
    }

    /// Lets the active job finish, then starts no further jobs.
    pub fn stop(&self) {
        self.control.send_modify(|s| s.stop_requested = true);
    }

    /// Cancels the active job; the queue continues with the next one.
    pub fn cancel_current(&self) {
        self.control.send_modify(|s| s.cancel_epoch += 1);
    }

    /// Cancels the active job and starts no further jobs.
    pub fn cancel(&self) {
        self.control.send_modify(|s| {
            s.stop_requested = true;
            s.cancel_epoch += 1;
        });
    }

    fn cancel_epoch(&self) -> u64 {
        self.control.borrow().cancel_epoch
    }

    /// Returns true once a stop has been requested.
    pub fn is_stopping(&self) -> bool {
        self.control.borrow().stop_requested
    }
}

/// Queue-wide completion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueueAggregate {
    /// Jobs that reached any terminal state.
    pub completed_count: usize,
    /// Jobs in the queue when it started.
    pub total_count: usize,
    /// Last known fraction of the active job.
    pub current_job_fraction: f64,
}

impl QueueAggregate {
    fn new(total_count: usize) -> Self {
        Self {
            completed_count: 0,
            total_count,
            current_job_fraction: 0.0,
        }
    }

    /// Overall fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total_count == 0 {
            return 1.0;
        }
        let done = self.completed_count as f64 + self.current_job_fraction;
        (done / self.total_count as f64).clamp(0.0, 1.0)
    }

    fn job_finished(&mut self) {
        self.completed_count += 1;
        self.current_job_fraction = 0.0;
    }
}

/// Everything the queue reports to its observers.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// A job left the pending list.
    JobStarted {
        job_id: String,
        source: PathBuf,
        position: usize,
        total: usize,
    },
    /// New estimate for the active job.
    FileProgress { job_id: String, estimate: Estimate },
    /// New queue-wide completion.
    QueueProgress(QueueAggregate),
    /// Diagnostic line from the active encoder.
    Log { job_id: String, line: String },
    /// A job reached its terminal state.
    JobFinished(JobReport),
    /// No further jobs will run.
    QueueFinished(QueueSummary),
}

/// Result of a whole queue run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub skipped: usize,
    /// Jobs left pending because the queue was stopped.
    pub not_started: usize,
    pub elapsed_secs: f64,
    pub jobs: Vec<JobReport>,
}

impl QueueSummary {
    /// Returns true if any job failed.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    fn record(&mut self, report: JobReport) {
        match report.outcome {
            JobOutcome::Succeeded => self.succeeded += 1,
            JobOutcome::Failed => self.failed += 1,
            JobOutcome::Cancelled => self.cancelled += 1,
            JobOutcome::Skipped => self.skipped += 1,
        }
        self.jobs.push(report);
    }
}

/// Runs queued jobs one after another.
pub struct QueueController {
    config: AppConfig,
    prober: Arc<dyn MediaProber>,
    invocation: Arc<dyn InvocationBuilder>,
    runner: JobRunner,
    pending: VecDeque<Job>,
    handle: QueueHandle,
    events: mpsc::UnboundedSender<QueueEvent>,
}

impl QueueController {
    /// Creates a controller that encodes with ffmpeg as configured.
    pub fn new(
        config: AppConfig,
        prober: Arc<dyn MediaProber>,
        events: mpsc::UnboundedSender<QueueEvent>,
    ) -> Self {
        let invocation = Arc::new(FfmpegInvocation::new(&config));
        let runner = JobRunner::new(RunnerSettings::from(&config.progress));

        Self {
            config,
            prober,
            invocation,
            runner,
            pending: VecDeque::new(),
            handle: QueueHandle::new(),
            events,
        }
    }

    /// Replaces the encoder command line builder.
    pub fn with_invocation_builder(mut self, builder: Arc<dyn InvocationBuilder>) -> Self {
        self.invocation = builder;
        self
    }

    /// Returns a handle for stop and cancel requests.
    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    /// Appends a source file and returns the new job's id.
    pub fn enqueue(&mut self, source: PathBuf) -> String {
        let job = Job::new(source, &self.config.output.directory);
        debug!(job_id = %job.id, source = ?job.source_path, output = ?job.output_path, "Job queued");
        let id = job.id.clone();
        self.pending.push_back(job);
        id
    }

    /// Runs every pending job until the list is empty or a stop is requested.
    pub async fn run(mut self) -> QueueSummary {
        let started = Instant::now();
        let total = self.pending.len();
        let mut aggregate = QueueAggregate::new(total);
        let mut summary = QueueSummary {
            total,
            ..QueueSummary::default()
        };

        info!(total, "Starting queue");
        self.emit(QueueEvent::QueueProgress(aggregate));

        let mut position = 0;
        while let Some(mut job) = self.pending.pop_front() {
            if self.handle.is_stopping() {
                info!(remaining = self.pending.len() + 1, "Queue stopped, not starting further jobs");
                self.pending.push_front(job);
                break;
            }

            position += 1;
            let cancel_epoch = self.handle.cancel_epoch();
            self.emit(QueueEvent::JobStarted {
                job_id: job.id.clone(),
                source: job.source_path.clone(),
                position,
                total,
            });

            let report = self.process(&mut job, cancel_epoch, &mut aggregate).await;
            job.finish(report.outcome);
            aggregate.job_finished();

            match report.outcome {
                JobOutcome::Succeeded => info!(job_id = %job.id, source = ?job.source_path, "Converted"),
                JobOutcome::Skipped => info!(job_id = %job.id, source = ?job.source_path, "Skipped"),
                JobOutcome::Cancelled => info!(job_id = %job.id, source = ?job.source_path, "Cancelled"),
                JobOutcome::Failed => warn!(job_id = %job.id, source = ?job.source_path, "Conversion failed"),
            }

            self.emit(QueueEvent::JobFinished(report.clone()));
            self.emit(QueueEvent::QueueProgress(aggregate));
            summary.record(report);
        }

        summary.not_started = self.pending.len();
        summary.elapsed_secs = started.elapsed().as_secs_f64();

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            skipped = summary.skipped,
            not_started = summary.not_started,
            "Queue finished"
        );
        self.emit(QueueEvent::QueueFinished(summary.clone()));
        summary
    }

    /// Probes, encodes and reports one job.
    ///
    /// `cancel_epoch` is the epoch observed when the job became active; any
    /// later cancel request applies to this job, even one made while probing.
    async fn process(&self, job: &mut Job, cancel_epoch: u64, aggregate: &mut QueueAggregate) -> JobReport {
        let probed = self.prober.probe(&job.source_path);
        if self.handle.cancel_epoch() > cancel_epoch {
            debug!(job_id = %job.id, "Cancelled before the encoder started");
            return JobReport::new(job, JobOutcome::Cancelled).with_message("cancelled before encoding started");
        }

        let media = match probed {
            Ok(media) => media,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Could not probe source");
                return JobReport::new(job, JobOutcome::Failed).with_message(e.to_string());
            }
        };

        job.duration_secs = media.duration_secs;
        job.audio_stream_count = media.audio_stream_count();

        if job.audio_stream_count == 0 {
            return JobReport::new(job, JobOutcome::Skipped).with_message("no audio streams found");
        }
        if job.duration().is_none() {
            warn!(job_id = %job.id, source = ?job.source_path, "Duration unknown, progress will be indeterminate");
        }

        job.target_bitrate_bits = target_bitrate_bits(&self.config.audio.bitrate, job.audio_stream_count);
        job.start();

        let invocation = self.invocation.build(job);
        let cancelled = cancellation(self.handle.subscribe(), cancel_epoch);

        let events = &self.events;
        let job_id = job.id.clone();
        let mut report = self
            .runner
            .run(job, &invocation, cancelled, |update| match update {
                RunnerUpdate::Progress(estimate) => {
                    if let Some(fraction) = estimate.fraction {
                        aggregate.current_job_fraction = fraction;
                    }
                    let _ = events.send(QueueEvent::FileProgress {
                        job_id: job_id.clone(),
                        estimate,
                    });
                    let _ = events.send(QueueEvent::QueueProgress(*aggregate));
                }
                RunnerUpdate::Log(line) => {
                    let _ = events.send(QueueEvent::Log {
                        job_id: job_id.clone(),
                        line,
                    });
                }
            })
            .await;

        if report.outcome == JobOutcome::Succeeded {
            match self.prober.output_streams(&job.output_path) {
                Ok(streams) => {
                    report.output_streams = streams.iter().map(|s| s.describe()).collect();
                }
                Err(e) => debug!(job_id = %job.id, error = %e, "Could not read output audio streams"),
            }
        }

        report
    }

    fn emit(&self, event: QueueEvent) {
        let _ = self.events.send(event);
    }
}

/// Resolves once a cancel newer than `epoch` has been requested.
async fn cancellation(mut control: watch::Receiver<ControlState>, epoch: u64) {
    loop {
        if control.borrow_and_update().cancel_epoch > epoch {
            return;
        }
        if control.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

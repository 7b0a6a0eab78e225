//! Console presentation of queue events through `tracing`.

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::encoder::estimator::{Estimate, EstimateMode};
use crate::queue::controller::{QueueEvent, QueueSummary};
use crate::queue::job::{JobOutcome, JobReport};

/// Decides which progress updates are worth an `info` line.
#[derive(Debug, Default)]
struct ProgressThrottle {
    last_percent: Option<u64>,
    last_mode: Option<EstimateMode>,
}

impl ProgressThrottle {
    fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns true when the whole percentage or the mode changed.
    fn is_notable(&mut self, percent: Option<u64>, mode: Option<EstimateMode>) -> bool {
        let notable = percent != self.last_percent || mode != self.last_mode;
        self.last_percent = percent;
        self.last_mode = mode;
        notable
    }
}

/// Logs queue events for a human watching the terminal.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    file: ProgressThrottle,
    queue: ProgressThrottle,
}

impl ConsoleReporter {
    /// Creates a reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs events until the queue's sender is dropped.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<QueueEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(&event);
        }
    }

    /// Logs a single event.
    pub fn handle(&mut self, event: &QueueEvent) {
        match event {
            QueueEvent::JobStarted {
                job_id,
                source,
                position,
                total,
            } => {
                self.file.reset();
                info!(job_id = %job_id, source = ?source, "[{}/{}] Converting", position, total);
            }
            QueueEvent::FileProgress { job_id, estimate } => {
                let percent = estimate.fraction.map(whole_percent);
                if self.file.is_notable(percent, Some(estimate.mode)) {
                    info!(job_id = %job_id, mode = %estimate.mode, "File {}", format_progress(estimate));
                } else {
                    debug!(job_id = %job_id, mode = %estimate.mode, "File {}", format_progress(estimate));
                }
            }
            QueueEvent::QueueProgress(aggregate) => {
                let fraction = aggregate.fraction();
                if self.queue.is_notable(Some(whole_percent(fraction)), None) {
                    info!(
                        completed = aggregate.completed_count,
                        total = aggregate.total_count,
                        "Queue {:.1}%",
                        fraction * 100.0
                    );
                }
            }
            QueueEvent::Log { job_id, line } => {
                debug!(job_id = %job_id, "ffmpeg: {}", line);
            }
            QueueEvent::JobFinished(report) => log_report(report),
            QueueEvent::QueueFinished(summary) => log_summary(summary),
        }
    }
}

fn log_report(report: &JobReport) {
    let name = report
        .source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| report.source.display().to_string());

    match report.outcome {
        JobOutcome::Succeeded => {
            for line in &report.output_streams {
                info!(job_id = %report.job_id, "Output audio stream {}", line);
            }
            info!(
                job_id = %report.job_id,
                output = ?report.output,
                "Successfully converted {} in {}",
                name,
                format_eta(report.elapsed_secs)
            );
        }
        JobOutcome::Failed => {
            error!(
                job_id = %report.job_id,
                "Error processing {}: {}",
                name,
                report.message.as_deref().unwrap_or("unknown error")
            );
            for line in &report.diagnostic_tail {
                error!(job_id = %report.job_id, "  {}", line);
            }
        }
        JobOutcome::Cancelled => {
            info!(job_id = %report.job_id, output = ?report.output, "Cancelled {}, partial output left in place", name);
        }
        JobOutcome::Skipped => {
            info!(
                job_id = %report.job_id,
                "Skipping {}: {}",
                name,
                report.message.as_deref().unwrap_or("nothing to convert")
            );
        }
    }
}

fn log_summary(summary: &QueueSummary) {
    let line = format!(
        "{} succeeded, {} failed, {} cancelled, {} skipped, {} not started in {}",
        summary.succeeded,
        summary.failed,
        summary.cancelled,
        summary.skipped,
        summary.not_started,
        format_eta(summary.elapsed_secs)
    );
    if summary.has_failures() {
        warn!("Queue finished: {}", line);
    } else {
        info!("Queue finished: {}", line);
    }
}

fn whole_percent(fraction: f64) -> u64 {
    (fraction * 100.0).floor().max(0.0) as u64
}

/// Renders an estimate as `45.0% [time] ETA 1m10s` or a busy indicator.
pub fn format_progress(estimate: &Estimate) -> String {
    let elapsed = format_eta(estimate.elapsed.as_secs_f64());
    match estimate.fraction {
        None => format!("calculating… (elapsed {})", elapsed),
        Some(fraction) => {
            let mut text = format!("{:.1}% [{}]", fraction * 100.0, estimate.mode);
            if let Some(eta) = estimate.eta_seconds {
                text.push_str(&format!(" ETA {}", format_eta(eta)));
            }
            text
        }
    }
}

/// Formats seconds as `1h02m03s`, `4m05s` or `12s`.
pub fn format_eta(secs: f64) -> String {
    let total = if secs.is_finite() { secs.max(0.0).round() as u64 } else { 0 };
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{}h{:02}m{:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

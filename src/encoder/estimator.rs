//! Progress estimation from incomplete encoder signals.
//!
//! The encoder's own media clock (`out_time`) is the best signal but is
//! frequently reported as not available, most notably when only audio is
//! re-encoded and the other streams are copied. The estimator falls back to
//! the size of the output written so far, and then to the reported speed,
//! and guarantees that the reported fraction never moves backwards and never
//! reaches 100% before the process has exited successfully.

use std::time::{Duration, Instant};

use serde::Serialize;

use super::progress::ProgressSample;

/// Highest fraction reported while the encoder is still running.
pub const MAX_RUNNING_FRACTION: f64 = 0.999;

/// Which signal the current estimate is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateMode {
    /// Nothing quantitative yet; show a busy indicator.
    Indeterminate,
    /// Media time reported by the encoder.
    TimeBased,
    /// Bytes written divided by the target bitrate.
    SizeBased,
    /// Wall clock multiplied by the reported speed.
    SpeedBased,
}

impl std::fmt::Display for EstimateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Indeterminate => write!(f, "indeterminate"),
            Self::TimeBased => write!(f, "time"),
            Self::SizeBased => write!(f, "size"),
            Self::SpeedBased => write!(f, "speed"),
        }
    }
}

/// One progress estimate for the active job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    /// Signal the estimate is based on.
    pub mode: EstimateMode,
    /// Completed fraction in `[0, 1)` while running, `1.0` after success.
    /// `None` when no fraction can be computed (e.g. unknown duration).
    pub fraction: Option<f64>,
    /// Estimated seconds of wall clock remaining.
    pub eta_seconds: Option<f64>,
    /// Wall clock since the job started.
    pub elapsed: Duration,
}

impl Estimate {
    /// Returns true if the caller should render a busy indicator.
    pub fn is_indeterminate(&self) -> bool {
        self.fraction.is_none()
    }
}

/// The signals of the most recent progress cycle.
///
/// Replaced wholesale on every cycle so a field the encoder stopped
/// reporting is never carried over from an older cycle.
#[derive(Debug, Clone, Copy, Default)]
struct CycleSignals {
    out_time: Option<Duration>,
    speed: Option<f64>,
    total_size: Option<u64>,
}

impl From<&ProgressSample> for CycleSignals {
    fn from(sample: &ProgressSample) -> Self {
        Self {
            out_time: sample.out_time,
            speed: sample.speed.filter(|s| *s > 0.0),
            total_size: sample.total_size,
        }
    }
}

/// Per-job progress state machine.
#[derive(Debug)]
pub struct ProgressEstimator {
    total_duration: Option<Duration>,
    target_bitrate_bits: u64,
    started_at: Instant,
    mode: EstimateMode,
    last_fraction: f64,
    last_output_size: u64,
    signals: CycleSignals,
    completed: bool,
}

impl ProgressEstimator {
    /// Creates an estimator for a job whose clock starts now.
    pub fn new(total_duration: Option<Duration>, target_bitrate_bits: u64) -> Self {
        Self {
            total_duration: total_duration.filter(|d| !d.is_zero()),
            target_bitrate_bits,
            started_at: Instant::now(),
            mode: EstimateMode::Indeterminate,
            last_fraction: 0.0,
            last_output_size: 0,
            signals: CycleSignals::default(),
            completed: false,
        }
    }

    /// Current estimation mode.
    pub fn mode(&self) -> EstimateMode {
        self.mode
    }

    /// Highest fraction reported so far.
    pub fn last_fraction(&self) -> f64 {
        self.last_fraction
    }

    /// Most recent output size observation in bytes.
    pub fn last_output_size(&self) -> u64 {
        self.last_output_size
    }

    /// Applies a new progress cycle.
    pub fn observe_sample(&mut self, sample: &ProgressSample) -> Estimate {
        self.observe_sample_at(sample, self.started_at.elapsed())
    }

    /// Applies a new progress cycle observed `elapsed` after the job started.
    pub fn observe_sample_at(&mut self, sample: &ProgressSample, elapsed: Duration) -> Estimate {
        self.signals = CycleSignals::from(sample);
        self.estimate(elapsed)
    }

    /// Applies a polled output file size.
    pub fn observe_size(&mut self, bytes: u64) -> Estimate {
        self.observe_size_at(bytes, self.started_at.elapsed())
    }

    /// Applies a polled output file size observed `elapsed` after the job started.
    pub fn observe_size_at(&mut self, bytes: u64, elapsed: Duration) -> Estimate {
        self.last_output_size = bytes;
        self.estimate(elapsed)
    }

    /// Marks the encoder as exited successfully. This is the only way to
    /// reach a fraction of 1.0.
    pub fn complete(&mut self) -> Estimate {
        self.completed = true;
        self.last_fraction = 1.0;
        Estimate {
            mode: self.mode,
            fraction: Some(1.0),
            eta_seconds: Some(0.0),
            elapsed: self.started_at.elapsed(),
        }
    }

    fn estimate(&mut self, elapsed: Duration) -> Estimate {
        if self.completed {
            return Estimate {
                mode: self.mode,
                fraction: Some(1.0),
                eta_seconds: Some(0.0),
                elapsed,
            };
        }

        let total_secs = self.total_duration.map(|d| d.as_secs_f64());
        let processed = self.processed_seconds(elapsed, total_secs);

        if let Some((mode, _)) = processed {
            self.mode = mode;
        }

        let fraction = match (processed, total_secs) {
            (Some((_, secs)), Some(total)) => Some(self.clamp(secs.min(total) / total)),
            // No usable signal this round: hold the floor once we have one.
            (None, Some(_)) if self.mode != EstimateMode::Indeterminate => Some(self.last_fraction),
            _ => None,
        };

        let eta_seconds = match (fraction, total_secs) {
            (Some(fraction), Some(total)) => {
                let done = processed
                    .map(|(_, secs)| secs.min(total))
                    .unwrap_or(0.0)
                    .max(fraction * total);
                self.eta_seconds(total - done, fraction, elapsed)
            }
            _ => None,
        };

        Estimate {
            mode: self.mode,
            fraction,
            eta_seconds,
            elapsed,
        }
    }

    /// Picks the best available signal and converts it to processed media seconds.
    ///
    /// Priority: encoder media time, then output size, then speed.
    fn processed_seconds(&self, elapsed: Duration, total_secs: Option<f64>) -> Option<(EstimateMode, f64)> {
        if let Some(out_time) = self.signals.out_time {
            return Some((EstimateMode::TimeBased, out_time.as_secs_f64()));
        }

        let size = self
            .last_output_size
            .max(self.signals.total_size.unwrap_or(0));
        if size > 0 && self.target_bitrate_bits > 0 {
            let secs = (size as f64 * 8.0) / self.target_bitrate_bits as f64;
            return Some((EstimateMode::SizeBased, secs));
        }

        match (self.signals.speed, total_secs) {
            (Some(speed), Some(_)) => Some((EstimateMode::SpeedBased, elapsed.as_secs_f64() * speed)),
            _ => None,
        }
    }

    /// Clamps to the monotonic floor and the running ceiling, then records the result.
    fn clamp(&mut self, raw: f64) -> f64 {
        let raw = if raw.is_finite() { raw.max(0.0) } else { 0.0 };
        let fraction = raw.max(self.last_fraction).min(MAX_RUNNING_FRACTION);
        self.last_fraction = fraction;
        fraction
    }

    fn eta_seconds(&self, remaining_media_secs: f64, fraction: f64, elapsed: Duration) -> Option<f64> {
        let remaining = remaining_media_secs.max(0.0);

        if let Some(speed) = self.signals.speed {
            return Some(remaining / speed);
        }

        let elapsed = elapsed.as_secs_f64();
        if fraction > 0.0 && elapsed > 0.0 {
            Some((elapsed / fraction * (1.0 - fraction)).max(0.0))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const EPSILON: f64 = 1e-9;

    fn sample(out_time_ms: Option<u64>, speed: Option<f64>) -> ProgressSample {
        ProgressSample {
            out_time: out_time_ms.map(Duration::from_millis),
            speed,
            total_size: None,
            status: Default::default(),
            raw_fields: BTreeMap::new(),
        }
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn assert_close(actual: Option<f64>, expected: f64) {
        let actual = actual.expect("expected a fraction");
        assert!((actual - expected).abs() < EPSILON, "{} != {}", actual, expected);
    }

    #[test]
    fn test_starts_indeterminate() {
        let mut estimator = ProgressEstimator::new(Some(secs(100)), 128_000);

        let estimate = estimator.observe_sample_at(&sample(None, None), secs(1));
        assert_eq!(estimate.mode, EstimateMode::Indeterminate);
        assert!(estimate.is_indeterminate());
        assert_eq!(estimate.eta_seconds, None);

        let estimate = estimator.observe_size_at(0, secs(1));
        assert_eq!(estimate.mode, EstimateMode::Indeterminate);
        assert!(estimate.is_indeterminate());
    }

    #[test]
    fn test_size_then_time_then_exit_scenario() {
        let mut estimator = ProgressEstimator::new(Some(secs(100)), 128_000);

        let t0 = estimator.observe_sample_at(&sample(None, None), secs(0));
        assert_eq!(t0.mode, EstimateMode::Indeterminate);
        let t0 = estimator.observe_size_at(0, secs(0));
        assert!(t0.is_indeterminate());

        let t1 = estimator.observe_size_at(640_000, secs(10));
        assert_eq!(t1.mode, EstimateMode::SizeBased);
        assert_close(t1.fraction, 0.40);

        let t2 = estimator.observe_sample_at(&sample(Some(45_000), None), secs(11));
        assert_eq!(t2.mode, EstimateMode::TimeBased);
        assert_close(t2.fraction, 0.45);

        let t3 = estimator.complete();
        assert_eq!(t3.fraction, Some(1.0));
        assert_eq!(t3.eta_seconds, Some(0.0));
    }

    #[test]
    fn test_time_based_does_not_drop_below_size_estimate() {
        let mut estimator = ProgressEstimator::new(Some(secs(100)), 128_000);

        let size = estimator.observe_size_at(800_000, secs(5));
        assert_close(size.fraction, 0.50);

        let time = estimator.observe_sample_at(&sample(Some(30_000), None), secs(6));
        assert_eq!(time.mode, EstimateMode::TimeBased);
        assert_close(time.fraction, 0.50);
    }

    #[test]
    fn test_time_beats_size_in_same_cycle() {
        let mut estimator = ProgressEstimator::new(Some(secs(100)), 128_000);
        estimator.observe_size_at(160_000, secs(1));

        let estimate = estimator.observe_sample_at(&sample(Some(20_000), Some(2.0)), secs(2));
        assert_eq!(estimate.mode, EstimateMode::TimeBased);
        assert_close(estimate.fraction, 0.20);
    }

    #[test]
    fn test_size_beats_speed() {
        let mut estimator = ProgressEstimator::new(Some(secs(100)), 128_000);
        estimator.observe_sample_at(&sample(None, Some(4.0)), secs(5));
        assert_eq!(estimator.mode(), EstimateMode::SpeedBased);

        let estimate = estimator.observe_size_at(320_000, secs(5));
        assert_eq!(estimate.mode, EstimateMode::SizeBased);
        // SpeedBased already reported 20s of 100s; size says 20s as well.
        assert_close(estimate.fraction, 0.20);
    }

    #[test]
    fn test_speed_based_fallback() {
        let mut estimator = ProgressEstimator::new(Some(secs(100)), 0);

        let estimate = estimator.observe_sample_at(&sample(None, Some(2.0)), secs(10));
        assert_eq!(estimate.mode, EstimateMode::SpeedBased);
        assert_close(estimate.fraction, 0.20);
        // 80s of media left at 2x.
        assert_close(estimate.eta_seconds, 40.0);
    }

    #[test]
    fn test_zero_speed_is_not_a_signal() {
        let mut estimator = ProgressEstimator::new(Some(secs(100)), 0);
        let estimate = estimator.observe_sample_at(&sample(None, Some(0.0)), secs(10));
        assert_eq!(estimate.mode, EstimateMode::Indeterminate);
    }

    #[test]
    fn test_speed_requires_known_duration() {
        let mut estimator = ProgressEstimator::new(None, 0);
        let estimate = estimator.observe_sample_at(&sample(None, Some(2.0)), secs(10));
        assert_eq!(estimate.mode, EstimateMode::Indeterminate);
    }

    #[test]
    fn test_time_eta_uses_speed() {
        let mut estimator = ProgressEstimator::new(Some(secs(100)), 128_000);
        let estimate = estimator.observe_sample_at(&sample(Some(40_000), Some(3.0)), secs(13));
        assert_close(estimate.eta_seconds, 20.0);
    }

    #[test]
    fn test_time_eta_falls_back_to_average_rate() {
        let mut estimator = ProgressEstimator::new(Some(secs(100)), 128_000);
        let estimate = estimator.observe_sample_at(&sample(Some(25_000), None), secs(10));
        // 25% took 10s, so 75% takes 30s more.
        assert_close(estimate.eta_seconds, 30.0);
    }

    #[test]
    fn test_never_reaches_one_while_running() {
        let mut estimator = ProgressEstimator::new(Some(secs(100)), 128_000);

        let estimate = estimator.observe_sample_at(&sample(Some(250_000), None), secs(50));
        assert_close(estimate.fraction, MAX_RUNNING_FRACTION);

        let estimate = estimator.observe_size_at(100_000_000, secs(51));
        assert_close(estimate.fraction, MAX_RUNNING_FRACTION);
    }

    #[test]
    fn test_lost_signal_keeps_mode_and_floor() {
        let mut estimator = ProgressEstimator::new(Some(secs(100)), 128_000);
        estimator.observe_sample_at(&sample(Some(30_000), None), secs(3));

        let estimate = estimator.observe_sample_at(&sample(None, None), secs(4));
        assert_eq!(estimate.mode, EstimateMode::TimeBased);
        assert_close(estimate.fraction, 0.30);
    }

    #[test]
    fn test_stale_out_time_is_not_retained() {
        let mut estimator = ProgressEstimator::new(Some(secs(100)), 128_000);
        estimator.observe_sample_at(&sample(Some(10_000), None), secs(1));

        // The next cycle drops out_time; size now drives the estimate.
        estimator.observe_sample_at(&sample(None, None), secs(2));
        let estimate = estimator.observe_size_at(960_000, secs(3));
        assert_eq!(estimate.mode, EstimateMode::SizeBased);
        assert_close(estimate.fraction, 0.60);
    }

    #[test]
    fn test_reported_total_size_counts_as_size_signal() {
        let mut estimator = ProgressEstimator::new(Some(secs(100)), 128_000);
        let mut with_size = sample(None, None);
        with_size.total_size = Some(320_000);

        let estimate = estimator.observe_sample_at(&with_size, secs(2));
        assert_eq!(estimate.mode, EstimateMode::SizeBased);
        assert_close(estimate.fraction, 0.20);
    }

    #[test]
    fn test_unknown_duration_reports_mode_without_fraction() {
        let mut estimator = ProgressEstimator::new(None, 128_000);

        let estimate = estimator.observe_size_at(640_000, secs(4));
        assert_eq!(estimate.mode, EstimateMode::SizeBased);
        assert!(estimate.is_indeterminate());
        assert_eq!(estimate.elapsed, secs(4));

        let estimate = estimator.observe_sample_at(&sample(Some(10_000), Some(1.0)), secs(5));
        assert_eq!(estimate.mode, EstimateMode::TimeBased);
        assert!(estimate.is_indeterminate());
        assert_eq!(estimate.eta_seconds, None);

        assert_eq!(estimator.complete().fraction, Some(1.0));
    }

    #[test]
    fn test_zero_duration_is_unknown() {
        let mut estimator = ProgressEstimator::new(Some(Duration::ZERO), 128_000);
        let estimate = estimator.observe_sample_at(&sample(Some(1_000), None), secs(1));
        assert!(estimate.is_indeterminate());
    }

    #[test]
    fn test_fraction_is_monotonic_over_noisy_signals() {
        let mut estimator = ProgressEstimator::new(Some(secs(600)), 192_000);
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        let mut previous = 0.0;

        for step in 0..2_000u64 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let elapsed = Duration::from_millis(step * 250);

            let estimate = match seed % 4 {
                0 => estimator.observe_size_at(seed % 20_000_000, elapsed),
                1 => estimator.observe_sample_at(&sample(Some(seed % 700_000), None), elapsed),
                2 => estimator.observe_sample_at(&sample(None, Some((seed % 50) as f64 / 10.0)), elapsed),
                _ => estimator.observe_sample_at(&sample(None, None), elapsed),
            };

            if let Some(fraction) = estimate.fraction {
                assert!(fraction >= previous, "fraction moved backwards at step {}", step);
                assert!(fraction < 1.0, "fraction reached 1.0 while running at step {}", step);
                previous = fraction;
            }
            if let Some(eta) = estimate.eta_seconds {
                assert!(eta >= 0.0);
            }
        }

        assert_eq!(estimator.complete().fraction, Some(1.0));
    }
}

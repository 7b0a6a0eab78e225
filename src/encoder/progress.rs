//! Structured progress reports written by the encoder.
//!
//! ffmpeg's `-progress` channel emits one `key=value` pair per line and closes
//! each report with `progress=continue` (or `progress=end` on the last one).
//! Every report repeats the full set of known keys, so a cycle is modeled as
//! a snapshot that replaces the previous one rather than patching it.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::trace;

/// Key whose value terminates a progress cycle.
pub const TERMINATOR_KEY: &str = "progress";

/// Value ffmpeg uses for fields it cannot compute yet.
const NOT_AVAILABLE: &str = "N/A";

/// Whether the encoder intends to send more cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleStatus {
    /// More cycles follow.
    #[default]
    Continue,
    /// This was the final cycle.
    End,
}

/// One complete progress cycle.
///
/// Typed fields are `None` when the key was missing or reported as not
/// available; they are never defaulted to zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSample {
    /// Media time written so far.
    pub out_time: Option<Duration>,
    /// Encoding speed relative to realtime playback.
    pub speed: Option<f64>,
    /// Bytes written to the output so far, as reported by the encoder.
    pub total_size: Option<u64>,
    /// Terminator value of this cycle.
    pub status: CycleStatus,
    /// Every key/value pair of the cycle, including the ones not interpreted here.
    pub raw_fields: BTreeMap<String, String>,
}

impl ProgressSample {
    /// Builds a sample from the raw pairs of one cycle.
    pub fn from_fields(raw_fields: BTreeMap<String, String>, status: CycleStatus) -> Self {
        // out_time_ms carries microseconds as well; ffmpeg never fixed the name.
        let out_time = raw_fields
            .get("out_time_us")
            .and_then(|v| parse_micros(v))
            .or_else(|| raw_fields.get("out_time_ms").and_then(|v| parse_micros(v)))
            .or_else(|| raw_fields.get("out_time").and_then(|v| parse_clock(v)));

        let speed = raw_fields.get("speed").and_then(|v| parse_speed(v));
        let total_size = raw_fields.get("total_size").and_then(|v| parse_size(v));

        Self {
            out_time,
            speed,
            total_size,
            status,
            raw_fields,
        }
    }

    /// Returns true if this was the encoder's final cycle.
    pub fn is_final(&self) -> bool {
        self.status == CycleStatus::End
    }
}

/// Accumulates `key=value` lines until a terminator completes a cycle.
#[derive(Debug, Default)]
pub struct CycleAssembler {
    fields: BTreeMap<String, String>,
}

impl CycleAssembler {
    /// Creates an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line, returning a sample when the line closes a cycle.
    ///
    /// Lines that are not `key=value` pairs are dropped.
    pub fn push_line(&mut self, line: &str) -> Option<ProgressSample> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let Some((key, value)) = line.split_once('=') else {
            trace!(line, "Ignoring malformed progress line");
            return None;
        };

        let key = key.trim();
        let value = value.trim();
        if key.is_empty() {
            trace!(line, "Ignoring progress line without key");
            return None;
        }

        if key == TERMINATOR_KEY {
            let status = match value {
                "end" => CycleStatus::End,
                _ => CycleStatus::Continue,
            };
            let fields = std::mem::take(&mut self.fields);
            return Some(ProgressSample::from_fields(fields, status));
        }

        self.fields.insert(key.to_string(), value.to_string());
        None
    }

    /// Returns true if pairs have been collected since the last terminator.
    pub fn has_partial_cycle(&self) -> bool {
        !self.fields.is_empty()
    }
}

fn is_not_available(value: &str) -> bool {
    value.is_empty() || value.eq_ignore_ascii_case(NOT_AVAILABLE)
}

/// Parses a microsecond count; negative values mean "not started yet".
fn parse_micros(value: &str) -> Option<Duration> {
    if is_not_available(value) {
        return None;
    }
    let micros: i64 = value.parse().ok()?;
    u64::try_from(micros).ok().map(Duration::from_micros)
}

/// Parses `HH:MM:SS.ffffff`.
fn parse_clock(value: &str) -> Option<Duration> {
    if is_not_available(value) || value.starts_with('-') {
        return None;
    }
    let mut parts = value.splitn(3, ':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::from_secs(hours * 3600 + minutes * 60) + Duration::from_secs_f64(seconds))
}

/// Parses `1.25x`.
fn parse_speed(value: &str) -> Option<f64> {
    if is_not_available(value) {
        return None;
    }
    let number = value.trim_end_matches(['x', 'X']).trim();
    let speed: f64 = number.parse().ok()?;
    (speed.is_finite() && speed >= 0.0).then_some(speed)
}

fn parse_size(value: &str) -> Option<u64> {
    if is_not_available(value) {
        return None;
    }
    value.parse().ok()
}

//! FFmpeg invocation for AAC audio normalization.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::model::{AppConfig, AudioSettings, StreamSettings};
use crate::queue::job::Job;

/// Per-stream bitrate assumed when the configured one cannot be parsed.
pub const FALLBACK_STREAM_BITRATE: u64 = 192_000;

/// A fully prepared encoder command line.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments passed to the executable.
    pub args: Vec<OsString>,
}

/// Builds the encoder command line for a job.
///
/// The runner only needs a program that writes `key=value` progress cycles
/// to stdout and diagnostics to stderr; everything codec-specific lives
/// behind this trait.
pub trait InvocationBuilder: Send + Sync {
    /// Returns the command line that converts `job`.
    fn build(&self, job: &Job) -> Invocation;
}

/// Builds ffmpeg command lines from the immutable application config.
#[derive(Debug, Clone)]
pub struct FfmpegInvocation {
    ffmpeg_path: PathBuf,
    audio: AudioSettings,
    streams: StreamSettings,
}

impl FfmpegInvocation {
    /// Creates a builder from the application configuration.
    pub fn new(config: &AppConfig) -> Self {
        Self {
            ffmpeg_path: config.global.ffmpeg_path.clone(),
            audio: config.audio.clone(),
            streams: config.streams.clone(),
        }
    }

    /// Builds the ffmpeg argument list for a job.
    pub fn build_args(&self, job: &Job) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-y",
            "-nostdin",
            "-hide_banner",
            "-progress",
            "pipe:1",
            "-nostats",
            "-loglevel",
            "error",
            "-i",
        ]
        .iter()
        .map(OsString::from)
        .collect();

        args.push(job.source_path.clone().into_os_string());

        for arg in [
            "-map",
            "0",
            "-c:v",
            self.streams.video_codec.as_str(),
            "-c:s",
            self.streams.subtitle_codec.as_str(),
            "-c:t",
            "copy",
            "-c:d",
            "copy",
        ] {
            args.push(arg.into());
        }

        for idx in 0..job.audio_stream_count {
            args.push(format!("-c:a:{}", idx).into());
            args.push("aac".into());
            args.push(format!("-b:a:{}", idx).into());
            args.push(self.audio.bitrate.clone().into());
            args.push(format!("-ac:a:{}", idx).into());
            args.push(self.audio.channels.to_string().into());
            args.push(format!("-ar:a:{}", idx).into());
            args.push(self.audio.sample_rate.to_string().into());
        }

        args.push("-aac_coder".into());
        args.push(self.audio.aac_coder.clone().into());

        if let Some(title) = self.audio.title.as_deref().filter(|t| !t.is_empty()) {
            args.push("-metadata:s:a".into());
            args.push(format!("title={}", title).into());
        }

        args.push(job.output_path.clone().into_os_string());
        args
    }
}

impl InvocationBuilder for FfmpegInvocation {
    fn build(&self, job: &Job) -> Invocation {
        Invocation {
            program: self.ffmpeg_path.clone(),
            args: self.build_args(job),
        }
    }
}

fn bitrate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<value>\d+(?:\.\d+)?)(?P<unit>[km]?)$")
            .expect("BUG: Failed to compile bitrate regex")
    })
}

/// Parses an ffmpeg bitrate ("224k", "1.5m", "128000") into bits per second.
///
/// Returns `None` for anything that is not a positive rate.
pub fn parse_bitrate_to_bps(text: &str) -> Option<u64> {
    let normalized: String = text
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let caps = bitrate_re().captures(&normalized)?;
    let value: f64 = caps["value"].parse().ok()?;
    let multiplier = match &caps["unit"] {
        "k" => 1_000.0,
        "m" => 1_000_000.0,
        _ => 1.0,
    };

    let bps = (value * multiplier).round() as u64;
    (bps > 0).then_some(bps)
}

/// Total audio bitrate the output is expected to carry, in bits per second.
pub fn target_bitrate_bits(bitrate: &str, audio_stream_count: usize) -> u64 {
    let per_stream = parse_bitrate_to_bps(bitrate).unwrap_or(FALLBACK_STREAM_BITRATE);
    per_stream * audio_stream_count.max(1) as u64
}

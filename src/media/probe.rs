//! FFprobe wrapper for media analysis.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProbeError;

/// What the queue needs to know about a source before encoding it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaSummary {
    /// Container duration in seconds, if ffprobe could determine it.
    pub duration_secs: Option<f64>,
    /// Audio streams in the file.
    pub audio_streams: Vec<AudioStreamInfo>,
}

impl MediaSummary {
    /// Number of audio streams in the file.
    pub fn audio_stream_count(&self) -> usize {
        self.audio_streams.len()
    }
}

/// Audio stream information of a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    /// Stream index within the container.
    pub index: usize,
    /// Codec name.
    pub codec: Option<String>,
    /// Number of channels.
    pub channels: Option<u32>,
    /// Sample rate in Hz.
    pub sample_rate: Option<u32>,
}

/// Audio stream information of a converted file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputAudioStream {
    /// Stream index within the container.
    pub index: usize,
    /// Codec name.
    pub codec: Option<String>,
    /// Number of channels.
    pub channels: Option<u32>,
    /// Bitrate in bits per second.
    pub bit_rate: Option<u64>,
}

impl OutputAudioStream {
    /// Renders `index -> codec Nch @ NNNk`.
    pub fn describe(&self) -> String {
        let bitrate = self
            .bit_rate
            .map(|b| format!("{}k", b / 1000))
            .unwrap_or_else(|| "unknown".to_string());
        let channels = self
            .channels
            .map(|c| c.to_string())
            .unwrap_or_else(|| "?".to_string());

        format!(
            "{} -> {} {}ch @ {}",
            self.index,
            self.codec.as_deref().unwrap_or("unknown"),
            channels,
            bitrate
        )
    }
}

/// Source of media metadata for the queue.
#[cfg_attr(test, mockall::automock)]
pub trait MediaProber: Send + Sync {
    /// Reads duration and audio streams of a source file.
    fn probe(&self, path: &Path) -> Result<MediaSummary, ProbeError>;

    /// Reads the audio streams of a converted file.
    fn output_streams(&self, path: &Path) -> Result<Vec<OutputAudioStream>, ProbeError>;
}

/// `MediaProber` backed by the ffprobe executable.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
}

impl FfprobeProber {
    /// Creates a prober that runs `ffprobe_path`.
    pub fn new(ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }

    fn run_json(&self, path: &Path, args: &[&str]) -> Result<serde_json::Value, ProbeError> {
        debug!(file = ?path, ffprobe = ?self.ffprobe_path, "Running ffprobe");

        let output = Command::new(&self.ffprobe_path)
            .args(args)
            .arg(path)
            .output()
            .map_err(|source| ProbeError::SpawnFailed {
                path: path.to_path_buf(),
                source,
            })?;

        if !output.status.success() {
            return Err(ProbeError::Failed {
                path: path.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| ProbeError::ParseFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

impl MediaProber for FfprobeProber {
    fn probe(&self, path: &Path) -> Result<MediaSummary, ProbeError> {
        let json = self.run_json(
            path,
            &[
                "-v", "error",
                "-print_format", "json",
                "-show_entries", "format=duration:stream=index,codec_type,codec_name,channels,sample_rate",
            ],
        )?;
        parse_summary(&json, path)
    }

    fn output_streams(&self, path: &Path) -> Result<Vec<OutputAudioStream>, ProbeError> {
        let json = self.run_json(
            path,
            &[
                "-v", "error",
                "-select_streams", "a",
                "-show_entries", "stream=index,bit_rate,codec_name,channels",
                "-print_format", "json",
            ],
        )?;
        Ok(parse_output_streams(&json))
    }
}

/// Parses the duration and audio streams from ffprobe JSON.
fn parse_summary(json: &serde_json::Value, path: &Path) -> Result<MediaSummary, ProbeError> {
    let streams = json
        .get("streams")
        .and_then(|s| s.as_array())
        .ok_or_else(|| ProbeError::ParseFailed {
            path: path.to_path_buf(),
            message: "missing streams in ffprobe output".to_string(),
        })?;

    let duration_secs = json
        .get("format")
        .and_then(|f| f.get("duration"))
        .and_then(number_or_string::<f64>)
        .filter(|d| d.is_finite() && *d > 0.0);

    let audio_streams = streams
        .iter()
        .filter(|s| s.get("codec_type").and_then(|v| v.as_str()) == Some("audio"))
        .filter_map(|s| {
            Some(AudioStreamInfo {
                index: s.get("index")?.as_u64()? as usize,
                codec: s.get("codec_name").and_then(|v| v.as_str()).map(String::from),
                channels: s.get("channels").and_then(number_or_string::<u32>),
                sample_rate: s.get("sample_rate").and_then(number_or_string::<u32>),
            })
        })
        .collect();

    Ok(MediaSummary {
        duration_secs,
        audio_streams,
    })
}

/// Parses the audio stream list of a converted file.
fn parse_output_streams(json: &serde_json::Value) -> Vec<OutputAudioStream> {
    json.get("streams")
        .and_then(|s| s.as_array())
        .map(|streams| {
            streams
                .iter()
                .filter_map(|s| {
                    Some(OutputAudioStream {
                        index: s.get("index")?.as_u64()? as usize,
                        codec: s.get("codec_name").and_then(|v| v.as_str()).map(String::from),
                        channels: s.get("channels").and_then(number_or_string::<u32>),
                        bit_rate: s.get("bit_rate").and_then(number_or_string::<u64>),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// ffprobe prints most numbers as strings; accept both forms.
fn number_or_string<T: std::str::FromStr>(value: &serde_json::Value) -> Option<T> {
    match value {
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_summary_counts_audio_streams() {
        let json = json!({
            "streams": [
                {"index": 0, "codec_type": "video", "codec_name": "h264"},
                {"index": 1, "codec_type": "audio", "codec_name": "dts", "channels": 6, "sample_rate": "48000"},
                {"index": 2, "codec_type": "audio", "codec_name": "ac3", "channels": 2, "sample_rate": "48000"},
                {"index": 3, "codec_type": "subtitle", "codec_name": "subrip"}
            ],
            "format": {"duration": "5400.125000"}
        });

        let summary = parse_summary(&json, Path::new("film.mkv")).unwrap();
        assert_eq!(summary.duration_secs, Some(5400.125));
        assert_eq!(summary.audio_stream_count(), 2);
        assert_eq!(summary.audio_streams[0].index, 1);
        assert_eq!(summary.audio_streams[0].channels, Some(6));
        assert_eq!(summary.audio_streams[1].sample_rate, Some(48000));
    }

    #[test]
    fn test_missing_duration_is_unknown() {
        let json = json!({
            "streams": [{"index": 0, "codec_type": "audio", "codec_name": "flac"}],
            "format": {"duration": "N/A"}
        });

        let summary = parse_summary(&json, Path::new("a.flac")).unwrap();
        assert_eq!(summary.duration_secs, None);
        assert_eq!(summary.audio_stream_count(), 1);
    }

    #[test]
    fn test_missing_streams_is_parse_error() {
        let err = parse_summary(&json!({"format": {}}), Path::new("x.mkv")).unwrap_err();
        assert!(matches!(err, ProbeError::ParseFailed { .. }));
    }

    #[test]
    fn test_output_stream_description() {
        let json = json!({
            "streams": [
                {"index": 1, "codec_name": "aac", "channels": 2, "bit_rate": "223874"},
                {"index": 2, "codec_name": "aac", "channels": 2}
            ]
        });

        let lines: Vec<String> = parse_output_streams(&json).iter().map(|s| s.describe()).collect();
        assert_eq!(lines, vec!["1 -> aac 2ch @ 223k", "2 -> aac 2ch @ unknown"]);
    }

    #[test]
    fn test_output_streams_tolerate_empty_document() {
        assert!(parse_output_streams(&json!({})).is_empty());
    }

    #[test]
    fn test_missing_ffprobe_is_spawn_error() {
        let prober = FfprobeProber::new("/nonexistent/bin/ffprobe");
        let err = prober.probe(Path::new("film.mkv")).unwrap_err();
        assert!(matches!(err, ProbeError::SpawnFailed { .. }));
    }
}

//! Configuration data structures.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure containing all settings.
///
/// Built once at startup and handed to the queue by value; nothing reads it
/// from ambient state afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Global application settings.
    #[serde(default)]
    pub global: GlobalConfig,

    /// Where converted files are written.
    #[serde(default)]
    pub output: OutputConfig,

    /// AAC encoding parameters applied to every audio stream.
    #[serde(default)]
    pub audio: AudioSettings,

    /// Handling of the non-audio streams.
    #[serde(default)]
    pub streams: StreamSettings,

    /// Progress tracking and process supervision settings.
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Input discovery settings.
    #[serde(default)]
    pub input: InputConfig,
}

/// Global application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Path or name of the ffmpeg executable.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path or name of the ffprobe executable.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,
}

/// Output location configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory that receives converted files, created on demand.
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
}

/// AAC encoding parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Per-stream target bitrate in ffmpeg notation (e.g., "224k").
    #[serde(default = "default_bitrate")]
    pub bitrate: String,

    /// Output channel count.
    #[serde(default = "default_channels")]
    pub channels: u8,

    /// Output sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Title tag written on every output audio stream.
    #[serde(default = "default_title")]
    pub title: Option<String>,

    /// Native AAC encoder coder algorithm.
    #[serde(default = "default_aac_coder")]
    pub aac_coder: String,
}

/// Codecs for the streams that are carried over alongside the audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Video codec ("copy" keeps the original).
    #[serde(default = "default_copy")]
    pub video_codec: String,

    /// Subtitle codec ("copy" keeps the original).
    #[serde(default = "default_copy")]
    pub subtitle_codec: String,
}

/// Progress tracking and process supervision settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Interval in milliseconds between output file size polls.
    #[serde(default = "default_size_poll_interval")]
    pub size_poll_interval_ms: u64,

    /// How long a cancelled encoder may take to exit before it is killed.
    #[serde(default = "default_cancel_grace")]
    pub cancel_grace_ms: u64,

    /// Number of diagnostic lines kept for failure reports.
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: usize,
}

impl ProgressConfig {
    /// Returns the size poll interval as a `Duration`.
    pub fn size_poll_interval(&self) -> Duration {
        Duration::from_millis(self.size_poll_interval_ms)
    }

    /// Returns the cancellation grace period as a `Duration`.
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

/// Input discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// File patterns matched when expanding a directory (e.g., ["*.mkv"]).
    #[serde(default = "default_file_patterns")]
    pub file_patterns: Vec<String>,

    /// Whether directories are expanded recursively.
    #[serde(default)]
    pub recursive: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("converted")
}

fn default_bitrate() -> String {
    "224k".to_string()
}

fn default_channels() -> u8 {
    2
}

fn default_sample_rate() -> u32 {
    48000
}

fn default_title() -> Option<String> {
    Some("AAC Stereo".to_string())
}

fn default_aac_coder() -> String {
    "twoloop".to_string()
}

fn default_copy() -> String {
    "copy".to_string()
}

fn default_size_poll_interval() -> u64 {
    250
}

fn default_cancel_grace() -> u64 {
    5000
}

fn default_log_tail_lines() -> usize {
    20
}

fn default_file_patterns() -> Vec<String> {
    ["*.mkv", "*.mka", "*.flac", "*.wav", "*.mp4", "*.m4a", "*.mp3"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            bitrate: default_bitrate(),
            channels: default_channels(),
            sample_rate: default_sample_rate(),
            title: default_title(),
            aac_coder: default_aac_coder(),
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            video_codec: default_copy(),
            subtitle_codec: default_copy(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            size_poll_interval_ms: default_size_poll_interval(),
            cancel_grace_ms: default_cancel_grace(),
            log_tail_lines: default_log_tail_lines(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            file_patterns: default_file_patterns(),
            recursive: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();

        assert_eq!(config.audio.bitrate, "224k");
        assert_eq!(config.audio.channels, 2);
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.audio.title.as_deref(), Some("AAC Stereo"));
        assert_eq!(config.output.directory, PathBuf::from("converted"));
        assert_eq!(config.progress.size_poll_interval(), Duration::from_millis(250));
        assert!(!config.input.recursive);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let yaml = r#"
audio:
  bitrate: 320k
progress:
  log_tail_lines: 5
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.audio.bitrate, "320k");
        assert_eq!(config.audio.aac_coder, "twoloop");
        assert_eq!(config.progress.log_tail_lines, 5);
        assert_eq!(config.progress.cancel_grace_ms, 5000);
        assert_eq!(config.streams.video_codec, "copy");
    }

    #[test]
    fn test_title_can_be_disabled() {
        let config: AppConfig = serde_yaml::from_str("audio:\n  title: null\n").unwrap();
        assert!(config.audio.title.is_none());
    }
}

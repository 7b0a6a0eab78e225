//! Semantic validation for configuration values.

use crate::config::model::AppConfig;
use crate::encoder::ffmpeg::parse_bitrate_to_bps;

use super::{ValidationIssue, ValidationResult};

/// Channel counts the AAC output is allowed to use.
const VALID_CHANNELS: &[u8] = &[1, 2, 6];

/// Sample rates that players handle without complaint.
const COMMON_SAMPLE_RATES: &[u32] = &[44100, 48000, 96000];

/// Video codec names accepted for the carried-over video stream.
const KNOWN_VIDEO_CODECS: &[&str] = &["copy", "libx264", "libx265"];

/// Subtitle codec names accepted for carried-over subtitle streams.
const KNOWN_SUBTITLE_CODECS: &[&str] = &["copy", "mov_text", "srt", "ass"];

/// AAC coder algorithms understood by ffmpeg's native encoder.
const AAC_CODERS: &[&str] = &["twoloop", "anmr", "fast"];

/// Validates semantic correctness of configuration values.
pub fn validate(config: &AppConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_global(config, &mut result);
    validate_audio(config, &mut result);
    validate_streams(config, &mut result);

    if config.progress.size_poll_interval_ms == 0 {
        result.add(ValidationIssue::error(
            "progress.size_poll_interval_ms",
            "Size poll interval must be greater than 0",
        ));
    }

    if config.progress.log_tail_lines == 0 {
        result.add(
            ValidationIssue::warning(
                "progress.log_tail_lines",
                "Failure reports will not include any encoder diagnostics",
            )
            .with_suggestion("Keep at least a few lines, e.g. 20"),
        );
    }

    result
}

/// Validates global configuration settings.
fn validate_global(config: &AppConfig, result: &mut ValidationResult) {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.as_str()) {
        result.add(
            ValidationIssue::error(
                "global.log_level",
                format!("Invalid log level: '{}'", config.global.log_level),
            )
            .with_suggestion(format!("Valid levels: {}", valid_levels.join(", "))),
        );
    }
}

/// Validates the AAC encoding parameters.
fn validate_audio(config: &AppConfig, result: &mut ValidationResult) {
    let audio = &config.audio;

    if parse_bitrate_to_bps(&audio.bitrate).is_none() {
        result.add(
            ValidationIssue::error(
                "audio.bitrate",
                format!("Invalid bitrate: '{}'", audio.bitrate),
            )
            .with_suggestion("Use a positive value such as '192k', '224k' or '320000'"),
        );
    }

    if !VALID_CHANNELS.contains(&audio.channels) {
        result.add(
            ValidationIssue::error(
                "audio.channels",
                format!("Unsupported channel count: {}", audio.channels),
            )
            .with_suggestion("Use 1 (mono), 2 (stereo) or 6 (5.1)"),
        );
    }

    if !COMMON_SAMPLE_RATES.contains(&audio.sample_rate) {
        result.add(
            ValidationIssue::warning(
                "audio.sample_rate",
                format!("Uncommon sample rate: {} Hz", audio.sample_rate),
            )
            .with_suggestion("Common rates: 44100, 48000, 96000"),
        );
    }

    if !AAC_CODERS.contains(&audio.aac_coder.as_str()) {
        result.add(
            ValidationIssue::error(
                "audio.aac_coder",
                format!("Unknown AAC coder: '{}'", audio.aac_coder),
            )
            .with_suggestion(format!("Did you mean '{}'?", find_similar(&audio.aac_coder, AAC_CODERS))),
        );
    }
}

/// Validates the codecs of the carried-over streams.
fn validate_streams(config: &AppConfig, result: &mut ValidationResult) {
    let video = &config.streams.video_codec;
    if !KNOWN_VIDEO_CODECS.contains(&video.as_str()) {
        result.add(
            ValidationIssue::warning("streams.video_codec", format!("Unknown video codec: '{}'", video))
                .with_suggestion(format!("Did you mean '{}'?", find_similar(video, KNOWN_VIDEO_CODECS))),
        );
    }

    let subtitle = &config.streams.subtitle_codec;
    if !KNOWN_SUBTITLE_CODECS.contains(&subtitle.as_str()) {
        result.add(
            ValidationIssue::warning(
                "streams.subtitle_codec",
                format!("Unknown subtitle codec: '{}'", subtitle),
            )
            .with_suggestion(format!(
                "Did you mean '{}'?",
                find_similar(subtitle, KNOWN_SUBTITLE_CODECS)
            )),
        );
    }
}

/// Finds the closest known name by Levenshtein distance.
fn find_similar<'a>(input: &str, candidates: &[&'a str]) -> &'a str {
    let input_lower = input.to_lowercase();

    candidates
        .iter()
        .min_by_key(|c| strsim::levenshtein(&input_lower, c))
        .copied()
        .unwrap_or("copy")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let result = validate(&AppConfig::default());
        assert_eq!(result.issue_count(), 0);
    }

    #[test]
    fn test_bad_bitrate_and_channels_are_errors() {
        let mut config = AppConfig::default();
        config.audio.bitrate = "loud".to_string();
        config.audio.channels = 4;

        let result = validate(&config);
        let paths: Vec<_> = result.errors().map(|i| i.path.as_str()).collect();

        assert_eq!(paths, vec!["audio.bitrate", "audio.channels"]);
    }

    #[test]
    fn test_uncommon_sample_rate_is_warning() {
        let mut config = AppConfig::default();
        config.audio.sample_rate = 22050;

        let result = validate(&config);
        assert!(result.is_valid());
        assert_eq!(result.warnings().count(), 1);
    }

    #[test]
    fn test_misspelled_video_codec_gets_suggestion() {
        let mut config = AppConfig::default();
        config.streams.video_codec = "lib265".to_string();

        let result = validate(&config);
        let issue = result.warnings().next().unwrap();

        assert_eq!(issue.path, "streams.video_codec");
        assert!(issue.suggestion.as_deref().unwrap().contains("libx265"));
    }
}

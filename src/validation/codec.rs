//! Codec availability validation.

use crate::config::model::AppConfig;

use super::{SystemCapabilities, ValidationIssue, ValidationResult};

/// Validates that the encoders this run depends on are available.
pub fn validate(config: &AppConfig, capabilities: &SystemCapabilities) -> ValidationResult {
    let mut result = ValidationResult::new();

    if !capabilities.available_encoders.contains("aac") {
        result.add(
            ValidationIssue::error(
                "global.ffmpeg_path",
                format!(
                    "ffmpeg at '{}' does not provide the 'aac' encoder",
                    config.global.ffmpeg_path.display()
                ),
            )
            .with_suggestion("Install an ffmpeg build with the native AAC encoder"),
        );
    }

    let video = config.streams.video_codec.as_str();
    if video != "copy" && !capabilities.available_encoders.contains(video) {
        result.add(
            ValidationIssue::error(
                "streams.video_codec",
                format!("Video encoder '{}' is not available", video),
            )
            .with_suggestion(suggest_video_codec(capabilities)),
        );
    }

    if !capabilities.ffprobe_available {
        result.add(
            ValidationIssue::error(
                "global.ffprobe_path",
                format!(
                    "ffprobe at '{}' is not usable; sources cannot be probed",
                    config.global.ffprobe_path.display()
                ),
            )
            .with_suggestion("Install ffprobe alongside ffmpeg or set global.ffprobe_path"),
        );
    }

    result
}

/// Suggests video encoders that are available on this system.
fn suggest_video_codec(capabilities: &SystemCapabilities) -> String {
    let common = ["libx264", "libx265"];

    let available: Vec<&str> = common
        .iter()
        .filter(|c| capabilities.available_encoders.contains(**c))
        .copied()
        .collect();

    if available.is_empty() {
        "Use 'copy' to keep the original video stream".to_string()
    } else {
        format!("Available alternatives: copy, {}", available.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(encoders: &[&str], ffprobe: bool) -> SystemCapabilities {
        SystemCapabilities {
            available_encoders: encoders.iter().map(|e| e.to_string()).collect(),
            ffprobe_available: ffprobe,
        }
    }

    #[test]
    fn test_missing_aac_is_error() {
        let result = validate(&AppConfig::default(), &capabilities(&["libx264"], true));
        assert_eq!(result.error_count(), 1);
    }

    #[test]
    fn test_missing_ffprobe_is_error() {
        let result = validate(&AppConfig::default(), &capabilities(&["aac"], false));
        let issue = result.errors().next().unwrap();
        assert_eq!(issue.path, "global.ffprobe_path");
        assert_eq!(result.error_count(), 1);
    }

    #[test]
    fn test_unavailable_video_encoder_is_error() {
        let mut config = AppConfig::default();
        config.streams.video_codec = "libx265".to_string();

        let result = validate(&config, &capabilities(&["aac", "libx264"], true));
        let issue = result.errors().next().unwrap();

        assert_eq!(issue.path, "streams.video_codec");
        assert!(issue.suggestion.as_deref().unwrap().contains("libx264"));
    }
}

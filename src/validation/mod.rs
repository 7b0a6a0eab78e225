//! Configuration validation system.

pub mod codec;
pub mod paths;
pub mod report;
pub mod semantic;

use std::collections::HashSet;
use std::path::Path;

use crate::config::model::AppConfig;
use crate::error::CapabilityError;

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// Blocks the conversion from starting.
    Error,
    /// Logged but allows the conversion.
    Warning,
}

/// A validation issue found during configuration checking.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity of the issue.
    pub severity: ValidationSeverity,
    /// Path to the problematic config field (e.g., "audio.bitrate").
    pub path: String,
    /// Description of the issue.
    pub message: String,
    /// Optional suggestion for fixing the issue.
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Creates a new error-level validation issue.
    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Error,
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Creates a new warning-level validation issue.
    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Warning,
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Adds a suggestion to this validation issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Result of validating a configuration.
#[derive(Debug, Default)]
pub struct ValidationResult {
    issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Creates an empty validation result.
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// Adds an issue to the result.
    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    /// Extends the result with issues from another result.
    pub fn extend(&mut self, other: ValidationResult) {
        self.issues.extend(other.issues);
    }

    /// Returns true if there are no errors (warnings are allowed).
    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == ValidationSeverity::Error)
    }

    /// Returns an iterator over error-level issues.
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Error)
    }

    /// Returns an iterator over warning-level issues.
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Warning)
    }

    /// Returns the total number of issues.
    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }

    /// Returns the number of errors.
    pub fn error_count(&self) -> usize {
        self.errors().count()
    }
}

/// System capabilities detected at startup.
#[derive(Debug, Clone, Default)]
pub struct SystemCapabilities {
    /// Available FFmpeg encoders.
    pub available_encoders: HashSet<String>,
    /// Whether ffprobe answered `-version`.
    pub ffprobe_available: bool,
}

impl SystemCapabilities {
    /// Detects system capabilities by querying ffmpeg and ffprobe.
    pub fn detect(ffmpeg: &Path, ffprobe: &Path) -> Result<Self, CapabilityError> {
        let available_encoders = detect_ffmpeg_encoders(ffmpeg)?;
        let ffprobe_available = tool_responds(ffprobe);

        Ok(Self {
            available_encoders,
            ffprobe_available,
        })
    }
}

/// Detects available FFmpeg encoders by parsing `ffmpeg -encoders`.
fn detect_ffmpeg_encoders(ffmpeg: &Path) -> Result<HashSet<String>, CapabilityError> {
    let command = format!("{} -encoders", ffmpeg.display());
    let output = std::process::Command::new(ffmpeg)
        .args(["-encoders", "-hide_banner"])
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CapabilityError::ToolNotFound {
                tool: ffmpeg.display().to_string(),
            },
            _ => CapabilityError::CommandFailed {
                command: command.clone(),
                message: e.to_string(),
            },
        })?;

    if !output.status.success() {
        return Err(CapabilityError::CommandFailed {
            command,
            message: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_ffmpeg_codec_list(&stdout))
}

/// Parses FFmpeg encoder list output into a set of codec names.
fn parse_ffmpeg_codec_list(output: &str) -> HashSet<String> {
    let mut codecs = HashSet::new();

    for line in output.lines() {
        // Lines look like: " A....D aac                  AAC (Advanced Audio Coding)"
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('-') || trimmed.contains("Encoders:") {
            continue;
        }

        if trimmed.starts_with('V') || trimmed.starts_with('A') || trimmed.starts_with('S') {
            let parts: Vec<&str> = trimmed.split_whitespace().collect();
            if parts.len() >= 2 && parts[1] != "=" {
                codecs.insert(parts[1].to_string());
            }
        }
    }

    codecs
}

/// Returns true if `<tool> -version` runs and exits successfully.
fn tool_responds(tool: &Path) -> bool {
    std::process::Command::new(tool)
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Validates the configuration against system capabilities.
pub fn validate_config(config: &AppConfig, capabilities: &SystemCapabilities) -> ValidationResult {
    let mut result = ValidationResult::new();

    result.extend(semantic::validate(config));
    result.extend(codec::validate(config, capabilities));
    result.extend(paths::validate(config));

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ffmpeg_codec_list() {
        let output = "\
Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC
 A....D aac                  AAC (Advanced Audio Coding)
 S..... mov_text             3GPP Timed Text subtitle
";
        let codecs = parse_ffmpeg_codec_list(output);

        assert!(codecs.contains("aac"));
        assert!(codecs.contains("libx264"));
        assert!(codecs.contains("mov_text"));
        assert!(!codecs.contains("="));
    }

    #[test]
    fn test_result_counts() {
        let mut result = ValidationResult::new();
        result.add(ValidationIssue::warning("audio.sample_rate", "odd"));
        assert!(result.is_valid());

        result.add(ValidationIssue::error("audio.bitrate", "bad"));
        assert!(!result.is_valid());
        assert_eq!(result.issue_count(), 2);
        assert_eq!(result.error_count(), 1);
    }
}

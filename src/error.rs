//! Error types for the AAC normalizer.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading and parsing errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {message}")]
    ParseFailed { path: PathBuf, message: String },

    #[error("Config validation failed with {error_count} error(s)")]
    ValidationFailed { error_count: usize },
}

/// Errors raised while starting or supervising an encoder process.
///
/// The queue never propagates these; they are folded into a failed job report.
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Failed to spawn '{program}': {source}")]
    SpawnFailed {
        program: PathBuf,
        source: std::io::Error,
    },

    #[error("Output location '{path}' is not writable: {source}")]
    OutputUnwritable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Output path '{path}' is the same file as the source")]
    OutputIsSource { path: PathBuf },

    #[error("Failed to {action} encoder process: {message}")]
    ControlFailed {
        action: &'static str,
        message: String,
    },

    #[error("Encoder process did not expose its {stream} stream")]
    StreamUnavailable { stream: &'static str },

    #[error("Waiting on encoder process failed: {0}")]
    Wait(#[source] std::io::Error),
}

/// ffprobe invocation and parsing errors.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to run ffprobe on '{path}': {source}")]
    SpawnFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("ffprobe failed on '{path}': {stderr}")]
    Failed { path: PathBuf, stderr: String },

    #[error("Failed to parse ffprobe output for '{path}': {message}")]
    ParseFailed { path: PathBuf, message: String },
}

/// Input discovery errors.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Input path does not exist: '{path}'")]
    NotFound { path: PathBuf },

    #[error("Invalid file pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Capability detection errors.
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("Failed to run '{command}': {message}")]
    CommandFailed { command: String, message: String },

    #[error("Required tool '{tool}' not found")]
    ToolNotFound { tool: String },
}

//! Command-line interface definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::model::AppConfig;

/// Batch converter that re-encodes every audio stream to AAC with ffmpeg.
#[derive(Parser, Debug)]
#[command(name = "aac-normalize", version, about, long_about = None)]
pub struct Cli {
    /// Path to a YAML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long, env = "AAC_NORMALIZE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Returns the log level from the verbosity flags, if any were given.
    pub fn verbosity_level(&self) -> Option<&'static str> {
        match self.verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert files and directories.
    Convert(ConvertArgs),

    /// Validate the configuration without converting anything.
    #[command(name = "config-validate")]
    ConfigValidate,

    /// Display the effective configuration.
    #[command(name = "config-show")]
    ConfigShow,

    /// Show duration and audio streams of a file.
    Probe {
        /// File to inspect.
        file: PathBuf,
    },
}

/// Arguments for the convert subcommand.
#[derive(Args, Debug, Default)]
pub struct ConvertArgs {
    /// Files or directories to convert.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory that receives converted files.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Per-stream AAC bitrate (e.g., 224k).
    #[arg(short, long)]
    pub bitrate: Option<String>,

    /// Output channel count.
    #[arg(long)]
    pub channels: Option<u8>,

    /// Output sample rate in Hz.
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Video codec ("copy" keeps the original).
    #[arg(long)]
    pub video_codec: Option<String>,

    /// Subtitle codec ("copy" keeps the original).
    #[arg(long)]
    pub subtitle_codec: Option<String>,

    /// Title tag for the output audio streams (empty to omit).
    #[arg(long)]
    pub title: Option<String>,

    /// Write a JSON summary of the run to this path.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl ConvertArgs {
    /// Applies the command-line overrides to a loaded configuration.
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.clone();
        }
        if let Some(bitrate) = &self.bitrate {
            config.audio.bitrate = bitrate.clone();
        }
        if let Some(channels) = self.channels {
            config.audio.channels = channels;
        }
        if let Some(rate) = self.sample_rate {
            config.audio.sample_rate = rate;
        }
        if let Some(codec) = &self.video_codec {
            config.streams.video_codec = codec.clone();
        }
        if let Some(codec) = &self.subtitle_codec {
            config.streams.subtitle_codec = codec.clone();
        }
        if let Some(title) = &self.title {
            config.audio.title = (!title.is_empty()).then(|| title.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_arguments_parse() {
        let cli = Cli::try_parse_from([
            "aac-normalize",
            "-v",
            "convert",
            "a.mkv",
            "music",
            "--bitrate",
            "320k",
            "--output-dir",
            "/tmp/out",
        ])
        .unwrap();

        assert_eq!(cli.verbosity_level(), Some("debug"));
        match cli.command {
            Commands::Convert(args) => {
                assert_eq!(args.inputs, vec![PathBuf::from("a.mkv"), PathBuf::from("music")]);
                assert_eq!(args.bitrate.as_deref(), Some("320k"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_convert_requires_inputs() {
        assert!(Cli::try_parse_from(["aac-normalize", "convert"]).is_err());
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let mut config = AppConfig::default();
        let args = ConvertArgs {
            inputs: vec![PathBuf::from("a.mkv")],
            output_dir: Some(PathBuf::from("/srv/aac")),
            channels: Some(6),
            video_codec: Some("libx264".to_string()),
            title: Some(String::new()),
            ..ConvertArgs::default()
        };

        args.apply_to(&mut config);

        assert_eq!(config.output.directory, PathBuf::from("/srv/aac"));
        assert_eq!(config.audio.channels, 6);
        assert_eq!(config.audio.bitrate, "224k");
        assert_eq!(config.streams.video_codec, "libx264");
        assert!(config.audio.title.is_none());
    }
}

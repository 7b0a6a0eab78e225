//! Media analysis and input discovery.

pub mod probe;
pub mod scan;

pub use probe::{FfprobeProber, MediaProber, MediaSummary, OutputAudioStream};
pub use scan::InputScanner;

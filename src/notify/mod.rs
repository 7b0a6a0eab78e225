//! Presentation of queue progress and results.

pub mod console;

pub use console::ConsoleReporter;

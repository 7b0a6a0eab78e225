//! Configuration loading and validation.

pub mod loader;
pub mod model;

pub use loader::{ensure_valid, load, load_from_path};
pub use model::AppConfig;

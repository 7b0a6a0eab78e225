//! Path validation for the output directory and input locations.

use std::path::{Path, PathBuf};

use crate::config::model::AppConfig;

use super::{ValidationIssue, ValidationResult};

/// Validates that the output directory exists (or can be created) and is writable.
pub fn validate(config: &AppConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_directory_writable(&config.output.directory, "output.directory", &mut result);

    result
}

/// Validates that no input directory is the output directory itself.
///
/// Converted files keep their source file name, so writing into the source
/// directory would overwrite the originals.
pub fn validate_inputs(inputs: &[PathBuf], output_dir: &Path) -> ValidationResult {
    let mut result = ValidationResult::new();

    for (i, input) in inputs.iter().enumerate() {
        let parent = if input.is_dir() {
            Some(input.as_path())
        } else {
            input.parent()
        };

        if let Some(dir) = parent {
            if same_directory(dir, output_dir) {
                result.add(
                    ValidationIssue::error(
                        format!("inputs[{}]", i),
                        format!(
                            "Input '{}' is located in the output directory '{}'",
                            input.display(),
                            output_dir.display()
                        ),
                    )
                    .with_suggestion("Choose a different output directory"),
                );
            }
        }
    }

    result
}

/// Validates that a directory exists and is writable.
fn validate_directory_writable(path: &Path, config_path: &str, result: &mut ValidationResult) {
    if !path.exists() {
        if let Err(e) = std::fs::create_dir_all(path) {
            result.add(
                ValidationIssue::error(
                    config_path,
                    format!("Cannot create directory '{}': {}", path.display(), e),
                )
                .with_suggestion("Check parent directory permissions"),
            );
        }
        return;
    }

    if !path.is_dir() {
        result.add(ValidationIssue::error(
            config_path,
            format!("Path is not a directory: '{}'", path.display()),
        ));
        return;
    }

    let test_file = path.join(".write_test");
    match std::fs::write(&test_file, "test") {
        Ok(()) => {
            let _ = std::fs::remove_file(&test_file);
        }
        Err(e) => {
            result.add(
                ValidationIssue::error(
                    config_path,
                    format!("Directory is not writable '{}': {}", path.display(), e),
                )
                .with_suggestion("Check directory permissions"),
            );
        }
    }
}

/// Checks if two paths name the same directory.
fn same_directory(path_a: &Path, path_b: &Path) -> bool {
    let canon_a = std::fs::canonicalize(path_a).unwrap_or_else(|_| path_a.to_path_buf());
    let canon_b = std::fs::canonicalize(path_b).unwrap_or_else(|_| path_b.to_path_buf());

    canon_a == canon_b
}

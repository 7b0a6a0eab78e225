//! Expansion of command-line inputs into a list of source files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use tracing::{debug, info};

use crate::config::model::InputConfig;
use crate::error::ScanError;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Finds source files among files and directories given by the user.
#[derive(Debug, Clone)]
pub struct InputScanner {
    patterns: Vec<Pattern>,
    recursive: bool,
}

impl InputScanner {
    /// Compiles the configured file patterns.
    pub fn new(config: &InputConfig) -> Result<Self, ScanError> {
        let patterns = config
            .file_patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| ScanError::InvalidPattern {
                    pattern: p.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            recursive: config.recursive,
        })
    }

    /// Expands `inputs` in order.
    ///
    /// Files are taken as given; directories contribute their matching files
    /// sorted by path. Duplicates keep their first position.
    pub fn expand(&self, inputs: &[PathBuf]) -> Result<Vec<PathBuf>, ScanError> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for input in inputs {
            if input.is_file() {
                if seen.insert(input.clone()) {
                    files.push(input.clone());
                }
            } else if input.is_dir() {
                for file in self.scan_directory(input) {
                    if seen.insert(file.clone()) {
                        files.push(file);
                    }
                }
            } else {
                return Err(ScanError::NotFound { path: input.clone() });
            }
        }

        info!(inputs = inputs.len(), files = files.len(), "Expanded inputs");
        Ok(files)
    }

    /// Returns true if the file name matches one of the patterns.
    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.patterns
            .iter()
            .any(|p| p.matches_with(name, MATCH_OPTIONS))
    }

    fn scan_directory(&self, dir: &Path) -> Vec<PathBuf> {
        let walker = if self.recursive {
            walkdir::WalkDir::new(dir)
        } else {
            walkdir::WalkDir::new(dir).max_depth(1)
        };

        let mut files: Vec<PathBuf> = walker
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| self.matches(p))
            .collect();
        files.sort();

        debug!(path = ?dir, count = files.len(), "Scanned directory");
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_directory_expansion_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("b.mkv"));
        touch(&dir.path().join("a.FLAC"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("nested/c.mkv"));

        let scanner = InputScanner::new(&InputConfig::default()).unwrap();
        let files = scanner.expand(&[dir.path().to_path_buf()]).unwrap();

        assert_eq!(files, vec![dir.path().join("a.FLAC"), dir.path().join("b.mkv")]);
    }

    #[test]
    fn test_recursive_expansion() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.mkv"));
        touch(&dir.path().join("nested/c.mkv"));

        let config = InputConfig {
            recursive: true,
            ..InputConfig::default()
        };
        let files = InputScanner::new(&config).unwrap().expand(&[dir.path().to_path_buf()]).unwrap();

        assert_eq!(files.len(), 2);
        assert!(files.contains(&dir.path().join("nested/c.mkv")));
    }

    #[test]
    fn test_explicit_files_bypass_patterns_and_dedupe() {
        let dir = TempDir::new().unwrap();
        let odd = dir.path().join("track.ogg");
        touch(&odd);

        let scanner = InputScanner::new(&InputConfig::default()).unwrap();
        let files = scanner.expand(&[odd.clone(), odd.clone()]).unwrap();

        assert_eq!(files, vec![odd]);
    }

    #[test]
    fn test_missing_input_is_error() {
        let scanner = InputScanner::new(&InputConfig::default()).unwrap();
        let err = scanner.expand(&[PathBuf::from("/nonexistent/input.mkv")]).unwrap_err();
        assert!(matches!(err, ScanError::NotFound { .. }));
    }

    #[test]
    fn test_invalid_pattern_is_error() {
        let config = InputConfig {
            file_patterns: vec!["[".to_string()],
            recursive: false,
        };
        assert!(matches!(
            InputScanner::new(&config),
            Err(ScanError::InvalidPattern { .. })
        ));
    }
}

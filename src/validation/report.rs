//! Validation report formatting.

use super::{ValidationIssue, ValidationResult, ValidationSeverity};

/// Formats a validation result into a human-readable report.
pub fn format_report(result: &ValidationResult) -> String {
    let errors: Vec<_> = result.errors().collect();
    let warnings: Vec<_> = result.warnings().collect();

    if errors.is_empty() && warnings.is_empty() {
        return "Configuration is valid.".to_string();
    }

    let mut report = String::new();

    if !errors.is_empty() {
        report.push_str("\nConfig Validation Failed\n");
        report.push_str("========================\n\n");
    }

    for issue in &errors {
        report.push_str(&format_issue(issue));
        report.push('\n');
    }

    if !warnings.is_empty() {
        if !errors.is_empty() {
            report.push_str("\nWarnings:\n");
            report.push_str("---------\n\n");
        }
        for issue in &warnings {
            report.push_str(&format_issue(issue));
            report.push('\n');
        }
    }

    report.push_str("---\n");
    report.push_str(&format!(
        "{} warning(s), {} error(s)\n",
        warnings.len(),
        errors.len()
    ));

    if !errors.is_empty() {
        report.push_str("Conversion would not start with this configuration.\n");
    }

    report
}

/// Formats a single validation issue.
fn format_issue(issue: &ValidationIssue) -> String {
    let prefix = match issue.severity {
        ValidationSeverity::Error => "ERROR",
        ValidationSeverity::Warning => "WARNING",
    };

    let mut output = format!("{} {}\n", prefix, issue.path);
    output.push_str(&format!("  └─ {}\n", issue.message));

    if let Some(suggestion) = &issue.suggestion {
        output.push_str(&format!("     {}\n", suggestion));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_result() {
        assert_eq!(format_report(&ValidationResult::new()), "Configuration is valid.");
    }

    #[test]
    fn test_errors_precede_warnings() {
        let mut result = ValidationResult::new();
        result.add(ValidationIssue::warning("audio.sample_rate", "Uncommon sample rate"));
        result.add(
            ValidationIssue::error("audio.bitrate", "Invalid bitrate").with_suggestion("Use '224k'"),
        );

        let report = format_report(&result);
        let error_at = report.find("ERROR audio.bitrate").unwrap();
        let warning_at = report.find("WARNING audio.sample_rate").unwrap();

        assert!(error_at < warning_at);
        assert!(report.contains("1 warning(s), 1 error(s)"));
        assert!(report.contains("Use '224k'"));
    }
}

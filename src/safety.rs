//! Safety checks to prevent accidental overwrites of input audio.
//!
//! The batch report is written with a plain truncating create, so its path
//! is validated before any file is processed.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// Validates that a report path is safe to write.
///
/// Checks:
/// - The file name must end in `.csv` (case-insensitive)
/// - The path must not be an existing directory
/// - The path must not be one of the discovered input files
pub fn validate_report_path(report: &Path, inputs: &[PathBuf]) -> Result<()> {
    let is_csv = report
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if !is_csv {
        bail!(
            "Safety check failed: report file '{}' must have a .csv extension",
            report.display()
        );
    }

    if report.is_dir() {
        bail!(
            "Safety check failed: report path '{}' is a directory",
            report.display()
        );
    }

    let report_abs = std::path::absolute(report).unwrap_or_else(|_| report.to_path_buf());
    for input in inputs {
        let input_abs = std::path::absolute(input).unwrap_or_else(|_| input.clone());
        if report_abs == input_abs {
            bail!(
                "Safety check failed: report '{}' cannot be the same as input '{}'",
                report.display(),
                input.display()
            );
        }
    }

    Ok(())
}

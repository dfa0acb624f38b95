//! JSON export of analysis reports.
//!
//! Reports are written as pretty-printed JSON with the field names of the
//! domain types, so downstream tooling can read them back unchanged.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::application::services::ErrorSummary;
use crate::domain::ab_testing::ABTestResults;
use crate::domain::capability::BrokerCapabilityProfile;
use crate::domain::performance::BrokerComparison;

/// Export failures.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Reading or writing the file failed.
    #[error("Export I/O failed for '{path}': {source}")]
    Io {
        /// File involved.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// The report could not be encoded or decoded.
    #[error("Report JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
}

/// A report with a stable file name.
pub trait Report: Serialize + DeserializeOwned {
    /// File name without directory, e.g. `ab_test_<id>.json`.
    fn file_name(&self) -> String;
}

impl Report for ABTestResults {
    fn file_name(&self) -> String {
        format!("ab_test_{}.json", self.test_id)
    }
}

impl Report for BrokerComparison {
    fn file_name(&self) -> String {
        format!("broker_comparison_{}.json", self.comparison_id)
    }
}

impl Report for BrokerCapabilityProfile {
    fn file_name(&self) -> String {
        format!(
            "capabilities_{}_{}.json",
            self.broker,
            self.discovered_at.format("%Y%m%dT%H%M%SZ")
        )
    }
}

impl Report for ErrorSummary {
    fn file_name(&self) -> String {
        format!("error_summary_{}s.json", self.window_secs)
    }
}

/// Encode a report as pretty JSON.
///
/// # Errors
///
/// Returns `Json` if serialization fails.
pub fn to_json<T: Serialize>(report: &T) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Decode a report from JSON.
///
/// # Errors
///
/// Returns `Json` if the text does not match the report shape.
pub fn from_json<T: DeserializeOwned>(json: &str) -> Result<T, ExportError> {
    Ok(serde_json::from_str(json)?)
}

/// Write a report to `path`, replacing any existing file.
///
/// # Errors
///
/// Returns `Io` or `Json` on failure.
pub fn write_report<T: Serialize>(path: impl AsRef<Path>, report: &T) -> Result<(), ExportError> {
    let path = path.as_ref();
    let json = to_json(report)?;
    fs::write(path, json).map_err(|source| io_error(path, source))?;
    tracing::debug!(path = %path.display(), "Report exported");
    Ok(())
}

/// Read a report written by [`write_report`].
///
/// # Errors
///
/// Returns `Io` or `Json` on failure.
pub fn read_report<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ExportError> {
    let path = path.as_ref();
    let json = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
    from_json(&json)
}

/// Write a report into `dir` under its own file name, creating the
/// directory when missing. Returns the written path.
///
/// # Errors
///
/// Returns `Io` or `Json` on failure.
pub fn export_to_dir<T: Report>(dir: impl AsRef<Path>, report: &T) -> Result<PathBuf, ExportError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|source| io_error(dir, source))?;
    let path = dir.join(report.file_name());
    write_report(&path, report)?;
    Ok(path)
}

fn io_error(path: &Path, source: std::io::Error) -> ExportError {
    ExportError::Io {
        path: path.display().to_string(),
        source,
    }
}

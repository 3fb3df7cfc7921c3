//! Error types for the termcensus pipeline.
//!
//! One error enum per stage:
//!
//! - [`CsvError`] - reading and decoding input tables
//! - [`ConfigError`] - pipeline configuration and input presence
//! - [`LoadError`] - required columns and typed row decoding
//! - [`JoinError`] - join cardinality violations
//! - [`ValidationError`] - output schema validation
//! - [`ReportError`] - reporting stage
//! - [`PipelineError`] - top-level orchestration
//!
//! Conversions are `From` implementations, so `?` works across stage boundaries.
//! Malformed grades, birth dates and term codes are not errors: they become
//! missing values and are counted in the run diagnostics.

use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// CSV Parsing Errors
// =============================================================================

/// Errors while reading a tabular input.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CSV content.
    #[error("Line {line}: {message}")]
    Parse { line: u64, message: String },

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,
}

impl From<csv::Error> for CsvError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        CsvError::Parse {
            line,
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors detected while validating the pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required input file does not exist.
    #[error("Input file not found: {}", .0.display())]
    MissingInputFile(PathBuf),

    /// The output path cannot be used.
    #[error("Invalid output path {}: {reason}", .path.display())]
    InvalidOutputPath { path: PathBuf, reason: String },

    /// A census tag is blank.
    #[error("Census tag for the {0} snapshot is empty")]
    EmptyCensusTag(&'static str),

    /// Both snapshots use the same tag.
    #[error("Early and end-of-term census tags are both '{0}'")]
    SameCensusTags(String),

    /// Failed to read a config file.
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a config file.
    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Load Errors
// =============================================================================

/// Errors while loading one of the three input tables.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The table could not be read or decoded.
    #[error("Cannot load {table}: {source}")]
    Csv {
        table: &'static str,
        #[source]
        source: CsvError,
    },

    /// A join key or required attribute column is absent.
    #[error("Column '{column}' not found in {table}")]
    MissingRequiredColumn { table: &'static str, column: String },
}

// =============================================================================
// Join Errors
// =============================================================================

/// Errors raised when a join does not have the expected cardinality.
#[derive(Debug, Error)]
pub enum JoinError {
    /// A many-to-one join found more than one right-hand row for a key.
    #[error("Join with {table} is not many-to-one: key {key} appears {count} times")]
    CardinalityViolation {
        table: &'static str,
        key: String,
        count: usize,
    },
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors during output schema validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The embedded schema itself could not be compiled.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// A record could not be converted to JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Report Errors
// =============================================================================

/// Errors from the reporting stage.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Report configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Reading the student-level file failed.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Writing a report file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Building or saving the workbook failed.
    #[error("Workbook error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// Rendering a chart image failed.
    #[error("Chart error: {0}")]
    Chart(String),

    /// Writing the JSON bundle failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The student-level file has no rows.
    #[error("No student-level records to report on")]
    EmptyInput,
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors.
///
/// This is the error type returned by [`crate::transform::pipeline::run`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Input loading error.
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Join cardinality error.
    #[error("Join error: {0}")]
    Join(#[from] JoinError),

    /// Schema validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Writing the output file failed.
    #[error("Export error: {0}")]
    Export(#[from] CsvError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for loading operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type for report operations.
pub type ReportResult<T> = Result<T, ReportError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let config_err = ConfigError::MissingInputFile(PathBuf::from("/data/grades.csv"));
        let pipeline_err: PipelineError = config_err.into();
        assert!(pipeline_err.to_string().contains("grades.csv"));

        let load_err = LoadError::MissingRequiredColumn {
            table: "grades",
            column: "term_code".into(),
        };
        let pipeline_err: PipelineError = load_err.into();
        assert!(pipeline_err.to_string().contains("term_code"));
    }

    #[test]
    fn test_export_and_report_conversions() {
        let pipeline_err: PipelineError = CsvError::NoHeaders.into();
        assert!(matches!(pipeline_err, PipelineError::Export(CsvError::NoHeaders)));

        let report_err: ReportError = ConfigError::EmptyCensusTag("early").into();
        assert!(report_err.to_string().contains("early"));
    }

    #[test]
    fn test_cardinality_error_format() {
        let err = JoinError::CardinalityViolation {
            table: "program_data",
            key: "(ARTS, BA, BIOL)".into(),
            count: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("program_data"));
        assert!(msg.contains("(ARTS, BA, BIOL)"));
        assert!(msg.contains("2 times"));
    }

    #[test]
    fn test_load_error_keeps_source() {
        let err = LoadError::Csv {
            table: "fall_enrollment",
            source: CsvError::EmptyFile,
        };
        assert!(err.to_string().contains("fall_enrollment"));
        assert!(std::error::Error::source(&err).is_some());
    }
}

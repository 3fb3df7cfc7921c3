//! # Termcensus - student-term persistence from census snapshots
//!
//! Termcensus turns three institutional-research extracts (fall enrollment at
//! two census points, course grades, and a program catalog) into one row per
//! student-term with persistence, late major declaration, demographics, age
//! and term GPA, then reports on that file.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │  3 CSV files│────▶│   Loader    │────▶│  Transform  │────▶│ student-level│
//! │  (auto-enc) │     │ (typed rows)│     │(census+GPA) │     │     CSV      │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬───────┘
//!                                                                    ▼
//!                                                             ┌──────────────┐
//!                                                             │    Report    │
//!                                                             │ (xlsx+charts)│
//!                                                             └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use termcensus::{run, PipelineConfig};
//!
//! let outcome = run(&PipelineConfig::from_dirs("data", "out"))?;
//! println!("Persisted: {}", outcome.summary.derive.persisted);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`logs`] - Run log forwarded to the `log` facade
//! - [`config`] - Pipeline and report configuration
//! - [`models`] - Domain models (rows, keys, grades, exported record)
//! - [`parser`] - CSV parsing with auto-detection
//! - [`loader`] - Input tables and key coverage
//! - [`transform`] - GPA, joins, census merge, derivation, pipeline
//! - [`validation`] - Student-level schema validation
//! - [`export`] - Student-level CSV writer and reader
//! - [`report`] - Analytical tables, histogram charts and the xlsx workbook

// Core modules
pub mod config;
pub mod error;
pub mod logs;
pub mod models;

// Input
pub mod loader;
pub mod parser;

// Transformation
pub mod transform;

// Output
pub mod export;
pub mod validation;

// Reporting
pub mod report;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, CsvError, JoinError, LoadError, PipelineError, PipelineResult, ReportError,
    ValidationError,
};

// =============================================================================
// Re-exports - Config and logging
// =============================================================================

pub use config::{PipelineConfig, ReportConfig};
pub use logs::{LogEntry, LogLevel, RunLog};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    CensusSnapshot, CensusTags, LetterGrade, MergedStudentTerm, RaceEthnicity, StudentLevelRecord,
    StudentTermKey,
};

// =============================================================================
// Re-exports - Parsing and loading
// =============================================================================

pub use loader::{coverage, load_inputs, Coverage, InputTables};
pub use parser::{parse_csv_file_auto, ParseResult};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{build_student_level, run, PipelineOutcome, PipelineSummary};

// =============================================================================
// Re-exports - Validation and export
// =============================================================================

pub use export::{read_student_level_csv, write_student_level_csv};
pub use validation::{validate_records, validate_student_level, ValidationSummary};

// =============================================================================
// Re-exports - Report
// =============================================================================

pub use report::{build_workbook, run_report, Chart, ReportOutcome, Sheet, Workbook};

//! High-level pipeline API: three input tables to the student-level file.
//!
//! Combines loading, term aggregation, joins, the census split/merge, field
//! derivation, collapse, schema validation and export.
//!
//! # Example
//!
//! ```rust,ignore
//! use termcensus::{run, PipelineConfig};
//!
//! let config = PipelineConfig::from_dirs("data", "out");
//! let outcome = run(&config)?;
//! println!("{} student-terms", outcome.records.len());
//! ```

use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::export::write_student_level_csv;
use crate::loader::{coverage, load_inputs, log_coverage, Coverage, InputTables};
use crate::logs::RunLog;
use crate::models::StudentLevelRecord;
use crate::validation::{validate_records, ValidationSummary};

use super::census::{split_and_merge, CensusStats};
use super::collapse::{collapse, DuplicateStats};
use super::derive::{derive_all, DeriveStats};
use super::grades::summarize;
use super::join::{join_enrollment, JoinStats, ProgramCatalog};

const STAGE: &str = "pipeline";

/// Validation messages printed per invalid record.
const ERRORS_PER_RECORD: usize = 3;

/// Diagnostics collected over one run.
#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub coverage: Coverage,
    pub join: JoinStats,
    pub census: CensusStats,
    pub derive: DeriveStats,
    pub duplicates: DuplicateStats,
    /// Grade rows whose letter is not on the 4.0 scale.
    pub unmappable_grades: usize,
    /// `None` when validation was skipped.
    pub validation: Option<ValidationSummary>,
}

/// Result of a complete run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub records: Vec<StudentLevelRecord>,
    pub summary: PipelineSummary,
    pub log: RunLog,
}

/// Build student-level rows from already loaded tables.
///
/// Coverage and validation are left at their defaults; [`run`] fills them.
pub fn build_student_level(
    tables: &InputTables,
    config: &PipelineConfig,
    log: &mut RunLog,
) -> PipelineResult<(Vec<StudentLevelRecord>, PipelineSummary)> {
    let grades = summarize(&tables.grades);
    log.info(
        "grades",
        format!("term GPA rows: {} (from {} grade rows)", grades.gpa.len(), tables.grades.len()),
    );
    if grades.unmappable > 0 {
        log.info(
            "grades",
            format!("{} grade rows not on the 4.0 scale, excluded from GPA", grades.unmappable),
        );
    }

    let catalog = ProgramCatalog::from_entries(&tables.programs)?;
    log.info("join", format!("program catalog: {} entries", catalog.len()));

    let (joined, join) = join_enrollment(&tables.enrollment, &grades.raw_counts, &catalog, log);
    let (pairs, census) = split_and_merge(joined, &config.census, log);
    let (merged, derive) = derive_all(pairs, &grades.gpa, &config.undeclared_prefix, log);
    let (records, duplicates) = collapse(&merged, log);

    let summary = PipelineSummary {
        join,
        census,
        derive,
        duplicates,
        unmappable_grades: grades.unmappable,
        ..Default::default()
    };
    Ok((records, summary))
}

/// Run the whole pipeline and write the student-level file.
pub fn run(config: &PipelineConfig) -> PipelineResult<PipelineOutcome> {
    let mut log = RunLog::new();
    config.validate()?;

    log.info(STAGE, "loading data...");
    let tables = load_inputs(config, &mut log)?;

    let cov = coverage(&tables.enrollment, &tables.grades);
    log_coverage(&cov, &mut log);

    let (records, mut summary) = build_student_level(&tables, config, &mut log)?;
    summary.coverage = cov;

    if config.skip_validation {
        log.info("validate", "schema validation skipped");
    } else {
        let validation = validate_records(&records)?;
        log_validation(&validation, &mut log);
        summary.validation = Some(validation);
    }

    write_student_level_csv(&config.output_path, &records)?;
    log.success(
        STAGE,
        format!(
            "saved {} student-level rows to {}",
            records.len(),
            config.output_path.display()
        ),
    );

    Ok(PipelineOutcome {
        records,
        summary,
        log,
    })
}

fn log_validation(validation: &ValidationSummary, log: &mut RunLog) {
    if validation.is_clean() {
        log.success("validate", format!("all {} records valid", validation.valid));
        return;
    }

    log.warning(
        "validate",
        format!("{} valid, {} invalid", validation.valid, validation.invalid),
    );
    for (index, errors) in &validation.errors {
        let detail = errors
            .iter()
            .take(ERRORS_PER_RECORD)
            .cloned()
            .collect::<Vec<_>>()
            .join("; ");
        log.warning("validate", format!("record {index}: {detail}"));
    }
}

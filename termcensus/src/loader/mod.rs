//! Loads the three input tables and reports key coverage.
//!
//! Each table is parsed, its required columns checked, and its rows decoded
//! into typed records with trimmed `id`/`term_code` keys. Coverage between the
//! enrollment and grade keys is informational only.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

use crate::config::PipelineConfig;
use crate::error::{LoadError, LoadResult};
use crate::logs::RunLog;
use crate::models::{EnrollmentRow, GradeRow, ProgramEntry, StudentTermKey};
use crate::parser::parse_csv_file_auto;

const STAGE: &str = "load";

/// Number of example keys shown per mismatch direction.
pub const MISMATCH_SAMPLE: usize = 10;

pub const ENROLLMENT_COLUMNS: [&str; 11] = [
    "id",
    "term_code",
    "census",
    "college",
    "degr",
    "majr",
    "race_desc",
    "ethn_desc",
    "visa_desc",
    "legal_sex_desc",
    "birth_date",
];

pub const GRADE_COLUMNS: [&str; 3] = ["id", "term_code", "final_course_grade"];

pub const PROGRAM_COLUMNS: [&str; 4] = ["COLLEGE", "DEGREE", "MAJOR", "PROGRAM"];

/// The three decoded input tables.
#[derive(Debug, Clone, Default)]
pub struct InputTables {
    pub enrollment: Vec<EnrollmentRow>,
    pub grades: Vec<GradeRow>,
    pub programs: Vec<ProgramEntry>,
}

/// Key overlap between enrollment and grades.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Coverage {
    pub enrollment_keys: usize,
    pub grade_keys: usize,
    pub matched: usize,
    /// Enrollment keys with no grade rows (sorted, truncated).
    pub enrollment_only: Vec<StudentTermKey>,
    /// Grade keys with no enrollment rows (sorted, truncated).
    pub grades_only: Vec<StudentTermKey>,
}

impl Coverage {
    /// Share of enrollment keys that have grades.
    pub fn matched_ratio(&self) -> f64 {
        self.matched as f64 / self.enrollment_keys.max(1) as f64
    }
}

/// Load and decode one table, checking its required columns first.
pub fn load_table<T: DeserializeOwned>(
    path: &Path,
    table: &'static str,
    required: &[&str],
    log: &mut RunLog,
) -> LoadResult<Vec<T>> {
    let parsed = parse_csv_file_auto(path).map_err(|source| LoadError::Csv { table, source })?;

    if let Some(column) = parsed.first_missing(required) {
        return Err(LoadError::MissingRequiredColumn {
            table,
            column: column.to_string(),
        });
    }

    log.info(
        STAGE,
        format!(
            "{table}: {} rows x {} columns (encoding {}, delimiter {:?})",
            parsed.row_count(),
            parsed.column_count(),
            parsed.encoding,
            parsed.delimiter
        ),
    );

    parsed
        .deserialize()
        .map_err(|source| LoadError::Csv { table, source })
}

/// Load all three inputs named by the config.
pub fn load_inputs(config: &PipelineConfig, log: &mut RunLog) -> LoadResult<InputTables> {
    let enrollment: Vec<EnrollmentRow> = load_table(
        &config.enrollment_path,
        "fall_enrollment",
        &ENROLLMENT_COLUMNS,
        log,
    )?;
    let grades: Vec<GradeRow> = load_table(&config.grades_path, "grades", &GRADE_COLUMNS, log)?;
    let programs: Vec<ProgramEntry> =
        load_table(&config.program_path, "program_data", &PROGRAM_COLUMNS, log)?;

    log.info(
        STAGE,
        format!(
            "Terms in enrollment: {:?}",
            sample_terms(enrollment.iter().map(|r| r.term_code.as_str()))
        ),
    );
    log.info(
        STAGE,
        format!(
            "Terms in grades: {:?}",
            sample_terms(grades.iter().map(|r| r.term_code.as_str()))
        ),
    );

    Ok(InputTables {
        enrollment,
        grades,
        programs,
    })
}

/// Up to ten distinct term codes, sorted.
fn sample_terms<'a>(terms: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    terms
        .collect::<BTreeSet<_>>()
        .into_iter()
        .take(MISMATCH_SAMPLE)
        .collect()
}

/// Compare the (id, term_code) key sets of enrollment and grades.
pub fn coverage(enrollment: &[EnrollmentRow], grades: &[GradeRow]) -> Coverage {
    let enroll_keys: BTreeSet<StudentTermKey> = enrollment.iter().map(EnrollmentRow::key).collect();
    let grade_keys: BTreeSet<StudentTermKey> = grades.iter().map(GradeRow::key).collect();

    Coverage {
        enrollment_keys: enroll_keys.len(),
        grade_keys: grade_keys.len(),
        matched: enroll_keys.intersection(&grade_keys).count(),
        enrollment_only: enroll_keys
            .difference(&grade_keys)
            .take(MISMATCH_SAMPLE)
            .cloned()
            .collect(),
        grades_only: grade_keys
            .difference(&enroll_keys)
            .take(MISMATCH_SAMPLE)
            .cloned()
            .collect(),
    }
}

/// Write the coverage diagnostics to the run log.
pub fn log_coverage(cov: &Coverage, log: &mut RunLog) {
    log.info(STAGE, "(id, term_code) coverage between enrollment and grades");
    log.info(STAGE, format!("enrollment keys: {}", cov.enrollment_keys));
    log.info(STAGE, format!("grades keys: {}", cov.grade_keys));
    log.info(
        STAGE,
        format!(
            "matched: {} ({:.1}% of enrollment)",
            cov.matched,
            cov.matched_ratio() * 100.0
        ),
    );

    if !cov.enrollment_only.is_empty() {
        log.warning(
            STAGE,
            format!("sample enrollment -> no grades: {}", join_keys(&cov.enrollment_only)),
        );
    }
    if !cov.grades_only.is_empty() {
        log.warning(
            STAGE,
            format!("sample grades -> no enrollment: {}", join_keys(&cov.grades_only)),
        );
    }
}

fn join_keys(keys: &[StudentTermKey]) -> String {
    keys.iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn enrollment(id: &str, term: &str) -> EnrollmentRow {
        EnrollmentRow {
            id: id.into(),
            term_code: term.into(),
            ..Default::default()
        }
    }

    fn grade(id: &str, term: &str) -> GradeRow {
        GradeRow {
            id: id.into(),
            term_code: term.into(),
            final_course_grade: Some("A".into()),
        }
    }

    #[test]
    fn test_coverage_counts() {
        let enroll = vec![
            enrollment("1", "202210"),
            enrollment("1", "202210"),
            enrollment("2", "202210"),
            enrollment("3", "202210"),
        ];
        let grades = vec![grade("1", "202210"), grade("2", "202210"), grade("9", "202210")];

        let cov = coverage(&enroll, &grades);
        assert_eq!(cov.enrollment_keys, 3);
        assert_eq!(cov.grade_keys, 3);
        assert_eq!(cov.matched, 2);
        assert_eq!(cov.enrollment_only, vec![StudentTermKey::new("3", "202210")]);
        assert_eq!(cov.grades_only, vec![StudentTermKey::new("9", "202210")]);
        assert!((cov.matched_ratio() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_coverage_sample_is_capped() {
        let enroll: Vec<_> = (0..25).map(|i| enrollment(&i.to_string(), "202210")).collect();
        let cov = coverage(&enroll, &[]);
        assert_eq!(cov.enrollment_only.len(), MISMATCH_SAMPLE);
        assert_eq!(cov.matched_ratio(), 0.0);
    }

    #[test]
    fn test_coverage_empty_tables() {
        let cov = coverage(&[], &[]);
        assert_eq!(cov.matched_ratio(), 0.0);
    }

    #[test]
    fn test_load_table_missing_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grades.csv");
        std::fs::write(&path, "id,final_course_grade\n1,A\n").unwrap();

        let mut log = RunLog::new();
        let err = load_table::<GradeRow>(&path, "grades", &GRADE_COLUMNS, &mut log).unwrap_err();
        assert!(matches!(
            err,
            LoadError::MissingRequiredColumn { table: "grades", ref column } if column == "term_code"
        ));
    }

    #[test]
    fn test_load_table_trims_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grades.csv");
        std::fs::write(&path, "id,term_code,final_course_grade\n 12 , 202210 ,B+\n").unwrap();

        let mut log = RunLog::new();
        let rows = load_table::<GradeRow>(&path, "grades", &GRADE_COLUMNS, &mut log).unwrap();
        assert_eq!(rows[0].key(), StudentTermKey::new("12", "202210"));
        assert_eq!(rows[0].final_course_grade.as_deref(), Some("B+"));
        assert_eq!(log.entries().len(), 1);
    }

    #[test]
    fn test_load_table_missing_file() {
        let dir = tempdir().unwrap();
        let mut log = RunLog::new();
        let err = load_table::<GradeRow>(&dir.path().join("nope.csv"), "grades", &GRADE_COLUMNS, &mut log)
            .unwrap_err();
        assert!(matches!(err, LoadError::Csv { table: "grades", .. }));
    }
}

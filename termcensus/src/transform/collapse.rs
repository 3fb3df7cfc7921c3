//! Projection to the exported student-level rows.

use std::collections::{HashMap, HashSet};

use crate::logs::RunLog;
use crate::models::{MergedStudentTerm, StudentLevelRecord, StudentTermKey};

const STAGE: &str = "collapse";

/// Round half to even at two decimals, the way the reporting tools round.
pub fn round_gpa(gpa: f64) -> f64 {
    (gpa * 100.0).round_ties_even() / 100.0
}

/// Project one merged row to the exported field set.
pub fn project(row: &MergedStudentTerm) -> StudentLevelRecord {
    StudentLevelRecord {
        id: row.key.id.clone(),
        term_code: row.key.term_code.clone(),
        gender: row.gender.clone(),
        race_ethnicity: row.race_ethnicity.to_string(),
        age: row.age,
        college: row.college.clone(),
        degree: row.degree.clone(),
        major: row.major.clone(),
        program: row.program.clone(),
        term_gpa: row.term_gpa.map(round_gpa),
        course_count: row.course_count.and_then(|c| u32::try_from(c).ok()),
        persisted: row.persisted,
        declared_late: row.declared_late,
    }
}

/// Duplicate counters from [`dedupe_records`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DuplicateStats {
    /// Rows sharing their key with at least one other row, first occurrences included.
    pub duplicated_rows: usize,
    /// Rows removed.
    pub dropped: usize,
}

/// Keep the first row of each (id, term_code), in current order.
pub fn dedupe_records(records: Vec<StudentLevelRecord>) -> (Vec<StudentLevelRecord>, DuplicateStats) {
    let mut counts: HashMap<StudentTermKey, usize> = HashMap::new();
    for record in &records {
        *counts.entry(record.key()).or_insert(0) += 1;
    }
    let duplicated_rows = counts.values().filter(|&&c| c > 1).sum();

    let before = records.len();
    let mut seen = HashSet::new();
    let kept: Vec<StudentLevelRecord> = records
        .into_iter()
        .filter(|r| seen.insert(r.key()))
        .collect();

    let stats = DuplicateStats {
        duplicated_rows,
        dropped: before - kept.len(),
    };
    (kept, stats)
}

/// Project, round and deduplicate.
pub fn collapse(rows: &[MergedStudentTerm], log: &mut RunLog) -> (Vec<StudentLevelRecord>, DuplicateStats) {
    let projected: Vec<StudentLevelRecord> = rows.iter().map(project).collect();
    let (records, stats) = dedupe_records(projected);

    if stats.dropped > 0 {
        log.warning(
            STAGE,
            format!(
                "duplicates at (id, term_code): {} rows, keeping first occurrence ({} dropped)",
                stats.duplicated_rows, stats.dropped
            ),
        );
    }
    log.info(STAGE, format!("student-level rows: {}", records.len()));

    (records, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RaceEthnicity, SnapshotAttributes};

    fn merged(id: &str, major: &str, gpa: Option<f64>) -> MergedStudentTerm {
        MergedStudentTerm {
            key: StudentTermKey::new(id, "202210"),
            early: SnapshotAttributes::default(),
            end: SnapshotAttributes::default(),
            enrolled_early: true,
            enrolled_end: true,
            persisted: true,
            declared_late: false,
            race_ethnicity: RaceEthnicity::Unknown,
            age: Some(20),
            program: None,
            degree: Some("BA".into()),
            major: Some(major.into()),
            college: Some("ARTS".into()),
            gender: Some("Female".into()),
            term_gpa: gpa,
            course_count: gpa.map(|_| 3),
        }
    }

    #[test]
    fn test_round_gpa() {
        assert_eq!(round_gpa(3.0), 3.0);
        assert_eq!(round_gpa(10.0 / 3.0), 3.33);
        assert_eq!(round_gpa(3.666_666), 3.67);
        assert_eq!(round_gpa(0.125), 0.12);
    }

    #[test]
    fn test_project_fields() {
        let record = project(&merged("1", "BIOL", Some(3.456)));
        assert_eq!(record.id, "1");
        assert_eq!(record.race_ethnicity, "Unknown");
        assert_eq!(record.term_gpa, Some(3.46));
        assert_eq!(record.course_count, Some(3));
        assert!(record.persisted);
    }

    #[test]
    fn test_missing_gpa_stays_missing() {
        let record = project(&merged("1", "BIOL", None));
        assert_eq!(record.term_gpa, None);
        assert_eq!(record.course_count, None);
    }

    #[test]
    fn test_duplicate_keys_keep_first() {
        let rows = vec![merged("1", "BIOL", None), merged("1", "CHEM", None), merged("2", "MATH", None)];
        let mut log = RunLog::new();
        let (records, stats) = collapse(&rows, &mut log);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].major.as_deref(), Some("BIOL"));
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.duplicated_rows, 2);
        assert!(log
            .stage("collapse")
            .any(|e| e.message.contains("1 dropped")));
    }

    #[test]
    fn test_no_duplicates_no_warning() {
        let rows = vec![merged("1", "BIOL", None), merged("2", "CHEM", None)];
        let mut log = RunLog::new();
        let (_, stats) = collapse(&rows, &mut log);
        assert_eq!(stats, DuplicateStats::default());
        assert_eq!(log.warning_count(), 0);
    }
}

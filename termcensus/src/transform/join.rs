//! Enrollment joins: per-term course counts and the program catalog.
//!
//! Both joins are many-to-one left joins. The catalog side is checked up
//! front: two catalog rows normalizing to the same (college, degree, major)
//! key abort the run.

use std::collections::{BTreeMap, HashMap};

use crate::error::JoinError;
use crate::logs::RunLog;
use crate::models::{EnrollmentRow, JoinedEnrollment, ProgramEntry, SnapshotAttributes, StudentTermKey};

const STAGE: &str = "join";

/// Normalized (college, degree, major) catalog key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramKey {
    college: String,
    degree: String,
    major: String,
}

impl ProgramKey {
    /// Trim and upper-case each part; a missing part is empty text.
    pub fn new(college: Option<&str>, degree: Option<&str>, major: Option<&str>) -> Self {
        fn norm(part: Option<&str>) -> String {
            part.map(|s| s.trim().to_uppercase()).unwrap_or_default()
        }
        Self {
            college: norm(college),
            degree: norm(degree),
            major: norm(major),
        }
    }
}

impl std::fmt::Display for ProgramKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.college, self.degree, self.major)
    }
}

/// Lookup from (college, degree, major) to canonical program name.
#[derive(Debug, Clone, Default)]
pub struct ProgramCatalog {
    programs: HashMap<ProgramKey, Option<String>>,
}

impl ProgramCatalog {
    /// Build the catalog, rejecting duplicate keys.
    pub fn from_entries(entries: &[ProgramEntry]) -> Result<Self, JoinError> {
        let mut counts: HashMap<ProgramKey, usize> = HashMap::new();
        let mut programs = HashMap::new();

        for entry in entries {
            let key = ProgramKey::new(
                entry.college.as_deref(),
                entry.degree.as_deref(),
                entry.major.as_deref(),
            );
            *counts.entry(key.clone()).or_insert(0) += 1;
            programs.entry(key).or_insert_with(|| entry.program.clone());
        }

        let mut duplicates: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(_, c)| *c > 1)
            .map(|(k, c)| (k.to_string(), c))
            .collect();
        duplicates.sort();
        if let Some((key, count)) = duplicates.into_iter().next() {
            return Err(JoinError::CardinalityViolation {
                table: "program_data",
                key,
                count,
            });
        }

        Ok(Self { programs })
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Program for an enrollment row, if the catalog has one.
    pub fn lookup(&self, college: Option<&str>, degree: Option<&str>, major: Option<&str>) -> Option<&str> {
        self.programs
            .get(&ProgramKey::new(college, degree, major))
            .and_then(|p| p.as_deref())
    }
}

/// Counters reported by [`join_enrollment`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JoinStats {
    pub rows: usize,
    pub distinct_keys: usize,
    /// Enrollment rows with no grade rows at all for their term.
    pub without_grades: usize,
    pub program_matched: usize,
    pub program_missing: usize,
}

/// Attach raw course counts and programs to every enrollment row.
pub fn join_enrollment(
    enrollment: &[EnrollmentRow],
    raw_counts: &BTreeMap<StudentTermKey, usize>,
    catalog: &ProgramCatalog,
    log: &mut RunLog,
) -> (Vec<JoinedEnrollment>, JoinStats) {
    let joined: Vec<JoinedEnrollment> = enrollment
        .iter()
        .map(|row| {
            let key = row.key();
            let program = catalog
                .lookup(row.college.as_deref(), row.degree.as_deref(), row.major.as_deref())
                .map(String::from);
            JoinedEnrollment {
                raw_course_count: raw_counts.get(&key).copied(),
                census: row.census.clone(),
                attributes: SnapshotAttributes::from_row(row, program),
                key,
            }
        })
        .collect();

    let program_matched = joined.iter().filter(|j| j.attributes.program.is_some()).count();
    let stats = JoinStats {
        rows: joined.len(),
        distinct_keys: joined
            .iter()
            .map(|j| &j.key)
            .collect::<std::collections::BTreeSet<_>>()
            .len(),
        without_grades: joined.iter().filter(|j| j.raw_course_count.is_none()).count(),
        program_matched,
        program_missing: joined.len() - program_matched,
    };

    log.info(STAGE, format!("enrollment <- grade counts: {} rows", stats.rows));
    log.info(STAGE, format!("unique (id, term): {}", stats.distinct_keys));
    log.info(
        STAGE,
        format!("{} rows without any grade rows (no graded activity)", stats.without_grades),
    );
    log.info(
        STAGE,
        format!("program matched for {} of {} records", stats.program_matched, stats.rows),
    );
    if stats.program_missing > 0 {
        log.warning(
            STAGE,
            format!("program missing for {} records", stats.program_missing),
        );
    }

    (joined, stats)
}

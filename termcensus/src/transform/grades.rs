//! Term GPA aggregation.
//!
//! Grade rows collapse to one row per student-term. Only letters on the
//! 4.0 scale count toward GPA; withdrawals, incompletes and pass/fail marks are
//! excluded, so a student-term without any such grade has no GPA row at all.

use std::collections::BTreeMap;

use crate::models::{GradeRow, LetterGrade, StudentTermKey};

/// GPA of one student-term.
#[derive(Debug, Clone, PartialEq)]
pub struct TermGpa {
    /// Mean grade points of the contributing courses.
    pub term_gpa: f64,
    /// Number of courses that contributed to the mean.
    pub course_count: usize,
}

/// Output of the term aggregation.
#[derive(Debug, Clone, Default)]
pub struct GradeSummary {
    pub gpa: BTreeMap<StudentTermKey, TermGpa>,
    /// Grade rows per student-term, before the letter-grade filter.
    pub raw_counts: BTreeMap<StudentTermKey, usize>,
    /// Grade rows excluded because their grade is not on the 4.0 scale.
    pub unmappable: usize,
}

/// Count every grade row per student-term.
pub fn raw_course_counts(grades: &[GradeRow]) -> BTreeMap<StudentTermKey, usize> {
    let mut counts = BTreeMap::new();
    for row in grades {
        *counts.entry(row.key()).or_insert(0) += 1;
    }
    counts
}

/// Mean grade points per student-term.
///
/// Returns the GPA table and the number of excluded rows.
pub fn term_gpa(grades: &[GradeRow]) -> (BTreeMap<StudentTermKey, TermGpa>, usize) {
    let mut sums: BTreeMap<StudentTermKey, (f64, usize)> = BTreeMap::new();
    let mut unmappable = 0;

    for row in grades {
        let points = row
            .final_course_grade
            .as_deref()
            .and_then(LetterGrade::from_code)
            .map(|g| g.points());

        match points {
            Some(p) => {
                let entry = sums.entry(row.key()).or_insert((0.0, 0));
                entry.0 += p;
                entry.1 += 1;
            }
            None => unmappable += 1,
        }
    }

    let gpa = sums
        .into_iter()
        .map(|(key, (sum, count))| {
            (
                key,
                TermGpa {
                    term_gpa: sum / count as f64,
                    course_count: count,
                },
            )
        })
        .collect();

    (gpa, unmappable)
}

/// Run both aggregations.
pub fn summarize(grades: &[GradeRow]) -> GradeSummary {
    let raw_counts = raw_course_counts(grades);
    let (gpa, unmappable) = term_gpa(grades);
    GradeSummary {
        gpa,
        raw_counts,
        unmappable,
    }
}

//! Domain models for the termcensus pipeline.
//!
//! - [`EnrollmentRow`], [`GradeRow`], [`ProgramEntry`] - raw input rows
//! - [`StudentTermKey`] - the (id, term_code) join key
//! - [`CensusSnapshot`] / [`CensusTags`] - the two census points of a term
//! - [`SnapshotAttributes`] - attributes recorded at one census point
//! - [`LetterGrade`] - the fixed letter-grade to grade-points scale
//! - [`RaceEthnicity`] - the derived demographic category
//! - [`MergedStudentTerm`] - one row per student-term with both snapshots
//! - [`StudentLevelRecord`] - the exported row

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::parser::{deserialize_key, deserialize_na};

// =============================================================================
// Join key
// =============================================================================

/// A student in a given term.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StudentTermKey {
    pub id: String,
    pub term_code: String,
}

impl StudentTermKey {
    pub fn new(id: impl Into<String>, term_code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            term_code: term_code.into(),
        }
    }
}

impl fmt::Display for StudentTermKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.id, self.term_code)
    }
}

// =============================================================================
// Raw input rows
// =============================================================================

/// One row of the enrollment table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnrollmentRow {
    #[serde(deserialize_with = "deserialize_key")]
    pub id: String,
    #[serde(deserialize_with = "deserialize_key")]
    pub term_code: String,
    #[serde(default, deserialize_with = "deserialize_na")]
    pub census: Option<String>,
    #[serde(default, deserialize_with = "deserialize_na")]
    pub college: Option<String>,
    #[serde(default, rename = "degr", deserialize_with = "deserialize_na")]
    pub degree: Option<String>,
    #[serde(default, rename = "majr", deserialize_with = "deserialize_na")]
    pub major: Option<String>,
    #[serde(default, deserialize_with = "deserialize_na")]
    pub race_desc: Option<String>,
    #[serde(default, deserialize_with = "deserialize_na")]
    pub ethn_desc: Option<String>,
    #[serde(default, deserialize_with = "deserialize_na")]
    pub visa_desc: Option<String>,
    #[serde(default, deserialize_with = "deserialize_na")]
    pub legal_sex_desc: Option<String>,
    #[serde(default, deserialize_with = "deserialize_na")]
    pub birth_date: Option<String>,
}

impl EnrollmentRow {
    pub fn key(&self) -> StudentTermKey {
        StudentTermKey::new(self.id.clone(), self.term_code.clone())
    }
}

/// One course grade.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GradeRow {
    #[serde(deserialize_with = "deserialize_key")]
    pub id: String,
    #[serde(deserialize_with = "deserialize_key")]
    pub term_code: String,
    #[serde(default, deserialize_with = "deserialize_na")]
    pub final_course_grade: Option<String>,
}

impl GradeRow {
    pub fn key(&self) -> StudentTermKey {
        StudentTermKey::new(self.id.clone(), self.term_code.clone())
    }
}

/// One program catalog entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgramEntry {
    #[serde(rename = "COLLEGE", default, deserialize_with = "deserialize_na")]
    pub college: Option<String>,
    #[serde(rename = "DEGREE", default, deserialize_with = "deserialize_na")]
    pub degree: Option<String>,
    #[serde(rename = "MAJOR", default, deserialize_with = "deserialize_na")]
    pub major: Option<String>,
    #[serde(rename = "PROGRAM", default, deserialize_with = "deserialize_na")]
    pub program: Option<String>,
}

// =============================================================================
// Census snapshots
// =============================================================================

/// The census point at which a row was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CensusSnapshot {
    /// Early-term census (third week).
    Early,
    /// End-of-term census.
    EndOfTerm,
}

impl CensusSnapshot {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Early => "early",
            Self::EndOfTerm => "end-of-term",
        }
    }
}

/// Tag values used by the enrollment table's `census` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensusTags {
    pub early: String,
    pub end: String,
}

impl Default for CensusTags {
    fn default() -> Self {
        Self {
            early: "WK3".to_string(),
            end: "EOT".to_string(),
        }
    }
}

impl CensusTags {
    /// Classify a raw tag. Matching is exact; anything else is unrecognized.
    pub fn classify(&self, tag: Option<&str>) -> Option<CensusSnapshot> {
        match tag {
            Some(t) if t == self.early => Some(CensusSnapshot::Early),
            Some(t) if t == self.end => Some(CensusSnapshot::EndOfTerm),
            _ => None,
        }
    }
}

/// Attributes recorded for a student-term at one census point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotAttributes {
    pub major: Option<String>,
    pub degree: Option<String>,
    pub college: Option<String>,
    pub program: Option<String>,
    pub race_desc: Option<String>,
    pub ethn_desc: Option<String>,
    pub visa_desc: Option<String>,
    pub legal_sex_desc: Option<String>,
    pub birth_date: Option<String>,
}

impl SnapshotAttributes {
    /// Build from an enrollment row and its resolved program.
    pub fn from_row(row: &EnrollmentRow, program: Option<String>) -> Self {
        Self {
            major: row.major.clone(),
            degree: row.degree.clone(),
            college: row.college.clone(),
            program,
            race_desc: row.race_desc.clone(),
            ethn_desc: row.ethn_desc.clone(),
            visa_desc: row.visa_desc.clone(),
            legal_sex_desc: row.legal_sex_desc.clone(),
            birth_date: row.birth_date.clone(),
        }
    }

    /// Enrolled iff any of major, degree or college was recorded.
    pub fn is_enrolled(&self) -> bool {
        self.major.is_some() || self.degree.is_some() || self.college.is_some()
    }
}

/// An enrollment row after the grade and program joins.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedEnrollment {
    pub key: StudentTermKey,
    pub census: Option<String>,
    pub attributes: SnapshotAttributes,
    /// Number of raw grade rows for the student-term, before any grade filtering.
    pub raw_course_count: Option<usize>,
}

// =============================================================================
// Letter grades
// =============================================================================

/// Letter grades that count toward term GPA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LetterGrade {
    A,
    AMinus,
    BPlus,
    B,
    BMinus,
    CPlus,
    C,
    CMinus,
    DPlus,
    D,
    F,
}

impl LetterGrade {
    pub const ALL: [LetterGrade; 11] = [
        Self::A,
        Self::AMinus,
        Self::BPlus,
        Self::B,
        Self::BMinus,
        Self::CPlus,
        Self::C,
        Self::CMinus,
        Self::DPlus,
        Self::D,
        Self::F,
    ];

    /// Parse a letter grade. Surrounding whitespace is ignored; matching is
    /// case-sensitive, so `W`, `I`, `P`, `a` and friends are not GPA grades.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "A" => Some(Self::A),
            "A-" => Some(Self::AMinus),
            "B+" => Some(Self::BPlus),
            "B" => Some(Self::B),
            "B-" => Some(Self::BMinus),
            "C+" => Some(Self::CPlus),
            "C" => Some(Self::C),
            "C-" => Some(Self::CMinus),
            "D+" => Some(Self::DPlus),
            "D" => Some(Self::D),
            "F" => Some(Self::F),
            _ => None,
        }
    }

    pub fn to_code(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::AMinus => "A-",
            Self::BPlus => "B+",
            Self::B => "B",
            Self::BMinus => "B-",
            Self::CPlus => "C+",
            Self::C => "C",
            Self::CMinus => "C-",
            Self::DPlus => "D+",
            Self::D => "D",
            Self::F => "F",
        }
    }

    /// Grade points on the 4.0 scale.
    pub fn points(&self) -> f64 {
        match self {
            Self::A => 4.0,
            Self::AMinus => 3.7,
            Self::BPlus => 3.3,
            Self::B => 3.0,
            Self::BMinus => 2.7,
            Self::CPlus => 2.3,
            Self::C => 2.0,
            Self::CMinus => 1.7,
            Self::DPlus => 1.3,
            Self::D => 1.0,
            Self::F => 0.0,
        }
    }
}

// =============================================================================
// Race / ethnicity
// =============================================================================

/// Demographic category derived from visa, ethnicity and race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaceEthnicity {
    International,
    HispanicOrLatino,
    /// Recorded race description, verbatim (trimmed).
    Race(String),
    Unknown,
}

impl RaceEthnicity {
    pub fn as_str(&self) -> &str {
        match self {
            Self::International => "International",
            Self::HispanicOrLatino => "Hispanic or Latino",
            Self::Race(race) => race,
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for RaceEthnicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Merged student-term
// =============================================================================

/// One student-term carrying both census snapshots and the derived fields.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedStudentTerm {
    pub key: StudentTermKey,
    /// Early snapshot; all fields missing when the student had no early row.
    pub early: SnapshotAttributes,
    /// End-of-term snapshot; all fields missing when the student had no end row.
    pub end: SnapshotAttributes,
    pub enrolled_early: bool,
    pub enrolled_end: bool,
    pub persisted: bool,
    pub declared_late: bool,
    pub race_ethnicity: RaceEthnicity,
    pub age: Option<i32>,
    pub program: Option<String>,
    pub degree: Option<String>,
    pub major: Option<String>,
    pub college: Option<String>,
    pub gender: Option<String>,
    pub term_gpa: Option<f64>,
    pub course_count: Option<usize>,
}

// =============================================================================
// Exported record
// =============================================================================

/// Column order of the exported file.
pub const STUDENT_LEVEL_COLUMNS: [&str; 13] = [
    "id",
    "term_code",
    "gender",
    "race_ethnicity",
    "age",
    "college",
    "degree",
    "major",
    "program",
    "term_gpa",
    "course_count",
    "persisted_w3_to_end",
    "undeclared_to_declared",
];

/// One exported student-term row.
///
/// Field order matches [`STUDENT_LEVEL_COLUMNS`]; the CSV header is derived
/// from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentLevelRecord {
    pub id: String,
    pub term_code: String,
    pub gender: Option<String>,
    pub race_ethnicity: String,
    pub age: Option<i32>,
    pub college: Option<String>,
    pub degree: Option<String>,
    pub major: Option<String>,
    pub program: Option<String>,
    pub term_gpa: Option<f64>,
    pub course_count: Option<u32>,
    #[serde(rename = "persisted_w3_to_end")]
    pub persisted: bool,
    #[serde(rename = "undeclared_to_declared")]
    pub declared_late: bool,
}

impl StudentLevelRecord {
    pub fn key(&self) -> StudentTermKey {
        StudentTermKey::new(self.id.clone(), self.term_code.clone())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letter_grade_from_code() {
        assert_eq!(LetterGrade::from_code("A"), Some(LetterGrade::A));
        assert_eq!(LetterGrade::from_code(" B+ "), Some(LetterGrade::BPlus));
        assert_eq!(LetterGrade::from_code("W"), None);
        assert_eq!(LetterGrade::from_code("P"), None);
        assert_eq!(LetterGrade::from_code("a"), None);
    }

    #[test]
    fn test_letter_grade_roundtrip() {
        for grade in LetterGrade::ALL {
            assert_eq!(LetterGrade::from_code(grade.to_code()), Some(grade));
        }
    }

    #[test]
    fn test_letter_grade_points() {
        assert_eq!(LetterGrade::A.points(), 4.0);
        assert_eq!(LetterGrade::CMinus.points(), 1.7);
        assert_eq!(LetterGrade::F.points(), 0.0);
    }

    #[test]
    fn test_census_classify() {
        let tags = CensusTags::default();
        assert_eq!(tags.classify(Some("WK3")), Some(CensusSnapshot::Early));
        assert_eq!(tags.classify(Some("EOT")), Some(CensusSnapshot::EndOfTerm));
        assert_eq!(tags.classify(Some("wk3")), None);
        assert_eq!(tags.classify(Some("MID")), None);
        assert_eq!(tags.classify(None), None);
    }

    #[test]
    fn test_snapshot_enrolled() {
        let mut snap = SnapshotAttributes::default();
        assert!(!snap.is_enrolled());

        snap.race_desc = Some("Asian".into());
        assert!(!snap.is_enrolled());

        snap.degree = Some("BA".into());
        assert!(snap.is_enrolled());
    }

    #[test]
    fn test_race_ethnicity_labels() {
        assert_eq!(RaceEthnicity::International.as_str(), "International");
        assert_eq!(RaceEthnicity::HispanicOrLatino.to_string(), "Hispanic or Latino");
        assert_eq!(RaceEthnicity::Race("White".into()).as_str(), "White");
        assert_eq!(RaceEthnicity::Unknown.as_str(), "Unknown");
    }

    #[test]
    fn test_key_ordering() {
        let a = StudentTermKey::new("100", "202210");
        let b = StudentTermKey::new("100", "202220");
        let c = StudentTermKey::new("101", "202210");
        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.to_string(), "(100, 202210)");
    }
}

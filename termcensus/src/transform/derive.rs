//! Derived fields of a merged student-term.
//!
//! Each rule is a pure function over the handful of values it needs, so it can
//! be tested without building whole rows. [`derive_student_term`] wires them
//! together for one [`SnapshotPair`].

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use super::census::SnapshotPair;
use super::grades::TermGpa;
use crate::logs::RunLog;
use crate::models::{MergedStudentTerm, RaceEthnicity, SnapshotAttributes, StudentTermKey};

const STAGE: &str = "derive";

/// Visa types that do not make a student international.
pub const NON_INTERNATIONAL_VISAS: [&str; 3] = ["PR", "RF", "AS"];

/// Four-digit year, anything, two-character term suffix.
static TERM_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{4}).*(.{2})$").expect("term code pattern is valid"));

/// Earliest birth year taken at face value.
pub const MIN_BIRTH_YEAR: i32 = 1900;

/// Two-digit years at or below this fall in the 2000s, the rest in the 1900s.
const TWO_DIGIT_YEAR_PIVOT: i32 = 68;

const SHORT_YEAR_FORMATS: [&str; 4] = ["%m/%d/%y", "%m-%d-%y", "%d-%b-%y", "%y-%m-%d"];

const DATE_FORMATS: [&str; 8] = [
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%Y%m%d",
];

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

// =============================================================================
// Enrollment, persistence, declaration
// =============================================================================

/// Persisted iff enrolled at both census points.
pub fn persisted(enrolled_early: bool, enrolled_end: bool) -> bool {
    enrolled_early && enrolled_end
}

/// Undeclared at the early census, declared by the end of term.
///
/// Only persisters count. A missing major compares as empty text.
pub fn declared_late(persisted: bool, early_major: Option<&str>, end_major: Option<&str>, prefix: &str) -> bool {
    let prefix = prefix.to_uppercase();
    let undeclared = |major: Option<&str>| major.unwrap_or("").to_uppercase().starts_with(&prefix);
    persisted && undeclared(early_major) && !undeclared(end_major)
}

/// End-of-term value when the student was enrolled then, else the early value.
pub fn prefer_end_if_enrolled<'a>(enrolled_end: bool, early: Option<&'a str>, end: Option<&'a str>) -> Option<&'a str> {
    if enrolled_end {
        end
    } else {
        early
    }
}

// =============================================================================
// Race / ethnicity
// =============================================================================

/// First of (early, end) that is present and not blank, trimmed.
pub fn prefer_non_blank<'a>(early: Option<&'a str>, end: Option<&'a str>) -> Option<&'a str> {
    [early, end]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// Demographic category from resolved visa, ethnicity and race.
///
/// Precedence: a recorded visa outside [`NON_INTERNATIONAL_VISAS`] wins, then
/// Hispanic or Latino ethnicity, then the race text, then `Unknown`. A blank
/// visa is not evidence of international status.
pub fn race_ethnicity(visa: Option<&str>, ethnicity: Option<&str>, race: Option<&str>) -> RaceEthnicity {
    let visa = visa.map(|v| v.trim().to_uppercase()).unwrap_or_default();
    if !visa.is_empty() && !NON_INTERNATIONAL_VISAS.contains(&visa.as_str()) {
        return RaceEthnicity::International;
    }

    let ethnicity = ethnicity.map(str::trim).unwrap_or("");
    if ethnicity.to_lowercase() == "hispanic or latino" {
        return RaceEthnicity::HispanicOrLatino;
    }

    match race.map(str::trim) {
        Some(r) if !r.is_empty() => RaceEthnicity::Race(r.to_string()),
        _ => RaceEthnicity::Unknown,
    }
}

/// Resolve each input across snapshots (early preferred) and categorize.
pub fn race_ethnicity_for(early: &SnapshotAttributes, end: &SnapshotAttributes) -> RaceEthnicity {
    race_ethnicity(
        prefer_non_blank(early.visa_desc.as_deref(), end.visa_desc.as_deref()),
        prefer_non_blank(early.ethn_desc.as_deref(), end.ethn_desc.as_deref()),
        prefer_non_blank(early.race_desc.as_deref(), end.race_desc.as_deref()),
    )
}

// =============================================================================
// Age
// =============================================================================

/// Reference month for a term-code suffix: fall in October, spring in March,
/// summer in July. Unknown suffixes fall back to October.
pub fn reference_month(suffix: i32) -> u32 {
    match suffix {
        10 | 70 => 10,
        20 => 3,
        30 | 40 | 50 => 7,
        _ => 10,
    }
}

/// The "as-of" date of a term: the first of its reference month.
pub fn reference_date(term_code: &str) -> Option<NaiveDate> {
    let caps = TERM_CODE.captures(term_code)?;
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let suffix: i32 = caps.get(2)?.as_str().trim().parse().ok()?;
    NaiveDate::from_ymd_opt(year, reference_month(suffix), 1)
}

/// Parse a birth date in any of the formats registrar exports use.
///
/// Two-digit years pivot at 68. Dates before [`MIN_BIRTH_YEAR`] are
/// rejected, which also catches a short year read as a four-digit one.
pub fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    SHORT_YEAR_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
        .and_then(pivot_two_digit_year)
        .or_else(|| DATE_FORMATS.iter().find_map(|f| NaiveDate::parse_from_str(raw, f).ok()))
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .filter(|d| d.year() >= MIN_BIRTH_YEAR)
}

fn pivot_two_digit_year(date: NaiveDate) -> Option<NaiveDate> {
    let short = date.year().rem_euclid(100);
    let century = if short <= TWO_DIGIT_YEAR_PIVOT { 2000 } else { 1900 };
    date.with_year(century + short)
}

/// Whole years between `birth` and `as_of`.
pub fn age_on(birth: NaiveDate, as_of: NaiveDate) -> i32 {
    let mut years = as_of.year() - birth.year();
    if (as_of.month(), as_of.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    years
}

/// Age at the term's reference date. Missing when either input is unusable.
pub fn age_at_term(birth_early: Option<&str>, birth_end: Option<&str>, term_code: &str) -> Option<i32> {
    let birth = parse_birth_date(birth_early.or(birth_end)?)?;
    let as_of = reference_date(term_code)?;
    Some(age_on(birth, as_of))
}

// =============================================================================
// Row derivation
// =============================================================================

/// Derive every field for one student-term.
pub fn derive_student_term(pair: SnapshotPair, gpa: Option<&TermGpa>, undeclared_prefix: &str) -> MergedStudentTerm {
    let SnapshotPair { key, early, end } = pair;
    let early = early.unwrap_or_default();
    let end = end.unwrap_or_default();

    let enrolled_early = early.is_enrolled();
    let enrolled_end = end.is_enrolled();
    let persisted = persisted(enrolled_early, enrolled_end);

    let pick = |e: &Option<String>, l: &Option<String>| {
        prefer_end_if_enrolled(enrolled_end, e.as_deref(), l.as_deref()).map(String::from)
    };

    MergedStudentTerm {
        declared_late: declared_late(
            persisted,
            early.major.as_deref(),
            end.major.as_deref(),
            undeclared_prefix,
        ),
        race_ethnicity: race_ethnicity_for(&early, &end),
        age: age_at_term(
            early.birth_date.as_deref(),
            end.birth_date.as_deref(),
            &key.term_code,
        ),
        program: pick(&early.program, &end.program),
        degree: pick(&early.degree, &end.degree),
        major: pick(&early.major, &end.major),
        college: pick(&early.college, &end.college),
        gender: end.legal_sex_desc.clone().or_else(|| early.legal_sex_desc.clone()),
        term_gpa: gpa.map(|g| g.term_gpa),
        course_count: gpa.map(|g| g.course_count),
        enrolled_early,
        enrolled_end,
        persisted,
        key,
        early,
        end,
    }
}

/// Counters reported by [`derive_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeriveStats {
    pub rows: usize,
    pub persisted: usize,
    pub declared_late: usize,
    pub gpa_present: usize,
    pub age_missing: usize,
}

/// Derive all student-terms and attach their GPA.
pub fn derive_all(
    pairs: Vec<SnapshotPair>,
    gpa: &BTreeMap<StudentTermKey, TermGpa>,
    undeclared_prefix: &str,
    log: &mut RunLog,
) -> (Vec<MergedStudentTerm>, DeriveStats) {
    let rows: Vec<MergedStudentTerm> = pairs
        .into_iter()
        .map(|pair| {
            let term_gpa = gpa.get(&pair.key);
            derive_student_term(pair, term_gpa, undeclared_prefix)
        })
        .collect();

    let stats = DeriveStats {
        rows: rows.len(),
        persisted: rows.iter().filter(|r| r.persisted).count(),
        declared_late: rows.iter().filter(|r| r.declared_late).count(),
        gpa_present: rows.iter().filter(|r| r.term_gpa.is_some()).count(),
        age_missing: rows.iter().filter(|r| r.age.is_none()).count(),
    };

    log.info(STAGE, format!("student-terms: {}", stats.rows));
    log.info(STAGE, format!("persisted_w3_to_end = {}", stats.persisted));
    log.info(STAGE, format!("undeclared_to_declared = {}", stats.declared_late));
    log.info(STAGE, format!("term_gpa non-missing = {}", stats.gpa_present));
    if stats.age_missing > 0 {
        log.info(
            STAGE,
            format!("age missing for {} student-terms (no usable birth date or term code)", stats.age_missing),
        );
    }

    (rows, stats)
}

//! Reporting stage: analytical tables over the student-level file.
//!
//! Every table is a [`Sheet`]. Tables that share a worksheet are sections of
//! it, and the age, GPA and degree sheets carry a histogram [`Chart`]. Charts
//! are rendered into a scratch directory, embedded by [`Workbook::write_dir`]
//! and removed with the directory whether or not the write succeeds.
//!
//! # Example
//!
//! ```rust,ignore
//! use termcensus::{run_report, ReportConfig, RunLog};
//!
//! let config = ReportConfig::new("out/student_level_final_data.csv", "out/report");
//! let mut log = RunLog::new();
//! let outcome = run_report(&config, &mut log)?;
//! println!("{} worksheets", outcome.workbook.sheets.len());
//! ```

pub mod charts;
pub mod stats;
pub mod workbook;

use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use crate::config::ReportConfig;
use crate::error::{ReportError, ReportResult};
use crate::export::read_student_level_csv;
use crate::logs::RunLog;
use crate::models::StudentLevelRecord;

pub use stats::{describe, histogram, two_proportion_ztest, value_counts, Describe, ZTest};
pub use charts::{render_charts, Chart, Series};
pub use workbook::{Sheet, Workbook, REPORT_JSON, REPORT_XLSX};

use stats::{bin_counts, linspace, round_to, Bin};

const STAGE: &str = "report";

/// Bins of the age and GPA histograms.
pub const HISTOGRAM_BINS: usize = 10;

/// GPA bins per degree: 20 bins of width 0.2 over [0, 4].
pub const DEGREE_GPA_BINS: usize = 20;

/// H2, to the right of the describe table.
const DISTRIBUTION_CHART_ANCHOR: (u32, u16) = (1, 7);

/// J2, to the right of the degree bin table.
const DEGREE_CHART_ANCHOR: (u32, u16) = (1, 9);

const UNDECLARED_NOTE: &str = "Denominator of all early-census undeclared students is not present \
in the student-level file; reporting share of total and of persisters.";

fn ratio(numerator: usize, denominator: usize, decimals: i32) -> Value {
    if denominator == 0 {
        return Value::Null;
    }
    json!(round_to(numerator as f64 / denominator as f64, decimals))
}

fn percent(count: usize, total: usize) -> Value {
    if total == 0 {
        return Value::Null;
    }
    json!(round_to(count as f64 / total as f64 * 100.0, 2))
}

fn rounded(value: Option<f64>, decimals: i32) -> Value {
    json!(value.map(|v| round_to(v, decimals)))
}

// =============================================================================
// 1. Persistence
// =============================================================================

pub fn persistence_sheet(records: &[StudentLevelRecord]) -> Sheet {
    let total = records.len();
    let persisted = records.iter().filter(|r| r.persisted).count();

    let mut sheet = Sheet::new("Persistence rate", &["metric", "value"]);
    sheet.push(vec![json!("total_students"), json!(total)]);
    sheet.push(vec![json!("persisted_students"), json!(persisted)]);
    sheet.push(vec![json!("persistence_rate"), ratio(persisted, total, 6)]);
    sheet
}

// =============================================================================
// 2. Persistence by gender
// =============================================================================

/// (n_total, n_persisted) per gender, missing gender excluded.
fn gender_counts(records: &[StudentLevelRecord]) -> BTreeMap<&str, (usize, usize)> {
    let mut groups: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for record in records {
        if let Some(gender) = record.gender.as_deref() {
            let entry = groups.entry(gender).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += usize::from(record.persisted);
        }
    }
    groups
}

pub fn gender_persistence_sheet(records: &[StudentLevelRecord]) -> Sheet {
    let mut sheet = Sheet::new(
        "Gender diff (tables)",
        &["gender", "n_total", "n_persisted", "persist_rate"],
    );
    for (gender, (total, persisted)) in gender_counts(records) {
        sheet.push(vec![
            json!(gender),
            json!(total),
            json!(persisted),
            ratio(persisted, total, 6),
        ]);
    }
    sheet
}

/// Male vs Female persistence, two-sided pooled z-test.
pub fn gender_ztest(records: &[StudentLevelRecord]) -> Option<ZTest> {
    let groups = gender_counts(records);
    let (male_n, male_p) = *groups.get("Male")?;
    let (female_n, female_p) = *groups.get("Female")?;
    two_proportion_ztest(male_p, male_n, female_p, female_n)
}

pub fn gender_ztest_sheet(records: &[StudentLevelRecord]) -> Sheet {
    let test = gender_ztest(records);
    let mut sheet = Sheet::new(
        "Two-proportion z-test (Male vs Female)",
        &["comparison", "z_stat", "p_value"],
    );
    sheet.push(vec![
        json!("Male vs Female"),
        rounded(test.map(|t| t.z_stat), 6),
        rounded(test.map(|t| t.p_value), 6),
    ]);
    sheet
}

// =============================================================================
// 3. Class makeup
// =============================================================================

fn makeup_sheet<'a>(
    name: &str,
    column: &str,
    labels: impl Iterator<Item = Option<&'a str>>,
    total: usize,
) -> Sheet {
    let mut sheet = Sheet::new(name, &[column, "count", "percent"]);
    for (label, count) in value_counts(labels) {
        sheet.push(vec![json!(label), json!(count), percent(count, total)]);
    }
    sheet
}

pub fn race_makeup_sheet(records: &[StudentLevelRecord]) -> Sheet {
    makeup_sheet(
        "Race makeup",
        "race_ethnicity",
        records.iter().map(|r| Some(r.race_ethnicity.as_str())),
        records.len(),
    )
}

pub fn gender_makeup_sheet(records: &[StudentLevelRecord]) -> Sheet {
    makeup_sheet(
        "Gender makeup",
        "gender",
        records.iter().map(|r| r.gender.as_deref()),
        records.len(),
    )
}

/// Race by gender counts and row percentages. Rows without a gender are left out.
pub fn race_gender_sheets(records: &[StudentLevelRecord]) -> (Sheet, Sheet) {
    let mut table: BTreeMap<&str, BTreeMap<&str, usize>> = BTreeMap::new();
    let mut genders: BTreeSet<&str> = BTreeSet::new();
    for record in records {
        if let Some(gender) = record.gender.as_deref() {
            genders.insert(gender);
            *table
                .entry(record.race_ethnicity.as_str())
                .or_default()
                .entry(gender)
                .or_insert(0) += 1;
        }
    }

    let mut columns = vec!["race_ethnicity"];
    columns.extend(genders.iter().copied());
    let mut counts = Sheet::new("Race x Gender (counts)", &columns);
    let mut pct = Sheet::new("Race x Gender (pct)", &columns);

    for (race, row) in &table {
        let row_total: usize = row.values().sum();
        let cells: Vec<usize> = genders.iter().map(|g| row.get(g).copied().unwrap_or(0)).collect();

        let mut count_row = vec![json!(race)];
        count_row.extend(cells.iter().map(|c| json!(c)));
        counts.push(count_row);

        let mut pct_row = vec![json!(race)];
        pct_row.extend(cells.iter().map(|&c| percent(c, row_total)));
        pct.push(pct_row);
    }

    (counts, pct)
}

// =============================================================================
// 4-5. Age and GPA distributions
// =============================================================================

fn describe_sheet(name: &str, values: &[f64], decimals: i32) -> Sheet {
    let mut sheet = Sheet::new(name, &["stat", "value"]);
    for (stat, value) in describe(values).rows() {
        sheet.push(vec![json!(stat), rounded(value, decimals)]);
    }
    sheet
}

fn histogram_sheet(name: &str, bins: &[Bin]) -> Sheet {
    let mut sheet = Sheet::new(name, &["bin_start", "bin_end", "count"]);
    for bin in bins {
        sheet.push(vec![
            json!(round_to(bin.lower, 3)),
            json!(round_to(bin.upper, 3)),
            json!(bin.count),
        ]);
    }
    sheet
}

fn ages(records: &[StudentLevelRecord]) -> Vec<f64> {
    records.iter().filter_map(|r| r.age).map(f64::from).collect()
}

fn gpas(records: &[StudentLevelRecord]) -> Vec<f64> {
    records.iter().filter_map(|r| r.term_gpa).collect()
}

/// Age describe table, its histogram table below, and the histogram chart.
pub fn age_sheet(records: &[StudentLevelRecord]) -> Sheet {
    let values = ages(records);
    let bins = histogram(&values, HISTOGRAM_BINS);
    describe_sheet("Age distribution", &values, 2)
        .with_section(histogram_sheet("Age histogram", &bins))
        .with_chart(Chart::new("Age Distribution", DISTRIBUTION_CHART_ANCHOR).series("age", bins))
}

/// GPA describe table with per-value counts (ascending GPA) and the
/// histogram table below it, plus the histogram chart.
pub fn gpa_sheet(records: &[StudentLevelRecord]) -> Sheet {
    let mut values = gpas(records);
    let summary = describe_sheet("GPA distribution", &values, 3);
    let bins = histogram(&values, HISTOGRAM_BINS);
    let hist = histogram_sheet("GPA histogram", &bins);

    values.sort_by(f64::total_cmp);
    let mut counts = Sheet::new("GPA counts", &["term_gpa", "count", "percent"]);
    for group in values.chunk_by(|a, b| a == b) {
        counts.push(vec![
            json!(group[0]),
            json!(group.len()),
            percent(group.len(), records.len()),
        ]);
    }

    summary
        .with_section(counts)
        .with_section(hist)
        .with_chart(Chart::new("Term GPA Distribution", DISTRIBUTION_CHART_ANCHOR).series("term_gpa", bins))
}

// =============================================================================
// 6. Average GPA by program
// =============================================================================

/// Mean term GPA per program; students without a program form the last group.
pub fn gpa_by_program_sheet(records: &[StudentLevelRecord]) -> Sheet {
    let mut groups: BTreeMap<Option<&str>, (f64, usize)> = BTreeMap::new();
    for record in records {
        let entry = groups.entry(record.program.as_deref()).or_insert((0.0, 0));
        if let Some(gpa) = record.term_gpa {
            entry.0 += gpa;
            entry.1 += 1;
        }
    }

    let mut sheet = Sheet::new("Avg GPA by program", &["program", "average_gpa"]);
    let (missing, named): (Vec<_>, Vec<_>) = groups.into_iter().partition(|(p, _)| p.is_none());
    for (program, (sum, n)) in named.into_iter().chain(missing) {
        let mean = (n > 0).then(|| sum / n as f64);
        sheet.push(vec![json!(program), rounded(mean, 2)]);
    }
    sheet
}

// =============================================================================
// 7. GPA bins by degree
// =============================================================================

/// Label of a GPA bin, e.g. `[0.2, 0.4)`.
pub fn gpa_bin_label(bin: &Bin) -> String {
    format!("[{:.1}, {:.1})", bin.lower, bin.upper)
}

/// Counts of term GPA per 0.2-wide bin for each target degree present.
pub fn degree_bins_sheet(records: &[StudentLevelRecord], target_degrees: &[String]) -> Sheet {
    let edges = linspace(0.0, 4.0, DEGREE_GPA_BINS);
    let mut by_degree: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for record in records {
        if let Some(degree) = record.degree.as_deref() {
            if target_degrees.iter().any(|d| d == degree) {
                let values = by_degree.entry(degree).or_default();
                values.extend(record.term_gpa);
            }
        }
    }

    let mut sheet = Sheet::new("Degree grade distributions", &["degree", "gpa_bin", "count"]);
    let mut chart = Chart::new("Course Grade Distribution by Broad Degree Level", DEGREE_CHART_ANCHOR);
    for (degree, values) in &by_degree {
        let bins = bin_counts(values, &edges);
        for bin in &bins {
            sheet.push(vec![json!(degree), json!(gpa_bin_label(bin)), json!(bin.count)]);
        }
        chart = chart.series(*degree, bins);
    }
    sheet.with_chart(chart)
}

// =============================================================================
// 8. Undeclared to declared
// =============================================================================

pub fn undeclared_sheet(records: &[StudentLevelRecord]) -> Sheet {
    let total = records.len();
    let declared = records.iter().filter(|r| r.declared_late).count();
    let persisters = records.iter().filter(|r| r.persisted).count();

    let mut sheet = Sheet::new("Undecl→Decl proportion", &["metric", "value"]);
    sheet.push(vec![json!("n_undecl_to_decl"), json!(declared)]);
    sheet.push(vec![json!("prop_of_total"), ratio(declared, total, 6)]);
    sheet.push(vec![json!("prop_of_persisters"), ratio(declared, persisters, 6)]);
    sheet.push(vec![json!("note"), json!(UNDECLARED_NOTE)]);
    sheet
}

// =============================================================================
// Workbook
// =============================================================================

/// Build every worksheet in report order.
pub fn build_workbook(records: &[StudentLevelRecord], target_degrees: &[String]) -> Workbook {
    let mut book = Workbook::new();
    book.add(persistence_sheet(records));
    book.add(gender_persistence_sheet(records).with_section(gender_ztest_sheet(records)));
    book.add(race_makeup_sheet(records));
    book.add(gender_makeup_sheet(records));

    let (counts, pct) = race_gender_sheets(records);
    book.add(counts);
    book.add(pct);

    book.add(age_sheet(records));
    book.add(gpa_sheet(records));
    book.add(gpa_by_program_sheet(records));
    book.add(degree_bins_sheet(records, target_degrees));
    book.add(undeclared_sheet(records));
    book
}

/// Result of a report run.
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub workbook: Workbook,
    pub files: Vec<PathBuf>,
}

/// Read the student-level file, build the workbook and write it out.
pub fn run_report(config: &ReportConfig, log: &mut RunLog) -> ReportResult<ReportOutcome> {
    config.validate()?;

    let records = read_student_level_csv(&config.input_path)?;
    if records.is_empty() {
        return Err(ReportError::EmptyInput);
    }
    log.info(
        STAGE,
        format!("{} student-terms from {}", records.len(), config.input_path.display()),
    );

    let workbook = build_workbook(&records, &config.target_degrees);
    if gender_ztest(&records).is_none() {
        log.warning(STAGE, "Male vs Female z-test not computable");
    }

    fs::create_dir_all(&config.output_dir)?;
    // Dropping the scratch directory removes the chart images on every path.
    let scratch = tempfile::Builder::new()
        .prefix(".termcensus-charts")
        .tempdir_in(&config.output_dir)?;
    let images = render_charts(&workbook, scratch.path(), log)?;
    let files = workbook.write_dir(&config.output_dir, &images)?;
    scratch.close()?;

    log.success(
        STAGE,
        format!(
            "report written: {} worksheets ({} tables) in {}",
            workbook.sheets.len(),
            workbook.table_count(),
            config.output_dir.display()
        ),
    );

    Ok(ReportOutcome { workbook, files })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::write_student_level_csv;
    use tempfile::tempdir;

    fn record(
        id: &str,
        gender: Option<&str>,
        race: &str,
        degree: &str,
        gpa: Option<f64>,
        persisted: bool,
        declared_late: bool,
    ) -> StudentLevelRecord {
        StudentLevelRecord {
            id: id.into(),
            term_code: "202210".into(),
            gender: gender.map(String::from),
            race_ethnicity: race.into(),
            age: Some(18 + id.len() as i32),
            college: Some("ARTS".into()),
            degree: Some(degree.into()),
            major: Some("BIOL".into()),
            program: (degree != "MA").then(|| format!("{degree} program")),
            term_gpa: gpa,
            course_count: gpa.map(|_| 3),
            persisted,
            declared_late,
        }
    }

    fn sample() -> Vec<StudentLevelRecord> {
        vec![
            record("1", Some("Male"), "White", "BA", Some(3.0), true, true),
            record("2", Some("Male"), "Asian", "BA", Some(4.0), false, false),
            record("3", Some("Female"), "White", "BS", Some(3.0), true, false),
            record("4", Some("Female"), "White", "BS", None, true, false),
            record("5", None, "Unknown", "MA", Some(2.1), false, false),
        ]
    }

    #[test]
    fn test_persistence() {
        let sheet = persistence_sheet(&sample());
        assert_eq!(sheet.cell(0, "value"), Some(&json!(5)));
        assert_eq!(sheet.cell(1, "value"), Some(&json!(3)));
        assert_eq!(sheet.cell(2, "value"), Some(&json!(0.6)));
    }

    #[test]
    fn test_gender_persistence_excludes_missing() {
        let sheet = gender_persistence_sheet(&sample());
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.cell(0, "gender"), Some(&json!("Female")));
        assert_eq!(sheet.cell(0, "persist_rate"), Some(&json!(1.0)));
        assert_eq!(sheet.cell(1, "persist_rate"), Some(&json!(0.5)));
    }

    #[test]
    fn test_ztest_requires_both_groups() {
        let only_male: Vec<_> = sample().into_iter().filter(|r| r.gender.as_deref() == Some("Male")).collect();
        let sheet = gender_ztest_sheet(&only_male);
        assert_eq!(sheet.cell(0, "z_stat"), Some(&Value::Null));
        assert!(gender_ztest(&sample()).is_some());
    }

    #[test]
    fn test_makeup_counts_missing() {
        let sheet = gender_makeup_sheet(&sample());
        assert_eq!(sheet.rows.len(), 3);
        assert_eq!(sheet.cell(0, "count"), Some(&json!(2)));
        assert_eq!(sheet.cell(0, "percent"), Some(&json!(40.0)));
        assert_eq!(sheet.cell(2, "gender"), Some(&Value::Null));

        let race = race_makeup_sheet(&sample());
        assert_eq!(race.cell(0, "race_ethnicity"), Some(&json!("White")));
        assert_eq!(race.cell(0, "percent"), Some(&json!(60.0)));
    }

    #[test]
    fn test_race_gender_crosstab() {
        let (counts, pct) = race_gender_sheets(&sample());
        assert_eq!(counts.columns, vec!["race_ethnicity", "Female", "Male"]);
        // Unknown only appears with a missing gender
        assert_eq!(counts.rows.len(), 2);
        assert_eq!(counts.cell(1, "race_ethnicity"), Some(&json!("White")));
        assert_eq!(counts.cell(1, "Female"), Some(&json!(2)));
        assert_eq!(pct.cell(1, "Female"), Some(&json!(66.67)));
        assert_eq!(pct.cell(1, "Male"), Some(&json!(33.33)));
    }

    #[test]
    fn test_gpa_counts_sorted_by_value() {
        let summary = gpa_sheet(&sample());
        let (counts, hist) = (&summary.sections[0], &summary.sections[1]);
        assert_eq!(summary.cell(0, "value"), Some(&json!(4.0)));
        assert_eq!(counts.rows.len(), 3);
        assert_eq!(counts.cell(0, "term_gpa"), Some(&json!(2.1)));
        assert_eq!(counts.cell(1, "count"), Some(&json!(2)));
        assert_eq!(counts.cell(1, "percent"), Some(&json!(40.0)));
        assert_eq!(hist.rows.len(), HISTOGRAM_BINS);
        assert_eq!(summary.chart.as_ref().map(|c| c.anchor), Some((1, 7)));
    }

    #[test]
    fn test_age_sheet_backs_chart_with_table() {
        let sheet = age_sheet(&sample());
        assert_eq!(sheet.cell(0, "value"), Some(&json!(5.0)));
        assert_eq!(sheet.sections[0].name, "Age histogram");

        let chart = sheet.chart.as_ref().unwrap();
        let charted: usize = chart.series[0].bins.iter().map(|b| b.count).sum();
        assert_eq!(charted, 5);
    }

    #[test]
    fn test_gpa_by_program_missing_last() {
        let sheet = gpa_by_program_sheet(&sample());
        assert_eq!(sheet.rows.len(), 3);
        assert_eq!(sheet.cell(0, "program"), Some(&json!("BA program")));
        assert_eq!(sheet.cell(0, "average_gpa"), Some(&json!(3.5)));
        assert_eq!(sheet.cell(1, "average_gpa"), Some(&json!(3.0)));
        assert_eq!(sheet.cell(2, "program"), Some(&Value::Null));
    }

    #[test]
    fn test_degree_bins() {
        let degrees: Vec<String> = ["BA", "BS", "BM", "BFA"].iter().map(|d| d.to_string()).collect();
        let sheet = degree_bins_sheet(&sample(), &degrees);
        assert_eq!(sheet.rows.len(), 2 * DEGREE_GPA_BINS);
        assert_eq!(sheet.cell(0, "gpa_bin"), Some(&json!("[0.0, 0.2)")));

        let ba_top = &sheet.rows[DEGREE_GPA_BINS - 1];
        assert_eq!(ba_top[1], json!("[3.8, 4.0)"));
        assert_eq!(ba_top[2], json!(1));

        let total: u64 = sheet.rows.iter().filter_map(|r| r[2].as_u64()).sum();
        assert_eq!(total, 3);

        let chart = sheet.chart.as_ref().unwrap();
        assert_eq!(chart.anchor, (1, 9));
        let labels: Vec<&str> = chart.series.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["BA", "BS"]);
    }

    #[test]
    fn test_undeclared() {
        let sheet = undeclared_sheet(&sample());
        assert_eq!(sheet.cell(0, "value"), Some(&json!(1)));
        assert_eq!(sheet.cell(1, "value"), Some(&json!(0.2)));
        assert_eq!(sheet.cell(2, "value"), Some(&json!(0.333333)));
    }

    fn entries(dir: &std::path::Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_build_workbook_layout() {
        let book = build_workbook(&sample(), &["BA".to_string(), "BS".to_string()]);
        assert_eq!(book.sheets.len(), 11);
        assert_eq!(book.table_count(), 15);

        let gender = book.sheet("Gender diff (tables)").unwrap();
        assert_eq!(gender.sections[0].name, "Two-proportion z-test (Male vs Female)");
        assert!(book.table("GPA counts").is_some());

        let charted: Vec<&str> = book
            .sheets
            .iter()
            .filter(|s| s.chart.is_some())
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(
            charted,
            vec!["Age distribution", "GPA distribution", "Degree grade distributions"]
        );
    }

    #[test]
    fn test_run_report_writes_workbook_and_removes_images() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("student_level_final_data.csv");
        write_student_level_csv(&input, &sample()).unwrap();

        let out = dir.path().join("report");
        let config = ReportConfig::new(&input, &out);
        let mut log = RunLog::new();
        let outcome = run_report(&config, &mut log).unwrap();

        assert_eq!(outcome.workbook.sheets.len(), 11);
        assert_eq!(outcome.files.len(), 2);
        assert!(outcome.files[0].ends_with(REPORT_XLSX));
        assert!(outcome.files.last().unwrap().ends_with(REPORT_JSON));
        assert!(log.stage(STAGE).any(|e| e.message.contains("rendered 3 charts")));
        assert_eq!(entries(&out), vec![REPORT_JSON, REPORT_XLSX]);
    }

    #[test]
    fn test_run_report_failure_removes_images() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("student_level_final_data.csv");
        write_student_level_csv(&input, &sample()).unwrap();

        // a directory where the workbook should go makes the save fail
        let out = dir.path().join("report");
        fs::create_dir_all(out.join(REPORT_XLSX)).unwrap();

        let config = ReportConfig::new(&input, &out);
        let err = run_report(&config, &mut RunLog::new()).unwrap_err();
        assert!(matches!(err, ReportError::Xlsx(_)));
        assert_eq!(entries(&out), vec![REPORT_XLSX]);
    }

    #[test]
    fn test_run_report_empty_input() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("empty.csv");
        write_student_level_csv(&input, &[]).unwrap();

        let config = ReportConfig::new(&input, dir.path().join("report"));
        let err = run_report(&config, &mut RunLog::new()).unwrap_err();
        assert!(matches!(err, ReportError::EmptyInput));
    }
}

//! Writing and reading the student-level file.

use std::fs;
use std::path::Path;

use crate::error::{CsvError, CsvResult};
use crate::models::{StudentLevelRecord, STUDENT_LEVEL_COLUMNS};
use crate::parser::parse_csv_file_auto;

/// Write records as CSV, header first, creating the parent directory.
///
/// The header is written explicitly so an empty run still produces a file
/// with the full column list.
pub fn write_student_level_csv(path: &Path, records: &[StudentLevelRecord]) -> CsvResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(STUDENT_LEVEL_COLUMNS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a student-level file back into records.
pub fn read_student_level_csv(path: &Path) -> CsvResult<Vec<StudentLevelRecord>> {
    let parsed = parse_csv_file_auto(path)?;
    if let Some(column) = parsed.first_missing(&STUDENT_LEVEL_COLUMNS) {
        return Err(CsvError::Parse {
            line: 1,
            message: format!("missing column '{column}'"),
        });
    }
    parsed.deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: &str, gpa: Option<f64>, age: Option<i32>) -> StudentLevelRecord {
        StudentLevelRecord {
            id: id.into(),
            term_code: "202210".into(),
            gender: Some("Female".into()),
            race_ethnicity: "Hispanic or Latino".into(),
            age,
            college: Some("ARTS".into()),
            degree: Some("BA".into()),
            major: Some("BIOL".into()),
            program: None,
            term_gpa: gpa,
            course_count: gpa.map(|_| 4),
            persisted: true,
            declared_late: false,
        }
    }

    #[test]
    fn test_header_and_missing_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("student_level_final_data.csv");
        write_student_level_csv(&path, &[record("1", None, None)]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,term_code,gender,race_ethnicity,age,college,degree,major,program,term_gpa,course_count,persisted_w3_to_end,undeclared_to_declared"
        );
        assert_eq!(
            lines.next().unwrap(),
            "1,202210,Female,Hispanic or Latino,,ARTS,BA,BIOL,,,,true,false"
        );
    }

    #[test]
    fn test_empty_export_keeps_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        write_student_level_csv(&path, &[]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("id,term_code,"));
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("final.csv");
        let records = vec![record("1", Some(3.25), Some(19)), record("2", None, None)];
        write_student_level_csv(&path, &records).unwrap();

        let read = read_student_level_csv(&path).unwrap();
        assert_eq!(read, records);
    }

    #[test]
    fn test_read_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("other.csv");
        std::fs::write(&path, "id,term_code\n1,202210\n").unwrap();
        assert!(matches!(
            read_student_level_csv(&path),
            Err(CsvError::Parse { .. })
        ));
    }
}

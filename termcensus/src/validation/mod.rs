//! JSON Schema validation of exported student-level records.
//!
//! The schema is embedded at compile time from
//! `schemas/student-level-record.json` (draft 7). Besides types and
//! nullability it encodes two cross-field rules: a late declaration implies
//! persistence, and a missing GPA comes with a missing course count.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use termcensus::validation::validate_student_level;
//!
//! let row = json!({ "id": "1", "term_code": "202210", /* ... */ });
//! if let Err(errors) = validate_student_level(&row) {
//!     eprintln!("{errors:?}");
//! }
//! ```

use serde::Serialize;
use serde_json::Value;

use crate::error::ValidationError;
use crate::models::StudentLevelRecord;

const STUDENT_LEVEL_SCHEMA: &str = include_str!("../../schemas/student-level-record.json");

/// Maximum number of invalid records kept with their messages.
pub const MAX_REPORTED_ERRORS: usize = 10;

/// Validate a JSON value against a schema.
///
/// Returns every validation message on failure.
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator =
        jsonschema::draft7::new(schema).map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator.iter_errors(data).map(|e| e.to_string()).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick check returning only true/false.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// The embedded student-level schema.
pub fn student_level_schema() -> Result<Value, ValidationError> {
    serde_json::from_str(STUDENT_LEVEL_SCHEMA).map_err(|e| ValidationError::InvalidSchema(e.to_string()))
}

/// Validate one record (as JSON) against the student-level schema.
pub fn validate_student_level(data: &Value) -> Result<(), Vec<String>> {
    let schema = student_level_schema().map_err(|e| vec![e.to_string()])?;
    validate(&schema, data)
}

/// Outcome of validating a batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationSummary {
    pub valid: usize,
    pub invalid: usize,
    /// (record index, messages) for the first invalid records.
    pub errors: Vec<(usize, Vec<String>)>,
}

impl ValidationSummary {
    pub fn is_clean(&self) -> bool {
        self.invalid == 0
    }
}

/// Validate every record, compiling the schema once.
pub fn validate_records(records: &[StudentLevelRecord]) -> Result<ValidationSummary, ValidationError> {
    let schema = student_level_schema()?;
    let validator =
        jsonschema::draft7::new(&schema).map_err(|e| ValidationError::InvalidSchema(e.to_string()))?;

    let mut summary = ValidationSummary::default();
    for (i, record) in records.iter().enumerate() {
        let value = serde_json::to_value(record)?;
        let errors: Vec<String> = validator.iter_errors(&value).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            summary.valid += 1;
        } else {
            summary.invalid += 1;
            if summary.errors.len() < MAX_REPORTED_ERRORS {
                summary.errors.push((i, errors));
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_row() -> Value {
        json!({
            "id": "1001",
            "term_code": "202210",
            "gender": "Female",
            "race_ethnicity": "Unknown",
            "age": 19,
            "college": "ARTS",
            "degree": "BA",
            "major": "BIOL",
            "program": "Biology",
            "term_gpa": 3.45,
            "course_count": 4,
            "persisted_w3_to_end": true,
            "undeclared_to_declared": false
        })
    }

    fn record() -> StudentLevelRecord {
        serde_json::from_value(valid_row()).unwrap()
    }

    #[test]
    fn test_embedded_schema_parses() {
        assert!(student_level_schema().is_ok());
    }

    #[test]
    fn test_valid_row() {
        assert!(validate_student_level(&valid_row()).is_ok());
    }

    #[test]
    fn test_nulls_allowed() {
        let mut row = valid_row();
        row["age"] = Value::Null;
        row["term_gpa"] = Value::Null;
        row["course_count"] = Value::Null;
        row["program"] = Value::Null;
        assert!(validate_student_level(&row).is_ok());
    }

    #[test]
    fn test_gpa_out_of_range() {
        let mut row = valid_row();
        row["term_gpa"] = json!(4.3);
        assert!(validate_student_level(&row).is_err());
    }

    #[test]
    fn test_age_out_of_range() {
        let mut row = valid_row();
        row["age"] = json!(2022);
        assert!(validate_student_level(&row).is_err());
        row["age"] = json!(-1);
        assert!(validate_student_level(&row).is_err());
    }

    #[test]
    fn test_declared_late_requires_persistence() {
        let mut row = valid_row();
        row["persisted_w3_to_end"] = json!(false);
        row["undeclared_to_declared"] = json!(true);
        let errors = validate_student_level(&row).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_course_count_without_gpa() {
        let mut row = valid_row();
        row["term_gpa"] = Value::Null;
        assert!(validate_student_level(&row).is_err());
    }

    #[test]
    fn test_missing_field() {
        let row = json!({ "id": "1", "term_code": "202210" });
        assert!(validate_student_level(&row).is_err());
    }

    #[test]
    fn test_validate_records_summary() {
        let good = record();
        let mut bad = record();
        bad.declared_late = true;
        bad.persisted = false;

        let summary = validate_records(&[good.clone(), bad, good]).unwrap();
        assert_eq!(summary.valid, 2);
        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.errors[0].0, 1);
        assert!(!summary.is_clean());
    }

    #[test]
    fn test_is_valid_generic() {
        let schema = json!({ "type": "object", "required": ["id"] });
        assert!(is_valid(&schema, &json!({ "id": "1" })));
        assert!(!is_valid(&schema, &json!({})));
    }
}

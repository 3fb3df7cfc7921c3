//! Pipeline configuration.
//!
//! Input and output locations are explicit parameters. A config can be built
//! from a data folder layout ([`PipelineConfig::from_dirs`]), loaded from JSON,
//! or assembled by the CLI; [`PipelineConfig::validate`] runs before any
//! processing so a missing input aborts the run up front.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::models::CensusTags;

/// Enrollment file name inside a data folder.
pub const ENROLLMENT_FILE: &str = "fall_enrollment.csv";
/// Grades file name inside a data folder.
pub const GRADES_FILE: &str = "grades.csv";
/// Program catalog file name inside a data folder.
pub const PROGRAM_FILE: &str = "program_data.csv";
/// Exported student-level file name.
pub const OUTPUT_FILE: &str = "student_level_final_data.csv";

/// Prefix marking an undeclared major.
pub const DEFAULT_UNDECLARED_PREFIX: &str = "UN";

/// Degrees compared in the grade distribution table.
pub const DEFAULT_TARGET_DEGREES: [&str; 4] = ["BA", "BS", "BM", "BFA"];

/// Configuration of the cleaning pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub enrollment_path: PathBuf,
    pub grades_path: PathBuf,
    pub program_path: PathBuf,
    pub output_path: PathBuf,

    /// Census tag values for the two snapshots.
    #[serde(default)]
    pub census: CensusTags,

    /// Prefix of undeclared majors, compared case-insensitively.
    #[serde(default = "default_undeclared_prefix")]
    pub undeclared_prefix: String,

    /// Skip schema validation of exported records.
    #[serde(default)]
    pub skip_validation: bool,
}

fn default_undeclared_prefix() -> String {
    DEFAULT_UNDECLARED_PREFIX.to_string()
}

impl PipelineConfig {
    /// Standard layout: the three inputs in `data_dir`, the export in `out_dir`.
    pub fn from_dirs(data_dir: impl AsRef<Path>, out_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            enrollment_path: data_dir.join(ENROLLMENT_FILE),
            grades_path: data_dir.join(GRADES_FILE),
            program_path: data_dir.join(PROGRAM_FILE),
            output_path: out_dir.as_ref().join(OUTPUT_FILE),
            census: CensusTags::default(),
            undeclared_prefix: default_undeclared_prefix(),
            skip_validation: false,
        }
    }

    /// Load a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Check the configuration before any processing begins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for path in [&self.enrollment_path, &self.grades_path, &self.program_path] {
            if !path.is_file() {
                return Err(ConfigError::MissingInputFile(path.clone()));
            }
        }

        if self.output_path.file_name().is_none() {
            return Err(ConfigError::InvalidOutputPath {
                path: self.output_path.clone(),
                reason: "no file name".into(),
            });
        }
        if self.output_path.is_dir() {
            return Err(ConfigError::InvalidOutputPath {
                path: self.output_path.clone(),
                reason: "is a directory".into(),
            });
        }

        if self.census.early.trim().is_empty() {
            return Err(ConfigError::EmptyCensusTag("early"));
        }
        if self.census.end.trim().is_empty() {
            return Err(ConfigError::EmptyCensusTag("end-of-term"));
        }
        if self.census.early == self.census.end {
            return Err(ConfigError::SameCensusTags(self.census.early.clone()));
        }

        Ok(())
    }
}

/// Configuration of the reporting stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Student-level file produced by the cleaning pipeline.
    pub input_path: PathBuf,
    /// Directory receiving `report.xlsx` and `report.json`.
    pub output_dir: PathBuf,
    #[serde(default = "default_target_degrees")]
    pub target_degrees: Vec<String>,
}

fn default_target_degrees() -> Vec<String> {
    DEFAULT_TARGET_DEGREES.iter().map(|d| d.to_string()).collect()
}

impl ReportConfig {
    pub fn new(input_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_dir: output_dir.into(),
            target_degrees: default_target_degrees(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.input_path.is_file() {
            return Err(ConfigError::MissingInputFile(self.input_path.clone()));
        }
        if self.output_dir.is_file() {
            return Err(ConfigError::InvalidOutputPath {
                path: self.output_dir.clone(),
                reason: "is a file".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch_inputs(dir: &Path) {
        for name in [ENROLLMENT_FILE, GRADES_FILE, PROGRAM_FILE] {
            std::fs::write(dir.join(name), "id,term_code\n").unwrap();
        }
    }

    #[test]
    fn test_from_dirs_layout() {
        let config = PipelineConfig::from_dirs("/data/in", "/data/out");
        assert_eq!(config.enrollment_path, Path::new("/data/in/fall_enrollment.csv"));
        assert_eq!(config.program_path, Path::new("/data/in/program_data.csv"));
        assert_eq!(config.output_path, Path::new("/data/out/student_level_final_data.csv"));
        assert_eq!(config.census.early, "WK3");
        assert_eq!(config.undeclared_prefix, "UN");
    }

    #[test]
    fn test_validate_missing_input_is_fatal() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig::from_dirs(dir.path(), dir.path());
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingInputFile(p) if p.ends_with(ENROLLMENT_FILE)));
    }

    #[test]
    fn test_validate_ok() {
        let dir = tempdir().unwrap();
        touch_inputs(dir.path());
        let config = PipelineConfig::from_dirs(dir.path(), dir.path());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_identical_tags() {
        let dir = tempdir().unwrap();
        touch_inputs(dir.path());
        let mut config = PipelineConfig::from_dirs(dir.path(), dir.path());
        config.census.end = "WK3".into();
        assert!(matches!(config.validate(), Err(ConfigError::SameCensusTags(_))));
    }

    #[test]
    fn test_validate_rejects_directory_output() {
        let dir = tempdir().unwrap();
        touch_inputs(dir.path());
        let mut config = PipelineConfig::from_dirs(dir.path(), dir.path());
        config.output_path = dir.path().to_path_buf();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOutputPath { .. })
        ));
    }

    #[test]
    fn test_json_config_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "enrollment_path": "in/e.csv",
                "grades_path": "in/g.csv",
                "program_path": "in/p.csv",
                "output_path": "out/o.csv"
            }"#,
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.census, CensusTags::default());
        assert_eq!(config.undeclared_prefix, "UN");
        assert!(!config.skip_validation);
    }

    #[test]
    fn test_report_config_defaults() {
        let config = ReportConfig::new("final.csv", "report");
        assert_eq!(config.target_degrees, vec!["BA", "BS", "BM", "BFA"]);
    }
}

//! Transformation module.
//!
//! This module turns the three loaded tables into student-level rows:
//! - Grades: term GPA and raw course counts
//! - Join: program catalog and grade counts onto enrollment
//! - Census: early / end-of-term snapshot split and merge
//! - Derive: persistence, late declaration, race/ethnicity, age
//! - Collapse: projection, rounding and deduplication
//! - Pipeline: end-to-end run

pub mod census;
pub mod collapse;
pub mod derive;
pub mod grades;
pub mod join;
pub mod pipeline;

pub use census::{split_and_merge, CensusStats, SnapshotPair};
pub use collapse::{collapse, round_gpa, DuplicateStats};
pub use derive::{derive_all, derive_student_term, DeriveStats};
pub use grades::{summarize, GradeSummary, TermGpa};
pub use join::{join_enrollment, JoinStats, ProgramCatalog, ProgramKey};
pub use pipeline::*;

//! Census snapshot split and merge.
//!
//! Joined enrollment rows are split by census tag into the early and
//! end-of-term snapshots, each reduced to one row per student-term, then
//! outer-joined so every student-term seen in either snapshot yields one pair.

use std::collections::BTreeMap;

use crate::logs::RunLog;
use crate::models::{CensusSnapshot, CensusTags, JoinedEnrollment, SnapshotAttributes, StudentTermKey};

const STAGE: &str = "census";

/// Both snapshots of one student-term. A side is `None` when the student had
/// no row at that census point.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotPair {
    pub key: StudentTermKey,
    pub early: Option<SnapshotAttributes>,
    pub end: Option<SnapshotAttributes>,
}

impl SnapshotPair {
    fn empty(key: StudentTermKey) -> Self {
        Self {
            key,
            early: None,
            end: None,
        }
    }
}

/// Counters reported by [`split_and_merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CensusStats {
    pub early_rows: usize,
    pub end_rows: usize,
    pub early_duplicates: usize,
    pub end_duplicates: usize,
    /// Rows whose census tag was missing or matched neither snapshot.
    pub unrecognized: usize,
    pub merged: usize,
}

/// Partition rows by snapshot. Returns (early, end, unrecognized count).
pub fn split_snapshots(
    joined: Vec<JoinedEnrollment>,
    tags: &CensusTags,
) -> (Vec<JoinedEnrollment>, Vec<JoinedEnrollment>, usize) {
    let mut early = Vec::new();
    let mut end = Vec::new();
    let mut unrecognized = 0;

    for row in joined {
        match tags.classify(row.census.as_deref()) {
            Some(CensusSnapshot::Early) => early.push(row),
            Some(CensusSnapshot::EndOfTerm) => end.push(row),
            None => unrecognized += 1,
        }
    }

    (early, end, unrecognized)
}

/// Stable-sort by (id, term_code) and keep the first row of each key.
///
/// Returns the kept rows and the number dropped.
pub fn dedupe_snapshot(mut rows: Vec<JoinedEnrollment>) -> (Vec<JoinedEnrollment>, usize) {
    let before = rows.len();
    rows.sort_by(|a, b| a.key.cmp(&b.key));
    rows.dedup_by(|later, first| later.key == first.key);
    let dropped = before - rows.len();
    (rows, dropped)
}

/// Outer-join the two deduplicated snapshots on (id, term_code).
///
/// Output is ordered by key.
pub fn merge_snapshots(early: Vec<JoinedEnrollment>, end: Vec<JoinedEnrollment>) -> Vec<SnapshotPair> {
    let mut pairs: BTreeMap<StudentTermKey, SnapshotPair> = BTreeMap::new();

    for JoinedEnrollment { key, attributes, .. } in early {
        pairs
            .entry(key.clone())
            .or_insert_with(|| SnapshotPair::empty(key))
            .early = Some(attributes);
    }
    for JoinedEnrollment { key, attributes, .. } in end {
        pairs
            .entry(key.clone())
            .or_insert_with(|| SnapshotPair::empty(key))
            .end = Some(attributes);
    }

    pairs.into_values().collect()
}

/// Split, deduplicate and merge, logging each step.
pub fn split_and_merge(
    joined: Vec<JoinedEnrollment>,
    tags: &CensusTags,
    log: &mut RunLog,
) -> (Vec<SnapshotPair>, CensusStats) {
    let (early, end, unrecognized) = split_snapshots(joined, tags);
    if unrecognized > 0 {
        log.warning(
            STAGE,
            format!(
                "{unrecognized} rows dropped: census tag is neither '{}' nor '{}'",
                tags.early, tags.end
            ),
        );
    }

    let (early, early_duplicates) = dedupe_snapshot(early);
    let (end, end_duplicates) = dedupe_snapshot(end);
    for (label, kept, dropped) in [
        (CensusSnapshot::Early.label(), early.len(), early_duplicates),
        (CensusSnapshot::EndOfTerm.label(), end.len(), end_duplicates),
    ] {
        log.info(STAGE, format!("{label} snapshot: {kept} student-terms"));
        if dropped > 0 {
            log.warning(
                STAGE,
                format!("{label} snapshot: {dropped} duplicate (id, term_code) rows dropped"),
            );
        }
    }

    let (early_rows, end_rows) = (early.len(), end.len());
    let pairs = merge_snapshots(early, end);
    log.info(STAGE, format!("merged snapshots: {} student-terms", pairs.len()));

    let stats = CensusStats {
        early_rows,
        end_rows,
        early_duplicates,
        end_duplicates,
        unrecognized,
        merged: pairs.len(),
    };
    (pairs, stats)
}

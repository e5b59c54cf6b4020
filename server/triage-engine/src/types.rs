//! Core types for the triage engine (records, clusters, snapshots, diffs).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Raw input
// ---------------------------------------------------------------------------

/// One input line as produced by the line source. Never retained past
/// signature extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
  /// 0-based physical line position, global across all inputs of a source.
  pub ordinal: u64,
  pub text: String,
  /// Start of the time bucket the line's timestamp falls in, if bucketing is
  /// enabled and a timestamp was found.
  pub bucket: Option<DateTime<Utc>>,
}

impl RawRecord {
  pub fn new(ordinal: u64, text: impl Into<String>) -> Self {
    Self {
      ordinal,
      text: text.into(),
      bucket: None,
    }
  }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// Separates the category label from the normalized text.
pub const SIGNATURE_DELIMITER: char = '|';

/// Clustering key: `"<Category>|<normalized text>"`.
///
/// Category labels never contain the delimiter, so the first `|` always splits
/// the two parts even when the normalized text contains more of them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(pub String);

impl Signature {
  pub fn new(category: &str, normalized: &str) -> Self {
    let mut s = String::with_capacity(category.len() + normalized.len() + 1);
    s.push_str(category);
    s.push(SIGNATURE_DELIMITER);
    s.push_str(normalized);
    Signature(s)
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Split into (category, normalized). `None` if the delimiter is missing.
  pub fn parts(&self) -> Option<(&str, &str)> {
    self.0.split_once(SIGNATURE_DELIMITER)
  }

  pub fn category(&self) -> Option<&str> {
    self.parts().map(|(c, _)| c)
  }

  pub fn normalized(&self) -> Option<&str> {
    self.parts().map(|(_, n)| n)
  }

  /// Compact, run-independent identifier (16 hex chars of blake3).
  pub fn cluster_id(&self) -> String {
    let hex = blake3::hash(self.0.as_bytes()).to_hex();
    hex[..16].to_string()
  }
}

impl fmt::Display for Signature {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ---------------------------------------------------------------------------
// Clusters
// ---------------------------------------------------------------------------

/// Aggregate state for one signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
  pub count: u64,
  /// First line observed for this signature, verbatim.
  pub sample: String,
  /// Ascending ordinals of the first occurrences, capped.
  pub line_numbers: Vec<u64>,
  pub category: String,
  /// Ordinal of the first occurrence.
  pub first_seen: u64,
}

impl ClusterRecord {
  pub fn new(category: &str, record: &RawRecord) -> Self {
    Self {
      count: 1,
      sample: record.text.clone(),
      line_numbers: vec![record.ordinal],
      category: category.to_string(),
      first_seen: record.ordinal,
    }
  }
}

/// Run-level counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
  /// Physical lines read from all inputs.
  pub total_lines: u64,
  pub total_clusters: u64,
  /// Lines that reached the cluster engine.
  pub clustered_lines: u64,
  /// Lines dropped by include/exclude/keyword filters.
  pub filtered_lines: u64,
  /// Malformed lines skipped (bad encoding, unterminated tail, read errors).
  pub skipped_lines: u64,
}

/// The complete, immutable result of one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
  pub version: u32,
  pub summary: RunSummary,
  /// Clustered line counts keyed by bucket start ("YYYY-MM-DDTHH:MM").
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub buckets: BTreeMap<String, u64>,
  pub clusters: BTreeMap<Signature, ClusterRecord>,
}

/// Summary block used by reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterStats {
  pub total_clusters: usize,
  pub clustered_lines: u64,
  pub average_cluster_size: f64,
  pub largest_cluster: u64,
  pub smallest_cluster: u64,
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeFlag {
  Regression,
  Improvement,
}

/// One signature's movement between a baseline and a current snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
  pub signature: Signature,
  pub category: String,
  /// 0 when the signature is new.
  pub old_count: u64,
  /// 0 when the signature is resolved.
  pub new_count: u64,
  pub delta: i64,
  /// `None` for new signatures (growth from zero is unbounded).
  pub pct_delta: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub flag: Option<ChangeFlag>,
}

/// New, resolved and changed signatures between two runs. The three sets are
/// disjoint and each is ordered by signature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
  pub new: Vec<DiffEntry>,
  pub resolved: Vec<DiffEntry>,
  pub changed: Vec<DiffEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
  pub new: usize,
  pub resolved: usize,
  pub changed: usize,
  pub regressions: usize,
  pub improvements: usize,
}

//! Snapshot queries (ranking, stats) and JSON persistence.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::error::{Result, TriageError};
use crate::types::*;

/// Persisted format version. Bump on any incompatible change.
pub const SNAPSHOT_VERSION: u32 = 1;

impl ClusterSnapshot {
  /// A snapshot of a run that saw nothing.
  pub fn empty() -> Self {
    Self {
      version: SNAPSHOT_VERSION,
      summary: RunSummary::default(),
      buckets: BTreeMap::new(),
      clusters: BTreeMap::new(),
    }
  }

  /// Clusters by count descending, then first occurrence, then signature.
  pub fn ranked(&self) -> Vec<(&Signature, &ClusterRecord)> {
    let mut all: Vec<_> = self.clusters.iter().collect();
    all.sort_by_key(|(sig, c)| (Reverse(c.count), c.first_seen, *sig));
    all
  }

  pub fn top(&self, n: usize) -> Vec<(&Signature, &ClusterRecord)> {
    let mut ranked = self.ranked();
    ranked.truncate(n);
    ranked
  }

  pub fn stats(&self) -> ClusterStats {
    let total_clusters = self.clusters.len();
    let clustered_lines: u64 = self.clusters.values().map(|c| c.count).sum();
    let average_cluster_size = if total_clusters == 0 {
      0.0
    } else {
      clustered_lines as f64 / total_clusters as f64
    };
    ClusterStats {
      total_clusters,
      clustered_lines,
      average_cluster_size,
      largest_cluster: self.clusters.values().map(|c| c.count).max().unwrap_or(0),
      smallest_cluster: self.clusters.values().map(|c| c.count).min().unwrap_or(0),
    }
  }

  pub fn to_json(&self) -> Result<String> {
    Ok(serde_json::to_string(self)?)
  }

  pub fn to_json_pretty(&self) -> Result<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  /// Decode and validate a persisted snapshot. Anything malformed or
  /// inconsistent is a [`TriageError::Snapshot`].
  pub fn from_json(s: &str) -> Result<Self> {
    let snapshot: Self =
      serde_json::from_str(s).map_err(|e| TriageError::snapshot(format!("decode: {}", e)))?;
    snapshot.validate()?;
    Ok(snapshot)
  }

  /// Check the invariants every snapshot produced by the engine holds.
  pub fn validate(&self) -> Result<()> {
    if self.version != SNAPSHOT_VERSION {
      return Err(TriageError::snapshot(format!(
        "unsupported version {} (expected {})",
        self.version, SNAPSHOT_VERSION
      )));
    }
    if self.summary.total_clusters != self.clusters.len() as u64 {
      return Err(TriageError::snapshot(format!(
        "summary says {} clusters, found {}",
        self.summary.total_clusters,
        self.clusters.len()
      )));
    }
    for (sig, c) in &self.clusters {
      let bad = |reason: &str| TriageError::snapshot(format!("cluster {:?}: {}", sig.as_str(), reason));

      match sig.category() {
        None => return Err(bad("missing category delimiter")),
        Some(cat) if cat != c.category => return Err(bad("category does not match key")),
        Some(_) => {}
      }
      if c.count == 0 {
        return Err(bad("count must be at least 1"));
      }
      if (c.line_numbers.len() as u64) > c.count {
        return Err(bad("more line numbers than occurrences"));
      }
      if c.line_numbers.first() != Some(&c.first_seen) {
        return Err(bad("first line number must equal first_seen"));
      }
      if c.line_numbers.windows(2).any(|w| w[0] >= w[1]) {
        return Err(bad("line numbers must be strictly ascending"));
      }
    }
    Ok(())
  }
}

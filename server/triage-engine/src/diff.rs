//! Baseline vs. current comparison: new, resolved and changed signatures.

use tracing::info;

use crate::config::{DiffConfig, ZeroDeltaPolicy};
use crate::error::Result;
use crate::types::*;

/// Compare two completed snapshots. Pure: no logging, no I/O, and both inputs
/// are left untouched.
pub fn diff(baseline: &ClusterSnapshot, current: &ClusterSnapshot, cfg: &DiffConfig) -> DiffResult {
  let mut result = DiffResult::default();

  // BTreeMap iteration keeps every set ordered by signature.
  for (sig, cur) in &current.clusters {
    match baseline.clusters.get(sig) {
      None => result.new.push(DiffEntry {
        signature: sig.clone(),
        category: cur.category.clone(),
        old_count: 0,
        new_count: cur.count,
        delta: cur.count as i64,
        pct_delta: None,
        flag: None,
      }),
      Some(old) => {
        let delta = cur.count as i64 - old.count as i64;
        if delta == 0 && cfg.zero_delta == ZeroDeltaPolicy::Drop {
          continue;
        }
        let pct = delta as f64 / old.count as f64 * 100.0;
        result.changed.push(DiffEntry {
          signature: sig.clone(),
          category: cur.category.clone(),
          old_count: old.count,
          new_count: cur.count,
          delta,
          pct_delta: Some(pct),
          flag: classify(delta, pct, cfg),
        });
      }
    }
  }

  for (sig, old) in &baseline.clusters {
    if !current.clusters.contains_key(sig) {
      result.resolved.push(DiffEntry {
        signature: sig.clone(),
        category: old.category.clone(),
        old_count: old.count,
        new_count: 0,
        delta: -(old.count as i64),
        pct_delta: Some(-100.0),
        flag: None,
      });
    }
  }

  result
}

/// Decode two persisted snapshots, then diff them and log the summary. Either
/// failing to decode fails the whole diff.
pub fn diff_json(baseline: &str, current: &str, cfg: &DiffConfig) -> Result<DiffResult> {
  let baseline = ClusterSnapshot::from_json(baseline)?;
  let current = ClusterSnapshot::from_json(current)?;
  let result = diff(&baseline, &current, cfg);

  let summary = result.summary();
  info!(
    new = summary.new,
    resolved = summary.resolved,
    changed = summary.changed,
    regressions = summary.regressions,
    improvements = summary.improvements,
    "diff complete"
  );
  Ok(result)
}

fn classify(delta: i64, pct: f64, cfg: &DiffConfig) -> Option<ChangeFlag> {
  let threshold = cfg.regression_threshold_pct;
  let min_abs = cfg.min_abs_delta as i64;
  if pct > threshold || delta > min_abs {
    Some(ChangeFlag::Regression)
  } else if pct < -threshold || delta < -min_abs {
    Some(ChangeFlag::Improvement)
  } else {
    None
  }
}

impl DiffResult {
  pub fn regressions(&self) -> impl Iterator<Item = &DiffEntry> {
    self
      .changed
      .iter()
      .filter(|e| e.flag == Some(ChangeFlag::Regression))
  }

  pub fn improvements(&self) -> impl Iterator<Item = &DiffEntry> {
    self
      .changed
      .iter()
      .filter(|e| e.flag == Some(ChangeFlag::Improvement))
  }

  pub fn summary(&self) -> DiffSummary {
    DiffSummary {
      new: self.new.len(),
      resolved: self.resolved.len(),
      changed: self.changed.len(),
      regressions: self.regressions().count(),
      improvements: self.improvements().count(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::TriageError;
  use std::collections::BTreeMap;

  /// Snapshot with the given (category, normalized, count) clusters.
  fn snap(clusters: &[(&str, &str, u64)]) -> ClusterSnapshot {
    let mut map = BTreeMap::new();
    let mut ordinal = 0;
    for (category, normalized, count) in clusters {
      map.insert(
        Signature::new(category, normalized),
        ClusterRecord {
          count: *count,
          sample: normalized.to_string(),
          line_numbers: vec![ordinal],
          category: category.to_string(),
          first_seen: ordinal,
        },
      );
      ordinal += count;
    }
    let total: u64 = clusters.iter().map(|c| c.2).sum();
    ClusterSnapshot {
      summary: RunSummary {
        total_lines: total,
        total_clusters: map.len() as u64,
        clustered_lines: total,
        ..RunSummary::default()
      },
      clusters: map,
      ..ClusterSnapshot::empty()
    }
  }

  fn drop_zero() -> DiffConfig {
    DiffConfig {
      zero_delta: ZeroDeltaPolicy::Drop,
      ..DiffConfig::default()
    }
  }

  #[test]
  fn growth_past_threshold_is_a_regression() {
    let old = snap(&[("Database", "database connection timeout server", 10)]);
    let new = snap(&[("Database", "database connection timeout server", 16)]);
    let result = diff(&old, &new, &DiffConfig::default());

    assert!(result.new.is_empty());
    assert!(result.resolved.is_empty());
    let entry = &result.changed[0];
    assert_eq!(entry.delta, 6);
    assert!((entry.pct_delta.unwrap() - 60.0).abs() < 1e-9);
    assert_eq!(entry.flag, Some(ChangeFlag::Regression));
    assert_eq!(result.regressions().count(), 1);
  }

  #[test]
  fn vanished_signature_is_resolved() {
    let old = snap(&[("Auth", "login failed for user <NUM>", 5)]);
    let result = diff(&old, &ClusterSnapshot::empty(), &DiffConfig::default());
    assert_eq!(result.resolved.len(), 1);
    let entry = &result.resolved[0];
    assert_eq!(entry.signature.as_str(), "Auth|login failed for user <NUM>");
    assert_eq!(entry.old_count, 5);
    assert_eq!(entry.new_count, 0);
    assert_eq!(entry.delta, -5);
    assert_eq!(entry.pct_delta, Some(-100.0));
  }

  #[test]
  fn new_signature_has_no_percentage() {
    let result = diff(
      &ClusterSnapshot::empty(),
      &snap(&[("Timeout", "upstream timed out", 3)]),
      &DiffConfig::default(),
    );
    assert_eq!(result.new.len(), 1);
    assert_eq!(result.new[0].delta, 3);
    assert_eq!(result.new[0].pct_delta, None);
  }

  #[test]
  fn new_and_resolved_are_mirror_images() {
    let a = snap(&[("Auth", "a", 1), ("Generic", "b", 2), ("Http", "c", 3)]);
    let b = snap(&[("Generic", "b", 5), ("Timeout", "d", 1)]);
    let ab = diff(&a, &b, &DiffConfig::default());
    let ba = diff(&b, &a, &DiffConfig::default());

    let sigs = |entries: &[DiffEntry]| -> Vec<Signature> {
      entries.iter().map(|e| e.signature.clone()).collect()
    };
    assert_eq!(sigs(&ab.new), sigs(&ba.resolved));
    assert_eq!(sigs(&ab.resolved), sigs(&ba.new));
    assert_eq!(sigs(&ab.resolved), vec![
      Signature::new("Auth", "a"),
      Signature::new("Http", "c"),
    ]);
  }

  #[test]
  fn self_diff_retains_zero_deltas_by_default() {
    let a = snap(&[("Auth", "a", 1), ("Generic", "b", 2)]);
    let result = diff(&a, &a, &DiffConfig::default());
    assert!(result.new.is_empty());
    assert!(result.resolved.is_empty());
    assert_eq!(result.changed.len(), 2);
    assert!(result.changed.iter().all(|e| e.delta == 0 && e.flag.is_none()));
  }

  #[test]
  fn self_diff_drops_zero_deltas_when_asked() {
    let a = snap(&[("Auth", "a", 1), ("Generic", "b", 2)]);
    let result = diff(&a, &a, &drop_zero());
    assert!(result.new.is_empty());
    assert!(result.resolved.is_empty());
    assert!(result.changed.is_empty());
  }

  #[test]
  fn shrinking_is_an_improvement() {
    let old = snap(&[("Network", "connection reset", 100)]);
    let new = snap(&[("Network", "connection reset", 70)]);
    let result = diff(&old, &new, &DiffConfig::default());
    assert_eq!(result.changed[0].flag, Some(ChangeFlag::Improvement));
    assert_eq!(result.improvements().count(), 1);
    assert_eq!(result.regressions().count(), 0);
  }

  #[test]
  fn small_changes_are_unflagged() {
    let old = snap(&[("Network", "connection reset", 100)]);
    let new = snap(&[("Network", "connection reset", 110)]);
    let result = diff(&old, &new, &DiffConfig::default());
    assert_eq!(result.changed[0].flag, None);
  }

  #[test]
  fn large_absolute_growth_is_a_regression_at_low_percentage() {
    // +60 on 1000 is only 6%, but over the absolute floor.
    let old = snap(&[("Http", "bad gateway", 1000)]);
    let new = snap(&[("Http", "bad gateway", 1060)]);
    let result = diff(&old, &new, &DiffConfig::default());
    assert_eq!(result.changed[0].flag, Some(ChangeFlag::Regression));
  }

  #[test]
  fn empty_against_empty() {
    let empty = ClusterSnapshot::empty();
    let result = diff(&empty, &empty, &DiffConfig::default());
    assert_eq!(result, DiffResult::default());
  }

  #[test]
  fn summary_counts_sets() {
    let old = snap(&[("Auth", "a", 10), ("Generic", "b", 10)]);
    let new = snap(&[("Generic", "b", 20), ("Http", "c", 1)]);
    let s = diff(&old, &new, &DiffConfig::default()).summary();
    assert_eq!(
      (s.new, s.resolved, s.changed, s.regressions, s.improvements),
      (1, 1, 1, 1, 0)
    );
  }

  #[test]
  fn diff_leaves_inputs_untouched_and_repeats_exactly() {
    let old = snap(&[("Auth", "a", 4), ("Generic", "b", 10)]);
    let new = snap(&[("Generic", "b", 30), ("Http", "c", 1)]);
    let (old_before, new_before) = (old.clone(), new.clone());
    let first = diff(&old, &new, &DiffConfig::default());
    let second = diff(&old, &new, &DiffConfig::default());
    assert_eq!(first, second);
    assert_eq!(old, old_before);
    assert_eq!(new, new_before);
  }

  #[test]
  fn diff_json_decodes_both_sides() {
    let old = snap(&[("Auth", "a", 4)]).to_json().unwrap();
    let new = snap(&[("Auth", "a", 4), ("Http", "c", 1)]).to_json().unwrap();
    let result = diff_json(&old, &new, &DiffConfig::default()).unwrap();
    assert_eq!(result.new.len(), 1);
    assert_eq!(result.changed.len(), 1);
  }

  #[test]
  fn corrupt_input_fails_the_diff() {
    let good = snap(&[("Auth", "a", 4)]).to_json().unwrap();
    let err = diff_json(&good, "{\"version\": 1, \"clusters\": [", &DiffConfig::default()).unwrap_err();
    assert!(matches!(err, TriageError::Snapshot(_)));
    let err = diff_json("", &good, &DiffConfig::default()).unwrap_err();
    assert!(matches!(err, TriageError::Snapshot(_)));
  }
}

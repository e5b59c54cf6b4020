//! Run and diff configuration with sane defaults.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Options for one analysis run (line source + cluster engine).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Regexes; a line must match at least one (empty = match all).
  pub include_patterns: Vec<String>,
  /// Regexes; a line matching any of these is dropped.
  pub exclude_patterns: Vec<String>,
  /// Substrings that must all appear in a line (case-insensitive).
  pub keywords: Vec<String>,
  /// Width of the advisory time bucket attached to each record.
  pub time_bucket_minutes: Option<u32>,
  /// Stop reading after this many physical lines.
  pub max_lines: Option<u64>,
  /// Longer physical lines are skipped and counted, never buffered whole.
  pub max_line_bytes: usize,
  /// Max line numbers remembered per cluster.
  pub max_line_numbers: usize,
  pub diff: DiffConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      include_patterns: Vec::new(),
      exclude_patterns: Vec::new(),
      keywords: Vec::new(),
      time_bucket_minutes: None,
      max_lines: None,
      max_line_bytes: 1024 * 1024,
      max_line_numbers: 10,
      diff: DiffConfig::default(),
    }
  }
}

impl Config {
  /// Parse a TOML document. Missing keys fall back to defaults.
  pub fn from_toml_str(s: &str) -> Result<Self> {
    Ok(toml::from_str(s)?)
  }
}

/// What to do with signatures whose count did not move between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroDeltaPolicy {
  /// Keep them in `changed` with no flag.
  #[default]
  Retain,
  /// Leave them out of `changed` entirely.
  Drop,
}

/// Thresholds for regression / improvement classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
  /// Percentage growth above which a changed signature is a regression.
  pub regression_threshold_pct: f64,
  /// Absolute growth above which a changed signature is a regression,
  /// whatever its percentage.
  pub min_abs_delta: u64,
  pub zero_delta: ZeroDeltaPolicy,
}

impl Default for DiffConfig {
  fn default() -> Self {
    Self {
      regression_threshold_pct: 20.0,
      min_abs_delta: 50,
      zero_delta: ZeroDeltaPolicy::Retain,
    }
  }
}

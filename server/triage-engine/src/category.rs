//! Coarse category tagging from an ordered table of matcher rules.

use regex::Regex;

use crate::error::{Result, TriageError};

/// Category when no rule matches.
pub const GENERIC: &str = "Generic";
/// Category for lines that normalize to nothing.
pub const EMPTY: &str = "Empty";

/// One matcher: every pattern must match (case-insensitive) for the label to
/// apply.
#[derive(Debug, Clone)]
pub struct CategoryRule {
  label: String,
  all_of: Vec<Regex>,
}

impl CategoryRule {
  /// Build a rule. Labels must not contain the signature delimiter.
  pub fn new(label: &str, patterns: &[&str]) -> Result<Self> {
    if label.is_empty() || label.contains(crate::types::SIGNATURE_DELIMITER) {
      return Err(TriageError::validation(
        "category.label",
        &format!("{:?} must be non-empty and free of '|'", label),
      ));
    }
    let all_of = patterns
      .iter()
      .map(|p| Regex::new(&format!("(?i){}", p)).map_err(|e| TriageError::pattern(p, e)))
      .collect::<Result<Vec<_>>>()?;
    Ok(Self {
      label: label.to_string(),
      all_of,
    })
  }

  pub fn label(&self) -> &str {
    &self.label
  }

  pub fn matches(&self, text: &str) -> bool {
    !self.all_of.is_empty() && self.all_of.iter().all(|re| re.is_match(text))
  }
}

/// Prioritized rules; the first match wins.
#[derive(Debug, Clone)]
pub struct CategoryTable {
  rules: Vec<CategoryRule>,
}

impl CategoryTable {
  pub fn new(rules: Vec<CategoryRule>) -> Self {
    Self { rules }
  }

  /// Built-in table, highest priority first.
  pub fn builtin() -> Result<Self> {
    let rules = vec![
      CategoryRule::new(
        "NullPointerException",
        &[r"nullpointerexception|null pointer|null reference|nonetype"],
      )?,
      CategoryRule::new(
        "OutOfMemory",
        &[r"outofmemory|out of memory|\boom\b|memory exhausted"],
      )?,
      CategoryRule::new(
        "StackOverflow",
        &[r"stack ?overflow|maximum recursion"],
      )?,
      CategoryRule::new(
        "Database",
        &[r"database|\bsql\b|\bdb\b|postgres|mysql|mongo|redis"],
      )?,
      CategoryRule::new("Timeout", &[r"timeout|timed out"])?,
      CategoryRule::new(
        "Network",
        &[
          r"connection|socket|network|\bhost\b",
          r"refused|reset|unreachable|failed|closed|lost",
        ],
      )?,
      CategoryRule::new(
        "Auth",
        &[r"\bauth|unauthorized|forbidden|permission denied|\blogin\b|credential|token expired"],
      )?,
      CategoryRule::new(
        "FileSystem",
        &[r"no such file|file not found|disk full|read-only file system|i/o error|ioerror"],
      )?,
      CategoryRule::new(
        "Http",
        &[r"\bhttp\b|status code|bad gateway|service unavailable|internal server error"],
      )?,
      CategoryRule::new("Validation", &[r"invalid|validation|malformed|parse error"])?,
      CategoryRule::new("Exception", &[r"exception|traceback|panic|fatal|error"])?,
    ];
    Ok(Self::new(rules))
  }

  pub fn rules(&self) -> &[CategoryRule] {
    &self.rules
  }

  /// Label of the first matching rule, or [`GENERIC`].
  pub fn classify(&self, text: &str) -> &str {
    self
      .rules
      .iter()
      .find(|r| r.matches(text))
      .map(|r| r.label())
      .unwrap_or(GENERIC)
  }
}

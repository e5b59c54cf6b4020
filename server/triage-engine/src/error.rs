//! Structured error types for the triage engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriageError {
  #[error("validation: {field}: {reason}")]
  Validation { field: String, reason: String },

  #[error("io: {context}: {source}")]
  Io {
    context: String,
    source: std::io::Error,
  },

  #[error("pattern: {pattern}: {source}")]
  Pattern {
    pattern: String,
    source: regex::Error,
  },

  #[error("config: {0}")]
  Config(#[from] toml::de::Error),

  #[error("snapshot: {0}")]
  Snapshot(String),

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
}

impl TriageError {
  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }

  pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
    Self::Io {
      context: context.into(),
      source,
    }
  }

  pub fn pattern(pattern: &str, source: regex::Error) -> Self {
    Self::Pattern {
      pattern: pattern.to_string(),
      source,
    }
  }

  pub fn snapshot(msg: impl Into<String>) -> Self {
    Self::Snapshot(msg.into())
  }
}

pub type Result<T> = std::result::Result<T, TriageError>;

//! Stable signature computation for grouping log lines into clusters.

use crate::category::{CategoryTable, EMPTY};
use crate::error::Result;
use crate::normalize::Normalizer;
use crate::types::Signature;

/// Category + normalized text for one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
  pub category: String,
  pub normalized: String,
}

impl Extracted {
  pub fn signature(&self) -> Signature {
    Signature::new(&self.category, &self.normalized)
  }
}

/// Maps raw text to (category, normalized text). Holds only compiled,
/// immutable rules; identical text always yields an identical result.
pub struct SignatureExtractor {
  normalizer: Normalizer,
  categories: CategoryTable,
}

impl SignatureExtractor {
  pub fn new() -> Result<Self> {
    Self::with_categories(CategoryTable::builtin()?)
  }

  pub fn with_categories(categories: CategoryTable) -> Result<Self> {
    Ok(Self {
      normalizer: Normalizer::new()?,
      categories,
    })
  }

  /// Category is decided on the normalized text, so equal normalized text
  /// always means an equal signature. Text that normalizes to nothing is
  /// tagged [`EMPTY`].
  pub fn extract(&self, text: &str) -> Extracted {
    let normalized = self.normalizer.normalize(text);
    let category = if normalized.is_empty() {
      EMPTY
    } else {
      self.categories.classify(&normalized)
    };
    Extracted {
      category: category.to_string(),
      normalized,
    }
  }

  pub fn signature(&self, text: &str) -> Signature {
    self.extract(text).signature()
  }
}

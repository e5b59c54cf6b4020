//! Normalize raw log text by replacing variable substrings with placeholders.
//!
//! Rules run in a fixed order. Every placeholder is upper-case and digit-free,
//! and the text is lower-cased before the first rule, so a later rule can never
//! re-match an earlier placeholder.

use regex::{Captures, Regex};

use crate::error::{Result, TriageError};

pub const TIMESTAMP: &str = "<TIMESTAMP>";
pub const IP: &str = "<IP>";
pub const UUID: &str = "<UUID>";
pub const LINE: &str = "<LINE>";
pub const NUM: &str = "<NUM>";
pub const PATH: &str = "<PATH>";
pub const STR: &str = "<STR>";
pub const HEX: &str = "<HEX>";

const TIMESTAMP_PATTERN: &str = concat!(
  // ISO-8601 date, optional time / fraction / offset
  r"\b\d{4}-\d{2}-\d{2}(?:[t ]\d{2}:\d{2}(?::\d{2}(?:[.,]\d+)?)?(?:\s?(?:z|[+-]\d{2}:?\d{2}))?)?\b",
  // Apache / nginx access log
  r"|\b\d{2}/[a-z]{3}/\d{4}:\d{2}:\d{2}:\d{2}(?:\s[+-]\d{4})?",
  // slash date
  r"|\b\d{4}/\d{2}/\d{2}\b",
  // syslog
  r"|\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}\b",
  // bare clock time
  r"|\b\d{2}:\d{2}:\d{2}(?:[.,]\d+)?\b",
);

const IP_PATTERN: &str = r"\b(?:\d{1,3}\.){3}\d{1,3}\b";

const UUID_PATTERN: &str = r"\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b";

const LINE_PATTERN: &str = r"\bline\s*:?\s*\d+\b";

const NUMBER_PATTERN: &str = r"\b([a-z_]*)\d+(?:\.\d+)?([a-z]*)\b";

const PATH_PATTERN: &str = r#"(^|[\s=(\[,"'])((?:[a-z]:[\\/]|~/|\.{1,2}/|/)[^\s"',;:()\[\]]+)"#;

const QUOTED_PATTERN: &str = r#"(^|\W)(?:"[^"]*"|'[^'\n]*')"#;

const HEX_PATTERN: &str = r"\b(?:0x[0-9a-f]+|[0-9a-f]{6,})\b";

/// How a rule rewrites one match.
#[derive(Debug, Clone, Copy)]
enum Rewrite {
  /// Replace the whole match.
  Fixed(&'static str),
  /// Keep capture group 1, then the placeholder.
  KeepPrefix(&'static str),
  /// Numeric tokens, with or without an alphabetic prefix.
  Number,
  /// Hex identifiers, length and digit checked.
  Hex,
}

struct Rule {
  name: &'static str,
  regex: Regex,
  rewrite: Rewrite,
}

impl Rule {
  fn new(name: &'static str, pattern: &str, rewrite: Rewrite) -> Result<Self> {
    let regex = Regex::new(pattern).map_err(|e| TriageError::pattern(pattern, e))?;
    Ok(Self {
      name,
      regex,
      rewrite,
    })
  }

  fn apply(&self, text: &str) -> String {
    match self.rewrite {
      Rewrite::Fixed(placeholder) => self.regex.replace_all(text, placeholder).into_owned(),
      Rewrite::KeepPrefix(placeholder) => self
        .regex
        .replace_all(text, |caps: &Captures| format!("{}{}", &caps[1], placeholder))
        .into_owned(),
      Rewrite::Number => self.regex.replace_all(text, rewrite_number).into_owned(),
      Rewrite::Hex => self.regex.replace_all(text, rewrite_hex).into_owned(),
    }
  }
}

/// `user123` -> `user<NUM>`, `45` -> `<NUM>`, `500ms` -> `<NUM>ms`. A lettered
/// token that is `0x`-prefixed or entirely hex (e.g. `deadbeef42`) is left for
/// the hex rule.
fn rewrite_number(caps: &Captures) -> String {
  let token = &caps[0];
  let prefix = &caps[1];
  let suffix = &caps[2];
  if prefix.is_empty() && suffix.is_empty() {
    return NUM.to_string();
  }
  if token.starts_with("0x") || is_hex_token(token) {
    return token.to_string();
  }
  format!("{}{}{}", prefix, NUM, suffix)
}

fn rewrite_hex(caps: &Captures) -> String {
  let token = &caps[0];
  let prefixed = token.starts_with("0x");
  if token.len() >= 6 && (prefixed || token.bytes().any(|b| b.is_ascii_digit())) {
    HEX.to_string()
  } else {
    token.to_string()
  }
}

fn is_hex_token(token: &str) -> bool {
  token.len() >= 6 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Ordered placeholder rules. Compile once and share; `normalize` is pure.
pub struct Normalizer {
  rules: Vec<Rule>,
}

impl Normalizer {
  pub fn new() -> Result<Self> {
    let rules = vec![
      Rule::new("timestamp", TIMESTAMP_PATTERN, Rewrite::Fixed(TIMESTAMP))?,
      Rule::new("ip", IP_PATTERN, Rewrite::Fixed(IP))?,
      Rule::new("uuid", UUID_PATTERN, Rewrite::Fixed(UUID))?,
      Rule::new("line", LINE_PATTERN, Rewrite::Fixed("line <LINE>"))?,
      Rule::new("number", NUMBER_PATTERN, Rewrite::Number)?,
      Rule::new("path", PATH_PATTERN, Rewrite::KeepPrefix(PATH))?,
      Rule::new("quoted", QUOTED_PATTERN, Rewrite::KeepPrefix(STR))?,
      Rule::new("hex", HEX_PATTERN, Rewrite::Hex)?,
    ];
    Ok(Self { rules })
  }

  /// Rule names in application order.
  pub fn rule_names(&self) -> Vec<&'static str> {
    self.rules.iter().map(|r| r.name).collect()
  }

  /// Lower-case, substitute placeholders, collapse whitespace.
  ///
  /// Total: text no rule matches comes back lower-cased and trimmed.
  pub fn normalize(&self, text: &str) -> String {
    let mut out = text.to_lowercase();
    for rule in &self.rules {
      out = rule.apply(&out);
    }
    collapse_whitespace(&out)
  }
}

fn collapse_whitespace(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for word in s.split_whitespace() {
    if !out.is_empty() {
      out.push(' ');
    }
    out.push_str(word);
  }
  out
}

//! Best-effort timestamp extraction and fixed-width time bucketing.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use crate::error::{Result, TriageError};

const ISO_PATTERN: &str =
  r"(\d{4}-\d{2}-\d{2})[Tt ](\d{2}:\d{2}:\d{2})(?:[.,]\d+)?\s?([Zz]|[+-]\d{2}:?\d{2})?";

const CLF_PATTERN: &str = r"(\d{2}/[A-Za-z]{3}/\d{4}:\d{2}:\d{2}:\d{2})(?:\s([+-]\d{4}))?";

/// Format a bucket start as its key: "YYYY-MM-DDTHH:MM".
pub fn bucket_key(ts: &DateTime<Utc>) -> String {
  ts.format("%Y-%m-%dT%H:%M").to_string()
}

/// Round `ts` down to a multiple of `minutes` since the Unix epoch.
pub fn floor_to_bucket(ts: &DateTime<Utc>, minutes: u32) -> DateTime<Utc> {
  let width = i64::from(minutes.max(1)) * 60;
  let secs = ts.timestamp();
  let floored = secs - secs.rem_euclid(width);
  DateTime::<Utc>::from_timestamp(floored, 0).unwrap_or(*ts)
}

/// Finds the first recognizable timestamp in a log line.
///
/// Offset-less times are taken as UTC. Nothing found is `None`, never an error.
pub struct TimestampParser {
  iso: Regex,
  clf: Regex,
}

impl TimestampParser {
  pub fn new() -> Result<Self> {
    Ok(Self {
      iso: Regex::new(ISO_PATTERN).map_err(|e| TriageError::pattern(ISO_PATTERN, e))?,
      clf: Regex::new(CLF_PATTERN).map_err(|e| TriageError::pattern(CLF_PATTERN, e))?,
    })
  }

  pub fn extract(&self, line: &str) -> Option<DateTime<Utc>> {
    if let Some(caps) = self.iso.captures(line) {
      let naive =
        NaiveDateTime::parse_from_str(&format!("{} {}", &caps[1], &caps[2]), "%Y-%m-%d %H:%M:%S")
          .ok();
      if let Some(naive) = naive {
        let offset = match caps.get(3).map(|m| m.as_str()) {
          None | Some("Z") | Some("z") => FixedOffset::east_opt(0),
          Some(o) => parse_offset(o),
        };
        if let Some(ts) = offset.and_then(|off| off.from_local_datetime(&naive).single()) {
          return Some(ts.with_timezone(&Utc));
        }
      }
    }

    let caps = self.clf.captures(line)?;
    let naive = NaiveDateTime::parse_from_str(&caps[1], "%d/%b/%Y:%H:%M:%S").ok()?;
    let offset = match caps.get(2) {
      Some(m) => parse_offset(m.as_str())?,
      None => FixedOffset::east_opt(0)?,
    };
    offset
      .from_local_datetime(&naive)
      .single()
      .map(|ts| ts.with_timezone(&Utc))
  }

  /// Extract and floor in one step.
  pub fn bucket(&self, line: &str, minutes: u32) -> Option<DateTime<Utc>> {
    self.extract(line).map(|ts| floor_to_bucket(&ts, minutes))
  }
}

/// "+02:00", "+0200", "-05:30" -> FixedOffset.
fn parse_offset(s: &str) -> Option<FixedOffset> {
  let (sign, rest) = match s.as_bytes().first()? {
    b'+' => (1, &s[1..]),
    b'-' => (-1, &s[1..]),
    _ => return None,
  };
  let digits: String = rest.chars().filter(|c| *c != ':').collect();
  if digits.len() != 4 {
    return None;
  }
  let hours: i32 = digits[..2].parse().ok()?;
  let minutes: i32 = digits[2..].parse().ok()?;
  FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

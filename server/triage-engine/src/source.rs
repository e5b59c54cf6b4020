//! Streaming line source: reads one or more inputs a line at a time, applies
//! include/exclude/keyword filters and attaches optional time buckets.
//!
//! Memory is constant in input size: a single line buffer, never grown past
//! `max_line_bytes`, is reused for every read and nothing is kept once a
//! record has been handed downstream.

use regex::Regex;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, ErrorKind};
use std::path::Path;
use tracing::{debug, warn};

use crate::bucket::TimestampParser;
use crate::config::Config;
use crate::error::{Result, TriageError};
use crate::types::RawRecord;

/// Compiled include/exclude/keyword filter.
#[derive(Clone)]
pub struct LineFilter {
  include: Vec<Regex>,
  exclude: Vec<Regex>,
  /// Lower-cased.
  keywords: Vec<String>,
}

impl LineFilter {
  pub fn new(include: &[String], exclude: &[String], keywords: &[String]) -> Result<Self> {
    Ok(Self {
      include: compile_all(include)?,
      exclude: compile_all(exclude)?,
      keywords: keywords
        .iter()
        .filter(|k| !k.is_empty())
        .map(|k| k.to_lowercase())
        .collect(),
    })
  }

  pub fn from_config(config: &Config) -> Result<Self> {
    Self::new(
      &config.include_patterns,
      &config.exclude_patterns,
      &config.keywords,
    )
  }

  /// Matches any include (or there are none), no exclude, and every keyword.
  pub fn accepts(&self, line: &str) -> bool {
    if !self.include.is_empty() && !self.include.iter().any(|re| re.is_match(line)) {
      return false;
    }
    if self.exclude.iter().any(|re| re.is_match(line)) {
      return false;
    }
    if self.keywords.is_empty() {
      return true;
    }
    let lower = line.to_lowercase();
    self.keywords.iter().all(|k| lower.contains(k.as_str()))
  }

  /// True if the filter accepts every line.
  pub fn is_empty(&self) -> bool {
    self.include.is_empty() && self.exclude.is_empty() && self.keywords.is_empty()
  }
}

impl std::fmt::Debug for LineFilter {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LineFilter")
      .field("include", &self.include.iter().map(Regex::as_str).collect::<Vec<_>>())
      .field("exclude", &self.exclude.iter().map(Regex::as_str).collect::<Vec<_>>())
      .field("keywords", &self.keywords)
      .finish()
  }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>> {
  patterns
    .iter()
    .map(|p| Regex::new(&format!("(?i){}", p)).map_err(|e| TriageError::pattern(p, e)))
    .collect()
}

/// Counters maintained while a source is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
  /// Physical lines read, including filtered and skipped ones.
  pub lines_read: u64,
  pub emitted: u64,
  pub filtered: u64,
  /// Invalid UTF-8, over-long lines, unterminated final lines, and abandoned
  /// reads.
  pub skipped: u64,
}

/// How one physical line ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineRead {
  Eof,
  /// Ended by `\n`; the buffer holds the line without it.
  Complete,
  /// Input ended before a `\n`.
  Unterminated,
  /// Longer than the cap; everything up to the next `\n` was discarded.
  Oversized,
}

/// Read one line into `buf` without ever holding more than `cap` bytes of it.
fn read_capped_line<R>(reader: &mut R, buf: &mut Vec<u8>, cap: usize) -> io::Result<LineRead>
where
  R: BufRead + ?Sized,
{
  buf.clear();
  let mut started = false;
  let mut oversized = false;
  loop {
    let available = match reader.fill_buf() {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == ErrorKind::Interrupted => continue,
      Err(e) => return Err(e),
    };
    if available.is_empty() {
      return Ok(match (started, oversized) {
        (false, _) => LineRead::Eof,
        (true, true) => LineRead::Oversized,
        (true, false) => LineRead::Unterminated,
      });
    }
    started = true;

    let newline = available.iter().position(|b| *b == b'\n');
    let chunk = &available[..newline.unwrap_or(available.len())];
    if !oversized {
      if buf.len() + chunk.len() > cap {
        oversized = true;
        buf.clear();
      } else {
        buf.extend_from_slice(chunk);
      }
    }
    let used = chunk.len() + usize::from(newline.is_some());
    reader.consume(used);

    if newline.is_some() {
      return Ok(if oversized {
        LineRead::Oversized
      } else {
        LineRead::Complete
      });
    }
  }
}

struct Input {
  name: String,
  reader: Box<dyn BufRead + Send>,
}

/// Pull-based, finite sequence of [`RawRecord`]s over one or more inputs.
///
/// Not restartable: reading again means building a new source.
pub struct LineSource {
  pending: VecDeque<Input>,
  current: Option<Input>,
  filter: LineFilter,
  bucketing: Option<(TimestampParser, u32)>,
  max_lines: Option<u64>,
  max_line_bytes: usize,
  buf: Vec<u8>,
  next_ordinal: u64,
  stats: SourceStats,
}

impl LineSource {
  /// A source with no inputs yet.
  pub fn new(config: &Config) -> Result<Self> {
    let bucketing = match config.time_bucket_minutes {
      Some(0) => {
        return Err(TriageError::validation(
          "time_bucket_minutes",
          "must be greater than zero",
        ))
      }
      Some(minutes) => Some((TimestampParser::new()?, minutes)),
      None => None,
    };
    if config.max_line_bytes == 0 {
      return Err(TriageError::validation(
        "max_line_bytes",
        "must be greater than zero",
      ));
    }
    Ok(Self {
      pending: VecDeque::new(),
      current: None,
      filter: LineFilter::from_config(config)?,
      bucketing,
      max_lines: config.max_lines,
      max_line_bytes: config.max_line_bytes,
      buf: Vec::with_capacity(config.max_line_bytes.min(1024)),
      next_ordinal: 0,
      stats: SourceStats::default(),
    })
  }

  /// Single-reader convenience.
  pub fn from_reader<R>(name: &str, reader: R, config: &Config) -> Result<Self>
  where
    R: BufRead + Send + 'static,
  {
    Ok(Self::new(config)?.with_reader(name, reader))
  }

  /// Open every path up front. Failing to open any of them is fatal.
  pub fn from_paths<P: AsRef<Path>>(paths: &[P], config: &Config) -> Result<Self> {
    let mut source = Self::new(config)?;
    for path in paths {
      let path = path.as_ref();
      let file = File::open(path)
        .map_err(|e| TriageError::io(format!("open {}", path.display()), e))?;
      debug!(path = %path.display(), "opened input");
      source = source.with_reader(&path.display().to_string(), BufReader::new(file));
    }
    Ok(source)
  }

  /// Queue another input after the ones already added.
  pub fn with_reader<R>(mut self, name: &str, reader: R) -> Self
  where
    R: BufRead + Send + 'static,
  {
    self.pending.push_back(Input {
      name: name.to_string(),
      reader: Box::new(reader),
    });
    self
  }

  pub fn stats(&self) -> SourceStats {
    self.stats
  }

  fn limit_reached(&self) -> bool {
    matches!(self.max_lines, Some(max) if self.stats.lines_read >= max)
  }
}

impl Iterator for LineSource {
  type Item = RawRecord;

  fn next(&mut self) -> Option<RawRecord> {
    loop {
      if self.limit_reached() {
        return None;
      }
      if self.current.is_none() {
        self.current = Some(self.pending.pop_front()?);
      }
      let input = self.current.as_mut()?;

      let read = read_capped_line(&mut *input.reader, &mut self.buf, self.max_line_bytes);
      match read {
        Ok(LineRead::Eof) => {
          self.current = None;
        }
        Ok(outcome) => {
          let ordinal = self.next_ordinal;
          self.next_ordinal += 1;
          self.stats.lines_read += 1;

          match outcome {
            LineRead::Unterminated => {
              debug!(input = %input.name, ordinal, "skipping unterminated final line");
              self.stats.skipped += 1;
              continue;
            }
            LineRead::Oversized => {
              debug!(
                input = %input.name,
                ordinal,
                max_line_bytes = self.max_line_bytes,
                "skipping over-long line"
              );
              self.stats.skipped += 1;
              continue;
            }
            LineRead::Complete | LineRead::Eof => {}
          }
          if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
          }

          let text = match std::str::from_utf8(&self.buf) {
            Ok(t) => t,
            Err(e) => {
              debug!(input = %input.name, ordinal, error = %e, "skipping non-UTF-8 line");
              self.stats.skipped += 1;
              continue;
            }
          };

          if !self.filter.accepts(text) {
            self.stats.filtered += 1;
            continue;
          }

          let bucket = self
            .bucketing
            .as_ref()
            .and_then(|(parser, minutes)| parser.bucket(text, *minutes));

          self.stats.emitted += 1;
          return Some(RawRecord {
            ordinal,
            text: text.to_string(),
            bucket,
          });
        }
        Err(e) => {
          warn!(input = %input.name, error = %e, "read failed; abandoning rest of input");
          self.stats.skipped += 1;
          self.current = None;
        }
      }
    }
  }
}

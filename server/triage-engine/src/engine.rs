//! Core engine: owns one run's cluster map, ingests records, produces a snapshot.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread;
use tracing::{debug, trace};

use crate::bucket::bucket_key;
use crate::config::Config;
use crate::error::{Result, TriageError};
use crate::signature::SignatureExtractor;
use crate::snapshot::SNAPSHOT_VERSION;
use crate::source::{LineSource, SourceStats};
use crate::types::*;

/// Clusters one run's records by signature.
///
/// Lifetime is one run: construct, [`ingest`](Self::ingest) every record,
/// then [`finish`](Self::finish). State grows with the number of distinct
/// signatures only.
pub struct ClusterEngine {
  max_line_numbers: usize,
  extractor: Arc<SignatureExtractor>,
  clusters: HashMap<Signature, ClusterRecord>,
  buckets: BTreeMap<String, u64>,
  clustered: u64,
}

impl ClusterEngine {
  pub fn new(config: &Config) -> Result<Self> {
    Self::with_extractor(config, Arc::new(SignatureExtractor::new()?))
  }

  pub fn with_defaults() -> Result<Self> {
    Self::new(&Config::default())
  }

  /// Share one compiled extractor between engines (e.g. shards).
  pub fn with_extractor(config: &Config, extractor: Arc<SignatureExtractor>) -> Result<Self> {
    if config.max_line_numbers == 0 {
      return Err(TriageError::validation(
        "max_line_numbers",
        "must be greater than zero",
      ));
    }
    Ok(Self {
      max_line_numbers: config.max_line_numbers,
      extractor,
      clusters: HashMap::new(),
      buckets: BTreeMap::new(),
      clustered: 0,
    })
  }

  /// Fold one record into its cluster.
  pub fn ingest(&mut self, record: &RawRecord) {
    let extracted = self.extractor.extract(&record.text);
    let signature = extracted.signature();

    self.clustered += 1;
    if let Some(bucket) = &record.bucket {
      *self.buckets.entry(bucket_key(bucket)).or_insert(0) += 1;
    }

    match self.clusters.get_mut(&signature) {
      Some(cluster) => {
        cluster.count += 1;
        if cluster.line_numbers.len() < self.max_line_numbers {
          cluster.line_numbers.push(record.ordinal);
        }
      }
      None => {
        trace!(signature = %signature, ordinal = record.ordinal, "new cluster");
        let cluster = ClusterRecord::new(&extracted.category, record);
        self.clusters.insert(signature, cluster);
      }
    }
  }

  /// Distinct signatures seen so far.
  pub fn len(&self) -> usize {
    self.clusters.len()
  }

  pub fn is_empty(&self) -> bool {
    self.clusters.is_empty()
  }

  /// Records ingested so far.
  pub fn clustered_lines(&self) -> u64 {
    self.clustered
  }

  /// End the run. `stats` are the source's counters; when records did not
  /// come through a [`LineSource`], pass counters describing them (see
  /// [`analyze_records`]).
  pub fn finish(self, stats: SourceStats) -> ClusterSnapshot {
    let summary = RunSummary {
      total_lines: stats.lines_read,
      total_clusters: self.clusters.len() as u64,
      clustered_lines: self.clustered,
      filtered_lines: stats.filtered,
      skipped_lines: stats.skipped,
    };
    debug!(
      total_lines = summary.total_lines,
      clusters = summary.total_clusters,
      filtered = summary.filtered_lines,
      skipped = summary.skipped_lines,
      "run finished"
    );
    ClusterSnapshot {
      version: SNAPSHOT_VERSION,
      summary,
      buckets: self.buckets,
      clusters: self.clusters.into_iter().collect(),
    }
  }
}

/// Run a whole source through a fresh engine.
pub fn analyze(mut source: LineSource, config: &Config) -> Result<ClusterSnapshot> {
  let mut engine = ClusterEngine::new(config)?;
  for record in source.by_ref() {
    engine.ingest(&record);
  }
  Ok(engine.finish(source.stats()))
}

/// Cluster pre-built records (no filtering). Every record counts as one line
/// read.
pub fn analyze_records<I>(records: I, config: &Config) -> Result<ClusterSnapshot>
where
  I: IntoIterator<Item = RawRecord>,
{
  let engine = ClusterEngine::new(config)?;
  Ok(run_records(engine, records))
}

fn run_records<I>(mut engine: ClusterEngine, records: I) -> ClusterSnapshot
where
  I: IntoIterator<Item = RawRecord>,
{
  for record in records {
    engine.ingest(&record);
  }
  let n = engine.clustered_lines();
  engine.finish(SourceStats {
    lines_read: n,
    emitted: n,
    ..SourceStats::default()
  })
}

/// Cluster shards on separate threads and merge the partial snapshots.
///
/// Records must carry global ordinals; the result then equals a single-threaded
/// run over the same records, whatever the shard assignment.
pub fn analyze_sharded(shards: Vec<Vec<RawRecord>>, config: &Config) -> Result<ClusterSnapshot> {
  let extractor = Arc::new(SignatureExtractor::new()?);
  let engines = shards
    .iter()
    .map(|_| ClusterEngine::with_extractor(config, Arc::clone(&extractor)))
    .collect::<Result<Vec<_>>>()?;

  let partials: Vec<ClusterSnapshot> = thread::scope(|scope| {
    let handles: Vec<_> = engines
      .into_iter()
      .zip(shards)
      .map(|(engine, shard)| scope.spawn(move || run_records(engine, shard)))
      .collect();
    handles
      .into_iter()
      .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
      .collect()
  });

  let cap = config.max_line_numbers;
  Ok(
    partials
      .into_iter()
      .fold(ClusterSnapshot::empty(), |acc, part| merge(acc, part, cap)),
  )
}

/// Combine two partial snapshots of the same run.
///
/// Associative and commutative: counts and counters add up, line numbers are
/// unioned and re-capped at `cap`, and the sample comes from the globally
/// earliest occurrence.
pub fn merge(mut a: ClusterSnapshot, b: ClusterSnapshot, cap: usize) -> ClusterSnapshot {
  for (signature, theirs) in b.clusters {
    match a.clusters.get_mut(&signature) {
      Some(ours) => merge_record(ours, theirs, cap),
      None => {
        a.clusters.insert(signature, theirs);
      }
    }
  }
  for (key, count) in b.buckets {
    *a.buckets.entry(key).or_insert(0) += count;
  }

  a.summary = RunSummary {
    total_lines: a.summary.total_lines + b.summary.total_lines,
    total_clusters: a.clusters.len() as u64,
    clustered_lines: a.summary.clustered_lines + b.summary.clustered_lines,
    filtered_lines: a.summary.filtered_lines + b.summary.filtered_lines,
    skipped_lines: a.summary.skipped_lines + b.summary.skipped_lines,
  };
  a
}

fn merge_record(ours: &mut ClusterRecord, theirs: ClusterRecord, cap: usize) {
  ours.count += theirs.count;

  let mut lines = std::mem::take(&mut ours.line_numbers);
  lines.extend(theirs.line_numbers);
  lines.sort_unstable();
  lines.dedup();
  lines.truncate(cap);
  ours.line_numbers = lines;

  if (theirs.first_seen, &theirs.sample) < (ours.first_seen, &ours.sample) {
    ours.first_seen = theirs.first_seen;
    ours.sample = theirs.sample;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn records(lines: &[&str]) -> Vec<RawRecord> {
    lines
      .iter()
      .enumerate()
      .map(|(i, l)| RawRecord::new(i as u64, *l))
      .collect()
  }

  /// Distinct, digit-free word per `n` (base 26).
  fn letters(mut n: u64) -> String {
    let mut s = String::new();
    loop {
      s.push((b'a' + (n % 26) as u8) as char);
      n /= 26;
      if n == 0 {
        return s;
      }
    }
  }

  #[test]
  fn similar_lines_share_a_cluster() {
    let snap = analyze_records(
      records(&[
        "Connection to 192.168.1.100 failed at line 45",
        "Connection to 10.0.0.2 failed at line 99",
      ]),
      &Config::default(),
    )
    .unwrap();

    assert_eq!(snap.clusters.len(), 1);
    let (sig, cluster) = snap.clusters.iter().next().unwrap();
    assert_eq!(sig.category(), Some("Network"));
    assert_eq!(cluster.count, 2);
    assert_eq!(cluster.sample, "Connection to 192.168.1.100 failed at line 45");
    assert_eq!(cluster.line_numbers, vec![0, 1]);
    assert_eq!(cluster.first_seen, 0);
    assert_eq!(cluster.category, "Network");
  }

  #[test]
  fn line_numbers_are_capped() {
    let config = Config {
      max_line_numbers: 3,
      ..Config::default()
    };
    let lines: Vec<String> = (0..10).map(|i| format!("worker {} crashed", i)).collect();
    let recs = lines
      .iter()
      .enumerate()
      .map(|(i, l)| RawRecord::new(i as u64, l.as_str()))
      .collect::<Vec<_>>();
    let snap = analyze_records(recs, &config).unwrap();
    let cluster = snap.clusters.values().next().unwrap();
    assert_eq!(cluster.count, 10);
    assert_eq!(cluster.line_numbers, vec![0, 1, 2]);
  }

  #[test]
  fn state_grows_with_distinct_signatures_not_lines() {
    let shapes = [
      "database timeout",
      "disk full",
      "null pointer",
      "auth failed",
      "bad gateway",
    ];
    let mut few = ClusterEngine::with_defaults().unwrap();
    for i in 0..10_000u64 {
      let text = format!("{} after {} ms", shapes[(i % 5) as usize], i);
      few.ingest(&RawRecord::new(i, text));
    }
    assert_eq!(few.len(), 5);

    let mut many = ClusterEngine::with_defaults().unwrap();
    for i in 0..10_000u64 {
      // Letter-only variation survives normalization.
      many.ingest(&RawRecord::new(i, format!("unknown opcode {}", letters(i))));
    }
    assert_eq!(many.len(), 10_000);
    assert_eq!(few.clustered_lines(), many.clustered_lines());
  }

  #[test]
  fn blank_lines_are_clustered_not_dropped() {
    let snap = analyze_records(records(&["", "   ", "boom"]), &Config::default()).unwrap();
    let empty = snap.clusters.get(&Signature::new("Empty", "")).unwrap();
    assert_eq!(empty.count, 2);
    assert_eq!(snap.summary.clustered_lines, 3);
  }

  #[test]
  fn output_is_reproducible() {
    let input = records(&["a 1", "b 2", "a 3", "c", "b 9"]);
    let one = analyze_records(input.clone(), &Config::default()).unwrap();
    let two = analyze_records(input, &Config::default()).unwrap();
    assert_eq!(
      serde_json::to_string(&one).unwrap(),
      serde_json::to_string(&two).unwrap()
    );
  }

  #[test]
  fn buckets_are_counted() {
    let bucket = chrono::DateTime::parse_from_rfc3339("2025-01-15T10:30:00Z")
      .unwrap()
      .with_timezone(&chrono::Utc);
    let mut rec = RawRecord::new(0, "boom");
    rec.bucket = Some(bucket);
    let snap = analyze_records(vec![rec.clone(), rec, RawRecord::new(2, "boom")], &Config::default())
      .unwrap();
    assert_eq!(snap.buckets.get("2025-01-15T10:30"), Some(&2));
    assert_eq!(snap.buckets.len(), 1);
  }

  #[test]
  fn zero_line_number_cap_is_rejected() {
    let config = Config {
      max_line_numbers: 0,
      ..Config::default()
    };
    assert!(ClusterEngine::new(&config).is_err());
  }

  #[test]
  fn merge_is_commutative() {
    let config = Config::default();
    let a = analyze_records(
      vec![RawRecord::new(4, "disk full on 10.0.0.1"), RawRecord::new(7, "oops")],
      &config,
    )
    .unwrap();
    let b = analyze_records(
      vec![RawRecord::new(1, "disk full on 10.0.0.9"), RawRecord::new(2, "other")],
      &config,
    )
    .unwrap();

    let ab = merge(a.clone(), b.clone(), 10);
    let ba = merge(b, a, 10);
    assert_eq!(ab, ba);

    let disk = ab
      .clusters
      .values()
      .find(|c| c.category == "FileSystem")
      .unwrap();
    assert_eq!(disk.count, 2);
    assert_eq!(disk.first_seen, 1);
    assert_eq!(disk.sample, "disk full on 10.0.0.9");
    assert_eq!(disk.line_numbers, vec![1, 4]);
    assert_eq!(ab.summary.total_clusters, 3);
    assert_eq!(ab.summary.total_lines, 4);
  }

  #[test]
  fn sharded_run_matches_single_threaded_run() {
    let lines: Vec<String> = (0..200)
      .map(|i| match i % 4 {
        0 => format!("Database connection timeout server db{}", i),
        1 => format!("Connection to 10.0.{}.1 failed at line {}", i % 7, i),
        2 => format!("user{} not found", i),
        _ => "ERROR unexpected panic".to_string(),
      })
      .collect();
    let all: Vec<RawRecord> = lines
      .iter()
      .enumerate()
      .map(|(i, l)| RawRecord::new(i as u64, l.as_str()))
      .collect();

    let config = Config {
      max_line_numbers: 5,
      ..Config::default()
    };
    let single = analyze_records(all.clone(), &config).unwrap();

    // Interleaved assignment so every shard sees every signature.
    let mut shards = vec![Vec::new(), Vec::new(), Vec::new()];
    for (i, rec) in all.into_iter().enumerate() {
      shards[i % 3].push(rec);
    }
    let sharded = analyze_sharded(shards, &config).unwrap();
    assert_eq!(single, sharded);
  }
}

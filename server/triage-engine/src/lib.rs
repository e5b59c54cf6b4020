//! PushLog Error Log Triage Engine: deterministic log clustering.
//!
//! Streams raw error log lines, reduces each to a stable signature
//! (category + placeholder text), keeps one cluster per signature and emits a
//! ClusterSnapshot. Two persisted snapshots can be diffed to surface new,
//! resolved and regressed clusters.
//!
//! No AI, no DB, no network; pure computation + in-memory state.

pub mod bucket;
pub mod category;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod signature;
pub mod snapshot;
pub mod source;
pub mod types;

pub use config::{Config, DiffConfig, ZeroDeltaPolicy};
pub use diff::{diff, diff_json};
pub use engine::{analyze, analyze_records, analyze_sharded, merge, ClusterEngine};
pub use error::{Result, TriageError};
pub use signature::SignatureExtractor;
pub use source::{LineFilter, LineSource, SourceStats};
pub use types::{ClusterRecord, ClusterSnapshot, DiffResult, RawRecord, Signature};

//! Binary entrypoint: read raw log lines from stdin, write one ClusterSnapshot
//! JSON document to stdout.
//!
//! An optional TOML config is read from the path in `TRIAGE_ENGINE_CONFIG`.
//! Logs go to stderr; `RUST_LOG` overrides the default `triage_engine=info`.

use std::io::{self, BufReader, Write};
use tracing_subscriber::EnvFilter;
use triage_engine::{analyze, Config, LineSource, TriageError};

const CONFIG_ENV: &str = "TRIAGE_ENGINE_CONFIG";

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("triage_engine=info")),
    )
    .with_writer(io::stderr)
    .init();

  if let Err(e) = run_binary() {
    let _ = writeln!(io::stderr(), "triage-engine error: {}", e);
    std::process::exit(1);
  }
}

fn load_config() -> Result<Config, TriageError> {
  match std::env::var_os(CONFIG_ENV) {
    None => Ok(Config::default()),
    Some(path) => {
      let text = std::fs::read_to_string(&path)
        .map_err(|e| TriageError::io(format!("read {}", path.to_string_lossy()), e))?;
      Config::from_toml_str(&text)
    }
  }
}

fn run_binary() -> Result<(), Box<dyn std::error::Error>> {
  let config = load_config()?;
  let source = LineSource::from_reader("stdin", BufReader::new(io::stdin()), &config)?;
  let snapshot = analyze(source, &config)?;

  let json = serde_json::to_vec(&snapshot)?;
  let mut out = io::stdout().lock();
  out.write_all(&json)?;
  out.write_all(b"\n")?;
  out.flush()?;
  Ok(())
}

//! Persistence layer.
//!
//! Completed analysis runs are written as one JSON file per run, keyed by
//! fight id. The odds store lives in [`sqlite`].

pub mod sqlite;

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::stream::{AnalysisRunState, FightResult};
use crate::types::PipelineError;

/// Default directory for run result files.
pub const DEFAULT_RESULTS_DIR: &str = "mafs_runs";

fn run_path(dir: &Path, run_id: &str) -> PathBuf {
    dir.join(format!("{run_id}.json"))
}

/// Persist the results of a completed run exactly once.
///
/// Refuses incomplete or failed runs, and refuses to overwrite an earlier
/// write for the same run id.
pub fn save_run_results(state: &AnalysisRunState, dir: &Path) -> Result<PathBuf> {
    if !state.is_complete || state.is_fatal {
        return Err(PipelineError::RunIncomplete(state.run_id.clone()).into());
    }

    let keyed: BTreeMap<&str, &FightResult> = state
        .results
        .iter()
        .map(|r| (r.fight_id.as_str(), r))
        .collect();
    if keyed.len() < state.results.len() {
        debug!(
            run_id = %state.run_id,
            results = state.results.len(),
            unique = keyed.len(),
            "Duplicate fight ids; last result per fight kept"
        );
    }

    std::fs::create_dir_all(dir).context(format!("Failed to create {}", dir.display()))?;
    let path = run_path(dir, &state.run_id);
    let json = serde_json::to_string_pretty(&keyed).context("Failed to serialise run results")?;

    let mut file = match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(PipelineError::AlreadyPersisted(state.run_id.clone()).into());
        }
        Err(e) => return Err(e).context(format!("Failed to create {}", path.display())),
    };
    file.write_all(json.as_bytes())
        .context(format!("Failed to write results to {}", path.display()))?;

    info!(run_id = %state.run_id, path = %path.display(), fights = keyed.len(), "Run results saved");
    Ok(path)
}

/// Load a persisted run. Returns None if it was never saved.
pub fn load_run_results(dir: &Path, run_id: &str) -> Result<Option<BTreeMap<String, FightResult>>> {
    let path = run_path(dir, run_id);
    if !path.exists() {
        info!(path = %path.display(), "No saved results for run");
        return Ok(None);
    }

    let json = std::fs::read_to_string(&path)
        .context(format!("Failed to read results from {}", path.display()))?;
    let results = serde_json::from_str(&json)
        .context(format!("Failed to parse results from {}", path.display()))?;
    Ok(Some(results))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Snapshot records, loading and transaction statistics

pub mod snapshot;
pub mod statistics;

use anyhow::{Context, Result};
use snapshot::Snapshot;
use std::path::Path;

/// Read a JSON graph snapshot from disk
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Snapshot> {
    let path = path.as_ref();
    log::info!("Reading snapshot file: {}", path.display());

    if !path.exists() {
        return Err(anyhow::anyhow!("File not found: {}", path.display()));
    }

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let snapshot = Snapshot::from_json(&text)
        .with_context(|| format!("Failed to decode snapshot {}", path.display()))?;

    log::info!(
        "Loaded {} node records and {} edge records",
        snapshot.nodes.len(),
        snapshot.edges.len()
    );

    Ok(snapshot)
}

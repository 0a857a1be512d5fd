//! Results persistence module

use crate::analysis::risk::AnalysisResult;
use anyhow::Result;
use serde_json::{json, to_string_pretty};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Save analysis results to the specified directory
pub fn save_results(result: &AnalysisResult, output_dir: impl AsRef<Path>) -> Result<()> {
    let output_dir = output_dir.as_ref();
    log::info!(
        "Saving {} anomalies to {}",
        result.anomalies.len(),
        output_dir.display()
    );

    fs::create_dir_all(output_dir)?;

    save_analysis(result, output_dir)?;
    save_summary(result, output_dir)?;
    save_anomalies(result, output_dir)?;

    log::info!("Results saved successfully");

    Ok(())
}

fn write_json(path: &Path, value: &impl serde::Serialize) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(to_string_pretty(value)?.as_bytes())?;
    Ok(())
}

/// Save the complete result
fn save_analysis(result: &AnalysisResult, output_dir: &Path) -> Result<()> {
    log::debug!("Saving full analysis");
    write_json(&output_dir.join("analysis.json"), result)
}

/// Save graph shape, detector counts and the overall verdict
fn save_summary(result: &AnalysisResult, output_dir: &Path) -> Result<()> {
    log::debug!("Saving summary information");

    let summary = json!({
        "graph": result.summary,
        "counts": {
            "cycles": result.cycles.len(),
            "bursts": result.bursts.len(),
            "groups": result.clusters.len(),
            "communities": result.communities.stats.count,
            "denseSubgraphs": result.dense_subgraphs.len(),
            "anomalies": result.anomalies.len(),
        },
        "communities": result.communities.stats,
        "overallRisk": result.overall_risk,
        "partial": result.partial,
        "elapsedMs": result.elapsed_ms,
        "diagnostics": result.diagnostics,
    });

    write_json(&output_dir.join("summary.json"), &summary)
}

/// Save the uniform anomaly list
fn save_anomalies(result: &AnalysisResult, output_dir: &Path) -> Result<()> {
    log::debug!("Saving anomaly list");
    write_json(&output_dir.join("anomalies.json"), &result.anomalies)
}

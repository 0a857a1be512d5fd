//! Risk scoring and the analysis orchestrator

use crate::analysis::bursts::{detect_bursts, Burst};
use crate::analysis::cycles::{detect_cycles, Cycle};
use crate::analysis::paths::{analyze_paths, PathReport};
use crate::analysis::Deadline;
use crate::cluster::{find_risk_groups, Cluster};
use crate::config::AnalysisConfig;
use crate::data::snapshot::Snapshot;
use crate::data::statistics::{transaction_statistics, TransactionStatistics};
use crate::error::{AnalysisError, Result};
use crate::graph::algorithms::{degree_centrality, summarize, CentralNode, GraphSummary};
use crate::graph::community::{detect_communities, CommunityReport};
use crate::graph::subgraphs::{mine_subgraphs, DenseSubgraph};
use crate::graph::{build_graph, BuildDiagnostics};
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyKind {
    Cycle,
    Rapid,
    Group,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnomalyPayload {
    Cycle(Cycle),
    Rapid(Burst),
    Group(Cluster),
}

/// A finding from any detector, on a common footing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    /// `raw_risk / 100`, in [0, 1]
    pub severity: f64,
    /// Detector risk on the 0-100 scale
    pub raw_risk: f64,
    pub payload: AnomalyPayload,
}

impl Anomaly {
    fn new(kind: AnomalyKind, raw_risk: f64, payload: AnomalyPayload) -> Self {
        Self {
            kind,
            severity: raw_risk / 100.0,
            raw_risk,
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Verdict over the summed raw risks of all anomalies
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallRisk {
    pub score: f64,
    pub level: RiskLevel,
}

/// Sum raw risks and threshold: above 50 is high, above 20 medium
pub fn overall_risk(anomalies: &[Anomaly]) -> OverallRisk {
    let score: f64 = anomalies.iter().map(|anomaly| anomaly.raw_risk).sum();
    let level = if score > 50.0 {
        RiskLevel::High
    } else if score > 20.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };
    OverallRisk { score, level }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    #[serde(flatten)]
    pub build: BuildDiagnostics,
    pub cycle_candidates: usize,
    /// The cycle search hit `maxCyclesEmitted`
    pub cycles_truncated: bool,
    pub cluster_candidates: usize,
    /// Phases that did not run, with the reason
    pub skipped_phases: Vec<String>,
}

/// Everything one analysis run produces
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub summary: GraphSummary,
    pub cycles: Vec<Cycle>,
    pub bursts: Vec<Burst>,
    pub clusters: Vec<Cluster>,
    pub paths: Option<PathReport>,
    pub communities: CommunityReport,
    pub dense_subgraphs: Vec<DenseSubgraph>,
    pub centrality: Vec<CentralNode>,
    pub statistics: TransactionStatistics,
    pub anomalies: Vec<Anomaly>,
    pub overall_risk: OverallRisk,
    pub diagnostics: Diagnostics,
    /// Some phase stopped early at the deadline
    pub partial: bool,
    /// Wall-clock time of the run; left out of the JSON so output stays reproducible
    #[serde(skip)]
    pub elapsed_ms: u64,
}

/// Combine detector outputs into one anomaly list, in detector order
pub fn collect_anomalies(cycles: &[Cycle], bursts: &[Burst], clusters: &[Cluster]) -> Vec<Anomaly> {
    let cycle_anomalies = cycles.iter().map(|cycle| {
        Anomaly::new(
            AnomalyKind::Cycle,
            f64::from(cycle.risk),
            AnomalyPayload::Cycle(cycle.clone()),
        )
    });
    let burst_anomalies = bursts
        .iter()
        .map(|burst| Anomaly::new(AnomalyKind::Rapid, burst.risk(), AnomalyPayload::Rapid(burst.clone())));
    let group_anomalies = clusters
        .iter()
        .map(|group| Anomaly::new(AnomalyKind::Group, group.risk, AnomalyPayload::Group(group.clone())));

    cycle_anomalies
        .chain(burst_anomalies)
        .chain(group_anomalies)
        .collect()
}

fn run(snapshot: &Snapshot, config: &AnalysisConfig) -> Result<AnalysisResult> {
    let started = Instant::now();
    let deadline = Deadline::after(config.timeout());

    let (graph, build) = build_graph(&snapshot.nodes, &snapshot.edges);
    let mut diagnostics = Diagnostics {
        build,
        ..Diagnostics::default()
    };

    let cycle_report = detect_cycles(&graph, config, &deadline);
    diagnostics.cycle_candidates = cycle_report.candidates;
    diagnostics.cycles_truncated = cycle_report.truncated;

    let bursts = detect_bursts(&graph, config);

    let cluster_report = find_risk_groups(&graph, config, &deadline);
    diagnostics.cluster_candidates = cluster_report.candidates;

    let paths = if !config.analyze_paths {
        diagnostics.skipped_phases.push("paths: disabled".to_string());
        None
    } else {
        match analyze_paths(&graph, config, &deadline) {
            Ok(report) => Some(report),
            Err(err @ AnalysisError::GraphTooLarge { .. }) => {
                log::warn!("Skipping path analysis: {}", err);
                diagnostics.skipped_phases.push(format!("paths: {}", err));
                None
            }
            Err(err) => return Err(err),
        }
    };

    let communities = detect_communities(&graph, &deadline);
    let subgraph_report = mine_subgraphs(
        &graph,
        config.subgraph_min_size,
        config.subgraph_min_density,
        &deadline,
    );

    let partial = cycle_report.partial
        || cluster_report.partial
        || communities.partial
        || subgraph_report.partial
        || paths.as_ref().map_or(false, |report| report.partial);
    if partial {
        log::warn!("Analysis deadline expired; results are partial");
    }

    let anomalies = collect_anomalies(&cycle_report.cycles, &bursts, &cluster_report.groups);
    let overall_risk = overall_risk(&anomalies);

    let result = AnalysisResult {
        summary: summarize(&graph),
        centrality: degree_centrality(&graph, config.top_central_nodes),
        statistics: transaction_statistics(&graph),
        cycles: cycle_report.cycles,
        bursts,
        clusters: cluster_report.groups,
        paths,
        communities,
        dense_subgraphs: subgraph_report.subgraphs,
        anomalies,
        overall_risk,
        diagnostics,
        partial,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };

    log::info!(
        "Analysis finished in {} ms: {} anomalies, overall risk {:?} ({:.1})",
        result.elapsed_ms,
        result.anomalies.len(),
        result.overall_risk.level,
        result.overall_risk.score
    );

    Ok(result)
}

/// Analyze a snapshot: cycles, bursts, risk groups, paths, communities,
/// dense subgraphs and the overall verdict.
///
/// Pure with respect to its inputs; identical snapshots and options give
/// identical serialized results. With `threads > 0` the parallel phases run
/// on a dedicated pool of that size instead of rayon's global pool.
pub fn analyze(snapshot: &Snapshot, config: &AnalysisConfig) -> Result<AnalysisResult> {
    config.validate()?;

    if config.threads > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()?;
        pool.install(|| run(snapshot, config))
    } else {
        run(snapshot, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::snapshot::{NodeType, RawEdge, RawNode};

    fn account_triangle() -> Snapshot {
        Snapshot::new(
            vec![
                RawNode::new("A", NodeType::Account),
                RawNode::new("B", NodeType::Account),
                RawNode::new("C", NodeType::Account),
            ],
            vec![
                RawEdge::new("A", "B").with_amount(100.0).with_timestamp(0),
                RawEdge::new("B", "C").with_amount(100.0).with_timestamp(60_000),
                RawEdge::new("C", "A").with_amount(100.0).with_timestamp(120_000),
            ],
        )
    }

    #[test]
    fn overall_risk_thresholds() {
        let burst = |n: usize| Burst {
            account_id: "x".into(),
            transactions: vec![
                crate::analysis::bursts::BurstTransaction {
                    id: None,
                    target: "y".into(),
                    amount: None,
                    timestamp: 0,
                };
                n
            ],
            time_span: 0,
        };

        assert_eq!(overall_risk(&[]).level, RiskLevel::Low);
        let two = collect_anomalies(&[], &[burst(2)], &[]);
        assert_eq!(overall_risk(&two).level, RiskLevel::Low);
        let three = collect_anomalies(&[], &[burst(3)], &[]);
        assert_eq!(overall_risk(&three).level, RiskLevel::Medium);
        let six = collect_anomalies(&[], &[burst(3), burst(3)], &[]);
        assert_eq!(overall_risk(&six).score, 60.0);
        assert_eq!(overall_risk(&six).level, RiskLevel::High);
    }

    #[test]
    fn triangle_is_one_high_risk_cycle() {
        let result = analyze(&account_triangle(), &AnalysisConfig::default()).unwrap();

        assert_eq!(result.cycles.len(), 1);
        assert_eq!(result.anomalies.len(), 1);
        let anomaly = &result.anomalies[0];
        assert_eq!(anomaly.kind, AnomalyKind::Cycle);
        assert_eq!(anomaly.raw_risk, 75.0);
        assert_eq!(anomaly.severity, 0.75);
        assert_eq!(result.overall_risk.level, RiskLevel::High);
        assert!(result.diagnostics.skipped_phases.is_empty());
        assert!(!result.partial);
    }

    #[test]
    fn oversized_graph_skips_paths_only() {
        let config = AnalysisConfig {
            max_path_nodes: 2,
            ..AnalysisConfig::default()
        };
        let result = analyze(&account_triangle(), &config).unwrap();

        assert!(result.paths.is_none());
        assert_eq!(result.diagnostics.skipped_phases.len(), 1);
        assert!(result.diagnostics.skipped_phases[0].starts_with("paths:"));
        assert_eq!(result.cycles.len(), 1);
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = AnalysisConfig {
            min_transactions: 0,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            analyze(&account_triangle(), &config),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn dedicated_pool_gives_same_result() {
        let shared = analyze(&account_triangle(), &AnalysisConfig::default()).unwrap();
        let pooled = analyze(
            &account_triangle(),
            &AnalysisConfig {
                threads: 2,
                ..AnalysisConfig::default()
            },
        )
        .unwrap();

        assert_eq!(
            serde_json::to_string(&shared).unwrap(),
            serde_json::to_string(&pooled).unwrap()
        );
    }
}

//! Transaction cycle detection, classification and risk scoring

use crate::analysis::Deadline;
use crate::config::AnalysisConfig;
use crate::data::snapshot::{NodeType, RecordId};
use crate::graph::algorithms::has_cycle;
use crate::graph::TransactionGraph;
use itertools::Itertools;
use serde::Serialize;
use std::collections::HashSet;

const DAY_MS: f64 = 86_400_000.0;

/// What kind of money movement a cycle looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleKind {
    /// Only accounts: money going round in circles
    MoneyCycle,
    /// Accounts and merchants: cashing out through a merchant
    CashoutCycle,
    /// Many accounts mixed with other entities
    DisperseCycle,
    UnknownCycle,
}

/// A closed directed walk. The edge from the last node returns to the first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cycle {
    /// Node ids, rotated to start at the smallest id
    pub path: Vec<RecordId>,
    pub classification: CycleKind,
    /// Integer risk in [0, 100]
    pub risk: u8,
    /// Sum of the amounts on the traversed edges
    pub total_amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    /// Significant cycles, highest risk first
    pub cycles: Vec<Cycle>,
    /// Raw cycles closed by the search before scoring and filtering
    pub candidates: usize,
    /// The search stopped at `maxCyclesEmitted`
    pub truncated: bool,
    /// The deadline expired before every DFS root was explored
    pub partial: bool,
}

/// Classify a cycle from its node types; first matching rule wins
pub fn classify(types: &[NodeType]) -> CycleKind {
    let accounts = types.iter().filter(|&&t| t == NodeType::Account).count();
    let has_merchant = types.contains(&NodeType::Merchant);

    if accounts == types.len() {
        CycleKind::MoneyCycle
    } else if has_merchant && accounts > 0 {
        CycleKind::CashoutCycle
    } else if accounts > 3 {
        CycleKind::DisperseCycle
    } else {
        CycleKind::UnknownCycle
    }
}

/// Short mean intervals between the cycle's transactions score up to 30
pub fn time_term(timestamps: &[i64]) -> f64 {
    if timestamps.len() < 2 {
        return 0.0;
    }

    let sorted: Vec<i64> = timestamps.iter().copied().sorted_unstable().collect();
    let total: f64 = sorted
        .iter()
        .tuple_windows()
        .map(|(a, b)| (b - a) as f64)
        .sum();
    let mean_interval = total / (sorted.len() - 1) as f64;

    (30.0 * (1.0 - mean_interval / DAY_MS)).round().clamp(0.0, 30.0)
}

/// Accounts, merchants and type diversity score up to 20
pub fn type_term(types: &[NodeType]) -> f64 {
    let accounts = types.iter().filter(|&&t| t == NodeType::Account).count();
    let distinct = types.iter().collect::<HashSet<_>>().len();

    let mut term = accounts as f64 * 5.0;
    if types.contains(&NodeType::Merchant) {
        term += 15.0;
    }
    if distinct > 2 {
        term += 10.0;
    }
    term.min(20.0)
}

/// Score a cycle given as arena indices. Returns the risk and the traversed amount.
pub fn score_cycle(graph: &TransactionGraph, cycle: &[usize]) -> (u8, f64) {
    let len = cycle.len();
    let mut total_amount = 0.0;
    let mut timestamps = Vec::with_capacity(len);

    for (i, &from) in cycle.iter().enumerate() {
        let to = cycle[(i + 1) % len];
        if let Some(edge) = graph.find_edge(from, to) {
            total_amount += edge.amount_or_zero();
            if let Some(ts) = edge.timestamp {
                timestamps.push(ts);
            }
        }
    }

    let types: Vec<NodeType> = cycle.iter().map(|&idx| graph.node_type(idx)).collect();

    let base = len as f64 * 10.0;
    let amount_term = (total_amount / 10_000.0).min(50.0);
    let score = (base + amount_term + time_term(&timestamps) + type_term(&types))
        .round()
        .clamp(0.0, 100.0);

    (score as u8, total_amount)
}

/// Rotate a cycle so it starts at its smallest node id
fn canonical_rotation(graph: &TransactionGraph, cycle: &[usize]) -> Vec<usize> {
    let start = (0..cycle.len())
        .min_by(|&a, &b| graph.node_id(cycle[a]).cmp(graph.node_id(cycle[b])))
        .unwrap_or(0);
    cycle[start..].iter().chain(cycle[..start].iter()).copied().collect()
}

/// Distinct successors of every node, in id order
fn successors_by_id(graph: &TransactionGraph) -> Vec<Vec<usize>> {
    (0..graph.node_count())
        .map(|node| {
            graph
                .outgoing(node)
                .iter()
                .map(|&edge_idx| graph.edge(edge_idx).target)
                .sorted_unstable_by(|&a, &b| graph.node_id(a).cmp(graph.node_id(b)))
                .dedup()
                .collect()
        })
        .collect()
}

/// Enumerate the cycles closed by a depth-first search from every unvisited node.
///
/// The search keeps an explicit stack instead of recursing. An edge into a
/// node that is on the current path closes a cycle made of the path slice
/// from that node to the tail. Roots and successors are visited in id order
/// so the cycles found do not depend on snapshot order. Cost is bounded by
/// `max_cycles_emitted` and `max_path_length`.
fn enumerate_cycles(
    graph: &TransactionGraph,
    config: &AnalysisConfig,
    deadline: &Deadline,
    report: &mut CycleReport,
) -> Vec<Vec<usize>> {
    let node_count = graph.node_count();
    let successors = successors_by_id(graph);
    let roots: Vec<usize> = (0..node_count)
        .sorted_unstable_by(|&a, &b| graph.node_id(a).cmp(graph.node_id(b)))
        .collect();

    let mut visited = vec![false; node_count];
    let mut on_path = vec![false; node_count];
    let mut found: Vec<Vec<usize>> = Vec::new();

    'roots: for root in roots {
        if visited[root] {
            continue;
        }
        if deadline.expired() {
            log::warn!("Deadline expired during cycle search, returning partial result");
            report.partial = true;
            break;
        }

        // (node, next successor to try)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        let mut path: Vec<usize> = vec![root];
        visited[root] = true;
        on_path[root] = true;

        while let Some(&(node, cursor)) = stack.last() {
            let next = &successors[node];
            if cursor == next.len() {
                stack.pop();
                path.pop();
                on_path[node] = false;
                continue;
            }

            let top = stack.len() - 1;
            stack[top].1 += 1;

            let target = next[cursor];
            if on_path[target] {
                if let Some(start) = path.iter().position(|&idx| idx == target) {
                    found.push(path[start..].to_vec());
                    if found.len() >= config.max_cycles_emitted {
                        log::warn!(
                            "Cycle search stopped after {} cycles",
                            config.max_cycles_emitted
                        );
                        report.truncated = true;
                        break 'roots;
                    }
                }
            } else if !visited[target] && path.len() < config.max_path_length {
                visited[target] = true;
                on_path[target] = true;
                path.push(target);
                stack.push((target, 0));
            }
        }
    }

    found
}

/// Find, classify, score and filter the transaction cycles of a graph
pub fn detect_cycles(
    graph: &TransactionGraph,
    config: &AnalysisConfig,
    deadline: &Deadline,
) -> CycleReport {
    let mut report = CycleReport::default();

    if !has_cycle(graph) {
        log::debug!("Graph is acyclic, skipping cycle search");
        return report;
    }

    let raw_cycles = enumerate_cycles(graph, config, deadline, &mut report);
    report.candidates = raw_cycles.len();

    let mut scored: Vec<(Vec<usize>, u8, f64)> = raw_cycles
        .into_iter()
        .filter_map(|cycle| {
            let (risk, total_amount) = score_cycle(graph, &cycle);
            (risk >= config.cycle_risk_threshold)
                .then(|| (canonical_rotation(graph, &cycle), risk, total_amount))
        })
        .collect();

    // Highest risk first, ties broken by the canonical id sequence
    scored.sort_by(|a, b| {
        b.1.cmp(&a.1).then_with(|| {
            a.0.iter()
                .map(|&idx| graph.node_id(idx))
                .cmp(b.0.iter().map(|&idx| graph.node_id(idx)))
        })
    });

    let mut seen: HashSet<Vec<usize>> = HashSet::new();
    for (cycle, risk, total_amount) in scored {
        if !seen.insert(cycle.clone()) {
            continue;
        }
        let types: Vec<NodeType> = cycle.iter().map(|&idx| graph.node_type(idx)).collect();
        report.cycles.push(Cycle {
            path: cycle.iter().map(|&idx| graph.node_id(idx).clone()).collect(),
            classification: classify(&types),
            risk,
            total_amount,
        });
    }

    log::info!(
        "Found {} significant cycles ({} candidates)",
        report.cycles.len(),
        report.candidates
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::snapshot::{RawEdge, RawNode};
    use crate::graph::build_graph;

    fn triangle(types: [NodeType; 3]) -> TransactionGraph {
        let nodes = vec![
            RawNode::new("A", types[0]),
            RawNode::new("B", types[1]),
            RawNode::new("C", types[2]),
        ];
        let edges = vec![
            RawEdge::new("A", "B").with_amount(100.0).with_timestamp(0),
            RawEdge::new("B", "C").with_amount(100.0).with_timestamp(60_000),
            RawEdge::new("C", "A").with_amount(100.0).with_timestamp(120_000),
        ];
        build_graph(&nodes, &edges).0
    }

    #[test]
    fn classification_rules_apply_in_order() {
        use NodeType::*;
        assert_eq!(classify(&[Account, Account]), CycleKind::MoneyCycle);
        assert_eq!(classify(&[Account, Merchant]), CycleKind::CashoutCycle);
        assert_eq!(
            classify(&[Account, Account, Account, Account, Bank]),
            CycleKind::DisperseCycle
        );
        assert_eq!(classify(&[Bank, Merchant]), CycleKind::UnknownCycle);
    }

    #[test]
    fn account_triangle_scores_from_formula() {
        let graph = triangle([NodeType::Account; 3]);
        let report = detect_cycles(&graph, &AnalysisConfig::default(), &Deadline::none());

        assert_eq!(report.cycles.len(), 1);
        let cycle = &report.cycles[0];
        assert_eq!(cycle.classification, CycleKind::MoneyCycle);
        // 30 base + 0.03 amount + 30 time + 15 types
        assert_eq!(cycle.risk, 75);
        assert_eq!(cycle.total_amount, 300.0);
        assert_eq!(
            cycle.path,
            vec![RecordId::from("A"), RecordId::from("B"), RecordId::from("C")]
        );
    }

    #[test]
    fn time_term_needs_two_timestamps() {
        assert_eq!(time_term(&[]), 0.0);
        assert_eq!(time_term(&[5]), 0.0);
        assert_eq!(time_term(&[0, 60_000]), 30.0);
        assert_eq!(time_term(&[0, 43_200_000]), 15.0);
        assert_eq!(time_term(&[0, 3 * 86_400_000]), 0.0);
    }

    #[test]
    fn low_risk_cycles_are_filtered() {
        // Two-node merchant/bank loop without amounts or timestamps: 20 + 15 = 35
        let nodes = vec![
            RawNode::new(1, NodeType::Merchant),
            RawNode::new(2, NodeType::Bank),
        ];
        let edges = vec![RawEdge::new(1, 2), RawEdge::new(2, 1)];
        let (graph, _) = build_graph(&nodes, &edges);

        let report = detect_cycles(&graph, &AnalysisConfig::default(), &Deadline::none());
        assert_eq!(report.candidates, 1);
        assert!(report.cycles.is_empty());

        let lenient = AnalysisConfig {
            cycle_risk_threshold: 30,
            ..Default::default()
        };
        let report = detect_cycles(&graph, &lenient, &Deadline::none());
        assert_eq!(report.cycles[0].risk, 35);
        assert_eq!(report.cycles[0].classification, CycleKind::UnknownCycle);
    }

    #[test]
    fn one_node_closes_several_cycles() {
        // A->B->A and A->B->C->A share the prefix A->B
        let nodes: Vec<RawNode> = ["A", "B", "C"]
            .iter()
            .map(|&id| RawNode::new(id, NodeType::Account))
            .collect();
        let edges = vec![
            RawEdge::new("A", "B").with_amount(500_000.0),
            RawEdge::new("B", "A").with_amount(500_000.0),
            RawEdge::new("B", "C").with_amount(500_000.0),
            RawEdge::new("C", "A").with_amount(500_000.0),
        ];
        let (graph, _) = build_graph(&nodes, &edges);

        let report = detect_cycles(&graph, &AnalysisConfig::default(), &Deadline::none());
        assert_eq!(report.candidates, 2);
        assert_eq!(report.cycles.len(), 2);
        // 3 nodes: 30 + 50 + 0 + 15 = 95; 2 nodes: 20 + 50 + 0 + 10 = 80
        assert_eq!(report.cycles[0].risk, 95);
        assert_eq!(report.cycles[1].risk, 80);
    }

    #[test]
    fn cycle_cap_truncates_search() {
        let graph = triangle([NodeType::Account; 3]);
        let config = AnalysisConfig {
            max_cycles_emitted: 1,
            ..Default::default()
        };
        let report = detect_cycles(&graph, &config, &Deadline::none());
        assert!(report.truncated);
        assert_eq!(report.candidates, 1);
    }

    #[test]
    fn expired_deadline_marks_partial() {
        let graph = triangle([NodeType::Account; 3]);
        let deadline = Deadline::after(Some(std::time::Duration::ZERO));
        let report = detect_cycles(&graph, &AnalysisConfig::default(), &deadline);
        assert!(report.partial);
        assert!(report.cycles.is_empty());
    }

    #[test]
    fn acyclic_graph_yields_nothing() {
        let nodes = vec![
            RawNode::new("A", NodeType::Account),
            RawNode::new("B", NodeType::Account),
        ];
        let (graph, _) = build_graph(&nodes, &[RawEdge::new("A", "B")]);
        let report = detect_cycles(&graph, &AnalysisConfig::default(), &Deadline::none());
        assert_eq!(report, CycleReport::default());
    }
}

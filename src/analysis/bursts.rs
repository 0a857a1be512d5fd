//! Rapid consecutive transactions from a single account

use crate::config::AnalysisConfig;
use crate::data::snapshot::{NodeType, RecordId};
use crate::graph::TransactionGraph;
use serde::Serialize;

/// One transaction inside a burst
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BurstTransaction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub target: RecordId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    pub timestamp: i64,
}

/// `minTransactions` consecutive transactions from one account within `timeWindow`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Burst {
    pub account_id: RecordId,
    pub transactions: Vec<BurstTransaction>,
    /// Milliseconds between the first and last transaction of the window
    pub time_span: i64,
}

impl Burst {
    /// Raw risk on the 0-100 scale: ten points per transaction in the window
    pub fn risk(&self) -> f64 {
        (self.transactions.len() as f64 * 10.0).min(100.0)
    }
}

/// Slide a window of `minTransactions` over each account's outgoing,
/// timestamped transactions and report every window that fits in
/// `timeWindow`.
///
/// Overlapping windows are all reported: five transactions inside one
/// window produce three bursts with the default settings.
pub fn detect_bursts(graph: &TransactionGraph, config: &AnalysisConfig) -> Vec<Burst> {
    let window = config.min_transactions;
    if window == 0 {
        return Vec::new();
    }

    // Accounts in id order so the output does not depend on snapshot order
    let mut accounts: Vec<usize> = (0..graph.node_count())
        .filter(|&idx| graph.node_type(idx) == NodeType::Account)
        .collect();
    accounts.sort_by(|&a, &b| graph.node_id(a).cmp(graph.node_id(b)));

    let mut bursts = Vec::new();

    for account in accounts {
        let mut timed: Vec<(i64, usize)> = graph
            .outgoing(account)
            .iter()
            .filter_map(|&edge_idx| graph.edge(edge_idx).timestamp.map(|ts| (ts, edge_idx)))
            .collect();
        if timed.len() < window {
            continue;
        }
        // Edge index breaks timestamp ties in input order
        timed.sort_unstable();

        for slice in timed.windows(window) {
            let first = slice[0].0;
            let last = slice[slice.len() - 1].0;
            let time_span = last - first;
            if time_span > config.time_window {
                continue;
            }

            let transactions = slice
                .iter()
                .map(|&(timestamp, edge_idx)| {
                    let edge = graph.edge(edge_idx);
                    BurstTransaction {
                        id: edge.id.clone(),
                        target: graph.node_id(edge.target).clone(),
                        amount: edge.amount,
                        timestamp,
                    }
                })
                .collect();

            bursts.push(Burst {
                account_id: graph.node_id(account).clone(),
                transactions,
                time_span,
            });
        }
    }

    log::info!("Found {} rapid-transaction bursts", bursts.len());
    bursts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::snapshot::{RawEdge, RawNode};
    use crate::graph::build_graph;

    fn account_with_transfers(times: &[i64]) -> TransactionGraph {
        let nodes = vec![
            RawNode::new("acct", NodeType::Account),
            RawNode::new("shop", NodeType::Merchant),
        ];
        let edges: Vec<RawEdge> = times
            .iter()
            .enumerate()
            .map(|(i, &ts)| {
                RawEdge::new("acct", "shop")
                    .with_id(i as i64)
                    .with_timestamp(ts)
            })
            .collect();
        build_graph(&nodes, &edges).0
    }

    #[test]
    fn three_transfers_in_two_minutes_form_one_burst() {
        let graph = account_with_transfers(&[0, 60_000, 120_000]);
        let bursts = detect_bursts(&graph, &AnalysisConfig::default());

        assert_eq!(bursts.len(), 1);
        assert_eq!(bursts[0].account_id, RecordId::from("acct"));
        assert_eq!(bursts[0].time_span, 120_000);
        assert_eq!(bursts[0].transactions.len(), 3);
        assert_eq!(bursts[0].risk(), 30.0);
    }

    #[test]
    fn overlapping_windows_are_all_reported() {
        let graph = account_with_transfers(&[0, 10_000, 20_000, 30_000, 40_000]);
        let bursts = detect_bursts(&graph, &AnalysisConfig::default());
        assert_eq!(bursts.len(), 3);
        assert_eq!(bursts[2].transactions[0].id, Some(RecordId::Int(2)));
    }

    #[test]
    fn transfers_are_sorted_before_windowing() {
        let graph = account_with_transfers(&[600_000, 0, 1_000, 2_000]);
        let bursts = detect_bursts(&graph, &AnalysisConfig::default());

        assert_eq!(bursts.len(), 1);
        let times: Vec<i64> = bursts[0].transactions.iter().map(|t| t.timestamp).collect();
        assert_eq!(times, vec![0, 1_000, 2_000]);
    }

    #[test]
    fn slow_or_untimed_transfers_do_not_burst() {
        let graph = account_with_transfers(&[0, 200_000, 400_000]);
        assert!(detect_bursts(&graph, &AnalysisConfig::default()).is_empty());

        let nodes = vec![
            RawNode::new("acct", NodeType::Account),
            RawNode::new("shop", NodeType::Merchant),
        ];
        let edges = vec![RawEdge::new("acct", "shop"); 4];
        let (graph, _) = build_graph(&nodes, &edges);
        assert!(detect_bursts(&graph, &AnalysisConfig::default()).is_empty());
    }

    #[test]
    fn only_accounts_are_grouped() {
        let nodes = vec![
            RawNode::new("shop", NodeType::Merchant),
            RawNode::new("acct", NodeType::Account),
        ];
        let edges: Vec<RawEdge> = (0..3i64)
            .map(|i| RawEdge::new("shop", "acct").with_timestamp(i * 1_000))
            .collect();
        let (graph, _) = build_graph(&nodes, &edges);
        assert!(detect_bursts(&graph, &AnalysisConfig::default()).is_empty());
    }
}

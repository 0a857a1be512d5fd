//! Per-node behavioural features and similarity

use crate::analysis::ratio;
use crate::graph::TransactionGraph;
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;

const DAY_MS: f64 = 86_400_000.0;

/// Number of entries in a feature vector
pub const FEATURE_COUNT: usize = 6;

/// Behavioural profile of one node, computed over its incident edges
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFeatures {
    pub degree: usize,
    pub in_degree: usize,
    pub out_degree: usize,
    pub total_amount: f64,
    /// Incident edges per day over the timestamped span
    pub transaction_frequency: f64,
    pub risk_score: f64,
}

impl NodeFeatures {
    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            self.degree as f64,
            self.in_degree as f64,
            self.out_degree as f64,
            self.total_amount,
            self.transaction_frequency,
            self.risk_score,
        ]
    }
}

/// Edges per day across the span of the timestamped edges.
///
/// Fewer than two edges, fewer than two timestamps or a zero span give 0.
pub fn transaction_frequency(graph: &TransactionGraph, edges: &[usize]) -> f64 {
    if edges.len() < 2 {
        return 0.0;
    }

    let timestamps: Vec<i64> = edges
        .iter()
        .filter_map(|&edge_idx| graph.edge(edge_idx).timestamp)
        .collect();
    if timestamps.len() < 2 {
        return 0.0;
    }

    let first = timestamps.iter().min().copied().unwrap_or(0);
    let last = timestamps.iter().max().copied().unwrap_or(0);
    let span_days = (last - first) as f64 / DAY_MS;

    ratio(edges.len() as f64, span_days)
}

/// Node-level risk: amount spikes, high frequency and many counterparties
pub fn node_risk_score(graph: &TransactionGraph, node: usize, incident: &[usize], frequency: f64) -> f64 {
    let mut score = 0.0;

    // Absent amounts do not count towards the spike statistics
    let amounts: Vec<f64> = incident
        .iter()
        .filter_map(|&edge_idx| graph.edge(edge_idx).amount)
        .collect();
    if !amounts.is_empty() {
        let average = amounts.iter().sum::<f64>() / amounts.len() as f64;
        let max = amounts.iter().copied().fold(f64::MIN, f64::max);
        if max > average * 3.0 {
            score += 30.0;
        }
    }

    if frequency > 10.0 {
        score += 20.0;
    }

    let counterparties: HashSet<usize> = incident
        .iter()
        .map(|&edge_idx| {
            let edge = graph.edge(edge_idx);
            if edge.source == node {
                edge.target
            } else {
                edge.source
            }
        })
        .collect();
    if counterparties.len() > 10 {
        score += 20.0;
    }

    f64::min(score, 100.0)
}

/// Features of a single node
pub fn node_features(graph: &TransactionGraph, node: usize) -> NodeFeatures {
    let incident = graph.incident(node);

    let in_degree = incident
        .iter()
        .filter(|&&edge_idx| graph.edge(edge_idx).target == node)
        .count();
    let out_degree = incident
        .iter()
        .filter(|&&edge_idx| graph.edge(edge_idx).source == node)
        .count();
    let total_amount = incident
        .iter()
        .map(|&edge_idx| graph.edge(edge_idx).amount_or_zero())
        .sum();
    let transaction_frequency = transaction_frequency(graph, &incident);
    let risk_score = node_risk_score(graph, node, &incident, transaction_frequency);

    NodeFeatures {
        degree: incident.len(),
        in_degree,
        out_degree,
        total_amount,
        transaction_frequency,
        risk_score,
    }
}

/// Features of every node, computed in parallel; index order is preserved
pub fn compute_features(graph: &TransactionGraph) -> Vec<NodeFeatures> {
    (0..graph.node_count())
        .into_par_iter()
        .map(|node| node_features(graph, node))
        .collect()
}

/// Stack feature vectors into an N x 6 matrix
pub fn feature_matrix(features: &[NodeFeatures]) -> Array2<f64> {
    let mut matrix = Array2::zeros((features.len(), FEATURE_COUNT));
    for (mut row, node) in matrix.outer_iter_mut().zip(features) {
        row.assign(&Array1::from(node.to_vector().to_vec()));
    }
    matrix
}

/// Cosine similarity; 0 when either vector is all zeros
pub fn cosine_similarity(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    ratio(a.dot(&b), norm_a * norm_b)
}

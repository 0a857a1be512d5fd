//! Community detection by modularity (Louvain local moving)
//!
//! Edges are treated as undirected with unit weight; self-loops are ignored.
//! Nodes are visited in id order and ties between candidate communities go
//! to the smaller label, so the partition only depends on ids and edges.
//!
//! Q = (1/2m) * Σij[Aij - (ki*kj)/(2m)] * δ(ci, cj)

use crate::analysis::{ratio, Deadline};
use crate::data::snapshot::RecordId;
use crate::graph::TransactionGraph;
use serde::Serialize;
use std::collections::BTreeMap;

/// Sweeps over all nodes before giving up on convergence
const MAX_SWEEPS: usize = 100;

/// Minimum modularity gain for a node to change community
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    pub id: u32,
    /// Members in id order
    pub members: Vec<RecordId>,
    pub size: usize,
}

/// Size statistics over every community, singletons included
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityStats {
    pub count: usize,
    pub max_size: usize,
    pub avg_size: f64,
    /// Community id to size
    pub distribution: BTreeMap<u32, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityReport {
    /// Communities numbered by their smallest member id
    pub communities: Vec<Community>,
    pub stats: CommunityStats,
    pub modularity: f64,
    pub partial: bool,
}

/// Undirected weighted adjacency in id-rank space
struct WeightedAdjacency {
    neighbors: Vec<BTreeMap<usize, f64>>,
    degrees: Vec<f64>,
    total_weight: f64,
}

impl WeightedAdjacency {
    fn new(graph: &TransactionGraph, rank: &[usize]) -> Self {
        let node_count = graph.node_count();
        let mut neighbors = vec![BTreeMap::new(); node_count];
        let mut total_weight = 0.0;

        for edge in graph.edges() {
            if edge.source == edge.target {
                continue;
            }
            let (a, b) = (rank[edge.source], rank[edge.target]);
            *neighbors[a].entry(b).or_insert(0.0) += 1.0;
            *neighbors[b].entry(a).or_insert(0.0) += 1.0;
            total_weight += 1.0;
        }

        let degrees: Vec<f64> = neighbors
            .iter()
            .map(|row: &BTreeMap<usize, f64>| row.values().sum::<f64>())
            .collect();

        Self {
            neighbors,
            degrees,
            total_weight,
        }
    }
}

/// Move nodes between communities until no move improves modularity.
/// Returns whether the deadline cut the sweeps short.
fn local_moving(adjacency: &WeightedAdjacency, labels: &mut [usize], deadline: &Deadline) -> bool {
    let two_m = 2.0 * adjacency.total_weight;
    let mut totals = adjacency.degrees.clone();

    for sweep in 0..MAX_SWEEPS {
        if deadline.expired() {
            log::warn!("Community detection stopped after {} sweeps", sweep);
            return true;
        }

        let mut moved = false;
        for node in 0..labels.len() {
            let degree = adjacency.degrees[node];
            let current = labels[node];

            let mut links: BTreeMap<usize, f64> = BTreeMap::new();
            for (&other, &weight) in &adjacency.neighbors[node] {
                *links.entry(labels[other]).or_insert(0.0) += weight;
            }

            totals[current] -= degree;
            let gain = |label: usize, weight: f64| weight - totals[label] * degree / two_m;

            let mut best = current;
            let mut best_gain = gain(current, links.get(&current).copied().unwrap_or(0.0));
            for (&label, &weight) in &links {
                let candidate = gain(label, weight);
                if candidate > best_gain + MIN_GAIN {
                    best = label;
                    best_gain = candidate;
                }
            }

            totals[best] += degree;
            if best != current {
                labels[node] = best;
                moved = true;
            }
        }

        if !moved {
            log::debug!("Community detection converged after {} sweeps", sweep + 1);
            break;
        }
    }

    false
}

fn modularity(adjacency: &WeightedAdjacency, labels: &[usize]) -> f64 {
    if adjacency.total_weight == 0.0 {
        return 0.0;
    }

    let mut internal = vec![0.0; labels.len()];
    let mut totals = vec![0.0; labels.len()];
    for (node, row) in adjacency.neighbors.iter().enumerate() {
        totals[labels[node]] += adjacency.degrees[node];
        for (&other, &weight) in row {
            if labels[other] == labels[node] {
                internal[labels[node]] += weight;
            }
        }
    }

    let two_m = 2.0 * adjacency.total_weight;
    internal
        .iter()
        .zip(&totals)
        .map(|(&inside, &total)| inside / two_m - (total / two_m).powi(2))
        .sum()
}

fn community_stats(communities: &[Community]) -> CommunityStats {
    let sizes: Vec<usize> = communities.iter().map(|community| community.size).collect();

    CommunityStats {
        count: communities.len(),
        max_size: sizes.iter().copied().max().unwrap_or(0),
        avg_size: ratio(sizes.iter().sum::<usize>() as f64, sizes.len() as f64),
        distribution: communities
            .iter()
            .map(|community| (community.id, community.size))
            .collect(),
    }
}

/// Partition the graph into communities and report their size statistics
pub fn detect_communities(graph: &TransactionGraph, deadline: &Deadline) -> CommunityReport {
    let node_count = graph.node_count();
    if node_count == 0 {
        return CommunityReport::default();
    }

    let mut order: Vec<usize> = (0..node_count).collect();
    order.sort_by(|&a, &b| graph.node_id(a).cmp(graph.node_id(b)));
    let mut rank = vec![0; node_count];
    for (position, &idx) in order.iter().enumerate() {
        rank[idx] = position;
    }

    let adjacency = WeightedAdjacency::new(graph, &rank);
    let mut labels: Vec<usize> = (0..node_count).collect();
    let partial = adjacency.total_weight > 0.0 && local_moving(&adjacency, &mut labels, deadline);

    // Ranks ascend, so the first sighting of a label is its smallest member
    let mut numbering: BTreeMap<usize, u32> = BTreeMap::new();
    let mut communities: Vec<Community> = Vec::new();
    for (position, &label) in labels.iter().enumerate() {
        let next = communities.len() as u32;
        let id = *numbering.entry(label).or_insert(next);
        if id == next {
            communities.push(Community {
                id,
                members: Vec::new(),
                size: 0,
            });
        }
        let community = &mut communities[id as usize];
        community.members.push(graph.node_id(order[position]).clone());
        community.size += 1;
    }

    let report = CommunityReport {
        stats: community_stats(&communities),
        modularity: modularity(&adjacency, &labels),
        communities,
        partial,
    };

    log::info!(
        "Found {} communities (largest {}, modularity {:.3})",
        report.stats.count,
        report.stats.max_size,
        report.modularity
    );

    report
}

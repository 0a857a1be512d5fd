//! Density-based cluster detection over feature similarity
//!
//! Every node is compared against every other node, so a run costs O(N²)
//! similarity evaluations. That is fine up to a few thousand nodes; beyond
//! that, neighbourhoods should come from an approximate nearest-neighbour
//! index over the feature vectors instead of the full scan below.

use crate::analysis::Deadline;
use crate::cluster::features::{compute_features, cosine_similarity, feature_matrix, NodeFeatures};
use crate::cluster::metrics::{
    build_timeline, calculate_density, calculate_group_risk, identify_central_members,
    internal_edges, member_role,
};
use crate::cluster::{Cluster, ClusterReport};
use crate::config::AnalysisConfig;
use crate::graph::TransactionGraph;
use ndarray::Array2;
use rayon::prelude::*;
use std::collections::{BTreeMap, VecDeque};

/// Similarity neighbourhood of every node, rows computed in parallel.
///
/// Rows not reached before the deadline are left empty and the second
/// value is `true`.
pub fn density_neighbors(matrix: &Array2<f64>, eps: f64, deadline: &Deadline) -> (Vec<Vec<usize>>, bool) {
    let node_count = matrix.nrows();

    let rows: Vec<Option<Vec<usize>>> = (0..node_count)
        .into_par_iter()
        .map(|node| {
            if deadline.expired() {
                return None;
            }
            let row = matrix.row(node);
            let neighbors = (0..node_count)
                .filter(|&other| other != node)
                .filter(|&other| cosine_similarity(row, matrix.row(other)) >= eps)
                .collect();
            Some(neighbors)
        })
        .collect();

    let partial = rows.iter().any(Option::is_none);
    let neighbors = rows.into_iter().map(Option::unwrap_or_default).collect();
    (neighbors, partial)
}

/// DBSCAN over precomputed neighbourhoods with an explicit work queue.
///
/// Seeds are tried in `order`. A seed needs `min_pts` neighbours; only core
/// points extend the frontier, border points are absorbed without expanding.
/// Clusters smaller than `min_cluster_size` are discarded.
pub fn dbscan(
    neighbors: &[Vec<usize>],
    order: &[usize],
    min_pts: usize,
    min_cluster_size: usize,
) -> Vec<Vec<usize>> {
    let node_count = neighbors.len();
    let mut visited = vec![false; node_count];
    let mut assigned = vec![false; node_count];
    let mut clusters = Vec::new();

    for &seed in order {
        if visited[seed] || neighbors[seed].len() < min_pts {
            continue;
        }
        visited[seed] = true;
        assigned[seed] = true;

        let mut members = vec![seed];
        let mut queue: VecDeque<usize> = neighbors[seed].iter().copied().collect();

        while let Some(node) = queue.pop_front() {
            if !visited[node] {
                visited[node] = true;
                if neighbors[node].len() >= min_pts {
                    queue.extend(neighbors[node].iter().copied());
                }
            }
            if !assigned[node] {
                assigned[node] = true;
                members.push(node);
            }
        }

        if members.len() >= min_cluster_size {
            clusters.push(members);
        }
    }

    clusters
}

/// Turn raw members into a scored cluster, or `None` if it fails validation
fn validate_cluster(
    graph: &TransactionGraph,
    features: &[NodeFeatures],
    mut members: Vec<usize>,
    config: &AnalysisConfig,
) -> Option<Cluster> {
    members.sort_by(|&a, &b| graph.node_id(a).cmp(graph.node_id(b)));

    let internal = internal_edges(graph, &members);
    let density = calculate_density(members.len(), internal.len());
    let internal_amount: f64 = internal
        .iter()
        .map(|&edge_idx| graph.edge(edge_idx).amount_or_zero())
        .sum();
    let risk = calculate_group_risk(members.len(), density, internal_amount);

    if density <= config.cluster_density_threshold || risk <= config.group_risk_threshold {
        log::debug!(
            "Rejecting cluster of {} members (density {:.3}, risk {:.1})",
            members.len(),
            density,
            risk
        );
        return None;
    }

    let roles: BTreeMap<_, _> = members
        .iter()
        .map(|&node| (graph.node_id(node).clone(), member_role(&features[node])))
        .collect();

    Some(Cluster {
        id: 0,
        size: members.len(),
        members: members.iter().map(|&node| graph.node_id(node).clone()).collect(),
        density,
        internal_amount,
        risk,
        central_members: identify_central_members(graph, &members, &internal, config.top_central_nodes),
        roles,
        timeline: build_timeline(graph, &internal),
    })
}

/// Find, validate and enrich groups of similar, densely connected nodes
pub fn find_risk_groups(
    graph: &TransactionGraph,
    config: &AnalysisConfig,
    deadline: &Deadline,
) -> ClusterReport {
    let mut report = ClusterReport::default();
    if graph.is_empty() {
        return report;
    }

    log::info!("Computing similarity neighbourhoods for {} nodes", graph.node_count());

    let features = compute_features(graph);
    let matrix = feature_matrix(&features);
    let (neighbors, partial) = density_neighbors(&matrix, config.eps, deadline);
    if partial {
        log::warn!("Deadline expired during similarity scan; clusters are partial");
        report.partial = true;
    }

    // Seeds in id order so membership does not depend on snapshot order
    let mut order: Vec<usize> = (0..graph.node_count()).collect();
    order.sort_by(|&a, &b| graph.node_id(a).cmp(graph.node_id(b)));

    let candidates = dbscan(&neighbors, &order, config.min_pts, config.min_cluster_size);
    report.candidates = candidates.len();

    let mut groups: Vec<Cluster> = candidates
        .into_iter()
        .filter_map(|members| validate_cluster(graph, &features, members, config))
        .collect();

    // Highest risk first, ties by the smallest member id
    groups.sort_by(|a, b| {
        b.risk
            .total_cmp(&a.risk)
            .then_with(|| a.members.cmp(&b.members))
    });
    for (id, group) in groups.iter_mut().enumerate() {
        group.id = id as u32;
    }
    report.groups = groups;

    log::info!(
        "Found {} risk groups ({} density clusters)",
        report.groups.len(),
        report.candidates
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::snapshot::{NodeType, RawEdge, RawNode, RecordId};
    use crate::graph::build_graph;

    /// Four accounts trading with each other in both directions
    fn ring() -> TransactionGraph {
        let ids = ["r1", "r2", "r3", "r4"];
        let nodes: Vec<RawNode> = ids.iter().map(|&id| RawNode::new(id, NodeType::Account)).collect();
        let mut edges = Vec::new();
        for (i, &from) in ids.iter().enumerate() {
            for &to in &ids[i + 1..] {
                edges.push(RawEdge::new(from, to).with_amount(1_000.0));
                edges.push(RawEdge::new(to, from).with_amount(1_000.0));
            }
        }
        build_graph(&nodes, &edges).0
    }

    #[test]
    fn dbscan_expands_only_through_core_points() {
        // 0..=3 are mutual neighbours; 4 borders on 3 only
        let neighbors = vec![
            vec![1, 2, 3],
            vec![0, 2, 3],
            vec![0, 1, 3],
            vec![0, 1, 2, 4],
            vec![3],
            vec![],
        ];
        let order: Vec<usize> = (0..neighbors.len()).collect();

        let clusters = dbscan(&neighbors, &order, 3, 3);
        assert_eq!(clusters.len(), 1);
        let mut members = clusters[0].clone();
        members.sort_unstable();
        assert_eq!(members, vec![0, 1, 2, 3, 4]);

        assert!(dbscan(&neighbors, &order, 3, 6).is_empty());
    }

    #[test]
    fn dense_ring_is_surfaced() {
        let graph = ring();
        let report = find_risk_groups(&graph, &AnalysisConfig::default(), &Deadline::none());

        assert_eq!(report.candidates, 1);
        assert_eq!(report.groups.len(), 1);
        let group = &report.groups[0];
        assert_eq!(group.size, 4);
        assert_eq!(group.members[0], RecordId::from("r1"));
        // 12 internal edges over 4 * 3 / 2 pairs
        assert_eq!(group.density, 2.0);
        assert_eq!(group.internal_amount, 12_000.0);
        assert_eq!(group.risk, 100.0);
        assert_eq!(group.timeline.len(), 12);
        assert_eq!(group.central_members.len(), 4);
        assert!(!report.partial);
    }

    #[test]
    fn sparse_groups_fail_validation() {
        let nodes: Vec<RawNode> = (0..4).map(|i| RawNode::new(i, NodeType::Account)).collect();
        let edges = vec![RawEdge::new(0, 1), RawEdge::new(2, 3)];
        let (graph, _) = build_graph(&nodes, &edges);

        let report = find_risk_groups(&graph, &AnalysisConfig::default(), &Deadline::none());
        assert!(report.groups.is_empty());
    }

    #[test]
    fn expired_deadline_marks_partial() {
        let graph = ring();
        let deadline = Deadline::after(Some(std::time::Duration::ZERO));
        let report = find_risk_groups(&graph, &AnalysisConfig::default(), &deadline);

        assert!(report.partial);
        assert!(report.groups.is_empty());
    }

    #[test]
    fn empty_graph_has_no_groups() {
        let (graph, _) = build_graph(&[], &[]);
        let report = find_risk_groups(&graph, &AnalysisConfig::default(), &Deadline::none());
        assert_eq!(report, ClusterReport::default());
    }
}

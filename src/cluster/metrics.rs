//! Cluster statistics: density, group risk, roles, centrality and timeline

use crate::cluster::features::NodeFeatures;
use crate::cluster::{MemberRole, TimelineEvent};
use crate::data::snapshot::RecordId;
use crate::graph::TransactionGraph;
use std::collections::{HashMap, HashSet};

/// Edges with both endpoints inside the cluster, in input order
pub fn internal_edges(graph: &TransactionGraph, members: &[usize]) -> Vec<usize> {
    let member_set: HashSet<usize> = members.iter().copied().collect();

    let mut edges: Vec<usize> = members
        .iter()
        .flat_map(|&src| graph.outgoing(src).iter().copied())
        .filter(|&edge_idx| member_set.contains(&graph.edge(edge_idx).target))
        .collect();
    edges.sort_unstable();
    edges
}

/// Internal edges over n * (n - 1) / 2; 0 for clusters of one member or none
pub fn calculate_density(member_count: usize, internal_edge_count: usize) -> f64 {
    if member_count <= 1 {
        return 0.0;
    }
    let potential_edges = member_count * (member_count - 1) / 2;
    internal_edge_count as f64 / potential_edges as f64
}

/// `clamp(size * 10 + density * 50 + min(amount / 10000, 50), 0, 100)`
pub fn calculate_group_risk(member_count: usize, density: f64, internal_amount: f64) -> f64 {
    let score = member_count as f64 * 10.0 + density * 50.0 + f64::min(internal_amount / 10_000.0, 50.0);
    score.clamp(0.0, 100.0)
}

/// Role of a node from its whole-graph degrees
pub fn member_role(features: &NodeFeatures) -> MemberRole {
    if features.degree == 0 {
        return MemberRole::Regular;
    }

    let degree = features.degree as f64;
    if features.out_degree as f64 / degree > 0.8 {
        MemberRole::Source
    } else if features.in_degree as f64 / degree > 0.8 {
        MemberRole::Sink
    } else if features.degree > 10 {
        MemberRole::Hub
    } else {
        MemberRole::Regular
    }
}

/// Top `top_n` members by degree counted over internal edges; ties go to the smaller id
pub fn identify_central_members(
    graph: &TransactionGraph,
    members: &[usize],
    internal: &[usize],
    top_n: usize,
) -> Vec<RecordId> {
    let mut degrees: HashMap<usize, usize> = members.iter().map(|&node| (node, 0)).collect();
    for &edge_idx in internal {
        let edge = graph.edge(edge_idx);
        for endpoint in [edge.source, edge.target] {
            if let Some(degree) = degrees.get_mut(&endpoint) {
                *degree += 1;
            }
        }
    }

    let mut nodes_by_degree: Vec<(usize, usize)> = degrees.into_iter().collect();
    nodes_by_degree.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| graph.node_id(a.0).cmp(graph.node_id(b.0)))
    });

    nodes_by_degree
        .into_iter()
        .take(top_n)
        .map(|(node, _)| graph.node_id(node).clone())
        .collect()
}

/// Internal transactions ordered by timestamp, untimestamped ones last
pub fn build_timeline(graph: &TransactionGraph, internal: &[usize]) -> Vec<TimelineEvent> {
    let mut ordered = internal.to_vec();
    // Edge index keeps input order among equal timestamps
    ordered.sort_by_key(|&edge_idx| {
        let timestamp = graph.edge(edge_idx).timestamp;
        (timestamp.is_none(), timestamp, edge_idx)
    });

    ordered
        .into_iter()
        .map(|edge_idx| {
            let edge = graph.edge(edge_idx);
            TimelineEvent {
                id: edge.id.clone(),
                timestamp: edge.timestamp,
                source: graph.node_id(edge.source).clone(),
                target: graph.node_id(edge.target).clone(),
                amount: edge.amount,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::snapshot::{NodeType, RawEdge, RawNode};
    use crate::graph::build_graph;

    fn features(degree: usize, in_degree: usize, out_degree: usize) -> NodeFeatures {
        NodeFeatures {
            degree,
            in_degree,
            out_degree,
            total_amount: 0.0,
            transaction_frequency: 0.0,
            risk_score: 0.0,
        }
    }

    #[test]
    fn density_uses_undirected_pair_count() {
        assert_eq!(calculate_density(3, 3), 1.0);
        assert_eq!(calculate_density(4, 3), 0.5);
        assert_eq!(calculate_density(1, 0), 0.0);
        assert_eq!(calculate_density(0, 0), 0.0);
    }

    #[test]
    fn group_risk_is_clamped() {
        assert_eq!(calculate_group_risk(3, 1.0, 0.0), 80.0);
        assert_eq!(calculate_group_risk(3, 0.5, 100_000.0), 65.0);
        assert_eq!(calculate_group_risk(8, 1.0, 1_000_000.0), 100.0);
    }

    #[test]
    fn roles_follow_degree_ratios() {
        assert_eq!(member_role(&features(5, 0, 5)), MemberRole::Source);
        assert_eq!(member_role(&features(5, 5, 0)), MemberRole::Sink);
        assert_eq!(member_role(&features(12, 6, 6)), MemberRole::Hub);
        assert_eq!(member_role(&features(4, 2, 2)), MemberRole::Regular);
        assert_eq!(member_role(&features(0, 0, 0)), MemberRole::Regular);
    }

    #[test]
    fn central_members_and_timeline_use_internal_edges() {
        let nodes = vec![
            RawNode::new("a", NodeType::Account),
            RawNode::new("b", NodeType::Account),
            RawNode::new("c", NodeType::Account),
            RawNode::new("outside", NodeType::Merchant),
        ];
        let edges = vec![
            RawEdge::new("b", "a").with_timestamp(300),
            RawEdge::new("a", "c"),
            RawEdge::new("c", "b").with_timestamp(100),
            RawEdge::new("c", "outside").with_timestamp(50),
            RawEdge::new("c", "a").with_amount(5.0).with_timestamp(200),
        ];
        let (graph, _) = build_graph(&nodes, &edges);
        let members = vec![0, 1, 2];

        let internal = internal_edges(&graph, &members);
        assert_eq!(internal, vec![0, 1, 2, 4]);

        let central = identify_central_members(&graph, &members, &internal, 2);
        assert_eq!(central, vec![RecordId::from("a"), RecordId::from("c")]);

        let timeline = build_timeline(&graph, &internal);
        let times: Vec<Option<i64>> = timeline.iter().map(|event| event.timestamp).collect();
        assert_eq!(times, vec![Some(100), Some(200), Some(300), None]);
        assert_eq!(timeline[1].amount, Some(5.0));
        assert_eq!(timeline[3].source, RecordId::from("a"));
    }
}

//! All-pairs shortest paths and betweenness centrality
//!
//! Every ordered pair is solved with a breadth-first search over the directed
//! edge relation, so the cost is O(V * (V + E)) time and the per-pair output
//! is O(V^2). Graphs above `maxPathNodes` are refused with
//! [`AnalysisError::GraphTooLarge`] instead of silently degrading.

use crate::analysis::{ratio, Deadline};
use crate::config::AnalysisConfig;
use crate::data::snapshot::RecordId;
use crate::error::{AnalysisError, Result};
use crate::graph::TransactionGraph;
use petgraph::algo::all_simple_paths;
use petgraph::graph::{DiGraph, NodeIndex};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::VecDeque;

/// Sources handed to the worker pool per round; results are merged between rounds
const SOURCE_CHUNK: usize = 64;

const UNREACHED: usize = usize::MAX;

/// Shortest hop count between two connected nodes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairDistance {
    pub source: RecordId,
    pub target: RecordId,
    pub hops: usize,
    /// Number of distinct minimum-hop paths
    pub path_count: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeScore {
    pub id: RecordId,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathReport {
    /// Connected ordered pairs, by source id then target id
    pub pairs: Vec<PairDistance>,
    pub connected_pairs: usize,
    /// Mean hop count over connected ordered pairs
    pub average_path_length: f64,
    /// Longest shortest path (hops)
    pub diameter: usize,
    /// One example path realising the diameter
    pub longest_path: Vec<RecordId>,
    /// Betweenness per node, by id
    pub betweenness: Vec<NodeScore>,
    pub partial: bool,
}

/// Distinct-neighbor adjacency without self-loops, each list in id order
struct Adjacency {
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
}

impl Adjacency {
    fn new(graph: &TransactionGraph) -> Self {
        let neighbors = |node: usize, edges: &[usize], outgoing: bool| {
            let mut list: Vec<usize> = edges
                .iter()
                .map(|&edge_idx| {
                    let edge = graph.edge(edge_idx);
                    if outgoing {
                        edge.target
                    } else {
                        edge.source
                    }
                })
                .filter(|&other| other != node)
                .collect();
            list.sort_unstable_by(|&a, &b| graph.node_id(a).cmp(graph.node_id(b)));
            list.dedup();
            list
        };

        let node_count = graph.node_count();
        Self {
            successors: (0..node_count)
                .map(|node| neighbors(node, graph.outgoing(node), true))
                .collect(),
            predecessors: (0..node_count)
                .map(|node| neighbors(node, graph.incoming(node), false))
                .collect(),
        }
    }

    /// Hop distances and shortest-path counts from `source`, plus BFS visiting order
    fn bfs(&self, source: usize) -> (Vec<usize>, Vec<f64>, Vec<usize>) {
        let node_count = self.successors.len();
        let mut dist = vec![UNREACHED; node_count];
        let mut sigma = vec![0.0; node_count];
        let mut order = Vec::new();
        let mut queue = VecDeque::new();

        dist[source] = 0;
        sigma[source] = 1.0;
        queue.push_back(source);

        while let Some(v) = queue.pop_front() {
            order.push(v);
            for &w in &self.successors[v] {
                if dist[w] == UNREACHED {
                    dist[w] = dist[v] + 1;
                    queue.push_back(w);
                }
                if dist[w] == dist[v] + 1 {
                    sigma[w] += sigma[v];
                }
            }
        }

        (dist, sigma, order)
    }

    /// Predecessors of `node` that lie one hop closer to the BFS source
    fn shortest_predecessors<'a>(
        &'a self,
        node: usize,
        dist: &'a [usize],
    ) -> impl Iterator<Item = usize> + 'a {
        self.predecessors[node]
            .iter()
            .copied()
            .filter(move |&v| dist[v] != UNREACHED && dist[v] + 1 == dist[node])
    }
}

/// Everything one source contributes to the report
struct SourceSweep {
    /// (target, hops, path count) for every reached target except the source
    reached: Vec<(usize, usize, f64)>,
    /// Dependency of the source on each node (Brandes accumulation)
    dependency: Vec<f64>,
}

fn sweep(adjacency: &Adjacency, source: usize) -> SourceSweep {
    let (dist, sigma, order) = adjacency.bfs(source);

    let mut dependency = vec![0.0; dist.len()];
    for &w in order.iter().rev() {
        for v in adjacency.shortest_predecessors(w, &dist) {
            dependency[v] += sigma[v] / sigma[w] * (1.0 + dependency[w]);
        }
    }
    dependency[source] = 0.0;

    let reached = order
        .iter()
        .filter(|&&target| target != source)
        .map(|&target| (target, dist[target], sigma[target]))
        .collect();

    SourceSweep { reached, dependency }
}

fn sort_by_id(graph: &TransactionGraph, nodes: &mut [usize]) {
    nodes.sort_by(|&a, &b| graph.node_id(a).cmp(graph.node_id(b)));
}

/// Walk back from `target` along shortest predecessors, preferring the smallest id
fn example_path(graph: &TransactionGraph, adjacency: &Adjacency, source: usize, target: usize) -> Vec<RecordId> {
    let (dist, _, _) = adjacency.bfs(source);
    if dist[target] == UNREACHED {
        return Vec::new();
    }

    let mut path = vec![target];
    let mut current = target;
    while current != source {
        match adjacency
            .shortest_predecessors(current, &dist)
            .min_by(|&a, &b| graph.node_id(a).cmp(graph.node_id(b)))
        {
            Some(prev) => {
                path.push(prev);
                current = prev;
            }
            None => break,
        }
    }

    path.iter().rev().map(|&idx| graph.node_id(idx).clone()).collect()
}

/// Compute pairwise hop counts, diameter, mean path length and exact betweenness
pub fn analyze_paths(
    graph: &TransactionGraph,
    config: &AnalysisConfig,
    deadline: &Deadline,
) -> Result<PathReport> {
    let node_count = graph.node_count();
    if node_count > config.max_path_nodes {
        return Err(AnalysisError::GraphTooLarge {
            nodes: node_count,
            limit: config.max_path_nodes,
        });
    }

    let mut report = PathReport::default();
    if node_count < 2 {
        report.betweenness = graph
            .nodes()
            .iter()
            .map(|node| NodeScore { id: node.id.clone(), score: 0.0 })
            .collect();
        return Ok(report);
    }

    log::info!("Computing shortest paths for {} sources", node_count);

    let adjacency = Adjacency::new(graph);
    let mut sources: Vec<usize> = (0..node_count).collect();
    sort_by_id(graph, &mut sources);

    let mut betweenness = vec![0.0; node_count];
    let mut total_hops = 0usize;
    let mut longest: Option<(usize, usize)> = None;

    for chunk in sources.chunks(SOURCE_CHUNK) {
        if deadline.expired() {
            report.partial = true;
            break;
        }

        let sweeps: Vec<Option<SourceSweep>> = chunk
            .par_iter()
            .map(|&source| (!deadline.expired()).then(|| sweep(&adjacency, source)))
            .collect();

        // Merge in source order so sums are reproducible
        for (&source, sweep) in chunk.iter().zip(sweeps) {
            let Some(mut sweep) = sweep else {
                report.partial = true;
                continue;
            };

            sweep
                .reached
                .sort_by(|a, b| graph.node_id(a.0).cmp(graph.node_id(b.0)));

            for &(target, hops, path_count) in &sweep.reached {
                total_hops += hops;
                if hops > report.diameter {
                    report.diameter = hops;
                    longest = Some((source, target));
                }
                report.pairs.push(PairDistance {
                    source: graph.node_id(source).clone(),
                    target: graph.node_id(target).clone(),
                    hops,
                    path_count,
                });
            }

            for (total, contribution) in betweenness.iter_mut().zip(&sweep.dependency) {
                *total += contribution;
            }
        }
    }

    if report.partial {
        log::warn!("Deadline expired during path analysis, returning partial result");
    }

    report.connected_pairs = report.pairs.len();
    report.average_path_length = ratio(total_hops as f64, report.connected_pairs as f64);
    report.longest_path = longest
        .map(|(source, target)| example_path(graph, &adjacency, source, target))
        .unwrap_or_default();

    let mut by_id: Vec<usize> = (0..node_count).collect();
    sort_by_id(graph, &mut by_id);
    report.betweenness = by_id
        .into_iter()
        .map(|idx| NodeScore {
            id: graph.node_id(idx).clone(),
            score: betweenness[idx],
        })
        .collect();

    log::info!(
        "Path analysis: {} connected pairs, diameter {}, mean length {:.2}",
        report.connected_pairs,
        report.diameter,
        report.average_path_length
    );

    Ok(report)
}

/// Every distinct minimum-hop path from `source` to `target`, in id order.
///
/// Exponential in the worst case; meant for inspecting single pairs and for
/// re-deriving betweenness on small graphs.
pub fn all_shortest_paths(
    graph: &TransactionGraph,
    source: &RecordId,
    target: &RecordId,
) -> Vec<Vec<RecordId>> {
    let (Some(source), Some(target)) = (graph.index_of(source), graph.index_of(target)) else {
        return Vec::new();
    };
    if source == target {
        return Vec::new();
    }

    let adjacency = Adjacency::new(graph);
    let (dist, _, _) = adjacency.bfs(source);
    if dist[target] == UNREACHED {
        return Vec::new();
    }

    // Depth-first over shortest predecessors, building paths backwards
    let mut paths = Vec::new();
    let mut stack: Vec<Vec<usize>> = vec![vec![target]];
    while let Some(partial) = stack.pop() {
        let head = partial[partial.len() - 1];
        if head == source {
            paths.push(
                partial
                    .iter()
                    .rev()
                    .map(|&idx| graph.node_id(idx).clone())
                    .collect::<Vec<_>>(),
            );
            continue;
        }
        for prev in adjacency.shortest_predecessors(head, &dist) {
            let mut extended = partial.clone();
            extended.push(prev);
            stack.push(extended);
        }
    }

    paths.sort();
    paths
}

/// Simple directed paths between one pair of nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RelationPaths {
    /// Shortest first, then by id sequence
    pub paths: Vec<Vec<RecordId>>,
    /// More paths exist than `limit` allowed
    pub truncated: bool,
}

/// Every simple directed path from `source` to `target` of at most
/// `max_nodes` nodes, keeping at most `limit` of them.
///
/// Parallel edges collapse and self-loops are ignored. The mirror graph is
/// filled in id order, so the paths kept under `limit` depend only on ids.
pub fn relation_paths(
    graph: &TransactionGraph,
    source: &RecordId,
    target: &RecordId,
    max_nodes: usize,
    limit: usize,
) -> RelationPaths {
    let (Some(source), Some(target)) = (graph.index_of(source), graph.index_of(target)) else {
        return RelationPaths::default();
    };
    if source == target {
        return RelationPaths {
            paths: vec![vec![graph.node_id(source).clone()]],
            truncated: false,
        };
    }
    if max_nodes < 2 || limit == 0 {
        return RelationPaths::default();
    }

    let mut links: Vec<(usize, usize)> = graph
        .edges()
        .iter()
        .filter(|edge| edge.source != edge.target)
        .map(|edge| (edge.source, edge.target))
        .collect();
    links.sort_by(|a, b| {
        (graph.node_id(a.0), graph.node_id(a.1)).cmp(&(graph.node_id(b.0), graph.node_id(b.1)))
    });
    links.dedup();

    let mut mirror = DiGraph::<(), ()>::with_capacity(graph.node_count(), links.len());
    let indices: Vec<NodeIndex> = (0..graph.node_count()).map(|_| mirror.add_node(())).collect();
    for (from, to) in links {
        mirror.add_edge(indices[from], indices[to], ());
    }

    let mut found: Vec<Vec<NodeIndex>> =
        all_simple_paths::<Vec<NodeIndex>, _>(&mirror, indices[source], indices[target], 0, Some(max_nodes - 2))
            .take(limit + 1)
            .collect();
    let truncated = found.len() > limit;
    found.truncate(limit);

    let mut paths: Vec<Vec<RecordId>> = found
        .into_iter()
        .map(|path| {
            path.into_iter()
                .map(|idx| graph.node_id(idx.index()).clone())
                .collect()
        })
        .collect();
    paths.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

    log::debug!("Found {} relation paths (truncated: {})", paths.len(), truncated);
    RelationPaths { paths, truncated }
}

//! Descriptive statistics over the transactions of a graph

use crate::analysis::ratio;
use crate::data::snapshot::RecordId;
use crate::graph::TransactionGraph;
use chrono::{DateTime, Datelike, Timelike};
use serde::Serialize;
use statrs::statistics::Statistics;

const BUCKET_COUNT: usize = 10;

/// Amount statistics over edges that carry an amount
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Upper median: element `n / 2` of the sorted amounts
    pub median: f64,
    pub total: f64,
    pub std_dev: f64,
    pub distribution: AmountDistribution,
}

/// Equal-width histogram between the smallest and largest amount
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountDistribution {
    pub buckets: Vec<usize>,
    pub bucket_size: f64,
}

/// Gaps in milliseconds between consecutive timestamped transactions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalStats {
    pub min: i64,
    pub max: i64,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

/// A transaction more than two standard deviations above the mean amount
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LargeAmount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub source: RecordId,
    pub target: RecordId,
    pub amount: f64,
    /// Distance from the mean in standard deviations
    pub deviation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatistics {
    pub amounts: Option<AmountStats>,
    pub time_range: Option<TimeRange>,
    pub intervals: Option<IntervalStats>,
    /// Transactions per UTC hour of day
    pub hourly: Vec<usize>,
    /// Transactions per UTC weekday, Sunday first
    pub weekday: Vec<usize>,
    pub large_amounts: Vec<LargeAmount>,
}

/// Population standard deviation taken over amounts scaled into [0, 1] so
/// the squared deviations stay finite for amounts near `f64::MAX`
fn population_std_dev(amounts: &[f64], max: f64) -> f64 {
    if max <= 0.0 {
        return 0.0;
    }
    amounts.iter().map(|amount| amount / max).population_std_dev() * max
}

fn amount_stats(amounts: &[f64]) -> Option<AmountStats> {
    if amounts.is_empty() {
        return None;
    }

    let mut sorted = amounts.to_vec();
    sorted.sort_by(f64::total_cmp);

    let min = sorted[0];
    let max = sorted[sorted.len() - 1];
    let bucket_size = (max - min) / BUCKET_COUNT as f64;

    let mut buckets = vec![0; BUCKET_COUNT];
    for &amount in &sorted {
        let bucket = if bucket_size > 0.0 {
            (((amount - min) / bucket_size) as usize).min(BUCKET_COUNT - 1)
        } else {
            0
        };
        buckets[bucket] += 1;
    }

    Some(AmountStats {
        count: sorted.len(),
        min,
        max,
        mean: amounts.iter().mean(),
        median: sorted[sorted.len() / 2],
        total: amounts.iter().sum(),
        std_dev: population_std_dev(amounts, max),
        distribution: AmountDistribution { buckets, bucket_size },
    })
}

fn interval_stats(sorted_timestamps: &[i64]) -> Option<IntervalStats> {
    let gaps: Vec<i64> = sorted_timestamps
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .collect();

    let min = gaps.iter().min().copied()?;
    let max = gaps.iter().max().copied()?;
    let mean = gaps.iter().sum::<i64>() as f64 / gaps.len() as f64;

    Some(IntervalStats { min, max, mean })
}

fn large_amounts(graph: &TransactionGraph, amounts: &[f64]) -> Vec<LargeAmount> {
    if amounts.is_empty() {
        return Vec::new();
    }

    let mean = amounts.iter().mean();
    let max = amounts.iter().copied().fold(0.0, f64::max);
    let std_dev = population_std_dev(amounts, max);
    let threshold = mean + 2.0 * std_dev;

    graph
        .edges()
        .iter()
        .filter_map(|edge| {
            let amount = edge.amount.filter(|&amount| amount > threshold)?;
            Some(LargeAmount {
                id: edge.id.clone(),
                source: graph.node_id(edge.source).clone(),
                target: graph.node_id(edge.target).clone(),
                amount,
                deviation: ratio(amount - mean, std_dev),
            })
        })
        .collect()
}

/// Amount, timing and outlier statistics for every edge of the graph
pub fn transaction_statistics(graph: &TransactionGraph) -> TransactionStatistics {
    let amounts: Vec<f64> = graph.edges().iter().filter_map(|edge| edge.amount).collect();

    let mut timestamps: Vec<i64> = graph.edges().iter().filter_map(|edge| edge.timestamp).collect();
    timestamps.sort_unstable();

    let mut hourly = vec![0; 24];
    let mut weekday = vec![0; 7];
    for &ms in &timestamps {
        if let Some(datetime) = DateTime::from_timestamp_millis(ms) {
            hourly[datetime.hour() as usize] += 1;
            weekday[datetime.weekday().num_days_from_sunday() as usize] += 1;
        }
    }

    let time_range = match (timestamps.first(), timestamps.last()) {
        (Some(&start), Some(&end)) => Some(TimeRange { start, end }),
        _ => None,
    };

    TransactionStatistics {
        amounts: amount_stats(&amounts),
        time_range,
        intervals: interval_stats(&timestamps),
        hourly,
        weekday,
        large_amounts: large_amounts(graph, &amounts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::snapshot::{NodeType, RawEdge, RawNode};
    use crate::graph::build_graph;

    const HOUR_MS: i64 = 3_600_000;

    #[test]
    fn huge_amounts_keep_statistics_finite() {
        let nodes = vec![
            RawNode::new(1, NodeType::Account),
            RawNode::new(2, NodeType::Account),
        ];
        let edges = vec![
            RawEdge::new(1, 2).with_amount(f64::MAX / 2.0),
            RawEdge::new(2, 1).with_amount(f64::MAX / 2.0),
            RawEdge::new(1, 2).with_amount(f64::MAX),
            RawEdge::new(2, 1).with_amount(0.0),
        ];
        let (graph, diagnostics) = build_graph(&nodes, &edges);
        assert_eq!(diagnostics.invalid_amounts, 1);

        let stats = transaction_statistics(&graph);
        let amounts = stats.amounts.as_ref().unwrap();
        assert_eq!(amounts.count, 3);
        for value in [amounts.total, amounts.mean, amounts.std_dev, amounts.distribution.bucket_size] {
            assert!(value.is_finite(), "{} is not finite", value);
        }
        assert!(amounts.std_dev > 0.0);
        assert!(stats.large_amounts.iter().all(|large| large.deviation.is_finite()));
        assert!(!serde_json::to_string(amounts).unwrap().contains("null"));
    }

    #[test]
    fn amount_stats_match_hand_computation() {
        let stats = amount_stats(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.mean, 2.5);
        assert_eq!(stats.median, 3.0);
        assert_eq!(stats.total, 10.0);
        assert!((stats.std_dev - 1.25f64.sqrt()).abs() < 1e-12);
        assert_eq!(stats.distribution.buckets.iter().sum::<usize>(), 4);
        assert_eq!(stats.distribution.buckets[0], 1);
        assert_eq!(stats.distribution.buckets[BUCKET_COUNT - 1], 1);
    }

    #[test]
    fn equal_amounts_share_the_first_bucket() {
        let stats = amount_stats(&[7.0, 7.0]).unwrap();
        assert_eq!(stats.distribution.bucket_size, 0.0);
        assert_eq!(stats.distribution.buckets[0], 2);
        assert_eq!(stats.std_dev, 0.0);
    }

    #[test]
    fn empty_inputs_give_none() {
        assert!(amount_stats(&[]).is_none());
        assert!(interval_stats(&[]).is_none());
        assert!(interval_stats(&[5]).is_none());

        let (graph, _) = build_graph(&[], &[]);
        let stats = transaction_statistics(&graph);
        assert!(stats.amounts.is_none());
        assert!(stats.time_range.is_none());
        assert!(stats.large_amounts.is_empty());
        assert_eq!(stats.hourly, vec![0; 24]);
    }

    #[test]
    fn activity_histograms_use_utc() {
        let nodes = vec![
            RawNode::new("a", NodeType::Account),
            RawNode::new("b", NodeType::Account),
        ];
        // 1970-01-01 was a Thursday
        let edges = vec![
            RawEdge::new("a", "b").with_timestamp(0),
            RawEdge::new("a", "b").with_timestamp(13 * HOUR_MS),
            RawEdge::new("b", "a").with_timestamp(24 * HOUR_MS + 13 * HOUR_MS),
        ];
        let (graph, _) = build_graph(&nodes, &edges);

        let stats = transaction_statistics(&graph);
        assert_eq!(stats.hourly[0], 1);
        assert_eq!(stats.hourly[13], 2);
        assert_eq!(stats.weekday[4], 2);
        assert_eq!(stats.weekday[5], 1);
        assert_eq!(
            stats.intervals,
            Some(IntervalStats {
                min: 13 * HOUR_MS,
                max: 24 * HOUR_MS,
                mean: (37 * HOUR_MS) as f64 / 2.0,
            })
        );
    }

    #[test]
    fn outliers_sit_two_deviations_above_mean() {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for i in 0..10i64 {
            nodes.push(RawNode::new(i, NodeType::Account));
        }
        for i in 0..9i64 {
            edges.push(RawEdge::new(i, i + 1).with_amount(10.0));
        }
        edges.push(RawEdge::new(9i64, 0i64).with_id("big").with_amount(1_000.0));
        let (graph, _) = build_graph(&nodes, &edges);

        let stats = transaction_statistics(&graph);
        assert_eq!(stats.large_amounts.len(), 1);
        let outlier = &stats.large_amounts[0];
        assert_eq!(outlier.id, Some(RecordId::from("big")));
        assert_eq!(outlier.amount, 1_000.0);
        assert!((outlier.deviation - 3.0).abs() < 1e-9);
    }
}

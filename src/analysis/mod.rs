//! Suspicious-structure detectors and the risk orchestrator

pub mod bursts;
pub mod cycles;
pub mod paths;
pub mod risk;

use std::time::{Duration, Instant};

/// Wall-clock budget shared by the outer loops of every analyzer.
///
/// Analyzers check it once per outer iteration (DFS root, BFS source,
/// similarity row) and return a result marked `partial` once it expires.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn none() -> Self {
        Self { at: None }
    }

    pub fn after(budget: Option<Duration>) -> Self {
        Self {
            at: budget.map(|budget| Instant::now() + budget),
        }
    }

    pub fn expired(&self) -> bool {
        self.at.map_or(false, |at| Instant::now() >= at)
    }
}

/// `numerator / denominator`, or 0 when the denominator is 0
pub(crate) fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

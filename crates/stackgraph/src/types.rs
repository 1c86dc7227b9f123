//! Run options and results

use crate::graph::Graph;
use crate::status::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Summary of a walk, built from the final step statuses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub complete: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    /// Steps that never reached a terminal status (cancelled run)
    pub pending: Vec<String>,
    pub cancelled: bool,
}

impl RunSummary {
    /// Collect the summary from a graph's current statuses
    pub fn from_graph(graph: &Graph, cancelled: bool) -> Self {
        let mut summary = Self {
            cancelled,
            ..Self::default()
        };
        for step in graph.steps() {
            let name = step.name().to_string();
            match step.status().code() {
                StatusCode::Complete => summary.complete.push(name),
                StatusCode::Skipped => summary.skipped.push(name),
                StatusCode::Failed => summary.failed.push(name),
                StatusCode::Pending | StatusCode::Submitted => summary.pending.push(name),
            }
        }
        summary
    }

    /// Nothing failed, nothing left pending, not cancelled
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.pending.is_empty() && !self.cancelled
    }

    /// Whether some steps were left pending and the run can be retried
    pub fn is_incomplete(&self) -> bool {
        self.cancelled || !self.pending.is_empty()
    }

    /// Total number of steps covered
    pub fn total(&self) -> usize {
        self.complete.len() + self.skipped.len() + self.failed.len() + self.pending.len()
    }
}

/// Options for walking a plan
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Maximum number of steps submitted at once; `0` derives a bound
    /// from the graph
    pub concurrency: usize,
    /// Locked steps that run anyway
    pub force: BTreeSet<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            concurrency: 0,
            force: BTreeSet::new(),
        }
    }
}

impl WalkOptions {
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Self::default()
        }
    }

    /// Effective worker count for a graph.
    ///
    /// An unbounded request uses the step count, which can never stall a
    /// valid schedule.
    pub fn effective_concurrency(&self, graph: &Graph) -> usize {
        if self.concurrency == 0 {
            graph.len().max(1)
        } else {
            self.concurrency
        }
    }
}

//! Plan - a directional walk over a graph

use crate::context::{CancelToken, NoObserver, SharedAction, StepObserver};
use crate::error::Result;
use crate::graph::Graph;
use crate::step::Step;
use crate::types::{RunSummary, WalkOptions};
use crate::walker::Walk;
use std::collections::BTreeSet;

/// A graph wrapped with a walk direction.
///
/// Build plans run dependencies first; destroy plans (`reverse`) run
/// dependents first. A plan reads the graph's edges but only ever
/// changes step statuses.
#[derive(Debug)]
pub struct Plan {
    description: String,
    graph: Graph,
    reverse: bool,
    cancel: CancelToken,
    force: BTreeSet<String>,
}

impl Plan {
    /// Wrap a graph, validating it first
    pub fn new(description: impl Into<String>, graph: Graph) -> Result<Self> {
        graph.validate()?;
        Ok(Self {
            description: description.into(),
            graph,
            reverse: false,
            cancel: CancelToken::new(),
            force: BTreeSet::new(),
        })
    }

    /// Walk dependents before their dependencies
    pub fn reversed(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Share a cancellation token with whoever may interrupt the run
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Locked steps in this set run anyway
    pub fn with_force<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.force.extend(names.into_iter().map(Into::into));
        self
    }

    /// Restrict the plan to `targets` and what the walk must cover for them:
    /// their dependencies in a build, their dependents in a reverse walk.
    ///
    /// Set the direction with [`Plan::reversed`] first.
    pub fn filter_by_targets(self, targets: &[String]) -> Result<Self> {
        if targets.is_empty() {
            return Ok(self);
        }
        let graph = if self.reverse {
            self.graph.filtered_dependents(targets)?
        } else {
            self.graph.filtered(targets)?
        };
        Ok(Self { graph, ..self })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }

    pub fn get(&self, name: &str) -> Option<&Step> {
        self.graph.get(name)
    }

    /// Step names in walk order
    pub fn keys(&self) -> Result<Vec<String>> {
        self.graph.topological_order(self.reverse)
    }

    /// Steps in walk order
    pub fn steps(&self) -> Result<Vec<&Step>> {
        Ok(self
            .keys()?
            .iter()
            .filter_map(|name| self.graph.get(name))
            .collect())
    }

    /// Log and return the numbered walk order without running anything
    pub fn outline(&self) -> Result<Vec<String>> {
        let lines: Vec<String> = self
            .keys()?
            .iter()
            .enumerate()
            .map(|(i, name)| format!("step {}: {name}", i + 1))
            .collect();

        log::info!("plan \"{}\":", self.description);
        for line in &lines {
            log::info!("  - {line}");
        }
        Ok(lines)
    }

    /// Run every step, using `action` for steps without their own.
    ///
    /// `concurrency == 0` derives a bound from the graph.
    pub fn execute(&mut self, action: SharedAction, concurrency: usize) -> Result<RunSummary> {
        self.execute_with_observer(Some(action), concurrency, &mut NoObserver)
    }

    /// Like [`Plan::execute`], reporting each finished step to `observer`.
    ///
    /// An observer error stops the walk once in-flight steps are done and
    /// is returned as [`crate::GraphError::Observer`].
    pub fn execute_with_observer(
        &mut self,
        action: Option<SharedAction>,
        concurrency: usize,
        observer: &mut dyn StepObserver,
    ) -> Result<RunSummary> {
        let options = WalkOptions {
            concurrency,
            force: self.force.clone(),
        };
        let walk = Walk {
            reverse: self.reverse,
            default_action: action,
            options: &options,
            cancel: &self.cancel,
        };
        log::debug!("executing plan \"{}\"", self.description);
        walk.run(&mut self.graph, observer)
    }
}

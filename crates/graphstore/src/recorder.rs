//! Keeps the persistent graph in step with a running plan

use std::collections::BTreeSet;

use stackgraph::{Graph, Step, StepObserver, reasons};

use crate::error::Result;
use crate::store::PersistentGraphStore;

/// Step observer that updates and saves the persistent graph after every
/// finished step.
///
/// - deploy: complete steps, and steps skipped while their stack exists
///   (`nochange`, `locked`), are recorded with their declared dependencies
/// - deploy: steps in `removed` that completed, or were skipped with
///   `nochange` because their stack is already gone, are pruned
/// - destroy: the same goes for every step
///
/// A save failure is returned to the walker, which stops the run.
pub struct GraphRecorder<'a> {
    store: &'a PersistentGraphStore,
    declared: &'a Graph,
    persisted: Graph,
    removed: BTreeSet<String>,
    lock_code: String,
    destroying: bool,
}

impl<'a> GraphRecorder<'a> {
    /// Record a deploy of `declared` that also destroys `removed`
    pub fn deploy(
        store: &'a PersistentGraphStore,
        declared: &'a Graph,
        persisted: Graph,
        removed: BTreeSet<String>,
        lock_code: impl Into<String>,
    ) -> Self {
        Self {
            store,
            declared,
            persisted,
            removed,
            lock_code: lock_code.into(),
            destroying: false,
        }
    }

    /// Record a destroy run
    pub fn destroy(
        store: &'a PersistentGraphStore,
        declared: &'a Graph,
        persisted: Graph,
        lock_code: impl Into<String>,
    ) -> Self {
        Self {
            store,
            declared,
            persisted,
            removed: BTreeSet::new(),
            lock_code: lock_code.into(),
            destroying: true,
        }
    }

    /// Persistent graph as recorded so far
    pub fn persisted(&self) -> &Graph {
        &self.persisted
    }

    pub fn into_persisted(self) -> Graph {
        self.persisted
    }

    /// Apply one finished step. Returns whether the graph changed.
    fn apply(&mut self, step: &Step) -> Result<bool> {
        let name = step.name();

        if self.destroying || self.removed.contains(name) {
            let gone = step.is_completed()
                || (step.is_skipped() && step.status().reason() == Some(reasons::NO_CHANGE));
            if gone {
                return Ok(self.persisted.prune(name).is_some());
            }
            return Ok(false);
        }

        let exists = step.is_completed()
            || (step.is_skipped()
                && matches!(step.status().reason(), Some(reasons::NO_CHANGE | reasons::LOCKED)));
        if !exists {
            return Ok(false);
        }

        self.persisted.add_step_if_not_exists(Step::new(name));
        let dependencies: Vec<String> = self
            .declared
            .requires(name)
            .into_iter()
            .filter(|dep| self.persisted.contains(dep))
            .collect();
        self.persisted.replace_dependencies(name, dependencies)?;
        Ok(true)
    }
}

impl StepObserver for GraphRecorder<'_> {
    fn on_step_done(&mut self, step: &Step) -> std::result::Result<(), String> {
        let changed = self.apply(step).map_err(|e| e.to_string())?;
        if !changed {
            return Ok(());
        }
        self.store
            .save(&self.persisted, &self.lock_code)
            .map_err(|e| format!("failed to save persistent graph: {e}"))
    }
}

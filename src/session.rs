//! Deploy and destroy sessions
//!
//! A session turns the config into a dependency graph, binds every stack
//! to its driver and walks the graph. With a persistent graph configured,
//! a run also:
//! 1. locks the persistent graph for the whole run, then loads it
//! 2. schedules stacks removed from config for destruction
//! 3. records every finished stack, saving after each one
//! 4. unlocks, on success and on failure alike

use anyhow::{Context, Result, bail};
use graphstore::{
    GraphLocation, GraphRecorder, LocalStore, ObjectStore, PersistentGraphStore,
    include_removals, new_lock_code, reconcile, schedule_removals,
};
use stackgraph::{
    CancelToken, Graph, Plan, RunSummary, SharedAction, StatusWatcher, Step, StepDefinition,
};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::config::StackrunConfig;
use crate::drivers::{ActionDriver, CommandDriver, DriverRegistry, StackAction};
use crate::lookups::LookupRegistry;

/// Per-run options from the command line
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overrides the configured concurrency
    pub concurrency: Option<usize>,
    /// Only these stacks, plus their dependencies in a deploy or their
    /// dependents in a destroy
    pub targets: Vec<String>,
    /// Locked stacks to deploy anyway
    pub force: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Deploy,
    Destroy,
}

impl Mode {
    fn description(self) -> &'static str {
        match self {
            Self::Deploy => "deploy",
            Self::Destroy => "destroy",
        }
    }

    fn is_reverse(self) -> bool {
        self == Self::Destroy
    }
}

pub struct Session {
    config: StackrunConfig,
    drivers: DriverRegistry,
    lookups: Arc<LookupRegistry>,
    cancel: CancelToken,
    object_store: Option<Arc<dyn ObjectStore>>,
    watcher: Option<Arc<dyn StatusWatcher>>,
}

impl Session {
    /// Validate `config` against the registered drivers
    pub fn new(
        config: StackrunConfig,
        drivers: DriverRegistry,
        lookups: Arc<LookupRegistry>,
    ) -> Result<Self> {
        config.validate(&drivers.tags())?;
        Ok(Self {
            config,
            drivers,
            lookups,
            cancel: CancelToken::new(),
            object_store: None,
            watcher: None,
        })
    }

    /// Use this object store instead of the configured local directory
    #[cfg(test)]
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    /// Report status changes of every stack to `watcher`
    pub fn with_watcher(mut self, watcher: Arc<dyn StatusWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    /// Token that stops the run when cancelled
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Declared stacks and their dependencies.
    ///
    /// `output` lookups in a stack's variables add `requires` edges.
    pub fn declared_graph(&self) -> Result<Graph> {
        let mut definitions = Vec::with_capacity(self.config.stacks.len());
        for stack in &self.config.stacks {
            let mut requires: BTreeSet<String> = stack.requires.iter().cloned().collect();
            for (name, value) in &stack.variables {
                let implied = self
                    .lookups
                    .dependencies(value)
                    .with_context(|| format!("stack {} variable {name}", stack.name))?;
                requires.extend(implied);
            }

            let step = Step::new(&stack.name)
                .with_locked(stack.locked)
                .with_enabled(stack.enabled);
            definitions.push(
                StepDefinition::new(step)
                    .requires(requires)
                    .required_by(stack.required_by.iter().cloned()),
            );
        }
        Graph::from_definitions(definitions).context("Invalid stack dependencies")
    }

    /// Numbered walk order for a deploy (or destroy), without running anything
    pub fn outline(&self, destroy: bool, targets: &[String]) -> Result<Vec<String>> {
        let mode = if destroy { Mode::Destroy } else { Mode::Deploy };
        self.check_stacks(targets)?;
        let plan = Plan::new(mode.description(), self.declared_graph()?)?
            .reversed(mode.is_reverse())
            .filter_by_targets(targets)?;
        Ok(plan.outline()?)
    }

    pub fn deploy(&self, options: &RunOptions) -> Result<RunSummary> {
        self.run(Mode::Deploy, options)
    }

    pub fn destroy(&self, options: &RunOptions) -> Result<RunSummary> {
        self.run(Mode::Destroy, options)
    }

    fn run(&self, mode: Mode, options: &RunOptions) -> Result<RunSummary> {
        self.check_stacks(&options.targets)?;
        self.check_stacks(&options.force)?;
        let declared = self.declared_graph()?;
        let mut graph = if options.targets.is_empty() {
            declared.clone()
        } else if mode.is_reverse() {
            declared.filtered_dependents(&options.targets)?
        } else {
            declared.filtered(&options.targets)?
        };
        let mut action = self.stack_action()?;
        let concurrency = options.concurrency.unwrap_or(self.config.concurrency);

        let Some(graphs) = self.graph_store()? else {
            let mut plan = self.plan(mode, graph, options)?;
            return Ok(plan.execute(Arc::new(action), concurrency)?);
        };

        // The lock lives on the stored object, so it must exist first; the
        // graph is read again once locked.
        graphs.load().context("Could not load persistent graph")?;
        let guard = graphs
            .lock_manager()
            .acquire(graphs.location(), &new_lock_code())
            .context("Could not lock persistent graph")?;
        let persisted = graphs.load().context("Could not load persistent graph")?;

        let removed = if options.targets.is_empty() {
            reconcile(&declared, &persisted).to_remove
        } else {
            BTreeSet::new()
        };
        if !removed.is_empty() {
            log::info!(
                "destroying stack(s) removed from config: {}",
                removed.iter().cloned().collect::<Vec<_>>().join(", ")
            );
        }

        let destroy_removed = self
            .config
            .persistent_graph
            .as_ref()
            .and_then(|p| p.destroy_removed.clone());
        let removal_driver: Arc<dyn ActionDriver> =
            Arc::new(CommandDriver::removal(destroy_removed));
        for name in &removed {
            action.bind_removal(name.clone(), Arc::clone(&removal_driver));
        }
        let action: SharedAction = Arc::new(action);

        let mut recorder = match mode {
            Mode::Deploy => {
                schedule_removals(&mut graph, &persisted, &removed, &action)?;
                GraphRecorder::deploy(&graphs, &declared, persisted, removed, guard.lock_code())
            }
            Mode::Destroy => {
                include_removals(&mut graph, &persisted, &removed, &action)?;
                GraphRecorder::destroy(&graphs, &declared, persisted, guard.lock_code())
            }
        };

        let mut plan = self.plan(mode, graph, options)?;
        let summary = plan.execute_with_observer(Some(action), concurrency, &mut recorder)?;

        guard.release().context("Could not unlock persistent graph")?;
        Ok(summary)
    }

    /// Stack names given on the command line must be declared
    fn check_stacks(&self, names: &[String]) -> Result<()> {
        for name in names {
            if self.config.stack(name).is_none() {
                bail!(
                    "unknown stack '{name}' (declared: {})",
                    self.config.stack_names().join(", ")
                );
            }
        }
        Ok(())
    }

    fn plan(&self, mode: Mode, mut graph: Graph, options: &RunOptions) -> Result<Plan> {
        if let Some(watcher) = &self.watcher {
            for step in graph.steps_mut() {
                step.set_watcher(Arc::clone(watcher));
            }
        }
        let mut plan = Plan::new(mode.description(), graph)?
            .reversed(mode.is_reverse())
            .with_cancel(self.cancel.clone());
        if mode == Mode::Deploy {
            plan = plan.with_force(options.force.iter().cloned());
        }
        Ok(plan)
    }

    fn stack_action(&self) -> Result<StackAction> {
        let mut action = StackAction::new(&self.config.namespace, Arc::clone(&self.lookups));
        for stack in &self.config.stacks {
            action.bind(&stack.name, self.drivers.create(stack)?, stack.variables.clone());
        }
        Ok(action)
    }

    fn graph_store(&self) -> Result<Option<PersistentGraphStore>> {
        let Some(persistent) = &self.config.persistent_graph else {
            return Ok(None);
        };
        let store: Arc<dyn ObjectStore> = match &self.object_store {
            Some(store) => Arc::clone(store),
            None => Arc::new(LocalStore::new(persistent.store_path()?)),
        };
        let location = GraphLocation::new(&persistent.bucket, &self.config.namespace, &persistent.key);
        Ok(Some(PersistentGraphStore::new(store, location)))
    }
}

/// Graphviz rendering; arrows point from a stack to what it requires
pub fn to_dot(graph: &Graph) -> String {
    let mut dot = String::from("digraph stacks {\n");
    for name in graph.step_names() {
        let requires = graph.requires(name);
        if requires.is_empty() {
            let _ = writeln!(dot, "  \"{name}\";");
        }
        for dep in requires {
            let _ = writeln!(dot, "  \"{name}\" -> \"{dep}\";");
        }
    }
    dot.push_str("}\n");
    dot
}

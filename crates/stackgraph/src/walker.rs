//! Walker - runs eligible steps on a bounded worker pool
//!
//! A single coordinating loop owns every status change. Workers only run
//! actions and report back over a channel:
//!
//! 1. scan pending steps in topological order, skipping the blocked ones
//!    and submitting the eligible ones while a worker slot is free
//! 2. wait for a worker event (or a poll timeout, to notice cancellation)
//! 3. apply the event; on failure skip every pending downstream step
//! 4. repeat until nothing is pending or submitted
//!
//! On cancellation no new steps are submitted; in-flight steps are
//! awaited and the remaining pending steps stay pending.

use crate::context::{
    ActionResult, CancelToken, Outcome, SharedAction, StepContext, StepObserver,
};
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::status::{Status, StatusCode, reasons};
use crate::types::{RunSummary, WalkOptions};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pause before calling an action again when it reported no new status
pub(crate) const ACTION_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Message from a worker to the coordinator
enum WorkerEvent {
    /// The action reported a new in-progress status
    Progress { step: String, status: Status },
    /// The action reached a terminal status
    Finished { step: String, outcome: Outcome },
}

/// Everything the coordinating loop needs besides the graph
pub(crate) struct Walk<'a> {
    pub reverse: bool,
    pub default_action: Option<SharedAction>,
    pub options: &'a WalkOptions,
    pub cancel: &'a CancelToken,
}

impl Walk<'_> {
    pub(crate) fn run(&self, graph: &mut Graph, observer: &mut dyn StepObserver) -> Result<RunSummary> {
        let order = graph.topological_order(self.reverse)?;
        let upstream: BTreeMap<String, BTreeSet<String>> = order
            .iter()
            .map(|name| (name.clone(), self.upstream_of(graph, name)))
            .collect();

        let limit = self.options.effective_concurrency(graph);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(limit)
            .thread_name(|i| format!("stackgraph-worker-{i}"))
            .build()
            .map_err(|e| GraphError::WorkerPool(e.to_string()))?;

        log::debug!(
            "walking {} steps ({}), concurrency {limit}",
            order.len(),
            if self.reverse { "reverse" } else { "forward" }
        );

        let (tx, rx) = mpsc::channel::<WorkerEvent>();
        let mut fatal: Option<GraphError> = None;

        pool.in_place_scope(|scope| -> Result<()> {
            let mut in_flight = 0usize;

            loop {
                let mut progressed = false;

                if !self.cancel.is_cancelled() && fatal.is_none() {
                    for name in &order {
                        if in_flight >= limit || self.cancel.is_cancelled() || fatal.is_some() {
                            break;
                        }
                        let Some(step) = graph.get(name) else { continue };
                        if !step.is_pending() {
                            continue;
                        }

                        let ups = &upstream[name];
                        if ups.iter().any(|u| is_blocking(graph, u)) {
                            self.finish(graph, name, Status::skipped(reasons::DEPENDENCY_FAILED), observer, &mut fatal)?;
                            progressed = true;
                            continue;
                        }
                        if !ups.iter().all(|u| graph.get(u).is_some_and(|s| s.done())) {
                            continue;
                        }
                        if !step.is_enabled() {
                            self.finish(graph, name, Status::skipped(reasons::DISABLED), observer, &mut fatal)?;
                            progressed = true;
                            continue;
                        }
                        if !self.reverse && step.is_locked() && !self.options.force.contains(name) {
                            self.finish(graph, name, Status::skipped(reasons::LOCKED), observer, &mut fatal)?;
                            progressed = true;
                            continue;
                        }

                        let Some(action) = step.action().or(self.default_action.as_ref()).cloned()
                        else {
                            graph
                                .get_mut(name)
                                .ok_or_else(|| GraphError::StepNotFound(name.clone()))?
                                .submit()?;
                            self.finish(graph, name, Status::failed("no action configured"), observer, &mut fatal)?;
                            progressed = true;
                            continue;
                        };

                        let step = graph
                            .get_mut(name)
                            .ok_or_else(|| GraphError::StepNotFound(name.clone()))?;
                        step.submit()?;
                        let ctx = StepContext {
                            name: name.clone(),
                            status: step.status().clone(),
                            reverse: self.reverse,
                            dependency_outputs: dependency_outputs(graph, name),
                        };

                        in_flight += 1;
                        progressed = true;
                        let tx = tx.clone();
                        scope.spawn(move |_| run_action(&action, ctx, &tx));
                    }
                }

                if in_flight == 0 {
                    if progressed && !self.cancel.is_cancelled() && fatal.is_none() {
                        continue;
                    }
                    break;
                }

                match rx.recv_timeout(POLL_INTERVAL) {
                    Ok(WorkerEvent::Progress { step, status }) => {
                        graph
                            .get_mut(&step)
                            .ok_or_else(|| GraphError::StepNotFound(step.clone()))?
                            .set_status(status)?;
                    }
                    Ok(WorkerEvent::Finished { step, outcome }) => {
                        in_flight -= 1;
                        let failed = outcome.status.code() == StatusCode::Failed;
                        if let Some(s) = graph.get_mut(&step) {
                            s.set_outputs(outcome.outputs);
                        }
                        self.finish(graph, &step, outcome.status, observer, &mut fatal)?;
                        if failed {
                            self.propagate_failure(graph, &step, observer, &mut fatal)?;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            Ok(())
        })?;

        if let Some(err) = fatal {
            return Err(err);
        }

        let summary = RunSummary::from_graph(graph, self.cancel.is_cancelled());
        if summary.cancelled {
            log::warn!(
                "walk cancelled with {} step(s) still pending",
                summary.pending.len()
            );
        }
        Ok(summary)
    }

    /// Steps that must be done before `name` may run in this direction
    fn upstream_of(&self, graph: &Graph, name: &str) -> BTreeSet<String> {
        if self.reverse {
            graph.required_by(name)
        } else {
            graph.requires(name)
        }
    }

    /// Steps that can no longer run once `name` has failed
    fn downstream_of(&self, graph: &Graph, name: &str) -> BTreeSet<String> {
        if self.reverse {
            graph.transitive_dependencies(name)
        } else {
            graph.transitive_dependents(name)
        }
    }

    fn propagate_failure(
        &self,
        graph: &mut Graph,
        failed: &str,
        observer: &mut dyn StepObserver,
        fatal: &mut Option<GraphError>,
    ) -> Result<()> {
        for name in self.downstream_of(graph, failed) {
            if graph.get(&name).is_some_and(|s| s.is_pending()) {
                self.finish(graph, &name, Status::skipped(reasons::DEPENDENCY_FAILED), observer, fatal)?;
            }
        }
        Ok(())
    }

    /// Apply a terminal status and hand the step to the observer
    fn finish(
        &self,
        graph: &mut Graph,
        name: &str,
        status: Status,
        observer: &mut dyn StepObserver,
        fatal: &mut Option<GraphError>,
    ) -> Result<()> {
        let step = graph
            .get_mut(name)
            .ok_or_else(|| GraphError::StepNotFound(name.to_string()))?;
        step.set_status(status)?;

        if fatal.is_none()
            && let Err(message) = observer.on_step_done(step)
        {
            log::error!("stopping walk: {message}");
            *fatal = Some(GraphError::Observer {
                step: name.to_string(),
                message,
            });
        }
        Ok(())
    }
}

/// A failed upstream step, or one skipped because its own upstream failed
fn is_blocking(graph: &Graph, name: &str) -> bool {
    graph.get(name).is_some_and(|s| {
        s.has_failed() || (s.is_skipped() && s.status().reason() == Some(reasons::DEPENDENCY_FAILED))
    })
}

fn dependency_outputs(graph: &Graph, name: &str) -> BTreeMap<String, crate::context::Outputs> {
    graph
        .requires(name)
        .into_iter()
        .filter_map(|dep| graph.get(&dep).map(|s| (dep.clone(), s.outputs().clone())))
        .collect()
}

/// Worker body: call the action until it reports a terminal status.
///
/// A repeated, unchanged `Submitted` status waits [`ACTION_POLL_INTERVAL`]
/// before the next call.
fn run_action(action: &SharedAction, mut ctx: StepContext, tx: &Sender<WorkerEvent>) {
    loop {
        let outcome = match call_action(action, &ctx) {
            Ok(outcome) => outcome,
            Err(reason) => Outcome::from(Status::failed(reason)),
        };

        match outcome.status.code() {
            StatusCode::Submitted => {
                if outcome.status == ctx.status {
                    thread::sleep(ACTION_POLL_INTERVAL);
                    continue;
                }
                ctx.status = outcome.status.clone();
                let event = WorkerEvent::Progress {
                    step: ctx.name.clone(),
                    status: outcome.status,
                };
                if tx.send(event).is_err() {
                    return;
                }
            }
            StatusCode::Pending => {
                let outcome = Outcome::from(Status::failed("action returned pending status"));
                let _ = tx.send(WorkerEvent::Finished {
                    step: ctx.name,
                    outcome,
                });
                return;
            }
            _ => {
                let _ = tx.send(WorkerEvent::Finished {
                    step: ctx.name,
                    outcome,
                });
                return;
            }
        }
    }
}

/// Run the action once, turning errors and panics into a failure reason
fn call_action(action: &SharedAction, ctx: &StepContext) -> std::result::Result<Outcome, String> {
    let result: std::thread::Result<ActionResult> =
        panic::catch_unwind(AssertUnwindSafe(|| action.run(ctx)));
    match result {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(format!("action panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

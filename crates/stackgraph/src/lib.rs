//! # Stackgraph
//!
//! Dependency graph execution engine for deployable stacks.
//!
//! A [`Graph`] holds named [`Step`]s and "requires" edges. A [`Plan`] wraps
//! a graph with a walk direction and runs a [`StepAction`] for every step,
//! dependencies first (build) or dependents first (destroy), with bounded
//! concurrency.
//!
//! ## Core Concepts
//!
//! - **Step**: a named unit of work with a [`Status`] state machine
//! - **Graph**: steps plus dependency edges, validated to be acyclic
//! - **Plan**: a directional walk over a graph
//! - **RunSummary**: final statuses of a walk
//!
//! ## Example
//!
//! ```ignore
//! use stackgraph::{Graph, GraphDict, Plan, Status, StepContext, ActionResult};
//! use std::sync::Arc;
//!
//! let mut dict = GraphDict::new();
//! dict.insert("vpc".into(), vec![]);
//! dict.insert("bastion".into(), vec!["vpc".into()]);
//!
//! let mut plan = Plan::new("deploy", Graph::from_dict(&dict)?)?;
//! let summary = plan.execute(
//!     Arc::new(|ctx: &StepContext| -> ActionResult {
//!         Ok(Status::complete(format!("deployed {}", ctx.name)).into())
//!     }),
//!     2,
//! )?;
//! assert!(summary.is_success());
//! ```
//!
//! ## Failure handling
//!
//! A failed step skips every step downstream of it with the reason
//! `"dependency has failed"`; unrelated branches keep running. A panicking
//! action fails its step instead of taking down the run. Setting the plan's
//! [`CancelToken`] stops new submissions and leaves the rest pending.

pub mod context;
pub mod error;
pub mod graph;
pub mod plan;
pub mod status;
pub mod step;
pub mod types;
mod walker;

// Re-export main types at crate root
pub use context::{
    ActionError, ActionResult, CancelToken, NoObserver, Outcome, Outputs, SharedAction,
    StatusWatcher, StepAction, StepContext, StepObserver,
};
pub use error::{GraphError, Result};
pub use graph::{Graph, GraphDict, StepDefinition};
pub use plan::Plan;
pub use status::{Status, StatusCode, reasons};
pub use step::Step;
pub use types::{RunSummary, WalkOptions};

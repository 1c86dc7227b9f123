//! Action context and provider traits
//!
//! These traits keep the engine independent of what a step actually does
//! (provisioning, destruction, diffing) and of how progress is reported.

use crate::status::Status;
use crate::step::Step;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Key/value outputs produced by a step
pub type Outputs = BTreeMap<String, String>;

/// Snapshot handed to an action when its step runs.
///
/// Built by the coordinator at submission time, so actions never touch
/// the graph directly.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Name of the step being run
    pub name: String,
    /// Status the step currently has (submitted, possibly with a reason)
    pub status: Status,
    /// Whether the plan walks in destroy order
    pub reverse: bool,
    /// Outputs of the step's direct upstream steps, keyed by step name
    pub dependency_outputs: BTreeMap<String, Outputs>,
}

impl StepContext {
    /// Look up an output of an upstream step
    pub fn output(&self, step: &str, key: &str) -> Option<&str> {
        self.dependency_outputs
            .get(step)
            .and_then(|outputs| outputs.get(key))
            .map(String::as_str)
    }
}

/// What an action returns: the next status and any outputs it produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: Status,
    pub outputs: Outputs,
}

impl Outcome {
    pub fn with_outputs(status: Status, outputs: Outputs) -> Self {
        Self { status, outputs }
    }
}

impl From<Status> for Outcome {
    fn from(status: Status) -> Self {
        Self {
            status,
            outputs: Outputs::new(),
        }
    }
}

/// Typed failure returned by an action.
///
/// The walker turns it into a `FAILED` status with the message as reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionError {
    message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ActionError {}

/// Result of one action invocation
pub type ActionResult = std::result::Result<Outcome, ActionError>;

/// The work performed for a step.
///
/// Returning a `Submitted` status means "still in progress": the same
/// worker calls the action again with the updated context until a
/// terminal status comes back. A call that repeats the current status is
/// followed by a short pause. Implementations must be safe to call
/// concurrently for different steps.
pub trait StepAction: Send + Sync {
    fn run(&self, ctx: &StepContext) -> ActionResult;
}

impl<F> StepAction for F
where
    F: Fn(&StepContext) -> ActionResult + Send + Sync,
{
    fn run(&self, ctx: &StepContext) -> ActionResult {
        self(ctx)
    }
}

/// Shared handle to an action
pub type SharedAction = Arc<dyn StepAction>;

/// Callback invoked on every status change of a step
pub trait StatusWatcher: Send + Sync {
    fn on_status_change(&self, step: &str, old: &Status, new: &Status);
}

/// Receives every step that reached a terminal status during a walk.
///
/// Runs on the coordinating thread. Returning an error stops the walk.
pub trait StepObserver {
    fn on_step_done(&mut self, step: &Step) -> std::result::Result<(), String>;
}

/// Observer that does nothing
pub struct NoObserver;

impl StepObserver for NoObserver {
    fn on_step_done(&mut self, _step: &Step) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Cooperative cancellation flag shared across a whole run
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the walk stops submitting new steps
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_closures_are_actions() {
        let action = |ctx: &StepContext| -> ActionResult {
            Ok(Status::complete(format!("ran {}", ctx.name)).into())
        };
        let ctx = StepContext {
            name: "vpc".into(),
            status: Status::Submitted { reason: None },
            reverse: false,
            dependency_outputs: BTreeMap::new(),
        };
        let outcome = action.run(&ctx).unwrap();
        assert_eq!(outcome.status, Status::complete("ran vpc"));
        assert!(outcome.outputs.is_empty());
    }

    #[test]
    fn test_context_output_lookup() {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            "vpc".to_string(),
            Outputs::from([("VpcId".to_string(), "vpc-123".to_string())]),
        );
        let ctx = StepContext {
            name: "bastion".into(),
            status: Status::Submitted { reason: None },
            reverse: false,
            dependency_outputs: outputs,
        };
        assert_eq!(ctx.output("vpc", "VpcId"), Some("vpc-123"));
        assert_eq!(ctx.output("vpc", "Missing"), None);
        assert_eq!(ctx.output("other", "VpcId"), None);
    }
}

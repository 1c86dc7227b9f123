//! A single deployable unit tracked through the status state machine

use crate::context::{Outputs, SharedAction, StatusWatcher};
use crate::error::{GraphError, Result};
use crate::status::{Status, StatusCode};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// One stack in the dependency graph.
///
/// The name never changes after creation. Status changes go through
/// [`Step::set_status`], which validates the transition, stamps
/// `last_updated`, logs the status line and notifies the watcher.
#[derive(Clone)]
pub struct Step {
    name: String,
    status: Status,
    last_updated: DateTime<Utc>,
    locked: bool,
    enabled: bool,
    action: Option<SharedAction>,
    watcher: Option<Arc<dyn StatusWatcher>>,
    outputs: Outputs,
}

impl Step {
    /// Create a pending step
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: Status::Pending,
            last_updated: Utc::now(),
            locked: false,
            enabled: true,
            action: None,
            watcher: None,
            outputs: Outputs::new(),
        }
    }

    /// Attach the action this step runs instead of the plan-level one
    pub fn with_action(mut self, action: SharedAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_watcher(mut self, watcher: Arc<dyn StatusWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn action(&self) -> Option<&SharedAction> {
        self.action.as_ref()
    }

    pub fn set_action(&mut self, action: SharedAction) {
        self.action = Some(action);
    }

    pub fn set_watcher(&mut self, watcher: Arc<dyn StatusWatcher>) {
        self.watcher = Some(watcher);
    }

    /// Outputs recorded from the step's action
    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    pub fn set_outputs(&mut self, outputs: Outputs) {
        self.outputs = outputs;
    }

    /// Move to a new status, enforcing the state machine.
    pub fn set_status(&mut self, status: Status) -> Result<()> {
        if !self.status.can_transition_to(&status) {
            return Err(GraphError::InvalidTransition {
                step: self.name.clone(),
                from: self.status.code(),
                to: status.code(),
            });
        }

        let old = std::mem::replace(&mut self.status, status);
        self.last_updated = Utc::now();
        log::info!("{}", self.status.log_line(&self.name));

        if let Some(watcher) = &self.watcher {
            watcher.on_status_change(&self.name, &old, &self.status);
        }
        Ok(())
    }

    /// `PENDING -> SUBMITTED`, done by the walker right before dispatch
    pub fn submit(&mut self) -> Result<()> {
        self.set_status(Status::Submitted { reason: None })
    }

    pub fn complete(&mut self, reason: impl Into<String>) -> Result<()> {
        self.set_status(Status::complete(reason))
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.set_status(Status::failed(reason))
    }

    pub fn skip(&mut self, reason: impl Into<String>) -> Result<()> {
        self.set_status(Status::skipped(reason))
    }

    pub fn is_pending(&self) -> bool {
        self.status.code() == StatusCode::Pending
    }

    pub fn is_submitted(&self) -> bool {
        self.status.code() == StatusCode::Submitted
    }

    pub fn is_completed(&self) -> bool {
        self.status.code() == StatusCode::Complete
    }

    pub fn has_failed(&self) -> bool {
        self.status.code() == StatusCode::Failed
    }

    pub fn is_skipped(&self) -> bool {
        self.status.code() == StatusCode::Skipped
    }

    /// True for any terminal status
    pub fn done(&self) -> bool {
        self.status.is_terminal()
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("status", &self.status)
            .field("last_updated", &self.last_updated)
            .field("locked", &self.locked)
            .field("enabled", &self.enabled)
            .field("has_action", &self.action.is_some())
            .field("outputs", &self.outputs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::reasons;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, StatusCode, StatusCode)>>,
    }

    impl StatusWatcher for Recorder {
        fn on_status_change(&self, step: &str, old: &Status, new: &Status) {
            self.seen
                .lock()
                .unwrap()
                .push((step.to_string(), old.code(), new.code()));
        }
    }

    #[test]
    fn test_new_step_is_pending() {
        let step = Step::new("vpc");
        assert!(step.is_pending());
        assert!(!step.done());
        assert!(step.is_enabled());
        assert!(!step.is_locked());
    }

    #[test]
    fn test_lifecycle_notifies_watcher() {
        let recorder = Arc::new(Recorder::default());
        let mut step = Step::new("vpc").with_watcher(recorder.clone());

        step.submit().unwrap();
        assert!(step.is_submitted());
        step.complete(reasons::CREATING).unwrap();
        assert!(step.is_completed());
        assert!(step.done());

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ("vpc".to_string(), StatusCode::Pending, StatusCode::Submitted),
                ("vpc".to_string(), StatusCode::Submitted, StatusCode::Complete),
            ]
        );
    }

    #[test]
    fn test_terminal_step_rejects_changes() {
        let mut step = Step::new("vpc");
        step.skip(reasons::LOCKED).unwrap();
        assert!(step.is_skipped());

        let err = step.submit().unwrap_err();
        assert!(matches!(
            err,
            GraphError::InvalidTransition {
                from: StatusCode::Skipped,
                to: StatusCode::Submitted,
                ..
            }
        ));
        assert_eq!(step.status().reason(), Some(reasons::LOCKED));
    }

    #[test]
    fn test_transition_updates_timestamp() {
        let mut step = Step::new("vpc");
        let before = step.last_updated();
        step.submit().unwrap();
        step.fail("boom").unwrap();
        assert!(step.has_failed());
        assert!(step.last_updated() >= before);
    }
}

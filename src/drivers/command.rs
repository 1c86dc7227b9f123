//! `command` driver: stacks managed by shell commands
//!
//! - `args.check` exits 0 when the stack exists
//! - `args.build` creates or updates it
//! - `args.destroy` removes it
//!
//! Resolved variables are exported to every command, along with
//! `STACKRUN_STACK_NAME` and `STACKRUN_NAMESPACE`. Lines of the form
//! `::output KEY=VALUE` on stdout become the stack's outputs.

use stackgraph::{ActionError, ActionResult, Outcome, Status, reasons};
use std::collections::BTreeMap;

use super::{ActionDriver, DriverRequest, parse_outputs};
use crate::config::{StackArgs, StackConfig};
use crate::runner;

#[derive(Debug, Clone, Default)]
pub struct CommandDriver {
    args: StackArgs,
}

impl CommandDriver {
    pub const TAG: &'static str = "command";

    pub fn new(args: StackArgs) -> Self {
        Self { args }
    }

    pub fn from_config(stack: &StackConfig) -> Self {
        Self::new(stack.args.clone())
    }

    /// Driver that can only destroy, used for stacks removed from config
    pub fn removal(destroy: Option<String>) -> Self {
        Self::new(StackArgs {
            destroy,
            ..StackArgs::default()
        })
    }

    fn environment(request: &DriverRequest<'_>) -> BTreeMap<String, String> {
        let mut envs = request.variables.clone();
        envs.insert("STACKRUN_STACK_NAME".into(), request.stack.to_string());
        envs.insert("STACKRUN_NAMESPACE".into(), request.namespace.to_string());
        envs
    }

    /// Whether the stack exists; without a check command it is assumed not to
    fn exists(&self, envs: &BTreeMap<String, String>) -> bool {
        self.args
            .check
            .as_deref()
            .is_some_and(|check| runner::run_quiet(check, envs))
    }

    fn run(script: &str, envs: &BTreeMap<String, String>, reason: &str) -> ActionResult {
        let output = runner::run_shell(script, envs).map_err(|e| ActionError::new(format!("{e:#}")))?;
        if !output.success {
            return Err(ActionError::new(output.failure_reason()));
        }
        Ok(Outcome::with_outputs(
            Status::complete(reason),
            parse_outputs(&output.stdout),
        ))
    }
}

impl ActionDriver for CommandDriver {
    fn tag(&self) -> &'static str {
        Self::TAG
    }

    fn build(&self, request: &DriverRequest<'_>) -> ActionResult {
        let Some(build) = self.args.build.as_deref() else {
            return Ok(Status::skipped(reasons::NO_CHANGE).into());
        };
        let envs = Self::environment(request);

        if request.is_first_call() {
            let reason = if self.exists(&envs) {
                reasons::UPDATING
            } else {
                reasons::CREATING
            };
            return Ok(Status::submitted(reason).into());
        }

        let reason = request.status.reason().unwrap_or(reasons::CREATING);
        Self::run(build, &envs, reason)
    }

    fn destroy(&self, request: &DriverRequest<'_>) -> ActionResult {
        let Some(destroy) = self.args.destroy.as_deref() else {
            return Err(ActionError::new(format!(
                "no destroy command configured for stack {}",
                request.stack
            )));
        };
        let envs = Self::environment(request);

        if request.is_first_call() {
            if self.args.check.is_some() && !self.exists(&envs) {
                return Ok(Status::skipped(reasons::NO_CHANGE).into());
            }
            return Ok(Status::submitted(reasons::SUBMITTED_FOR_DESTRUCTION).into());
        }

        Self::run(destroy, &envs, reasons::DESTROYED)
    }
}

//! Action drivers: what deploying or destroying one stack actually does
//!
//! Every stack names a driver tag. The [`DriverRegistry`] maps tags to
//! factories once at startup; [`StackAction`] adapts the created drivers
//! to the graph walker.
//!
//! Drivers are polled: a call returning `Submitted` is made again until it
//! returns a terminal status, so one call can report progress and the next
//! do the work.

use anyhow::{Result, bail};
use stackgraph::{
    ActionError, ActionResult, Outputs, Status, StepAction, StepContext,
};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::StackConfig;
use crate::lookups::{LookupContext, LookupRegistry};

pub mod command;
pub mod noop;

pub use command::CommandDriver;
pub use noop::NoopDriver;

/// Everything a driver gets for one call
pub struct DriverRequest<'a> {
    pub stack: &'a str,
    pub namespace: &'a str,
    /// Variables with lookups resolved
    pub variables: &'a BTreeMap<String, String>,
    /// Status of the step right now; `Submitted` without a reason on the
    /// first call
    pub status: &'a Status,
}

impl DriverRequest<'_> {
    /// Whether an earlier call already reported progress
    pub fn is_first_call(&self) -> bool {
        self.status.reason().is_none()
    }
}

/// Deploys and destroys one kind of stack.
///
/// Implementations must be safe to call concurrently for different stacks.
pub trait ActionDriver: Send + Sync {
    /// Driver tag, as written in config
    fn tag(&self) -> &'static str;

    /// Create or update the stack
    fn build(&self, request: &DriverRequest<'_>) -> ActionResult;

    /// Tear the stack down
    fn destroy(&self, request: &DriverRequest<'_>) -> ActionResult;
}

/// Creates a driver for a configured stack
pub type DriverFactory = fn(&StackConfig) -> Result<Arc<dyn ActionDriver>>;

/// Driver factories by tag
pub struct DriverRegistry {
    factories: BTreeMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Registry without drivers
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the built-in `command` and `noop` drivers
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::empty();
        registry.register(CommandDriver::TAG, |stack| {
            Ok(Arc::new(CommandDriver::from_config(stack)))
        })?;
        registry.register(NoopDriver::TAG, |_| Ok(Arc::new(NoopDriver)))?;
        Ok(registry)
    }

    pub fn register(&mut self, tag: &str, factory: DriverFactory) -> Result<()> {
        if self.factories.contains_key(tag) {
            bail!("driver '{tag}' is already registered");
        }
        self.factories.insert(tag.to_string(), factory);
        Ok(())
    }

    pub fn tags(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Create the driver for a stack
    pub fn create(&self, stack: &StackConfig) -> Result<Arc<dyn ActionDriver>> {
        match self.factories.get(&stack.driver) {
            Some(factory) => factory(stack),
            None => bail!("stack {}: unknown driver '{}'", stack.name, stack.driver),
        }
    }
}

/// A driver bound to one stack
struct Binding {
    driver: Arc<dyn ActionDriver>,
    variables: BTreeMap<String, String>,
    /// Destroy regardless of walk direction
    destroy_only: bool,
}

/// Step action that dispatches each step to its stack's driver
pub struct StackAction {
    namespace: String,
    bindings: BTreeMap<String, Binding>,
    lookups: Arc<LookupRegistry>,
}

impl StackAction {
    pub fn new(namespace: impl Into<String>, lookups: Arc<LookupRegistry>) -> Self {
        Self {
            namespace: namespace.into(),
            bindings: BTreeMap::new(),
            lookups,
        }
    }

    /// Use `driver` for `stack`, following the walk direction
    pub fn bind(
        &mut self,
        stack: impl Into<String>,
        driver: Arc<dyn ActionDriver>,
        variables: BTreeMap<String, String>,
    ) {
        self.bindings.insert(
            stack.into(),
            Binding {
                driver,
                variables,
                destroy_only: false,
            },
        );
    }

    /// Use `driver` to destroy `stack`, even in a deploy walk
    pub fn bind_removal(&mut self, stack: impl Into<String>, driver: Arc<dyn ActionDriver>) {
        self.bindings.insert(
            stack.into(),
            Binding {
                driver,
                variables: BTreeMap::new(),
                destroy_only: true,
            },
        );
    }

    fn resolve_variables(
        &self,
        binding: &Binding,
        ctx: &StepContext,
        destroying: bool,
    ) -> std::result::Result<BTreeMap<String, String>, ActionError> {
        let lookup_ctx = LookupContext {
            dependency_outputs: &ctx.dependency_outputs,
        };
        if !destroying {
            return self
                .lookups
                .resolve_all(&binding.variables, &lookup_ctx)
                .map_err(|e| ActionError::new(format!("{e:#}")));
        }

        // Dependencies have not run yet in a destroy walk, so their outputs
        // are unknown; unresolvable variables are left empty.
        Ok(binding
            .variables
            .iter()
            .map(|(name, value)| {
                let value = self.lookups.resolve(value, &lookup_ctx).unwrap_or_else(|e| {
                    log::debug!("{}: leaving {name} empty: {e:#}", ctx.name);
                    String::new()
                });
                (name.clone(), value)
            })
            .collect())
    }
}

impl StepAction for StackAction {
    fn run(&self, ctx: &StepContext) -> ActionResult {
        let binding = self
            .bindings
            .get(&ctx.name)
            .ok_or_else(|| ActionError::new(format!("no driver bound to stack {}", ctx.name)))?;
        let destroying = ctx.reverse || binding.destroy_only;
        let variables = self.resolve_variables(binding, ctx, destroying)?;

        let request = DriverRequest {
            stack: &ctx.name,
            namespace: &self.namespace,
            variables: &variables,
            status: &ctx.status,
        };
        log::trace!(
            "{}: {} via {}",
            ctx.name,
            if destroying { "destroy" } else { "build" },
            binding.driver.tag()
        );
        if destroying {
            binding.driver.destroy(&request)
        } else {
            binding.driver.build(&request)
        }
    }
}

/// Parse `::output KEY=VALUE` lines from driver output
pub fn parse_outputs(stdout: &str) -> Outputs {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix("::output "))
        .filter_map(|rest| rest.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

//! Variable lookups: `${<type> <query>}` references inside stack variables
//!
//! Handlers are registered once per process in a [`LookupRegistry`]:
//! - `output` - `${output stack::Key}`, an output of another stack
//! - `env` - `${env NAME}`, an environment variable
//!
//! `output` lookups also name a stack the variable's owner depends on.

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use stackgraph::Outputs;
use std::collections::{BTreeMap, BTreeSet};

const LOOKUP_PATTERN: &str = r"\$\{(\w+)\s+([^}]*)\}";

/// Values a lookup may read while resolving
pub struct LookupContext<'a> {
    /// Outputs of the stacks the current stack requires
    pub dependency_outputs: &'a BTreeMap<String, Outputs>,
}

/// Resolves one lookup type
pub trait LookupHandler: Send + Sync {
    fn resolve(&self, query: &str, ctx: &LookupContext<'_>) -> Result<String>;

    /// Stack that must run before a variable using this query
    fn dependency(&self, _query: &str) -> Option<String> {
        None
    }
}

/// `${output stack::Key}`
pub struct OutputLookup;

impl OutputLookup {
    fn split(query: &str) -> Result<(&str, &str)> {
        query
            .trim()
            .split_once("::")
            .filter(|(stack, key)| !stack.is_empty() && !key.is_empty())
            .ok_or_else(|| anyhow!("invalid output lookup '{query}', expected stack::Key"))
    }
}

impl LookupHandler for OutputLookup {
    fn resolve(&self, query: &str, ctx: &LookupContext<'_>) -> Result<String> {
        let (stack, key) = Self::split(query)?;
        let outputs = ctx
            .dependency_outputs
            .get(stack)
            .with_context(|| format!("stack {stack} is not a dependency"))?;
        outputs
            .get(key)
            .cloned()
            .with_context(|| format!("stack {stack} has no output {key}"))
    }

    fn dependency(&self, query: &str) -> Option<String> {
        Self::split(query).ok().map(|(stack, _)| stack.to_string())
    }
}

/// `${env NAME}`
pub struct EnvLookup;

impl LookupHandler for EnvLookup {
    fn resolve(&self, query: &str, _ctx: &LookupContext<'_>) -> Result<String> {
        let name = query.trim();
        std::env::var(name).with_context(|| format!("environment variable {name} is not set"))
    }
}

/// Lookup handlers by type name
pub struct LookupRegistry {
    handlers: BTreeMap<String, Box<dyn LookupHandler>>,
    pattern: Regex,
}

impl LookupRegistry {
    /// Registry without handlers
    pub fn empty() -> Result<Self> {
        Ok(Self {
            handlers: BTreeMap::new(),
            pattern: Regex::new(LOOKUP_PATTERN).context("Invalid lookup pattern")?,
        })
    }

    /// Registry with the built-in `output` and `env` handlers
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::empty()?;
        registry.register("output", Box::new(OutputLookup))?;
        registry.register("env", Box::new(EnvLookup))?;
        Ok(registry)
    }

    pub fn register(&mut self, name: &str, handler: Box<dyn LookupHandler>) -> Result<()> {
        if self.handlers.contains_key(name) {
            bail!("lookup '{name}' is already registered");
        }
        self.handlers.insert(name.to_string(), handler);
        Ok(())
    }

    fn handler(&self, name: &str) -> Result<&dyn LookupHandler> {
        self.handlers
            .get(name)
            .map(AsRef::as_ref)
            .with_context(|| format!("unknown lookup type '{name}'"))
    }

    /// Stacks referenced by lookups in `value`
    pub fn dependencies(&self, value: &str) -> Result<BTreeSet<String>> {
        let mut stacks = BTreeSet::new();
        for caps in self.pattern.captures_iter(value) {
            let handler = self.handler(&caps[1])?;
            stacks.extend(handler.dependency(&caps[2]));
        }
        Ok(stacks)
    }

    /// Replace every lookup in `value` with its resolved value
    pub fn resolve(&self, value: &str, ctx: &LookupContext<'_>) -> Result<String> {
        let mut resolved = String::with_capacity(value.len());
        let mut last = 0;
        for caps in self.pattern.captures_iter(value) {
            let Some(whole) = caps.get(0) else { continue };
            let handler = self.handler(&caps[1])?;
            let replacement = handler
                .resolve(&caps[2], ctx)
                .with_context(|| format!("could not resolve {}", whole.as_str()))?;
            resolved.push_str(&value[last..whole.start()]);
            resolved.push_str(&replacement);
            last = whole.end();
        }
        resolved.push_str(&value[last..]);
        Ok(resolved)
    }

    /// Resolve every variable of a stack
    pub fn resolve_all(
        &self,
        variables: &BTreeMap<String, String>,
        ctx: &LookupContext<'_>,
    ) -> Result<BTreeMap<String, String>> {
        variables
            .iter()
            .map(|(name, value)| {
                let value = self
                    .resolve(value, ctx)
                    .with_context(|| format!("variable {name}"))?;
                Ok((name.clone(), value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs() -> BTreeMap<String, Outputs> {
        BTreeMap::from([(
            "vpc".to_string(),
            Outputs::from([("VpcId".to_string(), "vpc-123".to_string())]),
        )])
    }

    #[test]
    fn test_resolve_output() {
        let registry = LookupRegistry::builtin().unwrap();
        let outputs = outputs();
        let ctx = LookupContext {
            dependency_outputs: &outputs,
        };

        let value = registry.resolve("id=${output vpc::VpcId};", &ctx).unwrap();
        assert_eq!(value, "id=vpc-123;");
        assert_eq!(registry.resolve("plain", &ctx).unwrap(), "plain");
    }

    #[test]
    fn test_missing_output_fails() {
        let registry = LookupRegistry::builtin().unwrap();
        let outputs = outputs();
        let ctx = LookupContext {
            dependency_outputs: &outputs,
        };

        let err = registry.resolve("${output vpc::Subnet}", &ctx).unwrap_err();
        assert!(format!("{err:#}").contains("stack vpc has no output Subnet"));
        let err = registry.resolve("${output dns::Zone}", &ctx).unwrap_err();
        assert!(format!("{err:#}").contains("not a dependency"));
    }

    #[test]
    fn test_dependencies() {
        let registry = LookupRegistry::builtin().unwrap();
        let deps = registry
            .dependencies("${output vpc::VpcId},${output dns::Zone},${env HOME}")
            .unwrap();
        assert_eq!(deps, BTreeSet::from(["dns".to_string(), "vpc".to_string()]));
    }

    #[test]
    fn test_unknown_lookup_type() {
        let registry = LookupRegistry::builtin().unwrap();
        assert!(registry.dependencies("${ssm /path}").is_err());
    }

    #[test]
    fn test_env_lookup() {
        let registry = LookupRegistry::builtin().unwrap();
        let outputs = BTreeMap::new();
        let ctx = LookupContext {
            dependency_outputs: &outputs,
        };
        let path = std::env::var("PATH").unwrap();
        assert_eq!(registry.resolve("${env PATH}", &ctx).unwrap(), path);
        assert!(registry.resolve("${env STACKRUN_SURELY_UNSET_VAR}", &ctx).is_err());
    }

    #[test]
    fn test_register_custom_handler() {
        struct Upper;
        impl LookupHandler for Upper {
            fn resolve(&self, query: &str, _ctx: &LookupContext<'_>) -> Result<String> {
                Ok(query.to_uppercase())
            }
        }

        let mut registry = LookupRegistry::builtin().unwrap();
        registry.register("upper", Box::new(Upper)).unwrap();
        assert!(registry.register("upper", Box::new(Upper)).is_err());

        let outputs = BTreeMap::new();
        let ctx = LookupContext {
            dependency_outputs: &outputs,
        };
        assert_eq!(registry.resolve("${upper abc}", &ctx).unwrap(), "ABC");
    }
}

//! stackrun.toml - namespace, persistence and stack definitions

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Default config file, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "stackrun.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackrunConfig {
    pub namespace: String,

    /// Maximum stacks deployed at once; 0 derives it from the graph
    #[serde(default)]
    pub concurrency: usize,

    /// Where the persistent graph lives; omitted disables persistence
    #[serde(default)]
    pub persistent_graph: Option<PersistentGraphConfig>,

    #[serde(default)]
    pub stacks: Vec<StackConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentGraphConfig {
    /// Root directory of the local object store
    #[serde(default = "default_store")]
    pub store: String,
    pub bucket: String,
    pub key: String,
    /// Shell command that destroys a stack removed from this file.
    /// Runs with `STACKRUN_STACK_NAME` set.
    #[serde(default)]
    pub destroy_removed: Option<String>,
}

fn default_store() -> String {
    "~/.stackrun/state".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    pub name: String,
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub required_by: Vec<String>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub args: StackArgs,
}

/// Driver arguments; which ones matter depends on the driver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackArgs {
    #[serde(default)]
    pub check: Option<String>,
    #[serde(default)]
    pub build: Option<String>,
    #[serde(default)]
    pub destroy: Option<String>,
}

fn default_driver() -> String {
    "command".to_string()
}

fn default_true() -> bool {
    true
}

impl StackrunConfig {
    /// Load and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Check everything that can be checked before a run.
    ///
    /// `drivers` lists the registered driver tags.
    pub fn validate<S: AsRef<str>>(&self, drivers: &[S]) -> Result<()> {
        if self.namespace.trim().is_empty() {
            bail!("namespace must not be empty");
        }

        let mut seen = BTreeSet::new();
        for stack in &self.stacks {
            if stack.name.trim().is_empty() {
                bail!("stack name must not be empty");
            }
            if !seen.insert(stack.name.as_str()) {
                bail!("duplicate stack name in config: {}", stack.name);
            }
            if !drivers.iter().any(|d| d.as_ref() == stack.driver) {
                bail!("stack {}: unknown driver '{}'", stack.name, stack.driver);
            }
            if stack.requires.contains(&stack.name) || stack.required_by.contains(&stack.name) {
                bail!("stack {} cannot depend on itself", stack.name);
            }
        }

        if let Some(persistent) = &self.persistent_graph {
            if persistent.bucket.trim().is_empty() || persistent.key.trim().is_empty() {
                bail!("persistent_graph needs a bucket and a key");
            }
        }
        Ok(())
    }

    pub fn stack(&self, name: &str) -> Option<&StackConfig> {
        self.stacks.iter().find(|s| s.name == name)
    }

    pub fn stack_names(&self) -> Vec<&str> {
        self.stacks.iter().map(|s| s.name.as_str()).collect()
    }
}

impl PersistentGraphConfig {
    /// Store root with `~` and environment variables expanded
    pub fn store_path(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.store)
            .with_context(|| format!("Could not expand store path {}", self.store))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRIVERS: &[&str] = &["command", "noop"];

    const SAMPLE: &str = r#"
namespace = "dev"
concurrency = 2

[persistent_graph]
store = "/tmp/stackrun-state"
bucket = "deploy-state"
key = "main"

[[stacks]]
name = "vpc"
[stacks.variables]
CidrBlock = "10.0.0.0/16"
[stacks.args]
build = "echo building vpc"

[[stacks]]
name = "bastion"
driver = "noop"
requires = ["vpc"]
locked = true
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = StackrunConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.namespace, "dev");
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.stack_names(), vec!["vpc", "bastion"]);

        let vpc = config.stack("vpc").unwrap();
        assert_eq!(vpc.driver, "command");
        assert!(vpc.enabled);
        assert!(!vpc.locked);
        assert_eq!(vpc.variables["CidrBlock"], "10.0.0.0/16");
        assert_eq!(vpc.args.build.as_deref(), Some("echo building vpc"));
        assert_eq!(vpc.args.check, None);

        let bastion = config.stack("bastion").unwrap();
        assert!(bastion.locked);
        assert_eq!(bastion.requires, vec!["vpc"]);

        let persistent = config.persistent_graph.as_ref().unwrap();
        assert_eq!(persistent.store_path().unwrap(), PathBuf::from("/tmp/stackrun-state"));
        assert!(persistent.destroy_removed.is_none());
        config.validate(DRIVERS).unwrap();
    }

    #[test]
    fn test_minimal_config() {
        let config = StackrunConfig::parse("namespace = \"dev\"").unwrap();
        assert_eq!(config.concurrency, 0);
        assert!(config.persistent_graph.is_none());
        assert!(config.stacks.is_empty());
        config.validate(DRIVERS).unwrap();
    }

    #[test]
    fn test_default_store_is_expanded() {
        let config = StackrunConfig::parse(
            "namespace = \"dev\"\n[persistent_graph]\nbucket = \"b\"\nkey = \"k\"\n",
        )
        .unwrap();
        let path = config.persistent_graph.unwrap().store_path().unwrap();
        assert!(!path.to_string_lossy().starts_with('~'));
        assert!(path.ends_with(".stackrun/state"));
    }

    #[test]
    fn test_rejects_duplicate_stack() {
        let config = StackrunConfig::parse(
            "namespace = \"dev\"\n[[stacks]]\nname = \"vpc\"\n[[stacks]]\nname = \"vpc\"\n",
        )
        .unwrap();
        let err = config.validate(DRIVERS).unwrap_err();
        assert!(err.to_string().contains("duplicate stack name in config"));
    }

    #[test]
    fn test_rejects_unknown_driver() {
        let config = StackrunConfig::parse(
            "namespace = \"dev\"\n[[stacks]]\nname = \"vpc\"\ndriver = \"cloudformation\"\n",
        )
        .unwrap();
        let err = config.validate(DRIVERS).unwrap_err();
        assert!(err.to_string().contains("unknown driver 'cloudformation'"));
    }

    #[test]
    fn test_rejects_self_reference() {
        let config = StackrunConfig::parse(
            "namespace = \"dev\"\n[[stacks]]\nname = \"vpc\"\nrequired_by = [\"vpc\"]\n",
        )
        .unwrap();
        assert!(config.validate(DRIVERS).is_err());
    }

    #[test]
    fn test_rejects_empty_namespace() {
        let config = StackrunConfig::parse("namespace = \" \"").unwrap();
        assert!(config.validate(DRIVERS).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, SAMPLE).unwrap();
        assert_eq!(StackrunConfig::load(&path).unwrap().stacks.len(), 2);

        let err = StackrunConfig::load(&temp.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("Could not read"));
    }
}

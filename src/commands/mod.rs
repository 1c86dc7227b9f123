pub mod graph;
pub mod plan;
pub mod run;

use anyhow::{Context as _, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::StackrunConfig;
use crate::drivers::DriverRegistry;
use crate::lookups::LookupRegistry;
use crate::session::Session;

/// Load the config and set up a session with the built-in drivers and lookups
pub fn open_session(config_path: &Path) -> Result<Session> {
    let config = StackrunConfig::load(config_path)?;
    let lookups = LookupRegistry::builtin()?;
    Session::new(config, DriverRegistry::builtin()?, Arc::new(lookups))
        .with_context(|| format!("Invalid config {}", config_path.display()))
}

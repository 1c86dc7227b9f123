//! Ctrl+C handling
//!
//! The first interrupt cancels the run: nothing new is submitted, in-flight
//! stacks finish and the persistent graph is saved and unlocked. Further
//! interrupts are only acknowledged.

use anyhow::{Context, Result};
use stackgraph::CancelToken;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::ui;

/// Cancel `cancel` on SIGINT/SIGTERM
pub fn install(cancel: CancelToken) -> Result<()> {
    let seen = AtomicBool::new(false);
    ctrlc::set_handler(move || {
        if seen.swap(true, Ordering::SeqCst) {
            ui::warn("Already stopping, waiting for running stacks to finish");
            return;
        }
        ui::warn("Interrupted, stopping after running stacks finish");
        cancel.cancel();
    })
    .context("Failed to set Ctrl+C handler")
}

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::process::{Command, Stdio};

/// Captured result of a shell command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Last non-empty stderr line, or the exit code
    pub fn failure_reason(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| match self.code {
                Some(code) => format!("exited with status {code}"),
                None => "terminated by signal".to_string(),
            })
    }
}

/// Run `script` with `sh -c`, adding `envs` to the environment
pub fn run_shell(script: &str, envs: &BTreeMap<String, String>) -> Result<CommandOutput> {
    log::debug!("running: {script}");
    let output = Command::new("sh")
        .arg("-c")
        .arg(script)
        .envs(envs)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to execute: {script}"))?;

    Ok(CommandOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a command silently, returning success/failure
pub fn run_quiet(script: &str, envs: &BTreeMap<String, String>) -> bool {
    run_shell(script, envs).map(|o| o.success).unwrap_or(false)
}

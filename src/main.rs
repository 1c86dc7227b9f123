mod cli;
mod commands;
mod config;
mod drivers;
mod lookups;
mod runner;
mod session;
mod signal;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: cli.config,
    };
    log::debug!("verbosity {}, config {}", ctx.verbose, ctx.config.display());

    match dispatch(&ctx, cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

/// Run a command; `false` means it ran but some stacks did not succeed
fn dispatch(ctx: &Context, command: Command) -> Result<bool> {
    match command {
        Command::Deploy(args) => Ok(commands::run::deploy(ctx, args)?.is_success()),
        Command::Destroy(args) => Ok(commands::run::destroy(ctx, args)?.is_success()),
        Command::Plan(args) => commands::plan::run(ctx, &args).map(|()| true),
        Command::Graph(args) => commands::graph::run(ctx, &args).map(|()| true),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "stackrun", &mut io::stdout());
            Ok(true)
        }
    }
}

//! `deploy` and `destroy`

use anyhow::Result;
use stackgraph::RunSummary;
use std::sync::Arc;

use crate::Context;
use crate::cli::{DeployArgs, DestroyArgs, TargetArgs};
use crate::session::{RunOptions, Session};
use crate::signal;
use crate::ui;

pub fn deploy(ctx: &Context, args: DeployArgs) -> Result<RunSummary> {
    let session = prepare(ctx, "Deploy")?;
    let options = options(args.selection, args.force);
    let summary = session.deploy(&options)?;
    report(ctx, "Deploy", &summary);
    Ok(summary)
}

pub fn destroy(ctx: &Context, args: DestroyArgs) -> Result<RunSummary> {
    let session = prepare(ctx, "Destroy")?;
    let options = options(args.selection, Vec::new());
    let summary = session.destroy(&options)?;
    report(ctx, "Destroy", &summary);
    Ok(summary)
}

fn prepare(ctx: &Context, verb: &str) -> Result<Session> {
    let mut session = super::open_session(&ctx.config)?;
    if !ctx.quiet {
        session = session.with_watcher(Arc::new(ui::ConsoleWatcher));
    }
    signal::install(session.cancel_token().clone())?;
    if !ctx.quiet {
        ui::header(verb);
        ui::kv("config", &ctx.config.display().to_string());
    }
    Ok(session)
}

fn options(selection: TargetArgs, force: Vec<String>) -> RunOptions {
    RunOptions {
        concurrency: selection.concurrency,
        targets: selection.targets,
        force,
    }
}

fn report(ctx: &Context, verb: &str, summary: &RunSummary) {
    if ctx.quiet && summary.is_success() {
        return;
    }
    ui::run_summary(verb, summary);
}

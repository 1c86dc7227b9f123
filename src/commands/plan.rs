use anyhow::Result;

use crate::Context;
use crate::cli::PlanArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &PlanArgs) -> Result<()> {
    let session = super::open_session(&ctx.config)?;
    let outline = session.outline(args.destroy, &args.targets)?;

    if !ctx.quiet {
        ui::header(if args.destroy { "Destroy plan" } else { "Deploy plan" });
    }
    if outline.is_empty() {
        ui::info("No stacks to run");
        return Ok(());
    }
    for line in &outline {
        ui::dim(line);
    }
    Ok(())
}

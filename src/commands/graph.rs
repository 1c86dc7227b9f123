use anyhow::Result;

use crate::Context;
use crate::cli::{GraphArgs, GraphFormat};
use crate::session;

pub fn run(ctx: &Context, args: &GraphArgs) -> Result<()> {
    let graph = super::open_session(&ctx.config)?.declared_graph()?;
    let rendered = match args.format {
        GraphFormat::Json => serde_json::to_string_pretty(&graph.to_dict())?,
        GraphFormat::Dot => session::to_dot(&graph),
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_FILE;

#[derive(Parser)]
#[command(name = "stackrun")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Deploy and destroy dependent infrastructure stacks in order", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file
    #[arg(short, long, global = true, env = "STACKRUN_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or update every stack, dependencies first
    Deploy(DeployArgs),

    /// Tear stacks down, dependents first
    Destroy(DestroyArgs),

    /// Show the order stacks would run in, without running anything
    Plan(PlanArgs),

    /// Print the declared dependency graph
    Graph(GraphArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Only these stacks, plus what they depend on when deploying or what
    /// depends on them when destroying (repeatable)
    #[arg(short, long = "target", value_name = "STACK")]
    pub targets: Vec<String>,

    /// Maximum stacks in flight (0 = no limit)
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub selection: TargetArgs,

    /// Deploy these stacks even if they are locked (repeatable)
    #[arg(short, long, value_name = "STACK")]
    pub force: Vec<String>,
}

#[derive(Debug, Args)]
pub struct DestroyArgs {
    #[command(flatten)]
    pub selection: TargetArgs,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Show the destroy order instead
    #[arg(short, long)]
    pub destroy: bool,

    /// Only these stacks, plus what they depend on when deploying or what
    /// depends on them when destroying (repeatable)
    #[arg(short, long = "target", value_name = "STACK")]
    pub targets: Vec<String>,
}

#[derive(Debug, Args)]
pub struct GraphArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = GraphFormat::Json)]
    pub format: GraphFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    /// Stack name to the stacks it requires
    Json,
    /// Graphviz
    Dot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_deploy_flags() {
        let cli = Cli::parse_from([
            "stackrun", "-vv", "deploy", "-t", "app", "--target", "db", "-j", "4", "--force", "vpc",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        let Command::Deploy(args) = cli.command else {
            panic!("expected deploy");
        };
        assert_eq!(args.selection.targets, vec!["app", "db"]);
        assert_eq!(args.selection.concurrency, Some(4));
        assert_eq!(args.force, vec!["vpc"]);
    }

    #[test]
    fn test_graph_format() {
        let cli = Cli::parse_from(["stackrun", "graph", "--format", "dot", "-c", "other.toml"]);
        assert_eq!(cli.config, PathBuf::from("other.toml"));
        assert!(matches!(cli.command, Command::Graph(GraphArgs { format: GraphFormat::Dot })));
    }
}

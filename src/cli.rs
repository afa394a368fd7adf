use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use declarative::FailurePolicy;
use std::path::PathBuf;

use crate::stack::parse_parameter;

#[derive(Parser)]
#[command(name = "greenstack")]
#[command(version)]
#[command(about = "Plan and apply the GREEN Kubernetes control-plane stack", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Stack file to use instead of the built-in GREEN stack
    #[arg(long, global = true, env = "GREENSTACK_STACK", value_name = "FILE")]
    pub stack: Option<PathBuf>,

    /// Stack parameter (repeatable)
    #[arg(
        short = 'p',
        long = "parameter",
        global = true,
        value_name = "NAME=VALUE",
        value_parser = parse_parameter
    )]
    pub parameters: Vec<(String, String)>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Emit the resolved deployment template as JSON
    Synth(SynthArgs),

    /// Preview what apply would change
    #[command(alias = "diff")]
    Plan(PlanArgs),

    /// Converge the target to the declared stack
    Apply(ApplyArgs),

    /// Delete every recorded resource, dependents first
    Destroy(DestroyArgs),

    /// Show recorded resources and, optionally, whether they still exist
    Status(StatusArgs),

    /// Show the dependency graph
    Graph(GraphArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Arguments
// ============================================================================

#[derive(Parser)]
pub struct SynthArgs {
    /// Write the template to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Parser)]
pub struct PlanArgs {
    /// Only plan a kind or resource: "node_group", "addon.FluxV2", or part of an id
    pub target: Option<String>,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Only apply a kind or resource: "node_group", "addon.FluxV2", or part of an id
    pub target: Option<String>,

    /// Dry run - show what would be done
    #[arg(short, long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Number of parallel jobs per dependency level
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// What to do when an action fails
    #[arg(long, value_enum)]
    pub failure_policy: Option<FailurePolicyArg>,

    /// Retries for transient provider errors
    #[arg(long)]
    pub retries: Option<u32>,
}

#[derive(Parser)]
pub struct DestroyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser)]
pub struct StatusArgs {
    /// Read each resource from the provider and report missing ones
    #[arg(short, long)]
    pub refresh: bool,
}

#[derive(Parser)]
pub struct GraphArgs {
    /// Print Graphviz DOT instead of levels
    #[arg(long)]
    pub dot: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FailurePolicyArg {
    /// Stop and keep what was applied
    Halt,
    /// Stop and undo this run's changes
    Rollback,
    /// Keep going; skip dependents of failures
    Continue,
}

impl From<FailurePolicyArg> for FailurePolicy {
    fn from(arg: FailurePolicyArg) -> Self {
        match arg {
            FailurePolicyArg::Halt => Self::Halt,
            FailurePolicyArg::Rollback => Self::Rollback,
            FailurePolicyArg::Continue => Self::Continue,
        }
    }
}

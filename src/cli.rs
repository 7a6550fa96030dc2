use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "branch-planner")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(
    about = "Keep plan-only Terraform objects in sync with open pull requests",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/branch-planner/config.toml)
    #[arg(long, global = true, env = "BRANCH_PLANNER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Object store directory
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create, update and delete branch objects for the open pull requests
    Reconcile(ReconcileArgs),

    /// Show what reconcile would change, without changing anything
    Plan(PlanArgs),

    /// List the branch objects a template owns
    List(TemplateArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Identifies the template Terraform object
#[derive(Args, Debug, Clone)]
pub struct TemplateArgs {
    /// Namespace of the template
    #[arg(short, long)]
    pub namespace: String,

    /// Name of the template Terraform object
    #[arg(short, long)]
    pub template: String,
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub target: TemplateArgs,

    /// JSON file listing the open pull requests
    #[arg(short, long)]
    pub pull_requests: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ReconcileArgs {
    #[command(flatten)]
    pub target: TemplateArgs,

    /// JSON file listing the open pull requests
    #[arg(short, long)]
    pub pull_requests: PathBuf,

    /// Number of branches applied in parallel (default from config)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Show what would change without applying
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

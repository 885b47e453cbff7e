//! CLI argument parsing for the migration ledger.
//!
//! Each subcommand maps onto one ledger operation; policy lives in the
//! session and status modules so a host task runner can call them directly.
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "mledger",
    version,
    about = "Track which one-shot deploy migrations ran on each environment",
    after_help = "Examples:\n  mledger status --env production\n  mledger check --env production migrations/001-init.yml\n  mledger apply --env production --version $(git rev-parse --short HEAD)\n  mledger mark --env staging migrations/002-backfill.yml\n  mledger tasks --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Config file (defaults to ./mledger.yml)
    #[arg(long, short = 'c', global = true, value_name = "PATH", env = "MLEDGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Status(StatusArgs),
    Check(CheckArgs),
    Apply(ApplyArgs),
    Mark(MarkArgs),
    Tasks(TasksArgs),
}

/// Status command inputs.
#[derive(Parser, Debug)]
#[command(about = "List local migrations with their state on an environment")]
pub struct StatusArgs {
    /// Environment whose ledger is read
    #[arg(long, value_name = "ENV", env = "MLEDGER_ENV")]
    pub env: String,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

/// Check command inputs. Exit status 0 means the migration should run.
///
/// Each invocation is its own session, so a migration reported as pending is
/// not recorded anywhere. Recording happens through `apply`, `mark`, or a host
/// runner embedding `DeploySession` and calling `update` after its jobs.
#[derive(Parser, Debug)]
#[command(
    about = "Report whether a migration still has to run (exit 0) or not (exit 1)",
    long_about = "Report whether a migration still has to run (exit 0) or not (exit 1).\n\nRead-only: nothing is recorded. Use `apply` or `mark` to record migrations."
)]
pub struct CheckArgs {
    /// Target environment; without one every migration is reported as not runnable
    #[arg(long, value_name = "ENV", env = "MLEDGER_ENV")]
    pub env: Option<String>,

    /// Migration definition file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

/// Apply command inputs.
#[derive(Parser, Debug)]
#[command(about = "Run unapplied migration jobs and record them in the ledger")]
pub struct ApplyArgs {
    /// Target environment; without one nothing runs
    #[arg(long, value_name = "ENV", env = "MLEDGER_ENV")]
    pub env: Option<String>,

    /// Deploy version recorded with each migration (overrides build.version)
    #[arg(long, value_name = "VERSION")]
    pub version: Option<String>,

    /// Only run jobs of this task
    #[arg(long, value_name = "TASK", default_value = "deploy")]
    pub task: String,

    /// Run jobs of every task
    #[arg(long, conflicts_with = "task")]
    pub all_tasks: bool,

    /// Show what would run without running jobs or writing the ledger
    #[arg(long)]
    pub dry_run: bool,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

/// Mark command inputs.
#[derive(Parser, Debug)]
#[command(about = "Record migrations as applied without running them")]
pub struct MarkArgs {
    /// Target environment
    #[arg(long, value_name = "ENV", env = "MLEDGER_ENV")]
    pub env: String,

    /// Deploy version recorded with each migration (overrides build.version)
    #[arg(long, value_name = "VERSION")]
    pub version: Option<String>,

    /// Migration definition files
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,
}

/// Tasks command inputs.
#[derive(Parser, Debug)]
#[command(about = "Print the gated task table built from migration definitions")]
pub struct TasksArgs {
    /// Emit JSON instead of YAML
    #[arg(long)]
    pub json: bool,
}

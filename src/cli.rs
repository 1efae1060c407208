use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "axionctl")]
#[command(version)]
#[command(about = "Declarative configuration manager", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Agent API endpoint (e.g. https://localhost:8080)
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Path to optional YAML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Undecorated lifecycle output
    #[arg(long, global = true)]
    pub plain: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Preview configuration changes without applying them
    Plan(PlanArgs),

    /// Apply the configuration to the target system
    Apply(ApplyArgs),

    /// Print the manifest dependency graph in Graphviz DOT format
    Graph(GraphArgs),
}

#[derive(Args)]
pub struct PlanArgs {
    /// Path to the manifest (.yaml, .yml or .lua)
    #[arg(long)]
    pub manifest: PathBuf,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Path to the manifest (.yaml, .yml or .lua)
    #[arg(long)]
    pub manifest: PathBuf,

    /// Back up file and directory content before destructive changes so a
    /// failed run can restore it during rollback
    #[arg(long)]
    pub enable_backups: bool,

    /// Directory for backup artifacts
    /// (defaults to $AXION_BACKUP_DIR or ~/.config/axion/backups)
    #[arg(long)]
    pub backup_dir: Option<PathBuf>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct GraphArgs {
    /// Path to the manifest (.yaml, .yml or .lua)
    #[arg(long)]
    pub manifest: PathBuf,
}

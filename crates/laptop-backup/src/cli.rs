//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use laptop_backup_core::ConfigOverrides;

/// laptop-backup - Encrypted, versioned storage for device backups
#[derive(Parser, Debug)]
#[command(name = "laptop-backup")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to backup.yaml config file
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Project name scoping every resource
    #[arg(short, long, global = true, env = "LAPTOP_BACKUP_PROJECT_NAME")]
    pub project: Option<String>,

    /// AWS region
    #[arg(short, long, global = true)]
    pub region: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            project: self.project.clone(),
            region: self.region.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or converge the key, bucket and registry record
    Deploy(DeployArgs),

    /// Show the deployment and any drift
    Status(StatusArgs),

    /// Schedule key deletion and withdraw the record; the bucket is kept
    Destroy(DestroyArgs),
}

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Dry run (show what would be provisioned)
    #[arg(long)]
    pub dry_run: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct DestroyArgs {
    /// Skip confirmation
    #[arg(short, long)]
    pub force: bool,
}

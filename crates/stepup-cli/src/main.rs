use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod dispatch;
mod render;

use dispatch::run_cli;

#[derive(Parser, Debug)]
#[command(name = "stepup")]
#[command(about = "Run versioned upgrade steps for independently versioned members", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    state_root: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the recorded version of every member.
    Status,
    /// List lifecycle phases and their hook names in firing order.
    Phases,
    /// Show the steps a run would register, without running them.
    Plan {
        #[arg(long)]
        plan: PathBuf,
        #[command(flatten)]
        context: ContextArgs,
    },
    /// Run every applicable phase of an upgrade plan.
    Run {
        #[arg(long)]
        plan: PathBuf,
        #[command(flatten)]
        context: ContextArgs,
        #[command(flatten)]
        overrides: RunOverrides,
    },
}

#[derive(Args, Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ContextArgs {
    /// Include admin-only phases.
    #[arg(long)]
    admin: bool,
    /// Include network-wide phases.
    #[arg(long)]
    network: bool,
}

#[derive(Args, Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RunOverrides {
    /// Keep upgrading other members when one member fails.
    #[arg(long)]
    isolate_members: bool,
    /// Write each version once after all of its steps succeed.
    #[arg(long)]
    group_writes: bool,
    #[arg(long)]
    min_headroom_bytes: Option<u64>,
}

fn main() -> Result<()> {
    init_tracing();
    run_cli(Cli::parse())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("STEPUP_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

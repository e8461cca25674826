use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "stratus",
    about = "Stratus — local infrastructure state with advisory locking",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to stratus.toml
    #[arg(short, long, global = true, default_value = "stratus.toml")]
    config: PathBuf,
    /// Use this state file instead of the one in stratus.toml
    #[arg(short, long, global = true)]
    state: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a stratus.toml scaffold
    Init {
        /// State file the config points at
        #[arg(default_value = "terraform.tfstate")]
        path: PathBuf,
    },
    /// Print the current state as JSON
    Show,
    /// Replace the state with the document in FILE.
    ///
    /// The state is locked for the duration of the write unless locking is
    /// disabled in stratus.toml or with --no-lock.
    Push {
        file: PathBuf,
        #[arg(long)]
        no_lock: bool,
        /// Recorded in the lock info while the push runs
        #[arg(long, default_value = "push")]
        reason: String,
    },
    /// Delete the state file
    Rm {
        #[arg(long)]
        no_lock: bool,
    },
    /// Show who holds the state lock, if anyone
    Status,
    /// Remove a lock left behind by a crashed process
    ForceUnlock {
        /// Required: confirms the lock holder is gone
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stratus=info".parse()?)
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let load = || commands::load_config(&cli.config, cli.state.as_deref());

    match cli.command {
        Commands::Init { path } => commands::init::init(&cli.config, &path),
        Commands::Show => commands::state::show(&load()?),
        Commands::Push { file, no_lock, reason } => {
            commands::state::push(&load()?, &file, !no_lock, &reason)
        }
        Commands::Rm { no_lock } => commands::state::rm(&load()?, !no_lock),
        Commands::Status => commands::lock::status(&load()?),
        Commands::ForceUnlock { force } => commands::lock::force_unlock(&load()?, force),
    }
}

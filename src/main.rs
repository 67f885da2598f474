use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use quartermaster::commands::fetch::{self, ToolchainKind};
use quartermaster::commands::verify;

#[derive(Parser)]
#[command(name = "quartermaster")]
#[command(about = "Offline toolchain supply chain for implant builds", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase diagnostic verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download, verify and repackage every configured toolchain
    Fetch {
        /// Destination directory (default: <project root>/assets/fs)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Restrict the run to a single toolchain
        #[arg(long, value_enum)]
        only: Option<ToolchainKind>,
    },

    /// Verify an artifact against a detached minisign signature
    Verify {
        /// Path to the artifact to verify
        artifact: PathBuf,

        /// Path to the .minisig signature file
        signature: PathBuf,

        /// Public key: full key text, the bare base64 line, or a path to a
        /// key file (default: the configured zig release key)
        #[arg(long)]
        key: Option<String>,
    },
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(command: Commands) -> Result<bool> {
    match command {
        Commands::Fetch { out_dir, only } => {
            fetch::execute(fetch::FetchOptions { out_dir, only })?;
            Ok(true)
        }
        Commands::Verify {
            artifact,
            signature,
            key,
        } => verify::execute(verify::VerifyOptions {
            artifact,
            signature,
            key,
        }),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

//! `orch` command line.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use orch::error::exit_code_for;
use orch::exit_codes;
use orch::io::config::{load_settings, process_env};
use orch::io::invoke::SystemShell;
use orch::logging;
use orch::pipeline::run_feature;

#[derive(Parser)]
#[command(
    name = "orch",
    version,
    about = "Audited plan/execute/verify/fix/review pipeline for AI-assisted feature work"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline for one feature and print the run directory.
    Run {
        /// Directory name under the features dir.
        feature_id: String,
        /// Overrides `repo_root` from the config file and environment.
        #[arg(long)]
        repo_root: Option<PathBuf>,
        /// Settings file (default: `<repo_root>/orch.toml`).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the version.
    Version,
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            feature_id,
            repo_root,
            config,
        } => cmd_run(&feature_id, repo_root, config),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn cmd_run(feature_id: &str, repo_root: Option<PathBuf>, config: Option<PathBuf>) -> Result<()> {
    let config_path = config.or_else(|| {
        repo_root
            .as_ref()
            .map(|root| root.join(orch::io::config::CONFIG_FILE_NAME))
    });
    let mut settings = load_settings(config_path.as_deref(), process_env)?;
    if let Some(root) = repo_root {
        settings.repo_root = root;
    }
    let runner = SystemShell {
        output_limit_bytes: settings.output_limit_bytes,
    };
    let outcome = run_feature(feature_id, &settings, &runner)?;
    println!("{}", outcome.run_dir.display());
    Ok(())
}

mod archive;
mod backup;
mod cleanup;
mod cmd;
mod config;
mod deploy;
mod error;
mod remote;
mod retry;
mod smoke;
mod ssh;
mod theme;
mod tree;
mod verify;

use crate::cmd::Ctx;
use crate::config::AppConfig;
use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::process::exit;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "azedeploy",
    version,
    about = "Deploy, back up and smoke-test the AZE web application on FTPS shared hosting"
)]
struct Cli {
    /// Config file (default: ~/.config/azedeploy/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Deployment target from [targets.<name>]
    #[arg(short, long, global = true)]
    target: Option<String>,
    /// -v for info, -vv for debug logging
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Accept invalid TLS certificates (FTPS and HTTP)
    #[arg(long, global = true)]
    insecure: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mirror a local build directory into the target root
    Deploy(cmd::deploy::Args),
    /// Upload the files selected by a TOML manifest
    Upload(cmd::upload::Args),
    /// Compare remote file sizes against a manifest or check single paths
    Verify(cmd::verify::Args),
    /// Download the web space into a timestamped snapshot
    Backup(cmd::backup::Args),
    /// Remove debug and test artefacts (dry run unless --execute)
    Cleanup(cmd::cleanup::Args),
    /// Delete remote files
    Rm(cmd::rm::Args),
    /// List a remote directory
    Ls(cmd::ls::Args),
    /// Build a release tarball locally
    Pack(cmd::pack::Args),
    /// Pack, copy over SSH and extract in the target root
    Release(cmd::release::Args),
    /// Extract a tarball that is already on the server
    Extract(cmd::extract::Args),
    /// Run HTTP smoke checks against the target
    Smoke(cmd::smoke::Args),
    /// Show the effective configuration
    Config(cmd::config::Args),
}

fn main() {
    if let Err(e) = entry() {
        eprintln!("Error: {e:#}");
        exit(1);
    }
}

fn entry() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = AppConfig::load(cli.config.as_deref())?;
    let ctx = Ctx {
        config,
        config_path: cli.config.clone(),
        target: cli.target.clone(),
        insecure: cli.insecure,
    };

    match &cli.command {
        Command::Deploy(args) => cmd::deploy::run(args, &ctx),
        Command::Upload(args) => cmd::upload::run(args, &ctx),
        Command::Verify(args) => cmd::verify::run(args, &ctx),
        Command::Backup(args) => cmd::backup::run(args, &ctx),
        Command::Cleanup(args) => cmd::cleanup::run(args, &ctx),
        Command::Rm(args) => cmd::rm::run(args, &ctx),
        Command::Ls(args) => cmd::ls::run(args, &ctx),
        Command::Pack(args) => cmd::pack::run(args, &ctx),
        Command::Release(args) => cmd::release::run(args, &ctx),
        Command::Extract(args) => cmd::extract::run(args, &ctx),
        Command::Smoke(args) => cmd::smoke::run(args, &ctx),
        Command::Config(args) => cmd::config::run(args, &ctx),
    }
}

/// `RUST_LOG` wins; otherwise the level follows `-v`.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

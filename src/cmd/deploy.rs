use super::Ctx;
use crate::deploy::UploadOptions;
use crate::deploy::exclude::ExcludeSet;
use crate::deploy::mirror::mirror;
use crate::remote::{Remote, normalize, resolve};
use anyhow::{Result, bail};
use std::path::PathBuf;
use tracing::debug;

#[derive(clap::Args, Debug)]
pub struct Args {
    /// Local build directory to mirror
    pub local_dir: PathBuf,
    /// Subdirectory of the target root to upload into
    #[arg(long)]
    pub remote_dir: Option<String>,
    /// Rename files that already exist to `<name>.backup_<timestamp>` first
    #[arg(long)]
    pub backup_existing: bool,
    #[arg(long)]
    pub dry_run: bool,
    /// Run the smoke checks after a successful upload
    #[arg(long)]
    pub smoke: bool,
}

pub fn run(args: &Args, ctx: &Ctx) -> Result<()> {
    if !args.local_dir.is_dir() {
        bail!("local directory '{}' does not exist", args.local_dir.display());
    }
    let (name, target) = ctx.target()?;
    let remote_dir = match &args.remote_dir {
        Some(sub) => resolve(&target.remote_root, sub),
        None => normalize(&target.remote_root),
    };
    let exclude = ExcludeSet::from_config(&ctx.config.mirror)?;
    debug!("exclude patterns: {}", exclude.patterns().join(" "));
    let mut opts = UploadOptions::new(ctx.retry());
    opts.backup_existing = args.backup_existing;
    opts.dry_run = args.dry_run;

    eprintln!(
        "deploying {} -> {}:{}{}",
        args.local_dir.display(),
        name,
        remote_dir,
        if args.dry_run { " (dry run)" } else { "" }
    );
    let mut remote = ctx.connect()?;
    if let Ok(false) = remote.exists(&remote_dir) {
        eprintln!("{} does not exist yet and will be created", remote_dir);
    }
    let report = mirror(&mut remote, &args.local_dir, &remote_dir, &exclude, &opts);
    super::disconnect(remote);
    let report = report?;
    super::print_transfer_report(&report);

    if !report.is_success() {
        bail!("{} file(s) failed to upload", report.failed.len());
    }
    if args.smoke && !args.dry_run {
        super::smoke::run_for_target(ctx, None)?;
    }
    Ok(())
}

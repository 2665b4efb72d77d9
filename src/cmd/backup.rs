use super::{Ctx, format_size};
use crate::backup::{backup, snapshot_dir};
use crate::remote::resolve;
use anyhow::{Result, bail};
use chrono::Local;
use std::path::PathBuf;

#[derive(clap::Args, Debug)]
pub struct Args {
    /// Remote directory to start from (default: [backup].start)
    #[arg(long)]
    pub start: Option<String>,
    /// Directory that receives the `webspace_<timestamp>` snapshot
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Levels to descend below the start directory; negative does nothing
    #[arg(long, allow_negative_numbers = true)]
    pub max_depth: Option<i32>,
}

pub fn run(args: &Args, ctx: &Ctx) -> Result<()> {
    let cfg = &ctx.config.backup;
    let (_, target) = ctx.target()?;
    let start = resolve(
        &target.remote_root,
        args.start.as_deref().unwrap_or(&cfg.start),
    );
    let base = args.out.clone().unwrap_or_else(|| cfg.dir.clone());
    let dest = snapshot_dir(&base, Local::now());
    let max_depth = args.max_depth.unwrap_or(cfg.max_depth);

    eprintln!("backing up {} into {} ...", start, dest.display());
    let mut remote = ctx.connect()?;
    let report = backup(&mut remote, &start, &dest, max_depth, &ctx.retry());
    super::disconnect(remote);
    let report = report?;

    for (path, err) in &report.failed {
        eprintln!("{} - FAILED: {}", path, err);
    }
    println!(
        "{} files in {} directories ({}), {} symlinks skipped, {} failed",
        report.files,
        report.dirs,
        format_size(report.bytes),
        report.skipped_links,
        report.failed.len()
    );
    if !report.is_success() {
        bail!("backup incomplete: {} file(s) failed", report.failed.len());
    }
    println!("snapshot: {}", dest.display());
    Ok(())
}

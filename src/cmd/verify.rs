use super::{Ctx, format_size};
use crate::deploy::manifest::Manifest;
use crate::verify::{FileStatus, VerifyReport, verify, verify_paths};
use anyhow::{Result, bail};
use std::path::PathBuf;

#[derive(clap::Args, Debug)]
pub struct Args {
    /// Manifest whose files should be present with matching sizes
    #[arg(required_unless_present = "path", conflicts_with = "path")]
    pub manifest: Option<PathBuf>,
    #[arg(long, default_value = ".")]
    pub base: PathBuf,
    /// Check individual remote paths instead of a manifest
    #[arg(long, num_args = 1..)]
    pub path: Vec<String>,
}

pub fn run(args: &Args, ctx: &Ctx) -> Result<()> {
    let (_, target) = ctx.target()?;

    if let Some(manifest) = &args.manifest {
        let plan = Manifest::load(manifest)?.resolve(&args.base)?;
        let mut remote = ctx.connect()?;
        let report = verify(&mut remote, &target.remote_root, &plan.uploads, &ctx.retry());
        super::disconnect(remote);
        let mut report = report?;
        report.missing_local = plan.missing;
        return print_report(&report);
    }

    let mut remote = ctx.connect()?;
    let found = verify_paths(&mut remote, &target.remote_root, &args.path, &ctx.retry());
    super::disconnect(remote);
    let found = found?;
    let mut missing = 0;
    for (path, size) in &found {
        match size {
            Some(n) => println!("{} - {}", path, format_size(*n)),
            None => {
                missing += 1;
                eprintln!("{} - MISSING", path);
            }
        }
    }
    if missing > 0 {
        bail!("{} of {} path(s) missing", missing, found.len());
    }
    Ok(())
}

pub fn print_report(report: &VerifyReport) -> Result<()> {
    for item in &report.items {
        match &item.status {
            FileStatus::Ok => println!("{} - ok", item.remote),
            FileStatus::Missing => eprintln!("{} - MISSING", item.remote),
            FileStatus::SizeMismatch { local, remote } => eprintln!(
                "{} - SIZE MISMATCH (local {} B, remote {} B)",
                item.remote, local, remote
            ),
        }
    }
    for local in &report.missing_local {
        eprintln!("{} - not found locally, not verified", local.display());
    }
    if !report.is_success() {
        bail!(
            "verification failed for {} of {} file(s)",
            report.problem_count(),
            report.items.len() + report.missing_local.len()
        );
    }
    println!("{} file(s) verified", report.items.len());
    Ok(())
}

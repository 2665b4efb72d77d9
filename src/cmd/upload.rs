use super::Ctx;
use crate::deploy::UploadOptions;
use crate::deploy::manifest::{Manifest, upload_planned};
use crate::verify;
use anyhow::{Result, bail};
use std::path::PathBuf;

#[derive(clap::Args, Debug)]
pub struct Args {
    /// TOML manifest listing `[[files]]` and `[[globs]]`
    pub manifest: PathBuf,
    /// Directory manifest paths are relative to
    #[arg(long, default_value = ".")]
    pub base: PathBuf,
    #[arg(long)]
    pub backup_existing: bool,
    #[arg(long)]
    pub dry_run: bool,
    /// Fail when a listed local file is missing instead of skipping it
    #[arg(long)]
    pub strict: bool,
    /// Compare remote sizes after uploading
    #[arg(long)]
    pub verify: bool,
    #[arg(long)]
    pub smoke: bool,
}

pub fn run(args: &Args, ctx: &Ctx) -> Result<()> {
    let manifest = Manifest::load(&args.manifest)?;
    let plan = manifest.resolve(&args.base)?;
    if args.strict && !plan.missing.is_empty() {
        let missing: Vec<String> = plan.missing.iter().map(|p| p.display().to_string()).collect();
        bail!("missing local files: {}", missing.join(", "));
    }
    for m in &plan.missing {
        eprintln!("{} - not found locally, skipped", m.display());
    }
    if plan.uploads.is_empty() {
        bail!("manifest {} selects no files", args.manifest.display());
    }

    let (name, target) = ctx.target()?;
    let mut opts = UploadOptions::new(ctx.retry());
    opts.backup_existing = args.backup_existing;
    opts.dry_run = args.dry_run;

    eprintln!(
        "uploading {} file(s) to {}:{}{}",
        plan.uploads.len(),
        name,
        target.remote_root,
        if args.dry_run { " (dry run)" } else { "" }
    );
    let mut remote = ctx.connect()?;
    let report = upload_planned(&mut remote, &target.remote_root, &plan, &opts);
    super::print_transfer_report(&report);

    let verified = if args.verify && !args.dry_run {
        Some(verify::verify(&mut remote, &target.remote_root, &plan.uploads, &ctx.retry()))
    } else {
        None
    };
    super::disconnect(remote);

    if !report.is_success() {
        bail!("{} file(s) failed to upload", report.failed.len());
    }
    if let Some(verified) = verified {
        super::verify::print_report(&verified?)?;
    }
    if args.smoke && !args.dry_run {
        super::smoke::run_for_target(ctx, None)?;
    }
    Ok(())
}

use super::Ctx;
use crate::cleanup::{plan_cleanup, run_cleanup};
use anyhow::{Result, bail};

#[derive(clap::Args, Debug)]
pub struct Args {
    /// Actually delete; without this only the plan is printed
    #[arg(long)]
    pub execute: bool,
}

pub fn run(args: &Args, ctx: &Ctx) -> Result<()> {
    let (name, target) = ctx.target()?;
    let policy = ctx.retry();
    let mut remote = ctx.connect()?;
    let plan = plan_cleanup(&mut remote, &target.remote_root, &ctx.config.cleanup.sets, &policy);
    let report = plan.map(|plan| run_cleanup(&mut remote, &plan, !args.execute, &policy));
    super::disconnect(remote);
    let report = report?;

    for path in &report.deleted {
        if report.dry_run {
            println!("{} - would delete", path);
        } else {
            println!("{} - deleted", path);
        }
    }
    for path in &report.skipped {
        println!("{} - not on server", path);
    }
    for (path, err) in &report.failed {
        eprintln!("{} - FAILED: {}", path, err);
    }

    if report.deleted.is_empty() && report.failed.is_empty() {
        println!("{}: nothing to clean up", name);
    } else if report.dry_run {
        println!(
            "{} file(s) selected on {}; run with --execute to delete",
            report.deleted.len(),
            name
        );
    }
    if !report.is_success() {
        bail!("{} deletion(s) failed", report.failed.len());
    }
    Ok(())
}

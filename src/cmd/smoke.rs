use super::Ctx;
use crate::smoke::{Outcome, SmokeReport, build_client, run_checks};
use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(clap::Args, Debug)]
pub struct Args {
    /// Write a JSON report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

pub fn run(args: &Args, ctx: &Ctx) -> Result<()> {
    run_for_target(ctx, args.report.as_deref())
}

/// Run the configured checks against the selected target's base URL.
pub fn run_for_target(ctx: &Ctx, report_path: Option<&Path>) -> Result<()> {
    let (name, target) = ctx.target()?;
    let smoke = &ctx.config.smoke;
    let client = build_client(Duration::from_secs(smoke.timeout_secs.max(1)), ctx.insecure)?;

    eprintln!("smoke testing {} ({}) ...", name, target.base_url);
    let report = run_checks(&client, &target.base_url, &smoke.checks);
    print_report(&report);

    if let Some(path) = report_path {
        report.write_json(path)?;
        println!("report written to {}", path.display());
    }
    if !report.is_success() {
        bail!(
            "{} of {} smoke checks failed",
            report.summary.failed,
            report.summary.total
        );
    }
    Ok(())
}

fn print_report(report: &SmokeReport) {
    for r in &report.results {
        let line = format!("{:<20} {:<6} {}", r.name, r.method.as_str(), r.url);
        match &r.outcome {
            Outcome::Pass { status } => {
                println!("\x1b[1;32mPASS\x1b[0m  {} ({}, {}ms)", line, status, r.elapsed_ms)
            }
            Outcome::Fail { reason, .. } => {
                println!("\x1b[1;31mFAIL\x1b[0m  {} - {}", line, reason)
            }
            Outcome::Error { message } => {
                println!("\x1b[1;31mERROR\x1b[0m {} - {}", line, message)
            }
        }
    }
    println!(
        "{}/{} checks passed",
        report.summary.passed, report.summary.total
    );
}

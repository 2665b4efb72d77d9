use super::{Ctx, format_size};
use crate::archive::pack;
use crate::deploy::exclude::ExcludeSet;
use anyhow::Result;
use std::path::PathBuf;

#[derive(clap::Args, Debug)]
pub struct Args {
    /// Build directory to pack
    pub local_dir: PathBuf,
    /// Output file (default: azedeploy-<timestamp>.tar.gz)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &Args, ctx: &Ctx) -> Result<()> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("azedeploy-{}.tar.gz", super::timestamp())));
    let exclude = ExcludeSet::from_config(&ctx.config.mirror)?;
    let summary = pack(&args.local_dir, &output, &exclude)?;
    println!(
        "{} - {} files ({}), archive {}",
        output.display(),
        summary.files,
        format_size(summary.bytes),
        format_size(summary.archive_size)
    );
    Ok(())
}

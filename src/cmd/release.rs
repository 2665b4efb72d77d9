use super::{Ctx, format_size};
use crate::archive::pack;
use crate::deploy::exclude::ExcludeSet;
use crate::remote::join;
use crate::ssh::{SshSession, extract_command};
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

#[derive(clap::Args, Debug)]
pub struct Args {
    /// Build directory to release
    pub local_dir: PathBuf,
    /// Keep the local tarball after upload
    #[arg(long)]
    pub keep_archive: bool,
    #[arg(long)]
    pub smoke: bool,
}

pub fn run(args: &Args, ctx: &Ctx) -> Result<()> {
    let (name, target) = ctx.target()?;
    let file_name = format!("azedeploy-{}.tar.gz", super::timestamp());
    let local_archive = std::env::temp_dir().join(&file_name);
    let remote_archive = join(&ctx.config.release.staging_dir, &file_name);

    let exclude = ExcludeSet::from_config(&ctx.config.mirror)?;
    let summary = pack(&args.local_dir, &local_archive, &exclude)?;
    eprintln!(
        "packed {} files ({}) into {}",
        summary.files,
        format_size(summary.archive_size),
        local_archive.display()
    );

    let result = ship(ctx, &local_archive, &remote_archive, &target.remote_root);
    if args.keep_archive {
        println!("archive kept at {}", local_archive.display());
    } else if let Err(e) = fs::remove_file(&local_archive) {
        warn!("cannot remove {}: {e}", local_archive.display());
    }
    result?;

    println!("released {} to {}:{}", args.local_dir.display(), name, target.remote_root);
    if args.smoke {
        super::smoke::run_for_target(ctx, None)?;
    }
    Ok(())
}

fn ship(
    ctx: &Ctx,
    local_archive: &std::path::Path,
    remote_archive: &str,
    remote_root: &str,
) -> Result<()> {
    let login = ctx.config.ssh_login()?;
    eprintln!("connecting to {}@{}:{} ...", login.user, login.host, login.port);
    let session = SshSession::connect(&login)?;

    let sent = session
        .upload(local_archive, remote_archive, 0o644)
        .with_context(|| format!("upload of {} failed", local_archive.display()))?;
    eprintln!("{} - uploaded ({})", remote_archive, format_size(sent));

    let out = session.exec(&extract_command(remote_root, remote_archive))?;
    session.disconnect();
    out.check("remote extract")?;
    Ok(())
}

use super::Ctx;
use crate::remote::join;
use crate::ssh::{SshSession, extract_command};
use anyhow::Result;

#[derive(clap::Args, Debug)]
pub struct Args {
    /// Tarball already on the server; relative names are looked up in the
    /// release staging directory
    pub archive: String,
}

pub fn run(args: &Args, ctx: &Ctx) -> Result<()> {
    let (name, target) = ctx.target()?;
    let archive = if args.archive.starts_with('/') {
        args.archive.clone()
    } else {
        join(&ctx.config.release.staging_dir, &args.archive)
    };

    let login = ctx.config.ssh_login()?;
    let session = SshSession::connect(&login)?;
    let out = session.exec(&extract_command(&target.remote_root, &archive));
    session.disconnect();
    let out = out?.check("remote extract")?;
    if !out.stdout.trim().is_empty() {
        println!("{}", out.stdout.trim_end());
    }
    println!("extracted {} into {}:{}", archive, name, target.remote_root);
    Ok(())
}

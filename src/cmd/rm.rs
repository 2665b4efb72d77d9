use super::Ctx;
use crate::remote::{Remote, resolve};
use crate::retry::retry;
use anyhow::{Result, bail};

#[derive(clap::Args, Debug)]
pub struct Args {
    /// Remote files, relative to the target root unless absolute
    #[arg(required = true)]
    pub paths: Vec<String>,
}

pub fn run(args: &Args, ctx: &Ctx) -> Result<()> {
    let (_, target) = ctx.target()?;
    let policy = ctx.retry();
    let mut remote = ctx.connect()?;
    let mut failed = 0;
    for path in &args.paths {
        let full = resolve(&target.remote_root, path);
        match retry(&policy, &full, || remote.remove(&full)) {
            Ok(()) => println!("Removed '{}'", full),
            Err(e) => {
                failed += 1;
                eprintln!("{} - FAILED: {}", full, e);
            }
        }
    }
    super::disconnect(remote);
    if failed > 0 {
        bail!("{} of {} removal(s) failed", failed, args.paths.len());
    }
    Ok(())
}

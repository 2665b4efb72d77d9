use super::Ctx;
use anyhow::Result;

#[derive(clap::Args, Debug)]
pub struct Args {
    /// Only print where the config file is read from
    #[arg(long)]
    pub path: bool,
}

pub fn run(args: &Args, ctx: &Ctx) -> Result<()> {
    let path = match &ctx.config_path {
        Some(p) => p.clone(),
        None => crate::config::config_path()?,
    };
    if args.path {
        println!("{}", path.display());
        return Ok(());
    }
    let state = if path.exists() { "" } else { " (not found, using defaults)" };
    println!("# {}{}", path.display(), state);
    print!("{}", ctx.config.redacted_toml()?);
    Ok(())
}

use super::{Ctx, long_entry_prefix};
use crate::remote::{Entry, Remote, resolve};
use crate::retry::retry;
use crate::theme;
use crate::tree::{SortField, sort_entries, walk};
use anyhow::{Context, Result};
use unicode_width::UnicodeWidthStr;

#[derive(clap::Args, Debug)]
pub struct Args {
    /// Remote directory, relative to the target root unless absolute
    pub path: Option<String>,
    /// Long format: size and modification time
    #[arg(short, long)]
    pub long: bool,
    #[arg(short, long, value_enum, default_value_t = SortField::Name)]
    pub sort: SortField,
    #[arg(short, long)]
    pub reverse: bool,
    /// Print an indented tree down to this depth
    #[arg(short = 'R', long = "recursive", value_name = "DEPTH")]
    pub depth: Option<usize>,
    /// JSON output
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &Args, ctx: &Ctx) -> Result<()> {
    let (_, target) = ctx.target()?;
    let path = match &args.path {
        Some(p) => resolve(&target.remote_root, p),
        None => resolve(&target.remote_root, ""),
    };
    let policy = ctx.retry();
    let mut remote = ctx.connect()?;

    if let Some(depth) = args.depth {
        let rows = walk(&mut remote, &path, depth, &policy);
        super::disconnect(remote);
        let rows = rows?;
        if args.json {
            print_json(&rows)?;
        } else {
            print_tree(&path, &rows, args.long);
        }
        return Ok(());
    }

    let entries = retry(&policy, &path, || remote.list(&path))
        .with_context(|| format!("cannot list {path}"));
    super::disconnect(remote);
    let mut entries = entries?;
    sort_entries(&mut entries, args.sort, args.reverse);

    if args.json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("(empty)");
        return Ok(());
    }
    if args.long {
        print_long(&entries);
    } else {
        print_short(&entries);
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn term_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|w: &usize| *w > 0)
        .unwrap_or(80)
}

fn display_name(e: &Entry) -> String {
    if e.is_dir() {
        format!("{}/", e.name)
    } else {
        e.name.clone()
    }
}

/// eza-style grid output (column-major).
fn print_short(entries: &[Entry]) {
    let names: Vec<String> = entries.iter().map(display_name).collect();
    let widths: Vec<usize> = names.iter().map(|n| UnicodeWidthStr::width(n.as_str())).collect();

    let max_width = widths.iter().copied().max().unwrap_or(1);
    let col_width = max_width + 2;
    let num_cols = (term_width() / col_width).max(1);
    let num_rows = entries.len().div_ceil(num_cols);

    for row in 0..num_rows {
        for col in 0..num_cols {
            let idx = col * num_rows + row;
            if idx >= entries.len() {
                break;
            }
            let colored = theme::cli_colored(&names[idx], theme::categorize(&entries[idx]));
            let is_last_col = col + 1 == num_cols || (col + 1) * num_rows + row >= entries.len();
            if is_last_col {
                print!("{}", colored);
            } else {
                let padding = col_width.saturating_sub(widths[idx]);
                print!("{}{}", colored, " ".repeat(padding));
            }
        }
        println!();
    }
}

fn print_long(entries: &[Entry]) {
    for e in entries {
        let name = theme::cli_colored(&display_name(e), theme::categorize(e));
        println!("{}{}", long_entry_prefix(e), name);
    }
}

fn print_tree(root: &str, rows: &[(usize, Entry)], long: bool) {
    println!("{}", theme::cli_colored(root, theme::FileCategory::Dir));
    for (depth, e) in rows {
        let indent = "  ".repeat(depth + 1);
        let name = theme::cli_colored(&display_name(e), theme::categorize(e));
        if long {
            println!("{}{}{}", long_entry_prefix(e), indent, name);
        } else {
            println!("{}{}", indent, name);
        }
    }
}

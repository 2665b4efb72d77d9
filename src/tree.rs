use crate::remote::{Entry, Remote, join};
use crate::retry::{RetryPolicy, retry};
use anyhow::{Context, Result};
use clap::ValueEnum;
use std::cmp::Ordering;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SortField {
    #[default]
    Name,
    Size,
    Modified,
}

/// Directories first, then by `field`; `reverse` flips the field order only.
pub fn sort_entries(entries: &mut [Entry], field: SortField, reverse: bool) {
    entries.sort_by(|a, b| {
        let dirs = b.is_dir().cmp(&a.is_dir());
        if dirs != Ordering::Equal {
            return dirs;
        }
        let ord = match field {
            SortField::Name => a.name.cmp(&b.name),
            SortField::Size => a.size.cmp(&b.size).then_with(|| a.name.cmp(&b.name)),
            SortField::Modified => a
                .modified
                .cmp(&b.modified)
                .then_with(|| a.name.cmp(&b.name)),
        };
        if reverse { ord.reverse() } else { ord }
    });
}

/// Depth-first listing of `path`, `(depth, entry)` pairs with depth 0 for
/// the direct children. Unreadable subdirectories are logged and skipped.
pub fn walk(
    remote: &mut dyn Remote,
    path: &str,
    max_depth: usize,
    policy: &RetryPolicy,
) -> Result<Vec<(usize, Entry)>> {
    let mut entries = retry(policy, path, || remote.list(path))
        .with_context(|| format!("cannot list {path}"))?;
    sort_entries(&mut entries, SortField::Name, false);
    let mut out = Vec::new();
    walk_into(remote, path, entries, 0, max_depth, policy, &mut out);
    Ok(out)
}

fn walk_into(
    remote: &mut dyn Remote,
    dir: &str,
    entries: Vec<Entry>,
    depth: usize,
    max_depth: usize,
    policy: &RetryPolicy,
    out: &mut Vec<(usize, Entry)>,
) {
    for entry in entries {
        let descend = entry.is_dir() && depth < max_depth;
        let child = join(dir, &entry.name);
        out.push((depth, entry));
        if !descend {
            continue;
        }
        match retry(policy, &child, || remote.list(&child)) {
            Ok(mut children) => {
                sort_entries(&mut children, SortField::Name, false);
                walk_into(remote, &child, children, depth + 1, max_depth, policy, out);
            }
            Err(e) => warn!("cannot list {child}: {e}"),
        }
    }
}

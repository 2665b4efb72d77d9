use crate::config::CleanupSet;
use crate::error::RemoteError;
use crate::remote::{Remote, join, resolve};
use crate::retry::{RetryPolicy, retry};
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use tracing::{info, warn};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanupPlan {
    /// Absolute paths present on the server and selected for deletion.
    pub targets: Vec<String>,
    /// Explicitly listed files that are not on the server.
    pub absent: Vec<String>,
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub dry_run: bool,
}

impl CleanupReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

fn pattern_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for p in patterns {
        builder.add(Glob::new(p).with_context(|| format!("invalid cleanup pattern '{p}'"))?);
    }
    Ok(builder.build()?)
}

/// NLST may return bare names or full paths depending on the server.
fn base_name(listed: &str) -> &str {
    listed.trim_end_matches('/').rsplit('/').next().unwrap_or(listed)
}

/// Intersect every set with what the server actually holds.
pub fn plan_cleanup(
    remote: &mut dyn Remote,
    root: &str,
    sets: &[CleanupSet],
    policy: &RetryPolicy,
) -> Result<CleanupPlan> {
    let mut targets = BTreeSet::new();
    let mut absent = BTreeSet::new();

    for set in sets {
        let dir = resolve(root, &set.dir);
        let listed = retry(policy, &dir, || match remote.names(&dir) {
            Err(e) if e.is_empty_listing() => Ok(Vec::new()),
            other => other,
        });
        let names: BTreeSet<String> = match listed {
            Ok(listed) => listed.iter().map(|n| base_name(n).to_string()).collect(),
            Err(RemoteError::NotFound { .. }) => {
                warn!("cleanup directory {dir} does not exist");
                BTreeSet::new()
            }
            Err(e) => return Err(e).with_context(|| format!("cannot list {dir}")),
        };

        for file in &set.files {
            let path = join(&dir, file);
            if names.contains(file.as_str()) {
                targets.insert(path);
            } else {
                absent.insert(path);
            }
        }

        let globs = pattern_set(&set.patterns)?;
        for name in names.iter().filter(|n| globs.is_match(n.as_str())) {
            targets.insert(join(&dir, name));
        }
    }

    Ok(CleanupPlan {
        targets: targets.into_iter().collect(),
        absent: absent.into_iter().collect(),
    })
}

pub fn run_cleanup(
    remote: &mut dyn Remote,
    plan: &CleanupPlan,
    dry_run: bool,
    policy: &RetryPolicy,
) -> CleanupReport {
    let mut report = CleanupReport {
        skipped: plan.absent.clone(),
        dry_run,
        ..CleanupReport::default()
    };
    for path in &plan.targets {
        if dry_run {
            report.deleted.push(path.clone());
            continue;
        }
        match retry(policy, path, || remote.remove(path)) {
            Ok(()) => {
                info!("deleted {path}");
                report.deleted.push(path.clone());
            }
            Err(RemoteError::NotFound { .. }) => report.skipped.push(path.clone()),
            Err(e) => {
                warn!("{path}: {e}");
                report.failed.push((path.clone(), e.to_string()));
            }
        }
    }
    report
}

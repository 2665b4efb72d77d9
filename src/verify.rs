//! Post-deploy check: every planned upload must exist remotely with the
//! local file's size.

use crate::deploy::manifest::PlannedUpload;
use crate::remote::{Remote, resolve};
use crate::retry::{RetryPolicy, retry};
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Ok,
    Missing,
    SizeMismatch { local: u64, remote: u64 },
}

#[derive(Debug, Clone)]
pub struct VerifyItem {
    pub remote: String,
    pub status: FileStatus,
}

#[derive(Debug, Default)]
pub struct VerifyReport {
    pub items: Vec<VerifyItem>,
    /// Manifest entries with no local file, so nothing to compare against.
    pub missing_local: Vec<PathBuf>,
}

impl VerifyReport {
    pub fn is_success(&self) -> bool {
        self.missing_local.is_empty() && self.items.iter().all(|i| i.status == FileStatus::Ok)
    }

    pub fn problem_count(&self) -> usize {
        self.missing_local.len() + self.problems().count()
    }

    pub fn problems(&self) -> impl Iterator<Item = &VerifyItem> {
        self.items.iter().filter(|i| i.status != FileStatus::Ok)
    }
}

pub fn verify(
    remote: &mut dyn Remote,
    root: &str,
    plan: &[PlannedUpload],
    policy: &RetryPolicy,
) -> Result<VerifyReport> {
    let mut report = VerifyReport::default();
    for item in plan {
        let local = fs::metadata(&item.local)
            .with_context(|| format!("cannot stat {}", item.local.display()))?
            .len();
        let target = resolve(root, &item.remote);
        let remote_size = retry(policy, &target, || remote.size(&target))
            .with_context(|| format!("SIZE {target}"))?;
        let status = match remote_size {
            None => FileStatus::Missing,
            Some(n) if n == local => FileStatus::Ok,
            Some(n) => FileStatus::SizeMismatch { local, remote: n },
        };
        report.items.push(VerifyItem {
            remote: target,
            status,
        });
    }
    Ok(report)
}

/// Presence check for ad-hoc paths: `(path, size)` with `None` when absent.
pub fn verify_paths(
    remote: &mut dyn Remote,
    root: &str,
    paths: &[String],
    policy: &RetryPolicy,
) -> Result<Vec<(String, Option<u64>)>> {
    paths
        .iter()
        .map(|p| {
            let target = resolve(root, p);
            let size = retry(policy, &target, || remote.size(&target))
                .with_context(|| format!("SIZE {target}"))?;
            Ok((target, size))
        })
        .collect()
}

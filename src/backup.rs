//! Recursive download of the web space into a timestamped local snapshot.

use crate::remote::{Entry, EntryKind, Remote, join, normalize};
use crate::retry::{RetryPolicy, retry};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct BackupReport {
    pub files: usize,
    pub dirs: usize,
    pub bytes: u64,
    pub skipped_links: usize,
    pub failed: Vec<(String, String)>,
}

impl BackupReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn fail(&mut self, path: &str, err: impl std::fmt::Display) {
        warn!("{path}: {err}");
        self.failed.push((path.to_string(), err.to_string()));
    }
}

/// `<base>/webspace_<YYYYmmdd_HHMMSS>`
pub fn snapshot_dir(base: &Path, now: DateTime<Local>) -> PathBuf {
    base.join(format!("webspace_{}", now.format("%Y%m%d_%H%M%S")))
}

/// Mirror `start` into `local_root`, descending at most `max_depth` levels.
///
/// Depth 0 fetches only the files directly in `start`; a negative depth
/// does nothing. Files are written to `<name>.part` and renamed on success.
pub fn backup(
    remote: &mut dyn Remote,
    start: &str,
    local_root: &Path,
    max_depth: i32,
    policy: &RetryPolicy,
) -> Result<BackupReport> {
    let mut report = BackupReport::default();
    if max_depth < 0 {
        return Ok(report);
    }
    let start = normalize(start);
    let entries = retry(policy, &start, || remote.list(&start))
        .with_context(|| format!("cannot list backup start '{start}'"))?;
    fs::create_dir_all(local_root)
        .with_context(|| format!("failed to create {}", local_root.display()))?;
    report.dirs += 1;

    let mut ctx = Walk {
        remote,
        policy,
        report: &mut report,
    };
    ctx.copy_entries(&start, entries, local_root, max_depth as u32);
    info!(
        "backup of {start}: {} files, {} dirs, {} bytes, {} failed",
        report.files,
        report.dirs,
        report.bytes,
        report.failed.len()
    );
    Ok(report)
}

struct Walk<'a, 'r> {
    remote: &'a mut (dyn Remote + 'r),
    policy: &'a RetryPolicy,
    report: &'a mut BackupReport,
}

impl Walk<'_, '_> {
    fn copy_entries(&mut self, dir: &str, entries: Vec<Entry>, local: &Path, depth_left: u32) {
        for entry in entries {
            let remote_path = join(dir, &entry.name);
            if !is_safe_name(&entry.name) {
                self.report.fail(&remote_path, "refusing unsafe entry name");
                continue;
            }
            match entry.kind {
                EntryKind::Link => {
                    debug!("skipping symlink {remote_path}");
                    self.report.skipped_links += 1;
                }
                EntryKind::File => self.copy_file(&remote_path, &local.join(&entry.name)),
                EntryKind::Dir if depth_left > 0 => {
                    self.copy_dir(&remote_path, &local.join(&entry.name), depth_left - 1)
                }
                EntryKind::Dir => debug!("depth limit reached at {remote_path}"),
            }
        }
    }

    fn copy_dir(&mut self, remote_path: &str, local: &Path, depth_left: u32) {
        let listing = retry(self.policy, remote_path, || self.remote.list(remote_path));
        let entries = match listing {
            Ok(e) => e,
            Err(e) => {
                self.report.fail(remote_path, e);
                return;
            }
        };
        if let Err(e) = fs::create_dir_all(local) {
            self.report.fail(remote_path, format!("cannot create {}: {e}", local.display()));
            return;
        }
        self.report.dirs += 1;
        self.copy_entries(remote_path, entries, local, depth_left);
    }

    fn copy_file(&mut self, remote_path: &str, local: &Path) {
        let mut part_name = local.as_os_str().to_owned();
        part_name.push(".part");
        let part = PathBuf::from(part_name);

        let fetched = retry(self.policy, remote_path, || {
            let mut file = File::create(&part)?;
            let n = self.remote.get(remote_path, &mut file)?;
            file.sync_all()?;
            Ok(n)
        });
        let result = fetched
            .map_err(anyhow::Error::from)
            .and_then(|n| fs::rename(&part, local).map(|_| n).map_err(Into::into));
        match result {
            Ok(n) => {
                debug!("fetched {remote_path} ({n} bytes)");
                self.report.files += 1;
                self.report.bytes += n;
            }
            Err(e) => {
                let _ = fs::remove_file(&part);
                self.report.fail(remote_path, e);
            }
        }
    }
}

fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

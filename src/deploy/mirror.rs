//! Recursive upload of a local build directory into a remote directory.

use super::exclude::ExcludeSet;
use super::{TransferReport, UploadOptions, rel_to_remote, upload_file};
use crate::remote::{Remote, join, normalize};
use crate::retry::retry;
use anyhow::{Result, bail};
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

pub fn mirror(
    remote: &mut dyn Remote,
    local_dir: &Path,
    remote_dir: &str,
    exclude: &ExcludeSet,
    opts: &UploadOptions,
) -> Result<TransferReport> {
    if !local_dir.is_dir() {
        bail!("local directory '{}' does not exist", local_dir.display());
    }
    let remote_dir = normalize(remote_dir);
    let mut report = TransferReport {
        dry_run: opts.dry_run,
        ..TransferReport::default()
    };

    let walker = WalkDir::new(local_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let rel = e.path().strip_prefix(local_dir).unwrap_or(e.path());
            !(e.file_type().is_dir() && exclude.is_excluded(rel))
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let path = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                report.fail(&path, e);
                continue;
            }
        };
        let rel = entry.path().strip_prefix(local_dir).unwrap_or(entry.path());
        let target = join(&remote_dir, &rel_to_remote(rel));

        if entry.file_type().is_dir() {
            if opts.dry_run {
                continue;
            }
            if let Err(e) = retry(&opts.retry, &target, || remote.ensure_dir(&target)) {
                report.fail(&target, e);
            }
            continue;
        }
        if !entry.file_type().is_file() {
            debug!("skipping non-regular file {}", entry.path().display());
            report.skipped.push(target);
            continue;
        }
        if exclude.is_excluded(rel) {
            debug!("excluded {}", rel.display());
            report.skipped.push(target);
            continue;
        }
        upload_file(remote, entry.path(), &target, opts, &mut report);
    }

    info!("mirror {} -> {remote_dir}: {report}", local_dir.display());
    Ok(report)
}

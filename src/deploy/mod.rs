pub mod exclude;
pub mod manifest;
pub mod mirror;

use crate::error::RemoteError;
use crate::remote::{Remote, split_parent_name};
use crate::retry::{RetryPolicy, retry};
use chrono::Local;
use std::fmt;
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, info, warn};

/// Knobs shared by mirror and manifest uploads.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub backup_existing: bool,
    pub dry_run: bool,
    pub retry: RetryPolicy,
    /// `YYYYmmdd_HHMMSS`, fixed for the whole run so every backup of one
    /// deploy carries the same suffix.
    pub stamp: String,
}

impl UploadOptions {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            backup_existing: false,
            dry_run: false,
            retry,
            stamp: Local::now().format("%Y%m%d_%H%M%S").to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TransferReport {
    pub uploaded: Vec<String>,
    pub skipped: Vec<String>,
    /// `(original, renamed_to)`
    pub backed_up: Vec<(String, String)>,
    pub failed: Vec<(String, String)>,
    /// Files whose upload failed after the backup rename and that were put
    /// back under their original name.
    pub restored: Vec<String>,
    /// `(path, mode)` applied after upload.
    pub chmodded: Vec<(String, u32)>,
    pub bytes: u64,
    pub dry_run: bool,
}

impl TransferReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn fail(&mut self, path: &str, err: impl fmt::Display) {
        warn!("{path}: {err}");
        self.failed.push((path.to_string(), err.to_string()));
    }
}

impl fmt::Display for TransferReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.dry_run { "would upload" } else { "uploaded" };
        write!(
            f,
            "{} {} ({}), {} skipped, {} backed up, {} failed",
            self.uploaded.len(),
            verb,
            crate::cmd::format_size(self.bytes),
            self.skipped.len(),
            self.backed_up.len(),
            self.failed.len()
        )
    }
}

/// `/www/aze/index.php` -> `/www/aze/index.php.backup_20250807_101500`
pub fn backup_name(path: &str, stamp: &str) -> String {
    format!("{path}.backup_{stamp}")
}

/// Relative local path to a `/`-joined remote suffix.
pub fn rel_to_remote(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Upload one file, recording the outcome in `report` instead of failing
/// the batch. Returns whether the file was (or in a dry run would be)
/// uploaded.
pub fn upload_file(
    remote: &mut dyn Remote,
    local: &Path,
    remote_path: &str,
    opts: &UploadOptions,
    report: &mut TransferReport,
) -> bool {
    let size = match fs::metadata(local) {
        Ok(m) => m.len(),
        Err(e) => {
            report.fail(remote_path, format!("cannot read {}: {e}", local.display()));
            return false;
        }
    };

    if opts.dry_run {
        info!("would upload {} -> {remote_path}", local.display());
        report.uploaded.push(remote_path.to_string());
        report.bytes += size;
        return true;
    }

    let mut backup = None;
    if opts.backup_existing {
        let existing = retry(&opts.retry, remote_path, || remote.size(remote_path));
        match existing {
            Ok(Some(_)) => {
                let target = backup_name(remote_path, &opts.stamp);
                match retry(&opts.retry, remote_path, || remote.rename(remote_path, &target)) {
                    Ok(()) => {
                        info!("backed up {remote_path} -> {target}");
                        report.backed_up.push((remote_path.to_string(), target.clone()));
                        backup = Some(target);
                    }
                    Err(e) => {
                        report.fail(remote_path, format!("backup rename failed, not overwritten: {e}"));
                        return false;
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                report.fail(remote_path, e);
                return false;
            }
        }
    }

    let sent = retry(&opts.retry, remote_path, || {
        let mut file = File::open(local)?;
        remote.put(remote_path, &mut file)
    });
    match sent {
        Ok(bytes) => {
            info!("uploaded {} -> {remote_path} ({bytes} bytes)", local.display());
            report.uploaded.push(remote_path.to_string());
            report.bytes += bytes;
            true
        }
        Err(e) => {
            match backup {
                Some(backup) => restore_backup(remote, remote_path, &backup, opts, report, e),
                None => report.fail(remote_path, e),
            }
            false
        }
    }
}

/// Rename the backup over `remote_path` again after a failed STOR so the
/// live file is never left missing.
fn restore_backup(
    remote: &mut dyn Remote,
    remote_path: &str,
    backup: &str,
    opts: &UploadOptions,
    report: &mut TransferReport,
    err: RemoteError,
) {
    // A STOR that died mid-transfer can leave a truncated file behind.
    match remote.remove(remote_path) {
        Ok(()) => debug!("removed partial upload {remote_path}"),
        Err(RemoteError::NotFound { .. }) => {}
        Err(e) => debug!("could not remove partial upload {remote_path}: {e}"),
    }
    match retry(&opts.retry, remote_path, || remote.rename(backup, remote_path)) {
        Ok(()) => {
            warn!("restored {remote_path} from {backup}");
            report.backed_up.retain(|(original, _)| original != remote_path);
            report.restored.push(remote_path.to_string());
            report.fail(remote_path, format!("{err}; previous version restored"));
        }
        Err(e) => report.fail(
            remote_path,
            format!("{err}; restoring {backup} failed, live file is missing: {e}"),
        ),
    }
}

/// `SITE CHMOD` an uploaded file. A refusal is recorded as a failure while
/// the upload itself still counts.
pub fn apply_mode(
    remote: &mut dyn Remote,
    remote_path: &str,
    mode: u32,
    opts: &UploadOptions,
    report: &mut TransferReport,
) {
    if opts.dry_run {
        info!("would chmod {mode:o} {remote_path}");
        return;
    }
    match retry(&opts.retry, remote_path, || remote.chmod(remote_path, mode)) {
        Ok(()) => {
            info!("chmod {mode:o} {remote_path}");
            report.chmodded.push((remote_path.to_string(), mode));
        }
        Err(e) => report.fail(remote_path, format!("uploaded, but chmod {mode:o} failed: {e}")),
    }
}

/// Ensure the parent of `remote_path` exists, remembering directories that
/// were already created in this run.
pub fn ensure_parent(
    remote: &mut dyn Remote,
    remote_path: &str,
    opts: &UploadOptions,
    known: &mut std::collections::HashSet<String>,
) -> crate::error::RemoteResult<()> {
    let (parent, _) = split_parent_name(remote_path)?;
    if opts.dry_run || known.contains(&parent) {
        return Ok(());
    }
    retry(&opts.retry, &parent, || remote.ensure_dir(&parent))?;
    known.insert(parent);
    Ok(())
}

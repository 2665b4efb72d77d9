//! Release tarballs: the build directory packed as `.tar.gz` with the same
//! exclusion rules as a mirror upload.

use crate::deploy::exclude::ExcludeSet;
use anyhow::{Context, Result, bail};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub files: usize,
    /// Uncompressed payload size.
    pub bytes: u64,
    pub archive_size: u64,
}

pub fn pack(local_dir: &Path, output: &Path, exclude: &ExcludeSet) -> Result<ArchiveSummary> {
    if !local_dir.is_dir() {
        bail!("local directory '{}' does not exist", local_dir.display());
    }
    let out_abs = std::path::absolute(output)
        .with_context(|| format!("invalid output path {}", output.display()))?;

    let file =
        File::create(output).with_context(|| format!("failed to create {}", output.display()))?;
    let mut tar = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    tar.follow_symlinks(false);

    let mut summary = ArchiveSummary::default();
    let walker = WalkDir::new(local_dir)
        .sort_by_file_name()
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| {
            let rel = e.path().strip_prefix(local_dir).unwrap_or(e.path());
            !exclude.is_excluded(rel)
        });

    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", local_dir.display()))?;
        let path = entry.path();
        if std::path::absolute(path).is_ok_and(|p| p == out_abs) {
            continue;
        }
        let rel = path.strip_prefix(local_dir).unwrap_or(path);
        if entry.file_type().is_dir() {
            tar.append_dir(rel, path)
                .with_context(|| format!("failed to add {}", rel.display()))?;
        } else if entry.file_type().is_file() {
            let mut f =
                File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            tar.append_file(rel, &mut f)
                .with_context(|| format!("failed to add {}", rel.display()))?;
            summary.files += 1;
            summary.bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        } else {
            debug!("skipping {} (not a regular file)", path.display());
        }
    }

    let encoder = tar.into_inner().context("failed to finish tar stream")?;
    encoder.finish().context("failed to finish gzip stream")?;
    summary.archive_size = fs::metadata(output)?.len();
    Ok(summary)
}

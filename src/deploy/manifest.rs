//! Selective upload driven by a TOML manifest of explicit files and globs.

use super::{TransferReport, UploadOptions, apply_mode, ensure_parent, rel_to_remote, upload_file};
use crate::remote::{Remote, join, resolve};
use anyhow::{Context, Result, bail};
use globset::GlobBuilder;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub globs: Vec<GlobEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileEntry {
    pub local: PathBuf,
    /// Relative to the target root.
    pub remote: String,
    /// Octal permission bits set after upload, e.g. `"755"`.
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlobEntry {
    pub pattern: String,
    pub remote_dir: String,
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpload {
    pub local: PathBuf,
    pub remote: String,
    pub mode: Option<u32>,
}

#[derive(Debug, Default)]
pub struct Plan {
    pub uploads: Vec<PlannedUpload>,
    /// Explicit entries whose local file does not exist.
    pub missing: Vec<PathBuf>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Expand the manifest against `base_dir`.
    pub fn resolve(&self, base_dir: &Path) -> Result<Plan> {
        let mut plan = Plan::default();
        for f in &self.files {
            let mode = f.mode.as_deref().map(parse_mode).transpose()?;
            let local = base_dir.join(&f.local);
            if local.is_file() {
                plan.uploads.push(PlannedUpload {
                    local,
                    remote: f.remote.clone(),
                    mode,
                });
            } else {
                warn!("manifest entry {} not found locally", local.display());
                plan.missing.push(local);
            }
        }
        for g in &self.globs {
            let mode = g.mode.as_deref().map(parse_mode).transpose()?;
            for (local, rel) in expand_glob(base_dir, &g.pattern)? {
                plan.uploads.push(PlannedUpload {
                    local,
                    remote: join(&g.remote_dir, &rel),
                    mode,
                });
            }
        }
        Ok(plan)
    }
}

/// `"755"` or `"0o755"` to permission bits.
fn parse_mode(raw: &str) -> Result<u32> {
    let digits = raw.trim().trim_start_matches("0o");
    let mode = u32::from_str_radix(digits, 8)
        .with_context(|| format!("invalid mode '{raw}', expected octal like \"755\""))?;
    if mode > 0o7777 {
        bail!("invalid mode '{raw}', permission bits go up to 7777");
    }
    Ok(mode)
}

/// Regular files under `base_dir` matching `pattern`, sorted. The second
/// element is the path below the pattern's literal prefix.
fn expand_glob(base_dir: &Path, pattern: &str) -> Result<Vec<(PathBuf, String)>> {
    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .with_context(|| format!("invalid glob '{pattern}'"))?
        .compile_matcher();

    let prefix: PathBuf = pattern
        .split('/')
        .take_while(|seg| !seg.contains(['*', '?', '[', '{']))
        .collect();
    let walk_root = base_dir.join(&prefix);
    // No wildcard at all: the pattern names a single file.
    if walk_root.is_file() {
        if !matcher.is_match(&prefix) {
            return Ok(Vec::new());
        }
        let name = walk_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Ok(vec![(walk_root, name)]);
    }
    if !walk_root.is_dir() {
        warn!("glob '{pattern}' matched nothing ({} missing)", walk_root.display());
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(&walk_root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", walk_root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel_to_base) = entry.path().strip_prefix(base_dir) else {
            continue;
        };
        if !matcher.is_match(rel_to_base) {
            continue;
        }
        let below = entry.path().strip_prefix(&walk_root).unwrap_or(entry.path());
        found.push((entry.path().to_path_buf(), rel_to_remote(below)));
    }
    found.sort();
    Ok(found)
}

/// Upload a resolved plan under `root`; missing entries count as skipped.
pub fn upload_planned(
    remote: &mut dyn Remote,
    root: &str,
    plan: &Plan,
    opts: &UploadOptions,
) -> TransferReport {
    let mut report = TransferReport {
        dry_run: opts.dry_run,
        ..TransferReport::default()
    };
    for missing in &plan.missing {
        report.skipped.push(missing.display().to_string());
    }

    let mut known_dirs = HashSet::new();
    for item in &plan.uploads {
        let target = resolve(root, &item.remote);
        if let Err(e) = ensure_parent(remote, &target, opts, &mut known_dirs) {
            report.fail(&target, e);
            continue;
        }
        if upload_file(remote, &item.local, &target, opts, &mut report)
            && let Some(mode) = item.mode
        {
            apply_mode(remote, &target, mode, opts, &mut report);
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::tests::fast_opts;
    use crate::remote::memory::MemoryRemote;

    const MANIFEST: &str = r#"
[[files]]
local = "api/health.php"
remote = "api/health.php"

[[files]]
local = "build/index.html"
remote = "index.html"

[[files]]
local = "api/gone.php"
remote = "api/gone.php"

[[globs]]
pattern = "build/dist/assets/*"
remote_dir = "dist/assets"
"#;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("api")).unwrap();
        fs::create_dir_all(root.join("build/dist/assets/nested")).unwrap();
        fs::write(root.join("api/health.php"), "<?php").unwrap();
        fs::write(root.join("build/index.html"), "<html>").unwrap();
        fs::write(root.join("build/dist/assets/index-b.js"), "b").unwrap();
        fs::write(root.join("build/dist/assets/index-a.css"), "a").unwrap();
        fs::write(root.join("build/dist/assets/nested/deep.js"), "d").unwrap();
        dir
    }

    #[test]
    fn resolves_files_and_globs() {
        let dir = fixture();
        let plan = Manifest::from_toml(MANIFEST).unwrap().resolve(dir.path()).unwrap();

        let remotes: Vec<&str> = plan.uploads.iter().map(|u| u.remote.as_str()).collect();
        assert_eq!(
            remotes,
            vec![
                "api/health.php",
                "index.html",
                "dist/assets/index-a.css",
                "dist/assets/index-b.js",
            ]
        );
        assert_eq!(plan.missing, vec![dir.path().join("api/gone.php")]);
    }

    #[test]
    fn recursive_glob_keeps_subpaths() {
        let dir = fixture();
        let found = expand_glob(dir.path(), "build/dist/**/*.js").unwrap();
        let rels: Vec<&str> = found.iter().map(|(_, r)| r.as_str()).collect();
        assert_eq!(rels, vec!["assets/index-b.js", "assets/nested/deep.js"]);
    }

    #[test]
    fn uploads_plan_creating_parents() {
        let dir = fixture();
        let plan = Manifest::from_toml(MANIFEST).unwrap().resolve(dir.path()).unwrap();
        let mut remote = MemoryRemote::new();
        remote.add_dir("/www/aze");

        let report = upload_planned(&mut remote, "/www/aze", &plan, &fast_opts());

        assert!(report.is_success(), "{:?}", report.failed);
        assert_eq!(report.uploaded.len(), 4);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(remote.file("/www/aze/dist/assets/index-a.css"), Some(&b"a"[..]));
        assert_eq!(remote.file("/www/aze/api/health.php"), Some(&b"<?php"[..]));
    }

    #[test]
    fn literal_glob_matches_the_single_file() {
        let dir = fixture();
        let found = expand_glob(dir.path(), "build/index.html").unwrap();
        assert_eq!(
            found,
            vec![(dir.path().join("build/index.html"), "index.html".to_string())]
        );

        let m = Manifest::from_toml(
            "[[globs]]\npattern = \"build/index.html\"\nremote_dir = \"web\"\n",
        )
        .unwrap();
        let plan = m.resolve(dir.path()).unwrap();
        assert_eq!(plan.uploads.len(), 1);
        assert_eq!(plan.uploads[0].remote, "web/index.html");
        assert!(expand_glob(dir.path(), "build/missing.html").unwrap().is_empty());
    }

    #[test]
    fn scripts_get_their_mode_after_upload() {
        let dir = fixture();
        fs::create_dir_all(dir.path().join("scripts")).unwrap();
        fs::write(dir.path().join("scripts/backup.sh"), "#!/bin/sh").unwrap();
        fs::write(dir.path().join("scripts/restore.sh"), "#!/bin/sh").unwrap();
        let m = Manifest::from_toml(
            r#"
[[files]]
local = "api/health.php"
remote = "api/health.php"

[[globs]]
pattern = "scripts/*.sh"
remote_dir = "scripts"
mode = "755"
"#,
        )
        .unwrap();
        let plan = m.resolve(dir.path()).unwrap();
        assert_eq!(plan.uploads[0].mode, None);
        assert_eq!(plan.uploads[1].mode, Some(0o755));

        let mut remote = MemoryRemote::new();
        remote.add_dir("/www/aze");
        let report = upload_planned(&mut remote, "/www/aze", &plan, &fast_opts());
        assert!(report.is_success(), "{:?}", report.failed);
        assert_eq!(remote.modes.get("/www/aze/scripts/backup.sh"), Some(&0o755));
        assert_eq!(remote.modes.get("/www/aze/scripts/restore.sh"), Some(&0o755));
        assert!(!remote.modes.contains_key("/www/aze/api/health.php"));
    }

    #[test]
    fn failed_upload_is_not_chmodded() {
        let dir = fixture();
        let plan = Plan {
            uploads: vec![PlannedUpload {
                local: dir.path().join("api/health.php"),
                remote: "api/health.php".into(),
                mode: Some(0o644),
            }],
            missing: Vec::new(),
        };
        let mut remote = MemoryRemote::new();
        remote.add_dir("/www/aze/api");
        remote.reply("STOR", "/www/aze/api/health.php", 553, "denied");
        let report = upload_planned(&mut remote, "/www/aze", &plan, &fast_opts());
        assert_eq!(report.failed.len(), 1);
        assert!(remote.modes.is_empty());
    }

    #[test]
    fn modes_are_octal_strings() {
        assert_eq!(parse_mode("755").unwrap(), 0o755);
        assert_eq!(parse_mode("0o644").unwrap(), 0o644);
        assert!(parse_mode("789").is_err());
        assert!(parse_mode("17777").is_err());
    }

    #[test]
    fn empty_manifest_is_valid() {
        let m = Manifest::from_toml("").unwrap();
        assert!(m.files.is_empty() && m.globs.is_empty());
    }

    #[test]
    fn load_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.toml");
        fs::write(&path, "[[files]]\nlocal = 1\n").unwrap();
        let err = format!("{:#}", Manifest::load(&path).unwrap_err());
        assert!(err.contains("deploy.toml"));
    }
}

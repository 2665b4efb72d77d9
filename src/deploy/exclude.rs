use crate::config::MirrorConfig;
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Files that never belong on the web space.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".env",
    ".env.production",
    ".gitignore",
    ".DS_Store",
    "*.log",
    "*.tmp",
    "node_modules",
    ".git",
    "__pycache__",
    ".pytest_cache",
];

/// Upload filter: a path is excluded when a pattern matches the whole
/// relative path or any single component of it.
#[derive(Debug, Clone)]
pub struct ExcludeSet {
    set: GlobSet,
    patterns: Vec<String>,
}

impl ExcludeSet {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::new();
        for p in patterns {
            let p = p.as_ref().trim();
            if p.is_empty() {
                continue;
            }
            builder.add(Glob::new(p).with_context(|| format!("invalid exclude pattern '{p}'"))?);
            kept.push(p.to_string());
        }
        let set = builder.build().context("failed to build exclude set")?;
        Ok(Self {
            set,
            patterns: kept,
        })
    }

    #[cfg(test)]
    pub fn defaults() -> Result<Self> {
        Self::new(DEFAULT_EXCLUDES)
    }

    pub fn from_config(cfg: &MirrorConfig) -> Result<Self> {
        if cfg.extend_defaults {
            Self::new(DEFAULT_EXCLUDES.iter().copied().chain(cfg.exclude.iter().map(String::as_str)))
        } else {
            Self::new(&cfg.exclude)
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_excluded(&self, rel: &Path) -> bool {
        if rel.as_os_str().is_empty() {
            return false;
        }
        self.set.is_match(rel) || rel.components().any(|c| self.set.is_match(c.as_os_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_secrets_and_tooling() {
        let ex = ExcludeSet::defaults().unwrap();
        assert!(ex.is_excluded(Path::new(".env")));
        assert!(ex.is_excluded(Path::new("api/.env.production")));
        assert!(ex.is_excluded(Path::new("logs/php-error.log")));
        assert!(ex.is_excluded(Path::new("node_modules/react/index.js")));
        assert!(ex.is_excluded(Path::new(".git")));
        assert!(!ex.is_excluded(Path::new("api/health.php")));
        assert!(!ex.is_excluded(Path::new("dist/assets/index-4f2a.js")));
        assert!(!ex.is_excluded(Path::new("")));
    }

    #[test]
    fn config_extends_or_replaces_defaults() {
        let mut cfg = MirrorConfig {
            exclude: vec!["*.map".into(), "docs/**".into()],
            extend_defaults: true,
        };
        let ex = ExcludeSet::from_config(&cfg).unwrap();
        assert!(ex.is_excluded(Path::new("dist/app.js.map")));
        assert!(ex.is_excluded(Path::new("docs/setup.md")));
        assert!(ex.is_excluded(Path::new(".env")));

        cfg.extend_defaults = false;
        let ex = ExcludeSet::from_config(&cfg).unwrap();
        assert!(!ex.is_excluded(Path::new(".env")));
        assert_eq!(ex.patterns().len(), 2);
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = ExcludeSet::new(["[unclosed"]).unwrap_err();
        assert!(format!("{err:#}").contains("[unclosed"));
    }
}

use crate::retry::RetryPolicy;
use crate::smoke::{Check, default_checks};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub default_target: String,
    pub ftp: FtpConfig,
    pub ssh: SshConfig,
    pub targets: BTreeMap<String, Target>,
    pub mirror: MirrorConfig,
    pub retry: RetryConfig,
    pub backup: BackupConfig,
    pub smoke: SmokeConfig,
    pub cleanup: CleanupConfig,
    pub release: ReleaseConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_target: "production".to_string(),
            ftp: FtpConfig::default(),
            ssh: SshConfig::default(),
            targets: builtin_targets(),
            mirror: MirrorConfig::default(),
            retry: RetryConfig::default(),
            backup: BackupConfig::default(),
            smoke: SmokeConfig::default(),
            cleanup: CleanupConfig::default(),
            release: ReleaseConfig::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FtpConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub timeout_secs: u64,
    pub accept_invalid_certs: bool,
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 21,
            user: None,
            password: None,
            timeout_secs: 30,
            accept_invalid_certs: false,
        }
    }
}

impl fmt::Debug for FtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("timeout_secs", &self.timeout_secs)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

/// Fully resolved FTPS login, produced by [`AppConfig::ftp_login`].
#[derive(Clone)]
pub struct FtpLogin {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
}

impl fmt::Debug for FtpLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
    pub strict_host_key: bool,
    pub timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 22,
            user: None,
            password: None,
            key_path: None,
            strict_host_key: true,
            timeout_secs: 30,
        }
    }
}

impl fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("key_path", &self.key_path)
            .field("strict_host_key", &self.strict_host_key)
            .finish()
    }
}

#[derive(Clone)]
pub struct SshLogin {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub key_path: Option<PathBuf>,
    pub strict_host_key: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub remote_root: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub exclude: Vec<String>,
    /// Append `exclude` to the built-in list instead of replacing it.
    pub extend_defaults: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            extend_defaults: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 8000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub start: String,
    pub dir: PathBuf,
    pub max_depth: i32,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            start: "/".to_string(),
            dir: PathBuf::from("backups"),
            max_depth: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmokeConfig {
    pub timeout_secs: u64,
    pub checks: Vec<Check>,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            checks: default_checks(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSet {
    /// Directory relative to the target root; empty for the root itself.
    #[serde(default)]
    pub dir: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub sets: Vec<CleanupSet>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        let strings = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            sets: vec![
                CleanupSet {
                    dir: "api".to_string(),
                    files: Vec::new(),
                    patterns: strings(&[
                        "test-*.php",
                        "test_*.php",
                        "debug-*.php",
                        "debug_*.php",
                        "*.backup_*",
                        "*.bak*",
                    ]),
                },
                CleanupSet {
                    dir: String::new(),
                    files: Vec::new(),
                    patterns: strings(&["*.tsx", "*.backup_*", "*.bak*", "test-report-*.json"]),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    pub staging_dir: String,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            staging_dir: "/tmp".to_string(),
        }
    }
}

fn builtin_targets() -> BTreeMap<String, Target> {
    let mut targets = BTreeMap::new();
    targets.insert(
        "production".to_string(),
        Target {
            remote_root: "/www/aze".to_string(),
            base_url: "https://aze.mikropartner.de".to_string(),
        },
    );
    targets.insert(
        "test".to_string(),
        Target {
            remote_root: "/www/aze-test".to_string(),
            base_url: "https://aze.mikropartner.de/aze-test".to_string(),
        },
    );
    targets
}

impl AppConfig {
    /// Load the config file (explicit path or `~/.config/azedeploy/config.toml`),
    /// then `.env`, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let p = config_path()?;
                if p.exists() {
                    Self::from_file(&p)?
                } else {
                    Self::default()
                }
            }
        };

        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            tracing::warn!("ignoring unreadable .env: {e}");
        }
        cfg.apply_env(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(raw)?;
        for (name, target) in builtin_targets() {
            cfg.targets.entry(name).or_insert(target);
        }
        if cfg.smoke.checks.is_empty() {
            cfg.smoke.checks = default_checks();
        }
        Ok(cfg)
    }

    /// Overlay environment variables using the names the deploy scripts used.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(k));

        if let Some(v) = first(&["FTP_HOST", "FTP_SERVER"]) {
            self.ftp.host = Some(v);
        }
        if let Some(v) = first(&["FTP_PORT"]).and_then(|v| v.parse().ok()) {
            self.ftp.port = v;
        }
        if let Some(v) = first(&["FTP_USER"]) {
            self.ftp.user = Some(v);
        }
        if let Some(v) = first(&["FTP_PASS", "FTP_PASSWORD"]) {
            self.ftp.password = Some(v);
        }
        if let Some(v) = first(&["SSH_HOST"]) {
            self.ssh.host = Some(v);
        }
        if let Some(v) = first(&["SSH_PORT"]).and_then(|v| v.parse().ok()) {
            self.ssh.port = v;
        }
        if let Some(v) = first(&["SSH_USER"]) {
            self.ssh.user = Some(v);
        }
        if let Some(v) = first(&["SSH_PASS", "SSH_PASSWORD"]) {
            self.ssh.password = Some(v);
        }
        if let Some(v) = first(&["SSH_KEY"]) {
            self.ssh.key_path = Some(PathBuf::from(v));
        }
        if let Some(v) = first(&["FTP_BACKUP_START"]) {
            self.backup.start = v;
        }
        if let Some(v) = first(&["FTP_BACKUP_DIR"]) {
            self.backup.dir = PathBuf::from(v);
        }
    }

    pub fn target(&self, name: Option<&str>) -> Result<(&str, &Target)> {
        let name = name.unwrap_or(&self.default_target);
        self.targets
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| {
                let known: Vec<&str> = self.targets.keys().map(String::as_str).collect();
                anyhow!("unknown target '{}' (known: {})", name, known.join(", "))
            })
    }

    pub fn ftp_login(&self) -> Result<FtpLogin> {
        let host = self
            .ftp
            .host
            .clone()
            .ok_or_else(|| anyhow!("missing FTP host: set FTP_HOST (or FTP_SERVER) or [ftp].host"))?;
        let user = self
            .ftp
            .user
            .clone()
            .ok_or_else(|| anyhow!("missing FTP user: set FTP_USER or [ftp].user"))?;
        let password = self
            .ftp
            .password
            .clone()
            .ok_or_else(|| anyhow!("missing FTP password: set FTP_PASS (or FTP_PASSWORD)"))?;
        Ok(FtpLogin {
            host,
            port: self.ftp.port,
            user,
            password,
            timeout: Duration::from_secs(self.ftp.timeout_secs.max(1)),
            accept_invalid_certs: self.ftp.accept_invalid_certs,
        })
    }

    /// SSH login; host and user fall back to the FTP account, which is how the
    /// shared host provisions shell access.
    pub fn ssh_login(&self) -> Result<SshLogin> {
        let host = self
            .ssh
            .host
            .clone()
            .or_else(|| self.ftp.host.clone())
            .ok_or_else(|| anyhow!("missing SSH host: set SSH_HOST or FTP_HOST"))?;
        let user = self
            .ssh
            .user
            .clone()
            .or_else(|| self.ftp.user.clone())
            .ok_or_else(|| anyhow!("missing SSH user: set SSH_USER or FTP_USER"))?;
        let password = match (&self.ssh.password, &self.ssh.key_path) {
            (Some(p), _) => Some(p.clone()),
            (None, Some(_)) => None,
            (None, None) => self.ftp.password.clone(),
        };
        Ok(SshLogin {
            host,
            port: self.ssh.port,
            user,
            password,
            key_path: self.ssh.key_path.clone(),
            strict_host_key: self.ssh.strict_host_key,
            timeout: Duration::from_secs(self.ssh.timeout_secs.max(1)),
        })
    }

    /// TOML rendering with secrets masked, for `azedeploy config`.
    pub fn redacted_toml(&self) -> Result<String> {
        let mut copy = self.clone();
        if copy.ftp.password.is_some() {
            copy.ftp.password = Some("********".into());
        }
        if copy.ssh.password.is_some() {
            copy.ssh.password = Some("********".into());
        }
        toml::to_string_pretty(&copy).context("failed to serialize config")
    }
}

pub fn config_path() -> Result<PathBuf> {
    let base = home_config_dir().ok_or_else(|| anyhow!("unable to locate config dir"))?;
    Ok(base.join("azedeploy").join("config.toml"))
}

/// Returns ~/.config on all platforms instead of platform-specific config dirs.
fn home_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".config"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_include_builtin_targets() {
        let cfg = AppConfig::default();
        let (name, target) = cfg.target(None).unwrap();
        assert_eq!(name, "production");
        assert_eq!(target.remote_root, "/www/aze");
        assert_eq!(cfg.target(Some("test")).unwrap().1.remote_root, "/www/aze-test");
        let err = cfg.target(Some("staging")).unwrap_err().to_string();
        assert!(err.contains("unknown target 'staging'"));
        assert!(err.contains("production"));
    }

    #[test]
    fn toml_adds_targets_without_dropping_builtins() {
        let cfg = AppConfig::from_toml(
            r#"
default_target = "staging"

[ftp]
host = "ftp.example.net"
user = "deploy"

[targets.staging]
remote_root = "/www/aze-staging"
base_url = "https://staging.example.net"

[retry]
max_retries = 5
"#,
        )
        .unwrap();
        assert_eq!(cfg.target(None).unwrap().1.remote_root, "/www/aze-staging");
        assert!(cfg.targets.contains_key("production"));
        assert_eq!(cfg.ftp.port, 21);
        assert_eq!(cfg.retry.policy().max_retries, 5);
        assert!(!cfg.smoke.checks.is_empty());
    }

    #[test]
    fn env_overrides_file_values_with_script_names() {
        let mut cfg = AppConfig::default();
        let vars = env(&[
            ("FTP_SERVER", "ftp.example.net"),
            ("FTP_USER", "deploy"),
            ("FTP_PASSWORD", "s3cret"),
            ("FTP_BACKUP_DIR", "/var/backups"),
        ]);
        cfg.apply_env(|k| vars.get(k).cloned());
        let login = cfg.ftp_login().unwrap();
        assert_eq!(login.host, "ftp.example.net");
        assert_eq!(login.password, "s3cret");
        assert_eq!(cfg.backup.dir, PathBuf::from("/var/backups"));
    }

    #[test]
    fn primary_env_name_wins_over_alias() {
        let mut cfg = AppConfig::default();
        let vars = env(&[("FTP_HOST", "primary"), ("FTP_SERVER", "alias")]);
        cfg.apply_env(|k| vars.get(k).cloned());
        assert_eq!(cfg.ftp.host.as_deref(), Some("primary"));
    }

    #[test]
    fn missing_credentials_name_the_variable() {
        let mut cfg = AppConfig::default();
        cfg.ftp.host = Some("h".into());
        cfg.ftp.user = Some("u".into());
        let err = cfg.ftp_login().unwrap_err().to_string();
        assert!(err.contains("FTP_PASS"));
    }

    #[test]
    fn ssh_falls_back_to_ftp_account() {
        let mut cfg = AppConfig::default();
        cfg.ftp.host = Some("host".into());
        cfg.ftp.user = Some("user".into());
        cfg.ftp.password = Some("pw".into());
        let ssh = cfg.ssh_login().unwrap();
        assert_eq!(ssh.host, "host");
        assert_eq!(ssh.user, "user");
        assert_eq!(ssh.password.as_deref(), Some("pw"));

        cfg.ssh.key_path = Some(PathBuf::from("/home/u/.ssh/id_ed25519"));
        assert!(cfg.ssh_login().unwrap().password.is_none());
    }

    #[test]
    fn redaction_hides_passwords() {
        let mut cfg = AppConfig::default();
        cfg.ftp.password = Some("hunter2".into());
        let rendered = cfg.redacted_toml().unwrap();
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("********"));
        assert!(!format!("{:?}", cfg.ftp).contains("hunter2"));
    }
}

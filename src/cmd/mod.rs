pub mod backup;
pub mod cleanup;
pub mod config;
pub mod deploy;
pub mod extract;
pub mod ls;
pub mod pack;
pub mod release;
pub mod rm;
pub mod smoke;
pub mod upload;
pub mod verify;

use crate::config::{AppConfig, Target};
use crate::deploy::TransferReport;
use crate::remote::Entry;
use crate::remote::ftps::FtpsRemote;
use crate::retry::{RetryPolicy, retry};
use anyhow::{Context, Result};
use chrono::Local;
use std::path::PathBuf;
use tracing::warn;

/// Everything a subcommand needs besides its own arguments.
pub struct Ctx {
    pub config: AppConfig,
    pub config_path: Option<PathBuf>,
    pub target: Option<String>,
    pub insecure: bool,
}

impl Ctx {
    pub fn target(&self) -> Result<(&str, &Target)> {
        self.config.target(self.target.as_deref())
    }

    pub fn retry(&self) -> RetryPolicy {
        self.config.retry.policy()
    }

    pub fn connect(&self) -> Result<FtpsRemote> {
        let mut login = self.config.ftp_login()?;
        login.accept_invalid_certs |= self.insecure;
        eprintln!("connecting to {}:{} ...", login.host, login.port);
        retry(&self.retry(), "connect", || FtpsRemote::connect(login.clone()))
            .with_context(|| format!("FTPS connection to {} failed", login.host))
    }
}

pub fn disconnect(remote: FtpsRemote) {
    if let Err(e) = remote.quit() {
        warn!("QUIT failed: {e}");
    }
}

/// `YYYYmmdd_HHMMSS` for file names.
pub fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

pub fn print_transfer_report(report: &TransferReport) {
    for path in &report.uploaded {
        if report.dry_run {
            println!("{} - would upload", path);
        } else {
            println!("{} - done", path);
        }
    }
    for (from, to) in &report.backed_up {
        println!("{} - backed up as {}", from, to);
    }
    for (path, mode) in &report.chmodded {
        println!("{} - mode {:o}", path, mode);
    }
    for path in &report.restored {
        eprintln!("{} - upload failed, previous version restored", path);
    }
    for (path, err) in &report.failed {
        eprintln!("{} - FAILED: {}", path, err);
    }
    println!("{}", report);
}

/// Returns the colored `size  date  ` prefix used in long-format output.
pub fn long_entry_prefix(e: &Entry) -> String {
    let size_str = if e.is_dir() {
        format!("{:>9}", "-")
    } else {
        format!("{:>9}", format_size(e.size))
    };
    let date = format_date(e.modified.as_deref().unwrap_or(""));
    let colored_size = format!("\x1b[1;32m{}\x1b[0m", size_str);
    let colored_date = format!("\x1b[34m{:16}\x1b[0m", date);
    format!("{}  {}  ", colored_size, colored_date)
}

/// MLSD stamps (`20250807101500`) become `2025-08-07 10:15`; LIST dates
/// are shown as the server sent them.
pub fn format_date(raw: &str) -> String {
    let digits = raw.split('.').next().unwrap_or(raw);
    if digits.len() >= 12 && digits.bytes().all(|b| b.is_ascii_digit()) {
        format!(
            "{}-{}-{} {}:{}",
            &digits[0..4],
            &digits[4..6],
            &digits[6..8],
            &digits[8..10],
            &digits[10..12]
        )
    } else if raw.is_empty() {
        "-".to_string()
    } else {
        raw.to_string()
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

//! SSH side of a release: copy the tarball with SCP and unpack it in place.

use crate::config::SshLogin;
use anyhow::{Context, Result, anyhow, bail};
use ssh2::{CheckResult, KnownHostFileKind, Session};
use std::fs::File;
use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Turn a non-zero exit into an error carrying the remote stderr.
    pub fn check(self, what: &str) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        let detail = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        bail!("{what} exited with status {}: {detail}", self.exit_status)
    }
}

pub struct SshSession {
    session: Session,
    host: String,
}

impl SshSession {
    pub fn connect(login: &SshLogin) -> Result<Self> {
        let addr = (login.host.as_str(), login.port)
            .to_socket_addrs()
            .with_context(|| format!("cannot resolve {}", login.host))?
            .next()
            .ok_or_else(|| anyhow!("no address for {}", login.host))?;
        let tcp = TcpStream::connect_timeout(&addr, login.timeout)
            .with_context(|| format!("TCP connect to {addr} failed"))?;

        let mut session = Session::new().context("failed to create SSH session")?;
        session.set_tcp_stream(tcp);
        session.set_timeout(login.timeout.as_millis().min(u32::MAX as u128) as u32);
        session
            .handshake()
            .with_context(|| format!("SSH handshake with {addr} failed"))?;

        verify_host_key(&session, login)?;
        authenticate(&session, login)?;
        info!("ssh connected to {}@{}:{}", login.user, login.host, login.port);
        Ok(Self {
            session,
            host: login.host.clone(),
        })
    }

    pub fn exec(&self, command: &str) -> Result<ExecOutput> {
        debug!("{}$ {command}", self.host);
        let mut channel = self
            .session
            .channel_session()
            .context("failed to open SSH channel")?;
        channel.exec(command).with_context(|| format!("failed to run `{command}`"))?;

        let mut out = channel.stream(0);
        let mut err = channel.stderr();
        self.session.set_blocking(false);
        let drained = drain(&mut out, &mut err, || channel.eof());
        self.session.set_blocking(true);
        let (stdout, stderr) = drained.with_context(|| format!("reading output of `{command}`"))?;

        channel.wait_close()?;
        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_status: channel.exit_status()?,
        })
    }

    /// SCP `local` to `remote_path` with the given permission bits.
    pub fn upload(&self, local: &Path, remote_path: &str, mode: i32) -> Result<u64> {
        let mut file =
            File::open(local).with_context(|| format!("failed to open {}", local.display()))?;
        let size = file.metadata()?.len();
        let mut channel = self
            .session
            .scp_send(Path::new(remote_path), mode, size, None)
            .with_context(|| format!("SCP to {remote_path} refused"))?;
        let sent = io::copy(&mut file, &mut channel)
            .with_context(|| format!("SCP to {remote_path} failed"))?;
        channel.send_eof()?;
        channel.wait_eof()?;
        channel.close()?;
        channel.wait_close()?;
        Ok(sent)
    }

    pub fn disconnect(self) {
        if let Err(e) = self.session.disconnect(None, "bye", None) {
            debug!("ssh disconnect: {e}");
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum HostKeyVerdict {
    Trusted,
    Unknown,
    Rejected(&'static str),
}

fn host_key_verdict(check: CheckResult, strict: bool) -> HostKeyVerdict {
    match check {
        CheckResult::Match => HostKeyVerdict::Trusted,
        CheckResult::Mismatch => HostKeyVerdict::Rejected("does not match known_hosts"),
        CheckResult::NotFound | CheckResult::Failure if strict => {
            HostKeyVerdict::Rejected("is not in known_hosts (strict_host_key = true)")
        }
        CheckResult::NotFound | CheckResult::Failure => HostKeyVerdict::Unknown,
    }
}

fn verify_host_key(session: &Session, login: &SshLogin) -> Result<()> {
    let mut known = session.known_hosts().context("failed to init known_hosts")?;
    if let Some(path) = dirs::home_dir().map(|h| h.join(".ssh").join("known_hosts"))
        && path.exists()
    {
        known
            .read_file(&path, KnownHostFileKind::OpenSSH)
            .with_context(|| format!("failed to read {}", path.display()))?;
    }
    let (key, _) = session
        .host_key()
        .ok_or_else(|| anyhow!("server sent no host key"))?;
    let check = known.check_port(&login.host, login.port, key);
    match host_key_verdict(check, login.strict_host_key) {
        HostKeyVerdict::Trusted => Ok(()),
        HostKeyVerdict::Unknown => {
            warn!("host key for {} is not in known_hosts, continuing", login.host);
            Ok(())
        }
        HostKeyVerdict::Rejected(why) => bail!("host key for {} {why}", login.host),
    }
}

/// Password first, then the key file, then the agent.
fn authenticate(session: &Session, login: &SshLogin) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();
    if let Some(password) = &login.password {
        match session.userauth_password(&login.user, password) {
            Ok(()) if session.authenticated() => return Ok(()),
            Ok(()) => errors.push("password: not accepted".into()),
            Err(e) => errors.push(format!("password: {e}")),
        }
    }
    if let Some(key) = &login.key_path {
        match session.userauth_pubkey_file(&login.user, None, key, None) {
            Ok(()) if session.authenticated() => return Ok(()),
            Ok(()) => errors.push(format!("key {}: not accepted", key.display())),
            Err(e) => errors.push(format!("key {}: {e}", key.display())),
        }
    }
    match session.userauth_agent(&login.user) {
        Ok(()) if session.authenticated() => return Ok(()),
        Ok(()) => errors.push("agent: not accepted".into()),
        Err(e) => errors.push(format!("agent: {e}")),
    }
    bail!(
        "SSH authentication failed for {}: {}",
        login.user,
        errors.join("; ")
    )
}

/// Quote for a POSIX shell: `it's` becomes `'it'\''s'`.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

pub fn extract_command(remote_root: &str, archive: &str) -> String {
    format!(
        "cd {} && tar -xzf {} && rm -f {}",
        shell_quote(remote_root),
        shell_quote(archive),
        shell_quote(archive)
    )
}

/// Read stdout and stderr in turn until both hit EOF after `finished`
/// reports the remote end is done, so a chatty stderr cannot fill the
/// channel window while stdout is waited on. Expects non-blocking readers.
fn drain<O: Read, E: Read>(
    out: &mut O,
    err: &mut E,
    finished: impl Fn() -> bool,
) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let done = finished();
        let a = read_some(out, &mut buf, &mut stdout)?;
        let b = read_some(err, &mut buf, &mut stderr)?;
        if done && a == Some(0) && b == Some(0) {
            return Ok((stdout, stderr));
        }
        if a.unwrap_or(0) == 0 && b.unwrap_or(0) == 0 {
            thread::sleep(Duration::from_millis(10));
        }
    }
}

/// `None` when the read would block.
fn read_some<R: Read>(r: &mut R, buf: &mut [u8], into: &mut Vec<u8>) -> io::Result<Option<usize>> {
    match r.read(buf) {
        Ok(n) => {
            into.extend_from_slice(&buf[..n]);
            Ok(Some(n))
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(e),
    }
}

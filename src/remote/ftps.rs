//! Explicit-TLS FTP session (AUTH TLS + PROT P) backed by `suppaftp`.

use super::listing::{parse_list_line, parse_mlsd_line};
use super::{Entry, Remote, normalize};
use crate::config::FtpLogin;
use crate::error::{RemoteError, RemoteResult, classify_reply};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::io::{self, Read, Write};
use std::net::ToSocketAddrs;
use std::sync::Arc;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpResult, RustlsConnector, RustlsFtpStream};
use tracing::{debug, info, warn};

pub struct FtpsRemote {
    login: FtpLogin,
    stream: Option<RustlsFtpStream>,
    mlsd_supported: bool,
}

impl FtpsRemote {
    pub fn connect(login: FtpLogin) -> RemoteResult<Self> {
        let stream = open(&login)?;
        info!("connected to {}:{} as {}", login.host, login.port, login.user);
        Ok(Self {
            login,
            stream: Some(stream),
            mlsd_supported: true,
        })
    }

    pub fn quit(mut self) -> RemoteResult<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.quit().map_err(|e| map_ftp_error("QUIT", "", e))?;
        }
        Ok(())
    }

    /// Current control connection, reconnecting if a previous call lost it.
    fn stream(&mut self) -> RemoteResult<&mut RustlsFtpStream> {
        if self.stream.is_none() {
            warn!("control connection lost, reconnecting to {}", self.login.host);
            self.stream = Some(open(&self.login)?);
        }
        self.stream
            .as_mut()
            .ok_or_else(|| RemoteError::Connection("no control connection".into()))
    }

    fn call<T, F>(&mut self, op: &'static str, path: &str, f: F) -> RemoteResult<T>
    where
        F: FnOnce(&mut RustlsFtpStream) -> FtpResult<T>,
    {
        let stream = self.stream()?;
        debug!("{op} {path}");
        f(stream).map_err(|e| {
            let err = map_ftp_error(op, path, e);
            if err.is_connection_loss() {
                self.stream = None;
            }
            err
        })
    }
}

impl Remote for FtpsRemote {
    fn list(&mut self, dir: &str) -> RemoteResult<Vec<Entry>> {
        let dir = normalize(dir);
        if self.mlsd_supported {
            match self.call("MLSD", &dir, |s| s.mlsd(Some(dir.as_str()))) {
                Ok(lines) => return Ok(lines.iter().filter_map(|l| parse_mlsd_line(l)).collect()),
                Err(e) if mlsd_unsupported(&e) => {
                    debug!("server has no MLSD, falling back to LIST");
                    self.mlsd_supported = false;
                }
                Err(e) => return Err(e),
            }
        }
        let lines = self.call("LIST", &dir, |s| s.list(Some(dir.as_str())))?;
        Ok(lines.iter().filter_map(|l| parse_list_line(l)).collect())
    }

    fn names(&mut self, dir: &str) -> RemoteResult<Vec<String>> {
        let dir = normalize(dir);
        names_outcome(self.call("NLST", &dir, |s| s.nlst(Some(dir.as_str()))))
    }

    fn put(&mut self, path: &str, mut reader: &mut dyn Read) -> RemoteResult<u64> {
        let path = normalize(path);
        self.call("STOR", &path, |s| s.put_file(path.as_str(), &mut reader))
    }

    fn get(&mut self, path: &str, writer: &mut dyn Write) -> RemoteResult<u64> {
        let path = normalize(path);
        self.call("RETR", &path, |s| {
            s.retr(path.as_str(), |data| {
                io::copy(data, &mut *writer).map_err(FtpError::ConnectionError)
            })
        })
    }

    fn mkdir(&mut self, path: &str) -> RemoteResult<()> {
        let path = normalize(path);
        let result = self.call("MKD", &path, |s| s.mkdir(path.as_str()));
        mkdir_outcome(path, result)
    }

    fn rename(&mut self, from: &str, to: &str) -> RemoteResult<()> {
        let from = normalize(from);
        let to = normalize(to);
        self.call("RNFR", &from, |s| s.rename(from.as_str(), to.as_str()))
    }

    fn remove(&mut self, path: &str) -> RemoteResult<()> {
        let path = normalize(path);
        self.call("DELE", &path, |s| s.rm(path.as_str()))
    }

    fn size(&mut self, path: &str) -> RemoteResult<Option<u64>> {
        let path = normalize(path);
        size_outcome(self.call("SIZE", &path, |s| s.size(path.as_str())))
    }

    fn chmod(&mut self, path: &str, mode: u32) -> RemoteResult<()> {
        let path = normalize(path);
        let command = chmod_command(&path, mode);
        self.call("SITE", &path, |s| s.site(command).map(|_| ()))
    }
}

/// Replies meaning the server does not implement MLSD at all.
fn mlsd_unsupported(err: &RemoteError) -> bool {
    matches!(err, RemoteError::Reply { code: 500 | 501 | 502 | 504, .. })
}

fn names_outcome(result: RemoteResult<Vec<String>>) -> RemoteResult<Vec<String>> {
    match result {
        Err(e) if e.is_empty_listing() => Ok(Vec::new()),
        other => other,
    }
}

/// 521 is the RFC 959 "directory already exists" reply.
fn mkdir_outcome(path: String, result: RemoteResult<()>) -> RemoteResult<()> {
    match result {
        Err(RemoteError::Reply { code: 521, .. }) => Err(RemoteError::AlreadyExists { path }),
        other => other,
    }
}

fn size_outcome(result: RemoteResult<usize>) -> RemoteResult<Option<u64>> {
    match result {
        Ok(n) => Ok(Some(n as u64)),
        Err(RemoteError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

fn chmod_command(path: &str, mode: u32) -> String {
    format!("CHMOD {mode:o} {path}")
}

fn open(login: &FtpLogin) -> RemoteResult<RustlsFtpStream> {
    let addr = (login.host.as_str(), login.port)
        .to_socket_addrs()
        .map_err(|e| RemoteError::Connection(format!("cannot resolve {}: {e}", login.host)))?
        .next()
        .ok_or_else(|| RemoteError::Connection(format!("no address for {}", login.host)))?;

    let plain = RustlsFtpStream::connect_timeout(addr, login.timeout)
        .map_err(|e| map_ftp_error("CONNECT", &login.host, e))?;
    plain
        .get_ref()
        .set_read_timeout(Some(login.timeout))
        .map_err(|e| RemoteError::Connection(e.to_string()))?;

    let connector = RustlsConnector::from(Arc::new(tls_config(login.accept_invalid_certs)?));
    let mut stream = plain
        .into_secure(connector, &login.host)
        .map_err(|e| map_ftp_error("AUTH TLS", &login.host, e))?;

    stream
        .login(login.user.as_str(), login.password.as_str())
        .map_err(|e| map_ftp_error("USER", &login.user, e))?;
    stream
        .transfer_type(FileType::Binary)
        .map_err(|e| map_ftp_error("TYPE", "I", e))?;
    Ok(stream)
}

fn tls_config(accept_invalid_certs: bool) -> RemoteResult<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| RemoteError::Tls(e.to_string()))?;

    if accept_invalid_certs {
        warn!("TLS certificate verification is disabled for the FTPS connection");
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
            .with_no_client_auth());
    }

    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    Ok(builder.with_root_certificates(roots).with_no_client_auth())
}

fn map_ftp_error(op: &'static str, path: &str, err: FtpError) -> RemoteError {
    match err {
        FtpError::ConnectionError(e) => RemoteError::Connection(format!("{op} {path}: {e}")),
        FtpError::SecureError(e) => RemoteError::Tls(e),
        FtpError::UnexpectedResponse(resp) => classify_reply(
            op,
            path,
            resp.status.code(),
            &String::from_utf8_lossy(&resp.body),
        ),
        FtpError::InvalidAddress(e) => RemoteError::Config(e.to_string()),
        #[allow(unreachable_patterns)]
        other => RemoteError::Protocol(format!("{op} {path}: {other}")),
    }
}

/// Verifier for hosts whose certificate does not match their FTP hostname,
/// as is common on shared hosting. Signatures are still checked.
#[derive(Debug)]
struct AcceptAnyCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

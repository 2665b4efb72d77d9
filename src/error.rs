use thiserror::Error;

/// Failures raised by a [`crate::remote::Remote`] session.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Control or data connection dropped or could not be opened.
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("TLS negotiation failed: {0}")]
    Tls(String),

    #[error("login rejected for user '{user}'")]
    Auth { user: String },

    #[error("{path}: not found")]
    NotFound { path: String },

    #[error("{path}: already exists")]
    AlreadyExists { path: String },

    /// Server answered with an unexpected reply code.
    #[error("{op} failed ({code}): {message}")]
    Reply {
        op: &'static str,
        code: u32,
        message: String,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

impl RemoteError {
    /// Transient failures that are worth another attempt.
    ///
    /// FTP 4xx replies are "transient negative completion" by definition;
    /// 5xx replies are permanent and never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Reply { code, .. } => (400..500).contains(code),
            _ => false,
        }
    }

    /// True when the session itself is unusable and must reconnect.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Self::Connection(_))
            || matches!(self, Self::Reply { code: 421, .. })
    }

    /// NLST on an empty directory: ProFTPD and friends answer
    /// `450 No files found` instead of an empty data transfer.
    pub fn is_empty_listing(&self) -> bool {
        matches!(self, Self::Reply { op: "NLST", code: 450, .. })
    }
}

/// Map a negative FTP reply to the matching variant.
pub fn classify_reply(op: &'static str, path: &str, code: u32, message: &str) -> RemoteError {
    let message = message.trim().to_string();
    match (op, code) {
        (_, 530) => RemoteError::Auth {
            user: path.to_string(),
        },
        ("RETR" | "SIZE" | "DELE" | "RNFR" | "LIST" | "MLSD" | "NLST" | "CWD", 550) => {
            RemoteError::NotFound {
                path: path.to_string(),
            }
        }
        _ => RemoteError::Reply { op, code, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_replies_are_retryable() {
        let err = classify_reply("STOR", "/a", 451, "local error");
        assert!(err.is_retryable());
        let err = classify_reply("STOR", "/a", 553, "name not allowed");
        assert!(!err.is_retryable());
        assert!(RemoteError::Connection("reset".into()).is_retryable());
        assert!(!RemoteError::Tls("bad cert".into()).is_retryable());
    }

    #[test]
    fn missing_file_maps_to_not_found() {
        match classify_reply("DELE", "/api/x.php", 550, "No such file") {
            RemoteError::NotFound { path } => assert_eq!(path, "/api/x.php"),
            other => panic!("unexpected {other:?}"),
        }
        // 550 on MKD is ambiguous and must stay a plain reply
        assert!(matches!(
            classify_reply("MKD", "/api", 550, "exists"),
            RemoteError::Reply { code: 550, .. }
        ));
    }

    #[test]
    fn login_rejection_maps_to_auth() {
        assert!(matches!(
            classify_reply("USER", "deploy", 530, "Login incorrect"),
            RemoteError::Auth { .. }
        ));
    }

    #[test]
    fn service_closing_counts_as_connection_loss() {
        let err = classify_reply("STOR", "/a", 421, "timeout");
        assert!(err.is_connection_loss());
        assert!(err.is_retryable());
    }

    #[test]
    fn nlst_450_is_an_empty_listing() {
        assert!(classify_reply("NLST", "/api", 450, "No files found").is_empty_listing());
        assert!(!classify_reply("STOR", "/api/a", 450, "busy").is_empty_listing());
        assert!(!classify_reply("NLST", "/api", 451, "local error").is_empty_listing());
    }
}

//! Session error taxonomy.
//!
//! Every variant is fatal to the session: the worker unwinds immediately
//! and the connection owner decides what to log and whether to close.

use std::fmt;
use std::io;

/// Why the handshake rejected the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// The first message did not match the configured username.
    UnknownUser,
    /// The submitted digest did not match the expected one.
    PasswordMismatch,
    /// The peer answered the digest with something other than `OK`.
    /// Only raised on the client side.
    Refused,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFailure::UnknownUser => write!(f, "unknown user"),
            AuthFailure::PasswordMismatch => write!(f, "password mismatch"),
            AuthFailure::Refused => write!(f, "server refused credentials"),
        }
    }
}

/// Errors that end a worker session.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// An underlying send, receive or socket query failed.
    #[error("Connection error: {context}: {source}")]
    Connection {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    /// The peer failed authentication.
    #[error("Auth error: {0}")]
    Auth(AuthFailure),

    /// The peer violated the vector framing contract.
    #[error("Vector error: {0}")]
    Vector(String),
}

impl WorkerError {
    /// Wrap an I/O error with a short description of the failed step.
    pub fn connection(context: &'static str, source: io::Error) -> Self {
        WorkerError::Connection { context, source }
    }

    /// OS error code of the underlying failure, if there is one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            WorkerError::Connection { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

pub type WorkerResult<T> = Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = WorkerError::Auth(AuthFailure::UnknownUser);
        assert_eq!(err.to_string(), "Auth error: unknown user");

        let err = WorkerError::Vector("size mismatch".into());
        assert_eq!(err.to_string(), "Vector error: size mismatch");

        let err = WorkerError::connection(
            "recv string",
            io::Error::from_raw_os_error(libc::ECONNRESET),
        );
        assert!(err.to_string().starts_with("Connection error: recv string: "));
    }

    #[test]
    fn test_raw_os_error() {
        let err = WorkerError::connection("send", io::Error::from_raw_os_error(libc::EPIPE));
        assert_eq!(err.raw_os_error(), Some(libc::EPIPE));
        assert_eq!(WorkerError::Auth(AuthFailure::PasswordMismatch).raw_os_error(), None);
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WorkerError>();
    }
}

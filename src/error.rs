//! Error types for soxide.
//!
//! [`SocksError`] covers the wire codec and the protocol machines;
//! [`RelayError`] aggregates the per-role outcomes of a bidirectional
//! stream relay.

use std::fmt;
use std::io;
use thiserror::Error;

/// Errors produced by the SOCKS5 codec, the protocol machines and the
/// client session.
///
/// Using a protocol-machine operation in the wrong state is a programmer
/// error and panics instead of returning one of these.
#[derive(Error, Debug)]
pub enum SocksError {
    /// Underlying transport failure (short read, reset, refused connect).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Version byte other than 0x05.
    #[error("bad version: {0:#04x}")]
    BadVersion(u8),

    /// ATYP byte other than 1, 3 or 4.
    #[error("bad address type: {0:#04x}")]
    BadAddressType(u8),

    /// Domain address decoded with a zero length octet.
    #[error("zero length domain")]
    ZeroLengthDomain,

    /// Request carried a command this implementation does not serve.
    #[error("unsupported command: {0:#04x}")]
    BadCommand(u8),

    /// UDP envelope with a nonzero FRAG field.
    #[error("fragmented datagram not supported: frag {0}")]
    FragmentNotSupported(u8),

    /// UDP envelope shorter than the minimum header.
    #[error("truncated datagram: {0} bytes")]
    TruncatedDatagram(usize),

    /// Server answered the method negotiation with 0xFF.
    #[error("methods rejected by server: {0:02x?}")]
    MethodsRejected(Vec<u8>),

    /// Server selected a method the client has no handler for.
    #[error("method not implemented by client: {0:#04x}")]
    MethodNotImplemented(u8),

    /// Server reply carried a non-zero status code.
    #[error("bad reply from server: {0:#04x}")]
    BadReply(u8),

    /// An installed auth handler failed during the sub-negotiation.
    #[error("auth handler failed: {0}")]
    AuthHandler(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Datagram operation attempted after the TCP control connection went
    /// away.
    #[error("TCP control connection closed")]
    ControlClosed,

    /// The transport cannot report its remote address, so an unspecified
    /// bind address in the reply cannot be substituted.
    #[error("transport does not report a remote address")]
    NoRemoteAddr,
}

/// Convenience alias used throughout the protocol layer.
pub type Result<T> = std::result::Result<T, SocksError>;

/// Relay directions as seen from the server session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayRole {
    /// Reading from the SOCKS client.
    ReadClient,
    /// Writing to the outbound target.
    WriteTarget,
    /// Reading from the outbound target.
    ReadTarget,
    /// Writing to the SOCKS client.
    WriteClient,
}

impl fmt::Display for RelayRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayRole::ReadClient => "ReadClient",
            RelayRole::WriteTarget => "WriteTarget",
            RelayRole::ReadTarget => "ReadTarget",
            RelayRole::WriteClient => "WriteClient",
        };
        f.write_str(name)
    }
}

/// Aggregated outcome of a bidirectional relay, keyed by [`RelayRole`].
///
/// A relay produces four completion signals (reader and writer outcome for
/// each direction); the non-success ones are collected here in the order
/// they were drained.
#[derive(Debug, Default)]
pub struct RelayError {
    errors: Vec<(RelayRole, io::Error)>,
}

impl RelayError {
    /// Create an empty aggregate.
    pub fn new() -> Self {
        RelayError::default()
    }

    /// Record a signal; `None` (success) is ignored.
    pub fn push(&mut self, role: RelayRole, err: Option<io::Error>) {
        if let Some(err) = err {
            self.errors.push((role, err));
        }
    }

    /// True when every drained signal was a success.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// The recorded failures in drain order.
    pub fn errors(&self) -> &[(RelayRole, io::Error)] {
        &self.errors
    }

    /// Collapse into a `Result`, `Ok` when nothing failed.
    pub fn into_result(self) -> std::result::Result<(), RelayError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => f.write_str("no errors"),
            [(role, err)] => write!(f, "{}: {}", role, err),
            errors => {
                f.write_str("multiple errors:")?;
                for (role, err) in errors {
                    write!(f, "\n\t{}: {}", role, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for RelayError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_error_empty_is_ok() {
        let merr = RelayError::new();
        assert!(merr.is_empty());
        assert!(merr.into_result().is_ok());
    }

    #[test]
    fn relay_error_single() {
        let mut merr = RelayError::new();
        merr.push(RelayRole::ReadClient, None);
        merr.push(
            RelayRole::WriteTarget,
            Some(io::Error::new(io::ErrorKind::BrokenPipe, "pipe")),
        );
        let err = merr.into_result().unwrap_err();
        assert_eq!(err.errors().len(), 1);
        assert_eq!(format!("{}", err), "WriteTarget: pipe");
    }

    #[test]
    fn relay_error_multiple() {
        let mut merr = RelayError::new();
        merr.push(
            RelayRole::ReadTarget,
            Some(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        );
        merr.push(
            RelayRole::WriteClient,
            Some(io::Error::new(io::ErrorKind::BrokenPipe, "pipe")),
        );
        let rendered = format!("{}", merr);
        assert!(rendered.contains("ReadTarget: reset"));
        assert!(rendered.contains("WriteClient: pipe"));
    }

    #[test]
    fn socks_error_display() {
        assert_eq!(SocksError::BadVersion(0x04).to_string(), "bad version: 0x04");
        assert_eq!(SocksError::ZeroLengthDomain.to_string(), "zero length domain");
        assert_eq!(
            SocksError::BadReply(0x07).to_string(),
            "bad reply from server: 0x07"
        );
    }
}

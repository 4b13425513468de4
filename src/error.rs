use std::io;
use std::result;

pub type Result<T> = result::Result<T, Error>;

/// Crate-wide error taxonomy. Protocol errors drop the surrounding buffer
/// but never tear down a connection; `Again` is a marker for "retry after
/// poll", not a real failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported OpenFlow version {0} (expected 1)")]
    BadVersion(u8),
    #[error("unknown message type {0}")]
    BadType(u8),
    #[error("header length {length} out of range for a {available}-byte buffer")]
    BadLength { length: u16, available: usize },
    #[error("message truncated: expected at least {expected} bytes, have {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("tail element count does not evenly divide the remaining length")]
    BadAlignment,
    #[error("unknown action type {0}")]
    UnknownAction(u16),
    #[error("unknown packet-in reason {0}")]
    UnknownReason(u8),

    #[error("netlink attribute {index} missing")]
    AttrMissing { index: u16 },
    #[error("netlink attribute {index} has bad length {len}")]
    AttrBadLen { index: u16, len: usize },
    #[error("netlink family {0:?} not found")]
    UnknownFamily(String),
    #[error("netlink reply did not match the outstanding request")]
    MismatchedReply,
    #[error("netlink error reply: {0}")]
    Netlink(i32),

    #[error("operation would block")]
    Again,
    #[error("end of file")]
    Eof,

    #[error("{0}")]
    Fatal(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("system call failed: {0}")]
    Errno(#[from] nix::errno::Errno),
}

impl Error {
    pub fn truncated(expected: usize, actual: usize) -> Error {
        Error::Truncated { expected, actual }
    }

    /// True for errors that mean "the peer sent something malformed", as
    /// opposed to transport-level or transient conditions.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Error::BadVersion(_)
                | Error::BadType(_)
                | Error::BadLength { .. }
                | Error::Truncated { .. }
                | Error::BadAlignment
                | Error::UnknownAction(_)
                | Error::UnknownReason(_)
                | Error::AttrMissing { .. }
                | Error::AttrBadLen { .. }
        )
    }
}

pub fn require_bytes(buf: &[u8], len: usize) -> Result<()> {
    if buf.len() < len {
        Err(Error::truncated(len, buf.len()))
    } else {
        Ok(())
    }
}

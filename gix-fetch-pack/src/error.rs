//! Error types for fetch negotiation

use bstr::BString;

/// Result type alias for fetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by collaborators such as the pack indexer or the object store.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stable high-level error classification for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or truncated pkt-line framing
    Framing,
    /// The remote said something outside of the protocol grammar
    Protocol,
    /// The operation was cancelled through the progress sink
    Cancelled,
    /// The transport failed
    Io,
    /// The pack indexer failed
    Index,
    /// Invalid configuration values
    Config,
}

/// Error type for fetch negotiation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The length header or payload of a packet could not be decoded
    #[error("{message}: {raw:?}")]
    Framing {
        /// What went wrong
        message: String,
        /// The offending raw bytes, usually the 4-byte header
        raw: BString,
    },

    /// The remote sent a line that doesn't match the expected grammar
    #[error("{message}: {line:?}")]
    Protocol {
        /// What was expected
        message: String,
        /// The offending line as received
        line: BString,
    },

    /// The operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error on the transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The pack indexer failed to process the received pack
    #[error("failed to index received pack")]
    Index(#[source] BoxedError),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the invalid value
        message: String,
    },
}

impl Error {
    pub(crate) fn framing(message: impl Into<String>, raw: impl Into<BString>) -> Self {
        Self::Framing {
            message: message.into(),
            raw: raw.into(),
        }
    }

    pub(crate) fn protocol(message: impl Into<String>, line: impl Into<BString>) -> Self {
        Self::Protocol {
            message: message.into(),
            line: line.into(),
        }
    }

    /// Fast classification helper returning a stable error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Framing { .. } => ErrorKind::Framing,
            Error::Protocol { .. } => ErrorKind::Protocol,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Io(_) => ErrorKind::Io,
            Error::Index(_) => ErrorKind::Index,
            Error::Config { .. } => ErrorKind::Config,
        }
    }

    /// Return `true` if this is the cancellation signal rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Return `true` if the remote or the transport broke the protocol.
    ///
    /// These are always fatal to the current negotiation and never retried.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self.kind(), ErrorKind::Framing | ErrorKind::Protocol | ErrorKind::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(Error::framing("bad header", "zz00").kind(), ErrorKind::Framing);
        assert_eq!(Error::protocol("expected ACK/NAK", "hello").kind(), ErrorKind::Protocol);
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Cancelled.is_transport_failure());
    }

    #[test]
    fn framing_error_shows_raw_bytes() {
        let err = Error::framing("invalid packet line header", &b"00x1"[..]);
        assert_eq!(err.to_string(), "invalid packet line header: \"00x1\"");
        assert!(err.is_transport_failure());
    }
}

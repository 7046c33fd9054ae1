//! Crawl engine error taxonomy.
//!
//! Mirrors the teacher crate's approach: a hand-written enum with manual
//! `Display`/`Error` impls and `From` conversions for the wrapped I/O error
//! type, no `thiserror`/`anyhow`.

use std::{error, fmt, io};

/// Error kinds produced by the crawl engine.
///
/// Each variant maps to a distinct propagation policy: isolate the
/// offending URL and keep crawling, or abort the crawl outright.
#[derive(Debug)]
pub enum ErrorKind {
    /// A buffer or slab allocation failed. Fatal for the current transaction.
    AllocationFailure,

    /// Socket or TLS I/O failed. The connection is dropped; the URL is not
    /// retried.
    TransportError(IoError),

    /// Malformed status line, chunk framing, or a missing required header.
    /// The URL is archived so it is not re-queued.
    ProtocolError(&'static str),

    /// A discovered URL failed validation or a policy rule. Silent, not
    /// counted as a failure.
    PolicyDrop(PolicyReason),

    /// Cooperative cancellation observed at a suspension point.
    SignalInterrupt,

    /// Invalid CLI flag, argument, or config file. Reported and the process
    /// exits before crawling begins.
    ConfigError(String),
}

/// Why a candidate URL was dropped without being queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyReason {
    UnsupportedScheme,
    Mailto,
    MissingDot,
    TooLong,
    CrossDomain,
    Blacklisted,
    AlreadyArchived,
    ThresholdExceeded,
}

impl PolicyReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            PolicyReason::UnsupportedScheme => "unsupported scheme",
            PolicyReason::Mailto => "mailto link",
            PolicyReason::MissingDot => "host has no dot",
            PolicyReason::TooLong => "url exceeds length limit",
            PolicyReason::CrossDomain => "cross-domain link rejected",
            PolicyReason::Blacklisted => "matched blacklist token",
            PolicyReason::AlreadyArchived => "already archived",
            PolicyReason::ThresholdExceeded => "fill pool at threshold",
        }
    }
}

impl error::Error for ErrorKind {}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::AllocationFailure => write!(f, "allocation failure"),
            ErrorKind::TransportError(e) => write!(f, "transport error: {}", e.0),
            ErrorKind::ProtocolError(msg) => write!(f, "protocol error: {msg}"),
            ErrorKind::PolicyDrop(reason) => write!(f, "policy drop: {}", reason.as_str()),
            ErrorKind::SignalInterrupt => write!(f, "interrupted"),
            ErrorKind::ConfigError(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::TransportError(IoError(err))
    }
}

#[derive(Debug)]
pub struct IoError(pub io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl ErrorKind {
    /// Whether this error aborts the whole crawl, as opposed to just the
    /// current URL.
    pub const fn is_fatal_to_crawl(&self) -> bool {
        matches!(self, ErrorKind::AllocationFailure | ErrorKind::SignalInterrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_not_fatal_to_the_crawl() {
        let err = ErrorKind::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(!err.is_fatal_to_crawl());
    }

    #[test]
    fn signal_interrupt_is_fatal_to_the_crawl() {
        assert!(ErrorKind::SignalInterrupt.is_fatal_to_crawl());
    }

    #[test]
    fn policy_reason_renders_readable_text() {
        assert_eq!(PolicyReason::Mailto.as_str(), "mailto link");
    }
}

//! Error types for the ping engine.

use std::net::IpAddr;
use thiserror::Error;

use crate::config::Protocol;
use crate::state::Report;

/// Errors surfaced by engine and session operations.
///
/// Per-probe failures (a lost packet, a failed transmit, a stale reply) are
/// absorbed into the session's loss accounting and never appear here.
#[derive(Debug, Error)]
pub enum PingError {
    /// `ping` was called before `start`, or after `stop`.
    #[error("pinger is not started")]
    NotStarted,

    /// `start` was called while the engine is already running.
    #[error("pinger is already started")]
    AlreadyStarted,

    /// No unique probe identifier could be allocated within the configured
    /// number of attempts.
    #[error("probe identifier space exhausted")]
    Exhausted,

    /// A probe identifier was registered twice. The allocator retries past
    /// this internally; seeing it from the public API is a bug.
    #[error("duplicate probe identifier {0:#010x}")]
    DuplicateProbe(u32),

    /// A session must send at least one probe.
    #[error("invalid probe count: {0}")]
    InvalidCount(u32),

    /// The target address family does not match the engine's protocol.
    #[error("address family mismatch: {target} on an {protocol:?} engine")]
    FamilyMismatch { target: IpAddr, protocol: Protocol },

    /// The session was canceled (caller token, or engine shutdown) before
    /// all probes resolved. Carries the statistics accumulated so far.
    #[error("ping canceled before completion")]
    Canceled { partial: Report },

    /// Transport could not be opened or used.
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),
}

impl PingError {
    /// The partial report attached to a cancellation, if any.
    pub fn partial_report(&self) -> Option<&Report> {
        match self {
            PingError::Canceled { partial } => Some(partial),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_display() {
        assert_eq!(PingError::NotStarted.to_string(), "pinger is not started");
        assert_eq!(
            PingError::DuplicateProbe(0x1234).to_string(),
            "duplicate probe identifier 0x00001234"
        );

        let err = PingError::FamilyMismatch {
            target: IpAddr::V6(Ipv6Addr::LOCALHOST),
            protocol: Protocol::V4,
        };
        assert!(err.to_string().contains("::1"));
    }

    #[test]
    fn test_partial_report_accessor() {
        assert!(PingError::NotStarted.partial_report().is_none());

        let partial = Report::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 4);
        let err = PingError::Canceled { partial };
        assert!(err.partial_report().is_some());
    }
}

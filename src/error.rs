//! Unified error taxonomy for the network core, hook bus, service-bot
//! runtime, and Relay engine.
//!
//! Mirrors the teacher daemon's `HandlerError` approach: one `thiserror`
//! enum per concern, with conversions so adapter and plugin code can use
//! `?` freely, plus a user-facing rendering used by the service-bot runtime.

use thiserror::Error;

/// Errors surfaced by protocol adapters, the hook bus, and plugins.
///
/// See spec §7 for the full taxonomy and propagation policy.
#[derive(Debug, Error)]
pub enum PylinkError {
    /// Fatal to a single connection: bad recvpass, unparsable framing during
    /// registration, unexpected EOF during burst, CAP mismatch.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An outbound operation the adapter cannot implement (e.g. `kill` on
    /// Clientbot). Relay degrades gracefully on this variant.
    #[error("operation not supported by this protocol: {0}")]
    NotSupported(&'static str),

    /// A looked-up channel/user/server was absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Permission check from §4.6 failed.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Malformed input to a service-bot command.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Socket-level error during send/recv; triggers disconnect + reconnect.
    #[error("transient I/O error: {0}")]
    TransientIo(#[from] std::io::Error),

    /// An invariant from spec §3 was found broken. Logged, current event
    /// aborted, connection continues.
    #[error("state desync: {0}")]
    StateDesync(String),

    /// Config failed to parse or validate.
    #[error("configuration error: {0}")]
    Config(String),

    /// Relay DB failed to load or persist.
    #[error("relay database error: {0}")]
    RelayDb(String),
}

impl PylinkError {
    /// Error-code label suitable for metrics/log fields, mirroring the
    /// teacher's `HandlerError::error_code`.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Protocol(_) => "protocol_error",
            Self::NotSupported(_) => "not_supported",
            Self::NotFound(_) => "not_found",
            Self::NotAuthorized(_) => "not_authorized",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::TransientIo(_) => "transient_io",
            Self::StateDesync(_) => "state_desync",
            Self::Config(_) => "config_error",
            Self::RelayDb(_) => "relay_db_error",
        }
    }

    /// Whether this error should close the connection it occurred on.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::TransientIo(_))
    }

    /// Render as a user-visible `Error: <text>` service-bot reply (spec §7).
    pub fn to_user_notice(&self) -> String {
        format!("Error: {self}")
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PylinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_close_connection() {
        assert!(PylinkError::Protocol("bad recvpass".into()).is_fatal_to_connection());
        assert!(
            PylinkError::TransientIo(std::io::Error::other("boom")).is_fatal_to_connection()
        );
        assert!(!PylinkError::NotFound("#chan".into()).is_fatal_to_connection());
    }

    #[test]
    fn user_notice_is_prefixed() {
        let err = PylinkError::NotAuthorized("relay.link".into());
        assert_eq!(err.to_user_notice(), "Error: not authorized: relay.link");
    }
}

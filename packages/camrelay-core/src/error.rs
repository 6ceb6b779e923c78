//! Centralized error types for camrelay-core.
//!
//! Mirrors the error taxonomy of the ingest pipeline: connection-scoped
//! errors never escape the stream handler except as log lines, and only
//! [`CoreError::Bind`] and [`CoreError::NetworkDown`] cross into a
//! [`crate::events::HostEvent`].

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad frame size, bad header, or the wrong first frame type.
    /// Fatal to the connection; never retried.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Any of the read/write deadlines in the concurrency model elapsed.
    /// Fatal to the affected connection only.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A blocked read was interrupted by `force_disconnect`. Not a protocol
    /// or network failure; the connection is simply being torn down.
    #[error("force-disconnected")]
    ForceDisconnected,

    /// The decoder refused a packet. Non-fatal; the packet is dropped.
    #[error("decoder error: {0}")]
    Decoder(#[from] camrelay_decode::DecodeError),

    /// A negative return code from the native publisher. Non-fatal; the
    /// frame is counted as a drop.
    #[error("publisher error: {0}")]
    Publisher(String),

    /// A listener failed to bind. Fatal for that stream only; other
    /// streams continue.
    #[error("bind error: {0}")]
    Bind(String),

    /// The bind IP disappeared for two consecutive network checks.
    #[error("network down: bind ip {0} unreachable")]
    NetworkDown(String),

    /// Malformed configuration or an out-of-range CLI value. Fatal to
    /// process startup; never reaches a running supervisor.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Stable, machine-readable code for logging and host-facing messages.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::ProtocolViolation(_) => "protocol_violation",
            CoreError::Timeout(_) => "timeout",
            CoreError::ForceDisconnected => "force_disconnected",
            CoreError::Decoder(_) => "decoder_error",
            CoreError::Publisher(_) => "publisher_error",
            CoreError::Bind(_) => "bind_error",
            CoreError::NetworkDown(_) => "network_down",
            CoreError::Config(_) => "configuration_error",
            CoreError::Io(_) => "io_error",
        }
    }
}

/// Convenient Result alias for crate-wide operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_has_stable_code() {
        let err = CoreError::Bind("address in use".into());
        assert_eq!(err.code(), "bind_error");
    }

    #[test]
    fn network_down_message_includes_ip() {
        let err = CoreError::NetworkDown("192.168.1.10".into());
        assert!(err.to_string().contains("192.168.1.10"));
    }
}

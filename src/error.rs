//! Error types for the NatNet client.
//!
//! Every fallible operation in the crate returns [`NatNetError`]. The variants fall
//! into three groups with different blast radius:
//!
//! - **Datagram-local**: [`NatNetError::MalformedPacket`],
//!   [`NatNetError::TruncatedPayload`] and [`NatNetError::UnsupportedVersion`] describe a
//!   single bad datagram. The background receiver logs them and keeps streaming.
//! - **Handshake**: [`NatNetError::Timeout`] and [`NatNetError::Connection`] mean no
//!   usable client was produced.
//! - **Transport**: [`NatNetError::Io`] and [`NatNetError::Disconnected`] end the stream;
//!   consumers observe end-of-stream rather than an error.
//!
//! ```rust
//! use natnet::NatNetError;
//!
//! let error = NatNetError::truncated("rigid bodies", 28, 12);
//! assert!(error.is_datagram_local());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

use crate::types::ProtocolVersion;

/// Result type alias for NatNet operations.
pub type Result<T, E = NatNetError> = std::result::Result<T, E>;

/// Main error type for NatNet operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum NatNetError {
    #[error("Failed to connect to NatNet server: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Socket error while {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No response from server within {duration:?}")]
    Timeout { duration: Duration },

    #[error("Malformed packet: {details}")]
    MalformedPacket { details: String },

    #[error("Truncated payload in {section}: need {needed} bytes, {remaining} remaining")]
    TruncatedPayload { section: &'static str, needed: usize, remaining: usize },

    #[error("Payload does not match NatNet {version} layout: {details}")]
    UnsupportedVersion { version: ProtocolVersion, details: String },

    #[error("Invalid configuration: {details}")]
    Config { details: String },

    #[error("Connection to the NatNet server is closed")]
    Disconnected,
}

impl NatNetError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            NatNetError::Connection { .. } => true,
            NatNetError::Timeout { .. } => true,
            NatNetError::Io { .. } => true,
            NatNetError::MalformedPacket { .. } => false,
            NatNetError::TruncatedPayload { .. } => false,
            NatNetError::UnsupportedVersion { .. } => false,
            NatNetError::Config { .. } => false,
            NatNetError::Disconnected => true,
        }
    }

    /// Returns whether this error only concerns one datagram.
    ///
    /// The background receiver drops the offending datagram and keeps reading.
    pub fn is_datagram_local(&self) -> bool {
        matches!(
            self,
            NatNetError::MalformedPacket { .. }
                | NatNetError::TruncatedPayload { .. }
                | NatNetError::UnsupportedVersion { .. }
        )
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            NatNetError::Connection { .. } => vec![
                "Ensure Motive is running with streaming enabled",
                "Check the server and local addresses",
                "Verify the command port matches Motive's streaming settings",
            ],
            NatNetError::Io { .. } => vec![
                "Check that the local address belongs to this machine",
                "Make sure no other process holds the data port",
                "Check firewall rules for UDP ports 1510/1511",
            ],
            NatNetError::Timeout { .. } => vec![
                "Increase the connect timeout",
                "Verify Motive is broadcasting on the selected interface",
                "Check that unicast/multicast mode matches Motive's setting",
            ],
            NatNetError::MalformedPacket { .. } => vec![
                "Check for other traffic on the NatNet ports",
                "Verify the server is a NatNet-compatible application",
            ],
            NatNetError::TruncatedPayload { .. } => vec![
                "Increase the receive buffer size",
                "Check for IP fragmentation drops on the network path",
            ],
            NatNetError::UnsupportedVersion { .. } => vec![
                "Set a protocol version override matching Motive's bitstream version",
                "Update Motive or this library to a compatible version",
            ],
            NatNetError::Config { .. } => vec![
                "Check the connection parameters",
                "Compare the configuration file against the documented keys",
            ],
            NatNetError::Disconnected => vec![
                "Reconnect to the server",
                "Check whether Motive was closed or streaming was disabled",
            ],
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        NatNetError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        NatNetError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for socket errors with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        NatNetError::Io { context: context.into(), source }
    }

    /// Helper constructor for malformed packet errors.
    pub fn malformed(details: impl Into<String>) -> Self {
        NatNetError::MalformedPacket { details: details.into() }
    }

    /// Helper constructor for truncated payload errors.
    pub fn truncated(section: &'static str, needed: usize, remaining: usize) -> Self {
        NatNetError::TruncatedPayload { section, needed, remaining }
    }

    /// Helper constructor for version layout mismatches.
    pub fn unsupported_version(version: ProtocolVersion, details: impl Into<String>) -> Self {
        NatNetError::UnsupportedVersion { version, details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(details: impl Into<String>) -> Self {
        NatNetError::Config { details: details.into() }
    }
}

impl From<std::io::Error> for NatNetError {
    fn from(err: std::io::Error) -> Self {
        NatNetError::Io { context: "performing socket I/O".to_string(), source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            reason in ".*",
            needed in 0usize..0x10000usize,
            remaining in 0usize..0x10000usize,
            major in 0u8..10u8,
            minor in 0u8..20u8,
            details in ".*"
          ) {
            let connection_msg = NatNetError::connection_failed(reason.clone()).to_string();
            prop_assert!(connection_msg.contains(&reason));

            let truncated_msg = NatNetError::truncated("labeled markers", needed, remaining).to_string();
            prop_assert!(truncated_msg.contains("labeled markers"));
            prop_assert!(truncated_msg.contains(&needed.to_string()));
            prop_assert!(truncated_msg.contains(&remaining.to_string()));

            let version = ProtocolVersion::new(major, minor);
            let version_msg = NatNetError::unsupported_version(version, details.clone()).to_string();
            prop_assert!(version_msg.contains(&version.to_string()));
            prop_assert!(version_msg.contains(&details));
          }

          #[test]
          fn io_conversion_preserves_source(reason in ".*") {
            let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, reason.clone());
            let converted: NatNetError = io_err.into();
            match converted {
              NatNetError::Io { source, .. } => {
                prop_assert_eq!(source.to_string(), reason);
              }
              _ => prop_assert!(false, "Expected Io error from io::Error conversion"),
            }
          }
        }
    }

    #[test]
    fn decode_errors_are_datagram_local() {
        assert!(NatNetError::malformed("bad header").is_datagram_local());
        assert!(NatNetError::truncated("frame suffix", 8, 2).is_datagram_local());
        assert!(
            NatNetError::unsupported_version(ProtocolVersion::new(2, 0), "residue")
                .is_datagram_local()
        );

        assert!(!NatNetError::Timeout { duration: Duration::from_millis(100) }.is_datagram_local());
        assert!(!NatNetError::Disconnected.is_datagram_local());
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<NatNetError>();

        let error = NatNetError::connection_failed("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn recovery_methods_work() {
        let timeout = NatNetError::Timeout { duration: Duration::from_secs(3) };
        let malformed = NatNetError::malformed("length mismatch");
        let config = NatNetError::config("queue_capacity must be positive");

        assert!(timeout.is_retryable());
        assert!(!malformed.is_retryable());
        assert!(!config.is_retryable());

        for error in [&timeout, &malformed, &config] {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty());
            for suggestion in suggestions {
                assert!(suggestion.len() > 5);
            }
        }
    }

    #[test]
    fn connection_source_is_chained() {
        let root = std::io::Error::other("port unreachable");
        let error = NatNetError::connection_failed_with_source("handshake", Box::new(root));

        let source = std::error::Error::source(&error).expect("source should be chained");
        assert!(source.to_string().contains("port unreachable"));
    }
}

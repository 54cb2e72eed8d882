//! NatNet wire codec.
//!
//! Pure functions between datagrams and [`Message`]s. Every datagram starts with a
//! little-endian `u16` message id and a `u16` payload size; the payload layout of
//! frames and model definitions then depends on the negotiated [`ProtocolVersion`],
//! looked up in the [`gates`] table.
//!
//! Decoding never reads past the datagram. A bad datagram produces one of the
//! datagram-local errors ([`NatNetError::MalformedPacket`],
//! [`NatNetError::TruncatedPayload`], [`NatNetError::UnsupportedVersion`]) and the
//! caller moves on to the next one.
//!
//! ```rust
//! use natnet::protocol::{self, Message};
//! use natnet::ProtocolVersion;
//!
//! let datagram = protocol::encode(&Message::KeepAlive, ProtocolVersion::LATEST)?;
//! assert_eq!(datagram, [10, 0, 0, 0]);
//! assert_eq!(protocol::decode(&datagram, ProtocolVersion::LATEST)?, Message::KeepAlive);
//! # Ok::<(), natnet::NatNetError>(())
//! ```
//!
//! [`ProtocolVersion`]: crate::ProtocolVersion
//! [`NatNetError::MalformedPacket`]: crate::NatNetError::MalformedPacket
//! [`NatNetError::TruncatedPayload`]: crate::NatNetError::TruncatedPayload
//! [`NatNetError::UnsupportedVersion`]: crate::NatNetError::UnsupportedVersion

mod cursor;
mod descriptions;
mod frame;
pub mod gates;
mod messages;

pub use gates::{Field, Gate};
pub use messages::{HEADER_LEN, Message, MessageId, Response, decode, encode, peek_message_id};

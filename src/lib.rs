//! Type-safe Rust client for OptiTrack's NatNet motion-capture protocol.
//!
//! NatNet streams frames of rigid body poses, markers, skeletons and analog data from
//! a Motive server over UDP. This crate performs the handshake, decodes every protocol
//! version from 2.0 to 4.1, and fans decoded frames out to any number of blocking or
//! async consumers.
//!
//! # Features
//!
//! - **Versioned decoder**: one declarative gate table drives every layout difference
//! - **Background receiver**: a dedicated thread owns the sockets; consumers never do
//! - **Two consumption styles**: blocking iterators and async streams, side by side
//! - **Scoped lifetime**: dropping the client stops the receiver and closes the sockets
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use natnet::{ConnectionParams, NatNet};
//! use std::net::Ipv4Addr;
//!
//! #[tokio::main]
//! async fn main() {
//!     let params = ConnectionParams::multicast(Ipv4Addr::new(192, 168, 1, 10), Ipv4Addr::new(192, 168, 1, 20));
//!     let Some(client) = NatNet::connect(params).await else {
//!         eprintln!("Motive did not answer");
//!         return;
//!     };
//!
//!     let mut frames = client.subscribe();
//!     while let Some(frame) = frames.next_frame().await {
//!         for body in &frame.rigid_bodies {
//!             println!("{} {}: {:?}", frame.frame_number, body.id, body.position);
//!         }
//!     }
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
pub mod protocol;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Connection machinery
pub mod connection;
mod driver;
pub mod handshake;
pub mod stream;
pub mod transport;
pub mod transports;

// Core exports
pub use config::{ConnectionParams, ConnectionType};
pub use error::*;
pub use types::*;

// Main API exports
pub use connection::NatNetClient;
pub use driver::ReceiverStats;
pub use protocol::{Message, Response};
pub use stream::{FramePoll, FrameReader, FrameStream, LatestFrames};
pub use transport::{Channel, Datagram, Transport};
pub use transports::UdpTransport;

use tracing::warn;

/// Entry point with the "connected client or nothing" contract.
///
/// Failures are logged and collapse to `None`; use [`NatNetClient::connect`] when the
/// reason matters.
///
/// # Example
///
/// ```rust,no_run
/// use natnet::{ConnectionParams, NatNet};
/// use std::net::Ipv4Addr;
///
/// let params = ConnectionParams::unicast(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST);
/// match NatNet::connect_blocking(params) {
///     Some(client) => println!("streaming from {}", client.server_info().application_name),
///     None => println!("no server"),
/// }
/// ```
pub struct NatNet;

impl NatNet {
    /// Connect and run the handshake; `None` if no usable client came out of it.
    pub async fn connect(params: ConnectionParams) -> Option<NatNetClient> {
        NatNetClient::connect(params)
            .await
            .inspect_err(|e| warn!(error = %e, "NatNet connection failed"))
            .ok()
    }

    /// Blocking version of [`connect`](Self::connect).
    pub fn connect_blocking(params: ConnectionParams) -> Option<NatNetClient> {
        NatNetClient::connect_blocking(params)
            .inspect_err(|e| warn!(error = %e, "NatNet connection failed"))
            .ok()
    }
}

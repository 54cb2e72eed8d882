//! Transport trait for datagram sources

use crate::Result;

/// Which socket a datagram arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Point-to-point socket used for the handshake and requests. Unicast servers
    /// stream frames here as well.
    Command,
    /// Multicast group or dedicated data port.
    Data,
}

/// One received datagram, header included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub channel: Channel,
    pub payload: Vec<u8>,
}

impl Datagram {
    pub fn new(channel: Channel, payload: Vec<u8>) -> Self {
        Self { channel, payload }
    }
}

/// Socket pair the background receiver talks through.
///
/// Transports abstract over the real UDP sockets and in-memory fakes. They are
/// owned by exactly one task, so both methods take `&mut self`, and both must be
/// cancel-safe: the receiver races them against shutdown and timers.
#[async_trait::async_trait]
pub trait Transport: Send + 'static {
    /// Send one encoded message to the server's command port.
    async fn send_command(&mut self, datagram: &[u8]) -> Result<()>;

    /// Wait for the next datagram on either socket.
    ///
    /// Returns:
    /// - `Ok(datagram)` - A datagram arrived
    /// - `Err(e)` - The transport is unusable; the receiver stops
    async fn recv(&mut self) -> Result<Datagram>;
}

//! UDP socket pair talking to a Motive server

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, trace};

use crate::config::{ConnectionParams, ConnectionType};
use crate::transport::{Channel, Datagram, Transport};
use crate::{NatNetError, Result};

/// Command socket plus data socket, opened from [`ConnectionParams`].
///
/// The command socket is bound to an ephemeral port on the local interface and sends
/// every request to the server's command port. In multicast mode the data socket
/// binds the data port on all interfaces with address reuse, so several clients on one
/// host can read the same stream, and joins the group on the local interface; in
/// unicast mode it binds an ephemeral port, since the server streams to the address
/// that sent the Ping.
pub struct UdpTransport {
    command: UdpSocket,
    data: UdpSocket,
    server: SocketAddr,
    command_buf: Vec<u8>,
    data_buf: Vec<u8>,
}

impl UdpTransport {
    /// Bind both sockets.
    ///
    /// Must be called from inside the runtime that will poll the transport.
    pub async fn open(params: &ConnectionParams) -> Result<Self> {
        let multicast = params.connection_type == ConnectionType::Multicast;

        let command_bind = SocketAddrV4::new(params.local_address, 0);
        let command = UdpSocket::bind(command_bind).await.map_err(|e| {
            NatNetError::io(format!("binding the command socket on {command_bind}"), e)
        })?;
        if multicast {
            command
                .set_broadcast(true)
                .map_err(|e| NatNetError::io("enabling broadcast on the command socket", e))?;
        }

        let data_bind = if multicast {
            SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, params.data_port)
        } else {
            SocketAddrV4::new(params.local_address, 0)
        };
        let data = bind_reusable(data_bind)
            .map_err(|e| NatNetError::io(format!("binding the data socket on {data_bind}"), e))?;
        if multicast {
            data.join_multicast_v4(params.multicast_address, params.local_address).map_err(|e| {
                NatNetError::io(
                    format!(
                        "joining multicast group {} on {}",
                        params.multicast_address, params.local_address
                    ),
                    e,
                )
            })?;
            info!(group = %params.multicast_address, interface = %params.local_address, "Joined multicast group");
        }

        let transport = Self {
            command,
            data,
            server: params.server_command_addr(),
            command_buf: vec![0; params.receive_buffer_size],
            data_buf: vec![0; params.receive_buffer_size],
        };

        info!(
            server = %transport.server,
            command = ?transport.command.local_addr().ok(),
            data = ?transport.data.local_addr().ok(),
            mode = ?params.connection_type,
            "UDP transport open"
        );
        Ok(transport)
    }

    pub fn local_command_addr(&self) -> Result<SocketAddr> {
        self.command
            .local_addr()
            .map_err(|e| NatNetError::io("reading the command socket address", e))
    }

    pub fn local_data_addr(&self) -> Result<SocketAddr> {
        self.data.local_addr().map_err(|e| NatNetError::io("reading the data socket address", e))
    }
}

/// Binds with `SO_REUSEADDR` (and `SO_REUSEPORT` where available) set before the bind.
fn bind_reusable(addr: SocketAddrV4) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos", target_os = "cygwin"))))]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::V4(addr).into())?;
    UdpSocket::from_std(socket.into())
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    async fn send_command(&mut self, datagram: &[u8]) -> Result<()> {
        let sent = self
            .command
            .send_to(datagram, self.server)
            .await
            .map_err(|e| NatNetError::io(format!("sending to {}", self.server), e))?;
        trace!(bytes = sent, server = %self.server, "Sent command datagram");
        Ok(())
    }

    async fn recv(&mut self) -> Result<Datagram> {
        loop {
            let (channel, result) = tokio::select! {
                result = self.command.recv_from(&mut self.command_buf) => (Channel::Command, result),
                result = self.data.recv_from(&mut self.data_buf) => (Channel::Data, result),
            };

            match result {
                Ok((len, from)) => {
                    trace!(bytes = len, %from, ?channel, "Received datagram");
                    let buf = match channel {
                        Channel::Command => &self.command_buf,
                        Channel::Data => &self.data_buf,
                    };
                    return Ok(Datagram::new(channel, buf[..len].to_vec()));
                }
                // ICMP port-unreachable from an earlier send surfaces here on some platforms
                Err(e) if channel == Channel::Command && e.kind() == ErrorKind::ConnectionReset => {
                    debug!(error = %e, "Ignoring reset on the command socket");
                }
                Err(e) => {
                    let context = match channel {
                        Channel::Command => "receiving on the command socket",
                        Channel::Data => "receiving on the data socket",
                    };
                    return Err(NatNetError::io(context, e));
                }
            }
        }
    }
}

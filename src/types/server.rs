//! Server description produced by the handshake

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use super::ProtocolVersion;

/// Connection details a NatNet 3+ server appends to its ping response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConnectionInfo {
    /// Ticks per second of the server clock used by frame timestamps.
    pub high_res_clock_frequency: u64,
    pub data_port: u16,
    pub multicast: bool,
    pub multicast_address: Ipv4Addr,
}

/// What the server told us about itself during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub application_name: String,
    /// Application version as four bytes (major, minor, build, revision).
    pub server_version: [u8; 4],
    /// NatNet version as four bytes (major, minor, build, revision).
    pub natnet_version: [u8; 4],
    pub connection: Option<ServerConnectionInfo>,
}

impl ServerInfo {
    /// NatNet bitstream version the server reports.
    pub fn protocol_version(&self) -> ProtocolVersion {
        ProtocolVersion::new(self.natnet_version[0], self.natnet_version[1])
    }

    /// Converts a server clock tick count to seconds, when the clock frequency is known.
    pub fn ticks_to_seconds(&self, ticks: u64) -> Option<f64> {
        let frequency = self.connection?.high_res_clock_frequency;
        if frequency == 0 {
            return None;
        }
        Some(ticks as f64 / frequency as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motive(connection: Option<ServerConnectionInfo>) -> ServerInfo {
        ServerInfo {
            application_name: "Motive".to_string(),
            server_version: [3, 1, 0, 0],
            natnet_version: [4, 1, 0, 0],
            connection,
        }
    }

    #[test]
    fn protocol_version_from_natnet_bytes() {
        assert_eq!(motive(None).protocol_version(), ProtocolVersion::new(4, 1));
    }

    #[test]
    fn tick_conversion_needs_clock_frequency() {
        assert_eq!(motive(None).ticks_to_seconds(1_000), None);

        let info = motive(Some(ServerConnectionInfo {
            high_res_clock_frequency: 10_000_000,
            data_port: 1511,
            multicast: true,
            multicast_address: Ipv4Addr::new(239, 255, 42, 99),
        }));
        assert_eq!(info.ticks_to_seconds(25_000_000), Some(2.5));
    }
}

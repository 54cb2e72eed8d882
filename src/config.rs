//! Connection parameters
//!
//! [`ConnectionParams`] is plain data: build it in code or load it from YAML. Every key
//! has a default matching Motive's out-of-the-box streaming settings, so a document
//! only needs the keys it wants to change.
//!
//! ```rust
//! use natnet::{ConnectionParams, ConnectionType};
//!
//! let params = ConnectionParams::from_yaml_str(
//!     "server_address: 192.168.1.20\n\
//!      local_address: 192.168.1.30\n\
//!      connection_type: unicast\n\
//!      connect_timeout: 500\n",
//! )?;
//! assert_eq!(params.connection_type, ConnectionType::Unicast);
//! assert_eq!(params.data_port, 1511);
//! # Ok::<(), natnet::NatNetError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use crate::types::ProtocolVersion;
use crate::{NatNetError, Result};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Largest accepted `queue_capacity`; the receiver allocates every slot up front.
pub const MAX_QUEUE_CAPACITY: usize = 65_536;

/// How frame data reaches the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    /// The server sends frames straight to the client's data socket.
    Unicast,
    /// The server sends frames to a multicast group the client joins.
    #[default]
    Multicast,
}

/// Everything needed to reach a NatNet server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    pub server_address: Ipv4Addr,
    /// Interface the client binds and joins the multicast group on.
    pub local_address: Ipv4Addr,
    pub connection_type: ConnectionType,
    pub multicast_address: Ipv4Addr,
    pub command_port: u16,
    pub data_port: u16,
    /// Name announced in the Ping request.
    pub client_name: String,
    /// Handshake window in milliseconds; `None` uses 3 seconds.
    #[serde(with = "duration_ms")]
    pub connect_timeout: Option<Duration>,
    /// Decode with this layout instead of the one the server reports.
    pub version_override: Option<ProtocolVersion>,
    /// Fetch the model definitions as part of the handshake.
    pub request_model_definitions: bool,
    /// Frames buffered per queued subscriber before the oldest is dropped,
    /// between 1 and [`MAX_QUEUE_CAPACITY`].
    pub queue_capacity: usize,
    /// Wait for a command response in milliseconds; `None` uses 2 seconds.
    #[serde(with = "duration_ms")]
    pub command_timeout: Option<Duration>,
    /// Keep-alive period for unicast sessions in milliseconds; `None` disables it.
    #[serde(with = "duration_ms")]
    pub keep_alive_interval: Option<Duration>,
    pub receive_buffer_size: usize,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            server_address: Ipv4Addr::LOCALHOST,
            local_address: Ipv4Addr::LOCALHOST,
            connection_type: ConnectionType::Multicast,
            multicast_address: Ipv4Addr::new(239, 255, 42, 99),
            command_port: 1510,
            data_port: 1511,
            client_name: "NatNetClient".to_string(),
            connect_timeout: None,
            version_override: None,
            request_model_definitions: false,
            queue_capacity: 64,
            command_timeout: None,
            keep_alive_interval: Some(Duration::from_secs(1)),
            receive_buffer_size: 64 * 1024,
        }
    }
}

impl ConnectionParams {
    pub fn unicast(server_address: Ipv4Addr, local_address: Ipv4Addr) -> Self {
        Self {
            server_address,
            local_address,
            connection_type: ConnectionType::Unicast,
            ..Self::default()
        }
    }

    pub fn multicast(server_address: Ipv4Addr, local_address: Ipv4Addr) -> Self {
        Self {
            server_address,
            local_address,
            connection_type: ConnectionType::Multicast,
            ..Self::default()
        }
    }

    pub fn with_ports(mut self, command_port: u16, data_port: u16) -> Self {
        self.command_port = command_port;
        self.data_port = data_port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_version_override(mut self, version: ProtocolVersion) -> Self {
        self.version_override = Some(version);
        self
    }

    pub fn with_model_definitions(mut self, request: bool) -> Self {
        self.request_model_definitions = request;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Parse parameters from a YAML document and validate them.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let params: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| NatNetError::config(format!("invalid connection YAML: {e}")))?;
        params.validate()?;
        Ok(params)
    }

    /// Read parameters from a YAML file and validate them.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            NatNetError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        if self.command_port == 0 || self.data_port == 0 {
            return Err(NatNetError::config("command_port and data_port must be non-zero"));
        }
        if self.command_port == self.data_port {
            return Err(NatNetError::config(format!(
                "command_port and data_port are both {}",
                self.command_port
            )));
        }
        if self.connection_type == ConnectionType::Multicast && !self.multicast_address.is_multicast()
        {
            return Err(NatNetError::config(format!(
                "{} is not a multicast group address",
                self.multicast_address
            )));
        }
        if self.queue_capacity == 0 {
            return Err(NatNetError::config("queue_capacity must be at least 1"));
        }
        if self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(NatNetError::config(format!(
                "queue_capacity {} exceeds the maximum of {MAX_QUEUE_CAPACITY}",
                self.queue_capacity
            )));
        }
        if self.receive_buffer_size < crate::protocol::HEADER_LEN {
            return Err(NatNetError::config(format!(
                "receive_buffer_size of {} bytes cannot hold a message header",
                self.receive_buffer_size
            )));
        }
        if self.client_name.len() >= 256 {
            return Err(NatNetError::config("client_name must be shorter than 256 bytes"));
        }
        if let Some(version) = self.version_override
            && !version.is_supported()
        {
            return Err(NatNetError::config(format!(
                "version_override {version} is outside {}..={}",
                ProtocolVersion::MINIMUM,
                ProtocolVersion::LATEST
            )));
        }
        Ok(())
    }

    pub fn effective_connect_timeout(&self) -> Duration {
        self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn effective_command_timeout(&self) -> Duration {
        self.command_timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT)
    }

    /// Keep-alives only make sense when the server streams to us directly.
    pub fn effective_keep_alive(&self) -> Option<Duration> {
        match self.connection_type {
            ConnectionType::Unicast => self.keep_alive_interval.filter(|d| !d.is_zero()),
            ConnectionType::Multicast => None,
        }
    }

    pub fn server_command_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.server_address, self.command_port))
    }
}

/// `Option<Duration>` as whole milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => {
                serializer.serialize_some(&u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_motive_streaming_settings() {
        let params = ConnectionParams::default();
        assert_eq!(params.command_port, 1510);
        assert_eq!(params.data_port, 1511);
        assert_eq!(params.multicast_address, Ipv4Addr::new(239, 255, 42, 99));
        assert_eq!(params.effective_connect_timeout(), Duration::from_secs(3));
        assert_eq!(params.effective_command_timeout(), Duration::from_secs(2));
        assert!(!params.request_model_definitions);
        params.validate().expect("defaults are valid");
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let params = ConnectionParams::from_yaml_str(
            "connection_type: unicast\nconnect_timeout: 100\nversion_override: {major: 3, minor: 1}\n",
        )
        .expect("valid yaml");

        assert_eq!(params.connection_type, ConnectionType::Unicast);
        assert_eq!(params.connect_timeout, Some(Duration::from_millis(100)));
        assert_eq!(params.version_override, Some(ProtocolVersion::new(3, 1)));
        assert_eq!(params.queue_capacity, 64);
        assert_eq!(params.keep_alive_interval, Some(Duration::from_secs(1)));
    }

    #[test]
    fn null_keep_alive_disables_it() {
        let params = ConnectionParams::from_yaml_str("connection_type: unicast\nkeep_alive_interval: null\n")
            .expect("valid yaml");
        assert_eq!(params.effective_keep_alive(), None);

        let unicast = ConnectionParams::unicast(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST);
        assert_eq!(unicast.effective_keep_alive(), Some(Duration::from_secs(1)));
        let multicast = ConnectionParams::multicast(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST);
        assert_eq!(multicast.effective_keep_alive(), None);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let bad_group = ConnectionParams {
            multicast_address: Ipv4Addr::new(10, 0, 0, 1),
            ..ConnectionParams::default()
        };
        assert!(matches!(bad_group.validate(), Err(NatNetError::Config { .. })));

        // Unicast mode does not care about the group address
        let unicast = ConnectionParams { connection_type: ConnectionType::Unicast, ..bad_group };
        unicast.validate().expect("group unused in unicast mode");

        let zero_queue = ConnectionParams::default().with_queue_capacity(0);
        assert!(zero_queue.validate().is_err());

        ConnectionParams::default()
            .with_queue_capacity(MAX_QUEUE_CAPACITY)
            .validate()
            .expect("largest queue accepted");
        let huge_queue = ConnectionParams::default().with_queue_capacity(MAX_QUEUE_CAPACITY + 1);
        assert!(matches!(huge_queue.validate(), Err(NatNetError::Config { .. })));

        let same_ports = ConnectionParams::default().with_ports(1510, 1510);
        assert!(same_ports.validate().is_err());

        let ancient = ConnectionParams::default().with_version_override(ProtocolVersion::new(1, 4));
        assert!(ancient.validate().is_err());
    }

    #[test]
    fn oversized_queue_in_yaml_is_rejected() {
        let result = ConnectionParams::from_yaml_str("queue_capacity: 1000000000000\n");
        assert!(matches!(result, Err(NatNetError::Config { .. })));
    }

    #[test]
    fn unknown_yaml_shapes_are_config_errors() {
        let result = ConnectionParams::from_yaml_str("connection_type: broadcast\n");
        assert!(matches!(result, Err(NatNetError::Config { .. })));
    }

    #[test]
    fn yaml_round_trip_preserves_durations() {
        let params = ConnectionParams::unicast(Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 3))
            .with_connect_timeout(Duration::from_millis(250));
        let yaml = serde_yaml_ng::to_string(&params).expect("serializes");
        assert!(yaml.contains("connect_timeout: 250"));
        assert_eq!(ConnectionParams::from_yaml_str(&yaml).expect("parses"), params);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let result = ConnectionParams::from_yaml_file("/definitely/not/here.yaml");
        assert!(matches!(result, Err(NatNetError::Config { .. })));
    }
}

//! Test utilities: protocol fixtures and an in-memory transport
//!
//! Fixtures are built per protocol version so that every field a version carries is
//! populated and every field it lacks is left out. That makes them safe to round-trip
//! through the codec at any supported version.

#![cfg(any(test, feature = "benchmark"))]

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::protocol::{self, Field, Message};
use crate::transport::{Channel, Datagram, Transport};
use crate::types::{
    AnalogChannel, Asset, AssetDescription, AssetMarker, AssetMarkerDescription, AssetRigidBody,
    CameraDescription, DataDescription, Device, DeviceDescription, ExposureTimestamps, ForcePlate,
    ForcePlateDescription, FrameParams, LabeledMarker, MarkerSet, MarkerSetDescription, MoCapFrame,
    PrecisionTimestamp, ProtocolVersion, Quaternion, RigidBody, RigidBodyDescription,
    RigidBodyMarker, RigidBodyMarkerDescription, ServerConnectionInfo, ServerInfo, Skeleton,
    SkeletonDescription, Vector3,
};
use crate::{NatNetError, Result};

fn sample_rigid_body(id: i32, version: ProtocolVersion) -> RigidBody {
    let markers = if version.has(Field::RigidBodyMarkers) {
        let details = version.has(Field::RigidBodyMarkerDetails);
        (0..3)
            .map(|k| RigidBodyMarker {
                position: Vector3::new(0.5 * k as f32, 1.25, -0.25),
                id: details.then_some(id * 10 + k),
                size: details.then_some(0.0125),
            })
            .collect()
    } else {
        Vec::new()
    };

    RigidBody {
        id,
        position: Vector3::new(0.25 * id as f32, 1.5, -0.75),
        orientation: Quaternion::new(0.0, 0.5, 0.0, 0.5),
        markers,
        mean_error: version.has(Field::RigidBodyMeanError).then_some(0.000_5),
        tracking_valid: version.has(Field::RigidBodyTrackingParams).then_some(id % 2 == 1),
    }
}

/// A frame carrying data in every section `version` streams.
pub fn sample_frame(frame_number: i32, version: ProtocolVersion) -> MoCapFrame {
    let mut frame = MoCapFrame::empty(frame_number);

    frame.marker_sets = vec![
        MarkerSet {
            name: "wand".to_string(),
            markers: vec![Vector3::new(0.1, 0.2, 0.3), Vector3::new(0.4, 0.5, 0.6)],
        },
        MarkerSet { name: "all".to_string(), markers: vec![Vector3::new(-1.0, 0.0, 2.5)] },
    ];
    frame.unlabeled_markers = vec![Vector3::new(3.0, 0.125, -2.0)];
    frame.rigid_bodies = (1..=4).map(|id| sample_rigid_body(id, version)).collect();

    if version.has(Field::SkeletonSection) {
        frame.skeletons = vec![Skeleton {
            id: 2,
            rigid_bodies: (1..=2).map(|id| sample_rigid_body(id, version)).collect(),
        }];
    }

    if version.has(Field::AssetSection) {
        frame.assets = vec![Asset {
            id: 7,
            rigid_bodies: vec![AssetRigidBody {
                id: 70,
                position: Vector3::new(0.0, 1.0, 0.0),
                orientation: Quaternion::IDENTITY,
                mean_error: 0.001,
                params: 1,
            }],
            markers: vec![AssetMarker {
                id: 71,
                position: Vector3::new(0.0, 1.1, 0.0),
                size: 0.014,
                params: 0x20,
                residual: 0.0003,
            }],
        }];
    }

    if version.has(Field::LabeledMarkerSection) {
        frame.labeled_markers = (0..3)
            .map(|k| LabeledMarker {
                id: (1 << 16) | (k + 1),
                position: Vector3::new(0.1 * k as f32, 1.0, 0.0),
                size: 0.014,
                params: version.has(Field::LabeledMarkerParams).then_some(0x04),
                residual: version.has(Field::LabeledMarkerResidual).then_some(0.0002),
            })
            .collect();
    }

    if version.has(Field::ForcePlateSection) {
        frame.force_plates = vec![ForcePlate {
            id: 1,
            channels: vec![
                AnalogChannel { samples: vec![10.5, 11.0] },
                AnalogChannel { samples: vec![-3.25] },
            ],
        }];
    }

    if version.has(Field::DeviceSection) {
        frame.devices =
            vec![Device { id: 2, channels: vec![AnalogChannel { samples: vec![0.5, 0.75, 1.0] }] }];
    }

    frame.latency = version.has(Field::Latency).then_some(4.25);
    frame.timecode = 0x0102_0304;
    frame.timecode_subframe = 2;
    // representable as f32, so single-precision layouts round-trip
    frame.timestamp = 1234.5;
    if version.has(Field::ExposureTimestamps) {
        frame.exposure_timestamps = Some(ExposureTimestamps {
            camera_mid_exposure: 1_000_000,
            data_received: 1_000_500,
            transmit: 1_000_800,
        });
    }
    if version.has(Field::PrecisionTimestamp) {
        frame.precision_timestamp = Some(PrecisionTimestamp { seconds: 1_700_000_000, fraction: 42 });
    }
    frame.params = FrameParams(0x01);
    frame
}

fn sample_rigid_body_description(
    name: &str,
    id: i32,
    parent_id: i32,
    version: ProtocolVersion,
) -> RigidBodyDescription {
    let markers = if version.has(Field::RigidBodyDescriptionMarkers) {
        let named = version.has(Field::RigidBodyDescriptionMarkerNames);
        (1..=2)
            .map(|k| RigidBodyMarkerDescription {
                name: named.then(|| format!("{name}_{k}")),
                offset: Vector3::new(0.01 * k as f32, 0.0, -0.02),
                active_label: k,
            })
            .collect()
    } else {
        Vec::new()
    };

    RigidBodyDescription {
        name: version.has(Field::RigidBodyDescriptionName).then(|| name.to_string()),
        id,
        parent_id,
        offset: Vector3::new(0.0, 0.1, 0.0),
        markers,
    }
}

/// Model definitions covering every description type `version` can carry.
pub fn sample_descriptions(version: ProtocolVersion) -> Vec<DataDescription> {
    let mut descriptions = vec![
        DataDescription::MarkerSet(MarkerSetDescription {
            name: "wand".to_string(),
            marker_names: vec!["wand_1".to_string(), "wand_2".to_string(), "wand_3".to_string()],
        }),
        DataDescription::RigidBody(sample_rigid_body_description("wand", 1, -1, version)),
        DataDescription::Skeleton(SkeletonDescription {
            name: "actor".to_string(),
            id: 2,
            rigid_bodies: vec![
                sample_rigid_body_description("hip", 1, -1, version),
                sample_rigid_body_description("chest", 2, 1, version),
            ],
        }),
    ];

    if version.has(Field::ForcePlateDescription) {
        let mut calibration_matrix = [[0.0f32; 12]; 12];
        for (i, row) in calibration_matrix.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        descriptions.push(DataDescription::ForcePlate(ForcePlateDescription {
            id: 1,
            serial_number: "FP-0001".to_string(),
            width: 0.6,
            length: 0.4,
            origin: Vector3::new(0.0, 0.0, 0.05),
            calibration_matrix,
            corners: [
                Vector3::new(0.3, 0.0, 0.2),
                Vector3::new(-0.3, 0.0, 0.2),
                Vector3::new(-0.3, 0.0, -0.2),
                Vector3::new(0.3, 0.0, -0.2),
            ],
            plate_type: 1,
            channel_data_type: 0,
            channel_names: vec!["Fz".to_string(), "Mx".to_string()],
        }));
    }

    if version.has(Field::DeviceDescription) {
        descriptions.push(DataDescription::Device(DeviceDescription {
            id: 2,
            name: "NI-DAQ".to_string(),
            serial_number: "DAQ-17".to_string(),
            device_type: 2,
            channel_data_type: 0,
            channel_names: vec!["ai0".to_string()],
        }));
    }

    if version.has(Field::CameraDescription) {
        descriptions.push(DataDescription::Camera(CameraDescription {
            name: "Prime 41 #1".to_string(),
            position: Vector3::new(2.0, 2.5, -1.0),
            orientation: Quaternion::new(0.0, 0.5, 0.5, 0.5),
        }));
    }

    if version.has(Field::AssetDescription) {
        descriptions.push(DataDescription::Asset(AssetDescription {
            name: "glove".to_string(),
            asset_type: 1,
            id: 7,
            rigid_bodies: vec![sample_rigid_body_description("palm", 70, -1, version)],
            markers: vec![AssetMarkerDescription {
                name: "index_tip".to_string(),
                id: 71,
                position: Vector3::new(0.0, 0.02, 0.1),
                size: 0.006,
                params: 0,
            }],
        }));
    }

    descriptions
}

/// Ping response from a Motive server speaking `version`.
pub fn sample_server_info(version: ProtocolVersion) -> ServerInfo {
    ServerInfo {
        application_name: "Motive".to_string(),
        server_version: [3, 1, 0, 0],
        natnet_version: version.to_bytes(),
        connection: Some(ServerConnectionInfo {
            high_res_clock_frequency: 10_000_000,
            data_port: 1511,
            multicast: true,
            multicast_address: Ipv4Addr::new(239, 255, 42, 99),
        }),
    }
}

/// Encodes a message, panicking on failure.
pub fn encode_message(message: &Message, version: ProtocolVersion) -> Vec<u8> {
    protocol::encode(message, version).expect("fixture message encodes")
}

/// Transport half handed to the code under test.
pub struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Datagram>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

/// Server half: injects datagrams and observes what the client sent.
pub struct MockServer {
    inbound: mpsc::UnboundedSender<Datagram>,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// In-memory transport pair. Dropping the server closes the transport.
pub fn mock_transport() -> (MockTransport, MockServer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    (
        MockTransport { inbound: inbound_rx, outbound: outbound_tx },
        MockServer { inbound: inbound_tx, outbound: outbound_rx },
    )
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send_command(&mut self, datagram: &[u8]) -> Result<()> {
        // UDP does not notice a missing peer either
        let _ = self.outbound.send(datagram.to_vec());
        Ok(())
    }

    async fn recv(&mut self) -> Result<Datagram> {
        self.inbound.recv().await.ok_or(NatNetError::Disconnected)
    }
}

impl MockServer {
    /// Delivers raw bytes as if they arrived on `channel`.
    pub fn push(&self, channel: Channel, payload: Vec<u8>) {
        let _ = self.inbound.send(Datagram::new(channel, payload));
    }

    pub fn send_message(&self, channel: Channel, message: &Message, version: ProtocolVersion) {
        self.push(channel, encode_message(message, version));
    }

    pub fn send_frame(&self, frame: MoCapFrame, version: ProtocolVersion) {
        self.send_message(Channel::Data, &Message::FrameOfData(frame), version);
    }

    fn decode_sent(datagram: Vec<u8>) -> Message {
        protocol::decode(&datagram, ProtocolVersion::LATEST).expect("client sent a valid message")
    }

    /// Next message the client sent, if one is already queued.
    pub fn try_recv_command(&mut self) -> Option<Message> {
        self.outbound.try_recv().ok().map(Self::decode_sent)
    }

    /// Waits for the next message the client sends.
    pub async fn recv_command(&mut self) -> Option<Message> {
        self.outbound.recv().await.map(Self::decode_sent)
    }

    /// Polls for the next message from a non-async test.
    pub fn recv_command_timeout(&mut self, timeout: Duration) -> Option<Message> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(message) = self.try_recv_command() {
                return Some(message);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Discards everything the client has sent so far.
    pub fn drain_commands(&mut self) {
        while self.outbound.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_leave_out_fields_the_version_lacks() {
        let legacy = sample_frame(1, ProtocolVersion::new(2, 0));
        assert!(legacy.skeletons.is_empty());
        assert!(legacy.labeled_markers.is_empty());
        assert!(legacy.latency.is_some());
        assert!(legacy.rigid_bodies.iter().all(|rb| rb.tracking_valid.is_none()));

        let modern = sample_frame(1, ProtocolVersion::LATEST);
        assert!(modern.latency.is_none());
        assert!(!modern.assets.is_empty());
        assert!(modern.rigid_bodies.iter().all(|rb| rb.markers.is_empty()));
    }

    #[tokio::test]
    async fn mock_transport_carries_both_directions() {
        let (mut transport, mut server) = mock_transport();
        server.send_message(Channel::Data, &Message::KeepAlive, ProtocolVersion::LATEST);
        let datagram = transport.recv().await.expect("datagram");
        assert_eq!(datagram.channel, Channel::Data);

        transport.send_command(&encode_message(&Message::Disconnect, ProtocolVersion::LATEST)).await.expect("send");
        assert_eq!(server.recv_command().await, Some(Message::Disconnect));

        drop(server);
        assert!(matches!(transport.recv().await, Err(NatNetError::Disconnected)));
    }
}

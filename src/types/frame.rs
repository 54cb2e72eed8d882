//! Frame-of-data records delivered to consumers
//!
//! A [`MoCapFrame`] is built once by the background receiver and then only shared
//! behind an `Arc`, so no consumer can observe another consumer's changes. Every
//! nested `Vec` keeps the order the server sent.

use serde::{Deserialize, Serialize};

/// Position in meters, Motive's right-handed Y-up frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Orientation quaternion in the order Motive streams it (x, y, z, w).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Named marker set and its marker positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerSet {
    pub name: String,
    pub markers: Vec<Vector3>,
}

/// Marker attached to a rigid body (only streamed before NatNet 3.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyMarker {
    pub position: Vector3,
    /// Present from NatNet 2.0.
    pub id: Option<i32>,
    /// Present from NatNet 2.0.
    pub size: Option<f32>,
}

/// Pose of one rigid body (or one skeleton bone).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBody {
    pub id: i32,
    pub position: Vector3,
    pub orientation: Quaternion,
    pub markers: Vec<RigidBodyMarker>,
    /// Mean marker error in meters, present from NatNet 2.0.
    pub mean_error: Option<f32>,
    /// Tracking-valid bit of the params field, present from NatNet 2.6.
    pub tracking_valid: Option<bool>,
}

/// Skeleton with its bone poses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    pub id: i32,
    pub rigid_bodies: Vec<RigidBody>,
}

/// Rigid body belonging to a trained markerset asset (NatNet 4.1+).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetRigidBody {
    pub id: i32,
    pub position: Vector3,
    pub orientation: Quaternion,
    pub mean_error: f32,
    pub params: i16,
}

/// Marker belonging to a trained markerset asset (NatNet 4.1+).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetMarker {
    pub id: i32,
    pub position: Vector3,
    pub size: f32,
    pub params: i16,
    pub residual: f32,
}

/// Trained markerset asset (NatNet 4.1+).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: i32,
    pub rigid_bodies: Vec<AssetRigidBody>,
    pub markers: Vec<AssetMarker>,
}

/// Labeled marker with its solver flags.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledMarker {
    /// Model id in the high 16 bits, marker id in the low 16 bits.
    pub id: i32,
    pub position: Vector3,
    pub size: f32,
    /// Present from NatNet 2.6.
    pub params: Option<i16>,
    /// Present from NatNet 3.0.
    pub residual: Option<f32>,
}

impl LabeledMarker {
    const OCCLUDED: i16 = 0x01;
    const POINT_CLOUD_SOLVED: i16 = 0x02;
    const MODEL_SOLVED: i16 = 0x04;
    const HAS_MODEL: i16 = 0x08;
    const UNLABELED: i16 = 0x10;
    const ACTIVE: i16 = 0x20;

    pub fn model_id(&self) -> i32 {
        self.id >> 16
    }

    pub fn marker_id(&self) -> i32 {
        self.id & 0xffff
    }

    fn flag(&self, bit: i16) -> bool {
        self.params.is_some_and(|p| p & bit != 0)
    }

    pub fn occluded(&self) -> bool {
        self.flag(Self::OCCLUDED)
    }

    pub fn point_cloud_solved(&self) -> bool {
        self.flag(Self::POINT_CLOUD_SOLVED)
    }

    pub fn model_solved(&self) -> bool {
        self.flag(Self::MODEL_SOLVED)
    }

    pub fn has_model(&self) -> bool {
        self.flag(Self::HAS_MODEL)
    }

    pub fn unlabeled(&self) -> bool {
        self.flag(Self::UNLABELED)
    }

    pub fn active(&self) -> bool {
        self.flag(Self::ACTIVE)
    }
}

/// One analog channel: the samples captured during this mocap frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalogChannel {
    pub samples: Vec<f32>,
}

/// Force plate with its channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForcePlate {
    pub id: i32,
    pub channels: Vec<AnalogChannel>,
}

/// Peripheral device (e.g. NI-DAQ) with its channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: i32,
    pub channels: Vec<AnalogChannel>,
}

/// Frame-level params bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameParams(pub i16);

impl FrameParams {
    const RECORDING: i16 = 0x01;
    const TRACKED_MODELS_CHANGED: i16 = 0x02;

    pub fn is_recording(self) -> bool {
        self.0 & Self::RECORDING != 0
    }

    pub fn tracked_models_changed(self) -> bool {
        self.0 & Self::TRACKED_MODELS_CHANGED != 0
    }
}

/// Server clock timestamps, present from NatNet 3.0 (in high-resolution clock ticks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureTimestamps {
    pub camera_mid_exposure: u64,
    pub data_received: u64,
    pub transmit: u64,
}

/// Precision PTP timestamp, present from NatNet 4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecisionTimestamp {
    pub seconds: u32,
    pub fraction: u32,
}

/// One snapshot of everything Motive tracked for a single capture instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoCapFrame {
    pub frame_number: i32,
    pub marker_sets: Vec<MarkerSet>,
    /// Legacy "other markers" section.
    pub unlabeled_markers: Vec<Vector3>,
    pub rigid_bodies: Vec<RigidBody>,
    pub skeletons: Vec<Skeleton>,
    pub assets: Vec<Asset>,
    pub labeled_markers: Vec<LabeledMarker>,
    pub force_plates: Vec<ForcePlate>,
    pub devices: Vec<Device>,
    /// Only streamed before NatNet 3.0.
    pub latency: Option<f32>,
    pub timecode: u32,
    pub timecode_subframe: u32,
    /// Seconds since Motive started streaming. Single precision before NatNet 2.7.
    pub timestamp: f64,
    pub exposure_timestamps: Option<ExposureTimestamps>,
    pub precision_timestamp: Option<PrecisionTimestamp>,
    pub params: FrameParams,
}

impl MoCapFrame {
    /// Empty frame, useful as a starting point when building fixtures.
    pub fn empty(frame_number: i32) -> Self {
        Self {
            frame_number,
            marker_sets: Vec::new(),
            unlabeled_markers: Vec::new(),
            rigid_bodies: Vec::new(),
            skeletons: Vec::new(),
            assets: Vec::new(),
            labeled_markers: Vec::new(),
            force_plates: Vec::new(),
            devices: Vec::new(),
            latency: None,
            timecode: 0,
            timecode_subframe: 0,
            timestamp: 0.0,
            exposure_timestamps: None,
            precision_timestamp: None,
            params: FrameParams::default(),
        }
    }

    pub fn rigid_body(&self, id: i32) -> Option<&RigidBody> {
        self.rigid_bodies.iter().find(|rb| rb.id == id)
    }

    pub fn marker_set(&self, name: &str) -> Option<&MarkerSet> {
        self.marker_sets.iter().find(|set| set.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labeled_marker_id_and_flags() {
        let marker = LabeledMarker {
            id: (3 << 16) | 17,
            position: Vector3::default(),
            size: 0.014,
            params: Some(0x01 | 0x04 | 0x20),
            residual: Some(0.0002),
        };

        assert_eq!(marker.model_id(), 3);
        assert_eq!(marker.marker_id(), 17);
        assert!(marker.occluded());
        assert!(marker.model_solved());
        assert!(marker.active());
        assert!(!marker.point_cloud_solved());
        assert!(!marker.unlabeled());
        assert!(!marker.has_model());
    }

    #[test]
    fn marker_flags_absent_before_params_existed() {
        let marker = LabeledMarker {
            id: 5,
            position: Vector3::default(),
            size: 0.01,
            params: None,
            residual: None,
        };
        assert!(!marker.occluded());
        assert!(!marker.active());
    }

    #[test]
    fn frame_params_bits() {
        assert!(FrameParams(0x01).is_recording());
        assert!(!FrameParams(0x01).tracked_models_changed());
        assert!(FrameParams(0x03).tracked_models_changed());
        assert!(!FrameParams::default().is_recording());
    }

    #[test]
    fn lookups_by_id_and_name() {
        let mut frame = MoCapFrame::empty(10);
        frame.rigid_bodies.push(RigidBody {
            id: 7,
            position: Vector3::new(1.0, 2.0, 3.0),
            orientation: Quaternion::IDENTITY,
            markers: Vec::new(),
            mean_error: Some(0.001),
            tracking_valid: Some(true),
        });
        frame.marker_sets.push(MarkerSet { name: "wand".to_string(), markers: vec![] });

        assert_eq!(frame.rigid_body(7).map(|rb| rb.position.y), Some(2.0));
        assert!(frame.rigid_body(8).is_none());
        assert!(frame.marker_set("wand").is_some());
        assert!(frame.marker_set("all").is_none());
    }
}

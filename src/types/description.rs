//! Data descriptions (model definitions)
//!
//! Descriptions tell a consumer what the ids in a [`MoCapFrame`](super::MoCapFrame)
//! refer to: names of rigid bodies and skeleton bones, marker set membership,
//! force plate geometry and so on.

use serde::{Deserialize, Serialize};

use super::{Quaternion, Vector3};

/// Description type tags as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptionKind {
    MarkerSet,
    RigidBody,
    Skeleton,
    ForcePlate,
    Device,
    Camera,
    Asset,
}

impl DescriptionKind {
    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(Self::MarkerSet),
            1 => Some(Self::RigidBody),
            2 => Some(Self::Skeleton),
            3 => Some(Self::ForcePlate),
            4 => Some(Self::Device),
            5 => Some(Self::Camera),
            6 => Some(Self::Asset),
            _ => None,
        }
    }

    pub fn tag(self) -> i32 {
        match self {
            Self::MarkerSet => 0,
            Self::RigidBody => 1,
            Self::Skeleton => 2,
            Self::ForcePlate => 3,
            Self::Device => 4,
            Self::Camera => 5,
            Self::Asset => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerSetDescription {
    pub name: String,
    pub marker_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyMarkerDescription {
    /// Present from NatNet 4.0.
    pub name: Option<String>,
    pub offset: Vector3,
    pub active_label: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyDescription {
    /// Present from NatNet 2.0.
    pub name: Option<String>,
    pub id: i32,
    pub parent_id: i32,
    pub offset: Vector3,
    /// Present from NatNet 3.0; empty before.
    pub markers: Vec<RigidBodyMarkerDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkeletonDescription {
    pub name: String,
    pub id: i32,
    pub rigid_bodies: Vec<RigidBodyDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForcePlateDescription {
    pub id: i32,
    pub serial_number: String,
    pub width: f32,
    pub length: f32,
    pub origin: Vector3,
    pub calibration_matrix: [[f32; 12]; 12],
    pub corners: [Vector3; 4],
    pub plate_type: i32,
    pub channel_data_type: i32,
    pub channel_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescription {
    pub id: i32,
    pub name: String,
    pub serial_number: String,
    pub device_type: i32,
    pub channel_data_type: i32,
    pub channel_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDescription {
    pub name: String,
    pub position: Vector3,
    pub orientation: Quaternion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMarkerDescription {
    pub name: String,
    pub id: i32,
    pub position: Vector3,
    pub size: f32,
    pub params: i16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDescription {
    pub name: String,
    pub asset_type: i32,
    pub id: i32,
    pub rigid_bodies: Vec<RigidBodyDescription>,
    pub markers: Vec<AssetMarkerDescription>,
}

/// One entry of a ModelDef message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataDescription {
    MarkerSet(MarkerSetDescription),
    RigidBody(RigidBodyDescription),
    Skeleton(SkeletonDescription),
    ForcePlate(ForcePlateDescription),
    Device(DeviceDescription),
    Camera(CameraDescription),
    Asset(AssetDescription),
}

impl DataDescription {
    pub fn kind(&self) -> DescriptionKind {
        match self {
            Self::MarkerSet(_) => DescriptionKind::MarkerSet,
            Self::RigidBody(_) => DescriptionKind::RigidBody,
            Self::Skeleton(_) => DescriptionKind::Skeleton,
            Self::ForcePlate(_) => DescriptionKind::ForcePlate,
            Self::Device(_) => DescriptionKind::Device,
            Self::Camera(_) => DescriptionKind::Camera,
            Self::Asset(_) => DescriptionKind::Asset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_through_kind() {
        for tag in 0..7 {
            let kind = DescriptionKind::from_tag(tag).expect("known tag");
            assert_eq!(kind.tag(), tag);
        }
        assert_eq!(DescriptionKind::from_tag(7), None);
        assert_eq!(DescriptionKind::from_tag(-1), None);
    }
}

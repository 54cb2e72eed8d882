//! Core types for motion-capture data representation.
//!
//! All records are plain immutable values. The background receiver builds each
//! [`MoCapFrame`] once and hands it to consumers behind an `Arc`, so a frame is
//! shared without copying and never mutated after it leaves the decoder.
//!
//! ## Layout
//!
//! - [`ProtocolVersion`] is the negotiated bitstream version that drives the decoder
//! - [`ServerInfo`] describes the server, produced once per handshake
//! - [`MoCapFrame`] and its nested records are the per-frame snapshot
//! - [`DataDescription`] covers the model definitions (names, hierarchy, geometry)
//!
//! Fields that only exist in some protocol versions are `Option`s: `None` means the
//! negotiated version does not carry the field, never "value unknown".

mod description;
mod frame;
mod server;
mod version;

pub use description::{
    AssetDescription, AssetMarkerDescription, CameraDescription, DataDescription,
    DescriptionKind, DeviceDescription, ForcePlateDescription, MarkerSetDescription,
    RigidBodyDescription, RigidBodyMarkerDescription, SkeletonDescription,
};
pub use frame::{
    AnalogChannel, Asset, AssetMarker, AssetRigidBody, Device, ExposureTimestamps, ForcePlate,
    FrameParams, LabeledMarker, MarkerSet, MoCapFrame, PrecisionTimestamp, Quaternion, RigidBody,
    RigidBodyMarker, Skeleton, Vector3,
};
pub use server::{ServerConnectionInfo, ServerInfo};
pub use version::ProtocolVersion;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_shareable_across_threads() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<MoCapFrame>();
        assert_send_sync_static::<ServerInfo>();
        assert_send_sync_static::<DataDescription>();
    }
}

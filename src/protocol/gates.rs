//! Version gate table
//!
//! Every field or section whose presence depends on the negotiated bitstream
//! version is listed in [`Field`], and [`Field::gate`] is the one place that says
//! which versions carry it. Supporting a new protocol revision starts here: add the
//! field, give it a gate, then teach the codec to read and write it.

use crate::types::ProtocolVersion;

/// Half-open version range `[since, until)` in which a field is on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gate {
    pub since: ProtocolVersion,
    pub until: Option<ProtocolVersion>,
}

impl Gate {
    const fn since(major: u8, minor: u8) -> Self {
        Self { since: ProtocolVersion::new(major, minor), until: None }
    }

    const fn between(since: (u8, u8), until: (u8, u8)) -> Self {
        Self {
            since: ProtocolVersion::new(since.0, since.1),
            until: Some(ProtocolVersion::new(until.0, until.1)),
        }
    }

    pub fn admits(self, version: ProtocolVersion) -> bool {
        version >= self.since && self.until.is_none_or(|until| version < until)
    }
}

/// Version-dependent fields of frame and description payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Byte size after each frame section's element count.
    FrameSectionSize,
    /// Marker positions nested in each rigid body.
    RigidBodyMarkers,
    /// Marker ids and sizes following the nested rigid body marker positions.
    RigidBodyMarkerDetails,
    RigidBodyMeanError,
    RigidBodyTrackingParams,
    SkeletonSection,
    AssetSection,
    LabeledMarkerSection,
    LabeledMarkerParams,
    LabeledMarkerResidual,
    ForcePlateSection,
    DeviceSection,
    Latency,
    /// Frame timestamp widened from f32 to f64.
    DoubleTimestamp,
    ExposureTimestamps,
    PrecisionTimestamp,
    /// Byte size after each description's type tag.
    DescriptionSize,
    RigidBodyDescriptionName,
    RigidBodyDescriptionMarkers,
    RigidBodyDescriptionMarkerNames,
    ForcePlateDescription,
    DeviceDescription,
    CameraDescription,
    AssetDescription,
}

impl Field {
    pub const ALL: [Field; 24] = [
        Field::FrameSectionSize,
        Field::RigidBodyMarkers,
        Field::RigidBodyMarkerDetails,
        Field::RigidBodyMeanError,
        Field::RigidBodyTrackingParams,
        Field::SkeletonSection,
        Field::AssetSection,
        Field::LabeledMarkerSection,
        Field::LabeledMarkerParams,
        Field::LabeledMarkerResidual,
        Field::ForcePlateSection,
        Field::DeviceSection,
        Field::Latency,
        Field::DoubleTimestamp,
        Field::ExposureTimestamps,
        Field::PrecisionTimestamp,
        Field::DescriptionSize,
        Field::RigidBodyDescriptionName,
        Field::RigidBodyDescriptionMarkers,
        Field::RigidBodyDescriptionMarkerNames,
        Field::ForcePlateDescription,
        Field::DeviceDescription,
        Field::CameraDescription,
        Field::AssetDescription,
    ];

    pub const fn gate(self) -> Gate {
        match self {
            Field::FrameSectionSize => Gate::since(4, 1),
            Field::RigidBodyMarkers => Gate::between((1, 0), (3, 0)),
            Field::RigidBodyMarkerDetails => Gate::between((2, 0), (3, 0)),
            Field::RigidBodyMeanError => Gate::since(2, 0),
            Field::RigidBodyTrackingParams => Gate::since(2, 6),
            Field::SkeletonSection => Gate::since(2, 1),
            Field::AssetSection => Gate::since(4, 1),
            Field::LabeledMarkerSection => Gate::since(2, 3),
            Field::LabeledMarkerParams => Gate::since(2, 6),
            Field::LabeledMarkerResidual => Gate::since(3, 0),
            Field::ForcePlateSection => Gate::since(2, 9),
            Field::DeviceSection => Gate::since(2, 11),
            Field::Latency => Gate::between((1, 0), (3, 0)),
            Field::DoubleTimestamp => Gate::since(2, 7),
            Field::ExposureTimestamps => Gate::since(3, 0),
            Field::PrecisionTimestamp => Gate::since(4, 1),
            Field::DescriptionSize => Gate::since(4, 1),
            Field::RigidBodyDescriptionName => Gate::since(2, 0),
            Field::RigidBodyDescriptionMarkers => Gate::since(3, 0),
            Field::RigidBodyDescriptionMarkerNames => Gate::since(4, 0),
            Field::ForcePlateDescription => Gate::since(3, 0),
            Field::DeviceDescription => Gate::since(3, 0),
            Field::CameraDescription => Gate::since(3, 0),
            Field::AssetDescription => Gate::since(4, 1),
        }
    }
}

impl ProtocolVersion {
    /// Whether payloads of this version carry `field`.
    pub fn has(self, field: Field) -> bool {
        field.gate().admits(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(major: u8, minor: u8) -> ProtocolVersion {
        ProtocolVersion::new(major, minor)
    }

    #[test]
    fn legacy_fields_stop_at_three() {
        assert!(v(2, 11).has(Field::Latency));
        assert!(!v(3, 0).has(Field::Latency));
        assert!(v(2, 0).has(Field::RigidBodyMarkers));
        assert!(v(2, 0).has(Field::RigidBodyMarkerDetails));
        assert!(!v(3, 1).has(Field::RigidBodyMarkers));
    }

    #[test]
    fn sections_appear_in_order_of_introduction() {
        let v2_0 = v(2, 0);
        assert!(!v2_0.has(Field::SkeletonSection));
        assert!(!v2_0.has(Field::LabeledMarkerSection));

        assert!(v(2, 1).has(Field::SkeletonSection));
        assert!(v(2, 3).has(Field::LabeledMarkerSection));
        assert!(!v(2, 8).has(Field::ForcePlateSection));
        assert!(v(2, 9).has(Field::ForcePlateSection));
        assert!(!v(2, 10).has(Field::DeviceSection));
        assert!(v(2, 11).has(Field::DeviceSection));
        assert!(!v(4, 0).has(Field::AssetSection));
        assert!(v(4, 1).has(Field::AssetSection));
    }

    #[test]
    fn latest_version_has_every_modern_field() {
        let latest = ProtocolVersion::LATEST;
        let absent: Vec<Field> =
            Field::ALL.iter().copied().filter(|field| !latest.has(*field)).collect();
        assert_eq!(
            absent,
            vec![Field::RigidBodyMarkers, Field::RigidBodyMarkerDetails, Field::Latency]
        );
    }

    #[test]
    fn every_gate_admits_some_supported_version() {
        let supported: Vec<ProtocolVersion> = (2..=4u8)
            .flat_map(|major| (0..=11u8).map(move |minor| v(major, minor)))
            .filter(|version| version.is_supported())
            .collect();

        for field in Field::ALL {
            assert!(
                supported.iter().any(|version| version.has(field)),
                "{field:?} is never on the wire"
            );
        }
    }
}

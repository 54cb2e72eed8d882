//! ModelDef payload codec

use tracing::debug;

use super::cursor::{ByteReader, ByteWriter};
use super::gates::Field;
use crate::types::{
    AssetDescription, AssetMarkerDescription, CameraDescription, DataDescription, DescriptionKind,
    DeviceDescription, ForcePlateDescription, MarkerSetDescription, ProtocolVersion,
    RigidBodyDescription, RigidBodyMarkerDescription, SkeletonDescription, Vector3,
};
use crate::{NatNetError, Result};

const MIN_DESCRIPTION: usize = 4;
const MIN_RIGID_BODY_DESCRIPTION: usize = 20;
const MIN_ASSET_MARKER: usize = 23;
const CALIBRATION_ROWS: usize = 12;

/// Version gate of a description type, `None` for types every version carries.
fn kind_gate(kind: DescriptionKind) -> Option<Field> {
    match kind {
        DescriptionKind::MarkerSet | DescriptionKind::RigidBody | DescriptionKind::Skeleton => None,
        DescriptionKind::ForcePlate => Some(Field::ForcePlateDescription),
        DescriptionKind::Device => Some(Field::DeviceDescription),
        DescriptionKind::Camera => Some(Field::CameraDescription),
        DescriptionKind::Asset => Some(Field::AssetDescription),
    }
}

pub(crate) fn decode_descriptions(
    reader: &mut ByteReader<'_>,
    version: ProtocolVersion,
) -> Result<Vec<DataDescription>> {
    reader.section("data descriptions");
    let count = reader.count(MIN_DESCRIPTION)?;
    let mut descriptions = Vec::with_capacity(count);

    for _ in 0..count {
        reader.section("data descriptions");
        let tag = reader.i32()?;
        let declared = if version.has(Field::DescriptionSize) {
            let size = reader.i32()?;
            Some(usize::try_from(size).map_err(|_| {
                NatNetError::malformed(format!("negative size {size} for description type {tag}"))
            })?)
        } else {
            None
        };

        let Some(kind) = DescriptionKind::from_tag(tag) else {
            match declared {
                Some(size) => {
                    debug!(tag, size, "skipping unknown data description");
                    reader.take(size)?;
                    continue;
                }
                None => {
                    return Err(NatNetError::unsupported_version(
                        version,
                        format!("unknown data description type {tag}"),
                    ));
                }
            }
        };

        if let Some(field) = kind_gate(kind)
            && !version.has(field)
        {
            return Err(NatNetError::unsupported_version(
                version,
                format!("{kind:?} descriptions require NatNet {}", field.gate().since),
            ));
        }

        let start = reader.position();
        let description = read_description(reader, kind, version)?;
        if let Some(size) = declared {
            let consumed = reader.position() - start;
            if consumed != size {
                return Err(NatNetError::unsupported_version(
                    version,
                    format!("{kind:?} description declared {size} bytes but {consumed} were decoded"),
                ));
            }
        }
        descriptions.push(description);
    }

    Ok(descriptions)
}

fn read_description(
    reader: &mut ByteReader<'_>,
    kind: DescriptionKind,
    version: ProtocolVersion,
) -> Result<DataDescription> {
    Ok(match kind {
        DescriptionKind::MarkerSet => {
            reader.section("marker set description");
            let name = reader.cstring()?;
            let marker_names = read_names(reader)?;
            DataDescription::MarkerSet(MarkerSetDescription { name, marker_names })
        }
        DescriptionKind::RigidBody => DataDescription::RigidBody(read_rigid_body(reader, version)?),
        DescriptionKind::Skeleton => {
            reader.section("skeleton description");
            let name = reader.cstring()?;
            let id = reader.i32()?;
            let count = reader.count(MIN_RIGID_BODY_DESCRIPTION)?;
            let rigid_bodies =
                (0..count).map(|_| read_rigid_body(reader, version)).collect::<Result<_>>()?;
            DataDescription::Skeleton(SkeletonDescription { name, id, rigid_bodies })
        }
        DescriptionKind::ForcePlate => {
            reader.section("force plate description");
            let id = reader.i32()?;
            let serial_number = reader.cstring()?;
            let width = reader.f32()?;
            let length = reader.f32()?;
            let origin = reader.vector3()?;
            let mut calibration_matrix = [[0.0f32; CALIBRATION_ROWS]; CALIBRATION_ROWS];
            for row in calibration_matrix.iter_mut() {
                for cell in row.iter_mut() {
                    *cell = reader.f32()?;
                }
            }
            let mut corners = [Vector3::default(); 4];
            for corner in corners.iter_mut() {
                *corner = reader.vector3()?;
            }
            DataDescription::ForcePlate(ForcePlateDescription {
                id,
                serial_number,
                width,
                length,
                origin,
                calibration_matrix,
                corners,
                plate_type: reader.i32()?,
                channel_data_type: reader.i32()?,
                channel_names: read_names(reader)?,
            })
        }
        DescriptionKind::Device => {
            reader.section("device description");
            DataDescription::Device(DeviceDescription {
                id: reader.i32()?,
                name: reader.cstring()?,
                serial_number: reader.cstring()?,
                device_type: reader.i32()?,
                channel_data_type: reader.i32()?,
                channel_names: read_names(reader)?,
            })
        }
        DescriptionKind::Camera => {
            reader.section("camera description");
            DataDescription::Camera(CameraDescription {
                name: reader.cstring()?,
                position: reader.vector3()?,
                orientation: reader.quaternion()?,
            })
        }
        DescriptionKind::Asset => {
            reader.section("asset description");
            let name = reader.cstring()?;
            let asset_type = reader.i32()?;
            let id = reader.i32()?;
            let count = reader.count(MIN_RIGID_BODY_DESCRIPTION)?;
            let rigid_bodies =
                (0..count).map(|_| read_rigid_body(reader, version)).collect::<Result<_>>()?;
            reader.section("asset description");
            let count = reader.count(MIN_ASSET_MARKER)?;
            let mut markers = Vec::with_capacity(count);
            for _ in 0..count {
                markers.push(AssetMarkerDescription {
                    name: reader.cstring()?,
                    id: reader.i32()?,
                    position: reader.vector3()?,
                    size: reader.f32()?,
                    params: reader.i16()?,
                });
            }
            DataDescription::Asset(AssetDescription { name, asset_type, id, rigid_bodies, markers })
        }
    })
}

fn read_rigid_body(reader: &mut ByteReader<'_>, version: ProtocolVersion) -> Result<RigidBodyDescription> {
    reader.section("rigid body description");
    let name = version.has(Field::RigidBodyDescriptionName).then(|| reader.cstring()).transpose()?;
    let id = reader.i32()?;
    let parent_id = reader.i32()?;
    let offset = reader.vector3()?;

    let mut markers = Vec::new();
    if version.has(Field::RigidBodyDescriptionMarkers) {
        let count = reader.count(16)?;
        let offsets = (0..count).map(|_| reader.vector3()).collect::<Result<Vec<_>>>()?;
        let labels = (0..count).map(|_| reader.i32()).collect::<Result<Vec<_>>>()?;
        let names = if version.has(Field::RigidBodyDescriptionMarkerNames) {
            (0..count).map(|_| reader.cstring().map(Some)).collect::<Result<Vec<_>>>()?
        } else {
            vec![None; count]
        };
        markers = offsets
            .into_iter()
            .zip(labels)
            .zip(names)
            .map(|((offset, active_label), name)| RigidBodyMarkerDescription {
                name,
                offset,
                active_label,
            })
            .collect();
    }

    Ok(RigidBodyDescription { name, id, parent_id, offset, markers })
}

fn read_names(reader: &mut ByteReader<'_>) -> Result<Vec<String>> {
    let count = reader.count(1)?;
    (0..count).map(|_| reader.cstring()).collect()
}

pub(crate) fn encode_descriptions(
    writer: &mut ByteWriter,
    descriptions: &[DataDescription],
    version: ProtocolVersion,
) -> Result<()> {
    writer.count(descriptions.len())?;
    for description in descriptions {
        let kind = description.kind();
        if let Some(field) = kind_gate(kind)
            && !version.has(field)
        {
            return Err(NatNetError::unsupported_version(
                version,
                format!("{kind:?} descriptions cannot be encoded before NatNet {}", field.gate().since),
            ));
        }

        writer.i32(kind.tag());
        let slot = version.has(Field::DescriptionSize).then(|| writer.begin_sized());
        write_description(writer, description, version)?;
        if let Some(slot) = slot {
            writer.end_sized(slot)?;
        }
    }
    Ok(())
}

fn write_description(
    writer: &mut ByteWriter,
    description: &DataDescription,
    version: ProtocolVersion,
) -> Result<()> {
    match description {
        DataDescription::MarkerSet(set) => {
            writer.cstring(&set.name)?;
            write_names(writer, &set.marker_names)
        }
        DataDescription::RigidBody(rb) => write_rigid_body(writer, rb, version),
        DataDescription::Skeleton(skeleton) => {
            writer.cstring(&skeleton.name)?;
            writer.i32(skeleton.id);
            writer.count(skeleton.rigid_bodies.len())?;
            skeleton.rigid_bodies.iter().try_for_each(|rb| write_rigid_body(writer, rb, version))
        }
        DataDescription::ForcePlate(plate) => {
            writer.i32(plate.id);
            writer.cstring(&plate.serial_number)?;
            writer.f32(plate.width);
            writer.f32(plate.length);
            writer.vector3(plate.origin);
            plate.calibration_matrix.iter().flatten().for_each(|cell| writer.f32(*cell));
            plate.corners.iter().for_each(|corner| writer.vector3(*corner));
            writer.i32(plate.plate_type);
            writer.i32(plate.channel_data_type);
            write_names(writer, &plate.channel_names)
        }
        DataDescription::Device(device) => {
            writer.i32(device.id);
            writer.cstring(&device.name)?;
            writer.cstring(&device.serial_number)?;
            writer.i32(device.device_type);
            writer.i32(device.channel_data_type);
            write_names(writer, &device.channel_names)
        }
        DataDescription::Camera(camera) => {
            writer.cstring(&camera.name)?;
            writer.vector3(camera.position);
            writer.quaternion(camera.orientation);
            Ok(())
        }
        DataDescription::Asset(asset) => {
            writer.cstring(&asset.name)?;
            writer.i32(asset.asset_type);
            writer.i32(asset.id);
            writer.count(asset.rigid_bodies.len())?;
            for rb in &asset.rigid_bodies {
                write_rigid_body(writer, rb, version)?;
            }
            writer.count(asset.markers.len())?;
            for marker in &asset.markers {
                writer.cstring(&marker.name)?;
                writer.i32(marker.id);
                writer.vector3(marker.position);
                writer.f32(marker.size);
                writer.i16(marker.params);
            }
            Ok(())
        }
    }
}

fn write_rigid_body(
    writer: &mut ByteWriter,
    rb: &RigidBodyDescription,
    version: ProtocolVersion,
) -> Result<()> {
    if version.has(Field::RigidBodyDescriptionName) {
        writer.cstring(rb.name.as_deref().unwrap_or_default())?;
    }
    writer.i32(rb.id);
    writer.i32(rb.parent_id);
    writer.vector3(rb.offset);

    if version.has(Field::RigidBodyDescriptionMarkers) {
        writer.count(rb.markers.len())?;
        rb.markers.iter().for_each(|m| writer.vector3(m.offset));
        rb.markers.iter().for_each(|m| writer.i32(m.active_label));
        if version.has(Field::RigidBodyDescriptionMarkerNames) {
            for marker in &rb.markers {
                writer.cstring(marker.name.as_deref().unwrap_or_default())?;
            }
        }
    } else if !rb.markers.is_empty() {
        return Err(NatNetError::unsupported_version(
            version,
            "rigid body marker descriptions require NatNet 3.0",
        ));
    }
    Ok(())
}

fn write_names(writer: &mut ByteWriter, names: &[String]) -> Result<()> {
    writer.count(names.len())?;
    names.iter().try_for_each(|name| writer.cstring(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_descriptions;

    fn v(major: u8, minor: u8) -> ProtocolVersion {
        ProtocolVersion::new(major, minor)
    }

    fn encode(descriptions: &[DataDescription], version: ProtocolVersion) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        encode_descriptions(&mut writer, descriptions, version).expect("descriptions encode");
        writer.into_inner()
    }

    fn decode(payload: &[u8], version: ProtocolVersion) -> Result<Vec<DataDescription>> {
        decode_descriptions(&mut ByteReader::new(payload), version)
    }

    #[test]
    fn sample_descriptions_survive_every_layout() {
        for version in [v(2, 0), v(2, 11), v(3, 0), v(4, 0), v(4, 1)] {
            let descriptions = sample_descriptions(version);
            let decoded = decode(&encode(&descriptions, version), version)
                .unwrap_or_else(|e| panic!("decode at {version} failed: {e}"));
            assert_eq!(decoded, descriptions, "mismatch at {version}");
        }
    }

    #[test]
    fn newest_layout_carries_every_kind() {
        let kinds: Vec<DescriptionKind> =
            sample_descriptions(v(4, 1)).iter().map(DataDescription::kind).collect();
        for tag in 0..7 {
            let kind = DescriptionKind::from_tag(tag).expect("known tag");
            assert!(kinds.contains(&kind), "{kind:?} missing from fixture");
        }
    }

    #[test]
    fn unknown_kind_is_skipped_when_sized() {
        let version = v(4, 1);
        let mut writer = ByteWriter::new();
        writer.i32(2);
        writer.i32(42);
        let slot = writer.begin_sized();
        writer.bytes(&[0xAB; 10]);
        writer.end_sized(slot).expect("size fits");
        writer.i32(DescriptionKind::MarkerSet.tag());
        let slot = writer.begin_sized();
        writer.cstring("wand").expect("name");
        writer.i32(0);
        writer.end_sized(slot).expect("size fits");

        let decoded = decode(&writer.into_inner(), version).expect("decodes");
        assert_eq!(
            decoded,
            vec![DataDescription::MarkerSet(MarkerSetDescription {
                name: "wand".to_string(),
                marker_names: Vec::new(),
            })]
        );
    }

    #[test]
    fn unknown_kind_without_size_is_a_version_error() {
        let mut writer = ByteWriter::new();
        writer.i32(1);
        writer.i32(42);
        writer.bytes(&[0; 8]);
        assert!(matches!(
            decode(&writer.into_inner(), v(3, 0)),
            Err(NatNetError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn camera_description_before_three_is_rejected() {
        let mut writer = ByteWriter::new();
        writer.i32(1);
        writer.i32(DescriptionKind::Camera.tag());
        writer.cstring("Cam 1").expect("name");
        writer.bytes(&[0; 28]);
        assert!(matches!(
            decode(&writer.into_inner(), v(2, 11)),
            Err(NatNetError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn truncated_descriptions_fail_cleanly() {
        let version = v(4, 1);
        let payload = encode(&sample_descriptions(version), version);
        for cut in 0..payload.len() {
            assert!(decode(&payload[..cut], version).is_err(), "prefix of {cut} bytes decoded");
        }
    }
}

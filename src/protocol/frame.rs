//! FrameOfData payload codec
//!
//! Sections are read in wire order. Each section starts with its element count;
//! NatNet 4.1 follows the count with the section's byte size, which is checked
//! against what the section actually consumed so a layout mismatch surfaces as
//! [`NatNetError::UnsupportedVersion`] instead of garbage values further on.

use tracing::trace;

use super::cursor::{ByteReader, ByteWriter};
use super::gates::Field;
use crate::types::{
    AnalogChannel, Asset, AssetMarker, AssetRigidBody, Device, ExposureTimestamps, ForcePlate,
    FrameParams, LabeledMarker, MarkerSet, MoCapFrame, PrecisionTimestamp, ProtocolVersion,
    RigidBody, RigidBodyMarker, Skeleton,
};
use crate::{NatNetError, Result};

const TRACKING_VALID: i16 = 0x01;
const END_OF_DATA_LEN: usize = 4;

// Smallest possible encoding of one element, used to bound element counts.
const MIN_MARKER_SET: usize = 5;
const VECTOR3: usize = 12;
const MIN_RIGID_BODY: usize = 32;
const MIN_SKELETON: usize = 8;
const MIN_ASSET: usize = 12;
const ASSET_RIGID_BODY: usize = 38;
const ASSET_MARKER: usize = 26;
const MIN_LABELED_MARKER: usize = 20;
const MIN_ANALOG_DEVICE: usize = 8;
const F32: usize = 4;

pub(crate) fn decode_frame(reader: &mut ByteReader<'_>, version: ProtocolVersion) -> Result<MoCapFrame> {
    reader.section("frame number");
    let mut frame = MoCapFrame::empty(reader.i32()?);

    frame.marker_sets = read_section(reader, version, "marker sets", MIN_MARKER_SET, |r| {
        let name = r.cstring()?;
        let count = r.count(VECTOR3)?;
        let markers = (0..count).map(|_| r.vector3()).collect::<Result<_>>()?;
        Ok(MarkerSet { name, markers })
    })?;

    frame.unlabeled_markers =
        read_section(reader, version, "unlabeled markers", VECTOR3, |r| r.vector3())?;

    frame.rigid_bodies =
        read_section(reader, version, "rigid bodies", MIN_RIGID_BODY, |r| read_rigid_body(r, version))?;

    if version.has(Field::SkeletonSection) {
        frame.skeletons = read_section(reader, version, "skeletons", MIN_SKELETON, |r| {
            let id = r.i32()?;
            r.section("skeleton bones");
            let count = r.count(MIN_RIGID_BODY)?;
            let rigid_bodies =
                (0..count).map(|_| read_rigid_body(r, version)).collect::<Result<_>>()?;
            Ok(Skeleton { id, rigid_bodies })
        })?;
    }

    if version.has(Field::AssetSection) {
        frame.assets = read_section(reader, version, "assets", MIN_ASSET, read_asset)?;
    }

    if version.has(Field::LabeledMarkerSection) {
        frame.labeled_markers =
            read_section(reader, version, "labeled markers", MIN_LABELED_MARKER, |r| {
                Ok(LabeledMarker {
                    id: r.i32()?,
                    position: r.vector3()?,
                    size: r.f32()?,
                    params: version.has(Field::LabeledMarkerParams).then(|| r.i16()).transpose()?,
                    residual: version
                        .has(Field::LabeledMarkerResidual)
                        .then(|| r.f32())
                        .transpose()?,
                })
            })?;
    }

    if version.has(Field::ForcePlateSection) {
        frame.force_plates = read_section(reader, version, "force plates", MIN_ANALOG_DEVICE, |r| {
            Ok(ForcePlate { id: r.i32()?, channels: read_channels(r)? })
        })?;
    }

    if version.has(Field::DeviceSection) {
        frame.devices = read_section(reader, version, "devices", MIN_ANALOG_DEVICE, |r| {
            Ok(Device { id: r.i32()?, channels: read_channels(r)? })
        })?;
    }

    read_suffix(reader, version, &mut frame)?;

    trace!(
        frame = frame.frame_number,
        rigid_bodies = frame.rigid_bodies.len(),
        labeled_markers = frame.labeled_markers.len(),
        "decoded frame"
    );
    Ok(frame)
}

fn read_section<'a, T>(
    reader: &mut ByteReader<'a>,
    version: ProtocolVersion,
    name: &'static str,
    min_element_size: usize,
    mut element: impl FnMut(&mut ByteReader<'a>) -> Result<T>,
) -> Result<Vec<T>> {
    reader.section(name);
    let count = reader.count(min_element_size)?;
    let declared = if version.has(Field::FrameSectionSize) { Some(reader.i32()?) } else { None };

    let start = reader.position();
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(element(reader)?);
        reader.section(name);
    }

    if let Some(declared) = declared {
        let consumed = reader.position() - start;
        if usize::try_from(declared).ok() != Some(consumed) {
            return Err(NatNetError::unsupported_version(
                version,
                format!("{name} declared {declared} bytes but {consumed} were decoded"),
            ));
        }
    }
    Ok(items)
}

fn read_rigid_body(reader: &mut ByteReader<'_>, version: ProtocolVersion) -> Result<RigidBody> {
    let id = reader.i32()?;
    let position = reader.vector3()?;
    let orientation = reader.quaternion()?;

    let mut markers = Vec::new();
    if version.has(Field::RigidBodyMarkers) {
        let count = reader.count(VECTOR3)?;
        let positions = (0..count).map(|_| reader.vector3()).collect::<Result<Vec<_>>>()?;
        if version.has(Field::RigidBodyMarkerDetails) {
            let ids = (0..count).map(|_| reader.i32()).collect::<Result<Vec<_>>>()?;
            let sizes = (0..count).map(|_| reader.f32()).collect::<Result<Vec<_>>>()?;
            markers = positions
                .into_iter()
                .zip(ids.into_iter().zip(sizes))
                .map(|(position, (id, size))| RigidBodyMarker {
                    position,
                    id: Some(id),
                    size: Some(size),
                })
                .collect();
        } else {
            markers = positions
                .into_iter()
                .map(|position| RigidBodyMarker { position, id: None, size: None })
                .collect();
        }
    }

    let mean_error = version.has(Field::RigidBodyMeanError).then(|| reader.f32()).transpose()?;
    let tracking_valid = version
        .has(Field::RigidBodyTrackingParams)
        .then(|| reader.i16().map(|params| params & TRACKING_VALID != 0))
        .transpose()?;

    Ok(RigidBody { id, position, orientation, markers, mean_error, tracking_valid })
}

fn read_asset(reader: &mut ByteReader<'_>) -> Result<Asset> {
    let id = reader.i32()?;

    reader.section("asset rigid bodies");
    let count = reader.count(ASSET_RIGID_BODY)?;
    let mut rigid_bodies = Vec::with_capacity(count);
    for _ in 0..count {
        rigid_bodies.push(AssetRigidBody {
            id: reader.i32()?,
            position: reader.vector3()?,
            orientation: reader.quaternion()?,
            mean_error: reader.f32()?,
            params: reader.i16()?,
        });
    }

    reader.section("asset markers");
    let count = reader.count(ASSET_MARKER)?;
    let mut markers = Vec::with_capacity(count);
    for _ in 0..count {
        markers.push(AssetMarker {
            id: reader.i32()?,
            position: reader.vector3()?,
            size: reader.f32()?,
            params: reader.i16()?,
            residual: reader.f32()?,
        });
    }

    Ok(Asset { id, rigid_bodies, markers })
}

fn read_channels(reader: &mut ByteReader<'_>) -> Result<Vec<AnalogChannel>> {
    let channels = reader.count(F32)?;
    let mut out = Vec::with_capacity(channels);
    for _ in 0..channels {
        let samples = reader.count(F32)?;
        let samples = (0..samples).map(|_| reader.f32()).collect::<Result<_>>()?;
        out.push(AnalogChannel { samples });
    }
    Ok(out)
}

fn read_suffix(
    reader: &mut ByteReader<'_>,
    version: ProtocolVersion,
    frame: &mut MoCapFrame,
) -> Result<()> {
    reader.section("frame suffix");
    frame.latency = version.has(Field::Latency).then(|| reader.f32()).transpose()?;
    frame.timecode = reader.u32()?;
    frame.timecode_subframe = reader.u32()?;
    frame.timestamp = if version.has(Field::DoubleTimestamp) {
        reader.f64()?
    } else {
        f64::from(reader.f32()?)
    };

    if version.has(Field::ExposureTimestamps) {
        frame.exposure_timestamps = Some(ExposureTimestamps {
            camera_mid_exposure: reader.u64()?,
            data_received: reader.u64()?,
            transmit: reader.u64()?,
        });
    }
    if version.has(Field::PrecisionTimestamp) {
        frame.precision_timestamp =
            Some(PrecisionTimestamp { seconds: reader.u32()?, fraction: reader.u32()? });
    }
    frame.params = FrameParams(reader.i16()?);

    match reader.remaining() {
        0 => Ok(()),
        END_OF_DATA_LEN => {
            reader.i32()?;
            Ok(())
        }
        residue => Err(NatNetError::unsupported_version(
            version,
            format!("{residue} unexpected bytes after the frame params"),
        )),
    }
}

pub(crate) fn encode_frame(
    writer: &mut ByteWriter,
    frame: &MoCapFrame,
    version: ProtocolVersion,
) -> Result<()> {
    writer.i32(frame.frame_number);

    write_section(writer, version, &frame.marker_sets, |w, set| {
        w.cstring(&set.name)?;
        w.count(set.markers.len())?;
        set.markers.iter().for_each(|m| w.vector3(*m));
        Ok(())
    })?;

    write_section(writer, version, &frame.unlabeled_markers, |w, marker| {
        w.vector3(*marker);
        Ok(())
    })?;

    write_section(writer, version, &frame.rigid_bodies, |w, rb| write_rigid_body(w, rb, version))?;

    write_gated_section(writer, version, Field::SkeletonSection, "skeletons", &frame.skeletons, |w, s| {
        w.i32(s.id);
        w.count(s.rigid_bodies.len())?;
        s.rigid_bodies.iter().try_for_each(|rb| write_rigid_body(w, rb, version))
    })?;

    write_gated_section(writer, version, Field::AssetSection, "assets", &frame.assets, write_asset)?;

    write_gated_section(
        writer,
        version,
        Field::LabeledMarkerSection,
        "labeled markers",
        &frame.labeled_markers,
        |w, marker| {
            w.i32(marker.id);
            w.vector3(marker.position);
            w.f32(marker.size);
            if version.has(Field::LabeledMarkerParams) {
                w.i16(marker.params.unwrap_or_default());
            }
            if version.has(Field::LabeledMarkerResidual) {
                w.f32(marker.residual.unwrap_or_default());
            }
            Ok(())
        },
    )?;

    write_gated_section(
        writer,
        version,
        Field::ForcePlateSection,
        "force plates",
        &frame.force_plates,
        |w, plate| {
            w.i32(plate.id);
            write_channels(w, &plate.channels)
        },
    )?;

    write_gated_section(writer, version, Field::DeviceSection, "devices", &frame.devices, |w, d| {
        w.i32(d.id);
        write_channels(w, &d.channels)
    })?;

    if version.has(Field::Latency) {
        writer.f32(frame.latency.unwrap_or_default());
    }
    writer.u32(frame.timecode);
    writer.u32(frame.timecode_subframe);
    if version.has(Field::DoubleTimestamp) {
        writer.f64(frame.timestamp);
    } else {
        writer.f32(frame.timestamp as f32);
    }
    if version.has(Field::ExposureTimestamps) {
        let stamps = frame.exposure_timestamps.unwrap_or(ExposureTimestamps {
            camera_mid_exposure: 0,
            data_received: 0,
            transmit: 0,
        });
        writer.u64(stamps.camera_mid_exposure);
        writer.u64(stamps.data_received);
        writer.u64(stamps.transmit);
    }
    if version.has(Field::PrecisionTimestamp) {
        let stamp = frame.precision_timestamp.unwrap_or(PrecisionTimestamp { seconds: 0, fraction: 0 });
        writer.u32(stamp.seconds);
        writer.u32(stamp.fraction);
    }
    writer.i16(frame.params.0);
    writer.i32(0);
    Ok(())
}

fn write_section<T>(
    writer: &mut ByteWriter,
    version: ProtocolVersion,
    items: &[T],
    mut element: impl FnMut(&mut ByteWriter, &T) -> Result<()>,
) -> Result<()> {
    writer.count(items.len())?;
    let slot = version.has(Field::FrameSectionSize).then(|| writer.begin_sized());
    for item in items {
        element(writer, item)?;
    }
    match slot {
        Some(slot) => writer.end_sized(slot),
        None => Ok(()),
    }
}

fn write_gated_section<T>(
    writer: &mut ByteWriter,
    version: ProtocolVersion,
    field: Field,
    name: &str,
    items: &[T],
    element: impl FnMut(&mut ByteWriter, &T) -> Result<()>,
) -> Result<()> {
    if version.has(field) {
        write_section(writer, version, items, element)
    } else if items.is_empty() {
        Ok(())
    } else {
        Err(NatNetError::unsupported_version(
            version,
            format!("{name} cannot be encoded before NatNet {}", field.gate().since),
        ))
    }
}

fn write_rigid_body(writer: &mut ByteWriter, rb: &RigidBody, version: ProtocolVersion) -> Result<()> {
    writer.i32(rb.id);
    writer.vector3(rb.position);
    writer.quaternion(rb.orientation);

    if version.has(Field::RigidBodyMarkers) {
        writer.count(rb.markers.len())?;
        rb.markers.iter().for_each(|m| writer.vector3(m.position));
        if version.has(Field::RigidBodyMarkerDetails) {
            rb.markers.iter().for_each(|m| writer.i32(m.id.unwrap_or_default()));
            rb.markers.iter().for_each(|m| writer.f32(m.size.unwrap_or_default()));
        }
    } else if !rb.markers.is_empty() {
        return Err(NatNetError::unsupported_version(
            version,
            "rigid body markers are not streamed from NatNet 3.0",
        ));
    }

    if version.has(Field::RigidBodyMeanError) {
        writer.f32(rb.mean_error.unwrap_or_default());
    }
    if version.has(Field::RigidBodyTrackingParams) {
        writer.i16(if rb.tracking_valid.unwrap_or(false) { TRACKING_VALID } else { 0 });
    }
    Ok(())
}

fn write_asset(writer: &mut ByteWriter, asset: &Asset) -> Result<()> {
    writer.i32(asset.id);
    writer.count(asset.rigid_bodies.len())?;
    for rb in &asset.rigid_bodies {
        writer.i32(rb.id);
        writer.vector3(rb.position);
        writer.quaternion(rb.orientation);
        writer.f32(rb.mean_error);
        writer.i16(rb.params);
    }
    writer.count(asset.markers.len())?;
    for marker in &asset.markers {
        writer.i32(marker.id);
        writer.vector3(marker.position);
        writer.f32(marker.size);
        writer.i16(marker.params);
        writer.f32(marker.residual);
    }
    Ok(())
}

fn write_channels(writer: &mut ByteWriter, channels: &[AnalogChannel]) -> Result<()> {
    writer.count(channels.len())?;
    for channel in channels {
        writer.count(channel.samples.len())?;
        channel.samples.iter().for_each(|s| writer.f32(*s));
    }
    Ok(())
}

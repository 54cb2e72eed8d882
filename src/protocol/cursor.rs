//! Bounds-checked little-endian cursors over packet payloads

use crate::types::{Quaternion, Vector3};
use crate::{NatNetError, Result};

/// Reads little-endian values from a payload, never past its end.
///
/// The cursor carries the name of the section being decoded so truncation errors
/// point at the part of the packet that ran out.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    section: &'static str,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, section: "payload" }
    }

    pub fn section(&mut self, name: &'static str) {
        self.section = name;
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(NatNetError::truncated(self.section, len, self.remaining()));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    pub fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    pub fn vector3(&mut self) -> Result<Vector3> {
        Ok(Vector3::new(self.f32()?, self.f32()?, self.f32()?))
    }

    pub fn quaternion(&mut self) -> Result<Quaternion> {
        Ok(Quaternion::new(self.f32()?, self.f32()?, self.f32()?, self.f32()?))
    }

    /// Element count followed by at least `min_element_size` bytes per element.
    ///
    /// Rejects negative counts and counts the remaining bytes cannot possibly hold,
    /// so a corrupt count never drives a huge allocation.
    pub fn count(&mut self, min_element_size: usize) -> Result<usize> {
        let raw = self.i32()?;
        let count = usize::try_from(raw).map_err(|_| {
            NatNetError::malformed(format!("negative element count {raw} in {}", self.section))
        })?;
        let needed = count.saturating_mul(min_element_size);
        if needed > self.remaining() {
            return Err(NatNetError::truncated(self.section, needed, self.remaining()));
        }
        Ok(count)
    }

    /// NUL-terminated string; the terminator is consumed.
    pub fn cstring(&mut self) -> Result<String> {
        let rest = &self.data[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| NatNetError::truncated(self.section, rest.len() + 1, rest.len()))?;
        let text = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += end + 1;
        Ok(text)
    }

    /// Fixed-width, NUL-padded string field.
    pub fn fixed_string(&mut self, width: usize) -> Result<String> {
        let field = self.take(width)?;
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        Ok(String::from_utf8_lossy(&field[..end]).into_owned())
    }
}

/// Appends little-endian values to a payload buffer.
#[derive(Default)]
pub(crate) struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn i16(&mut self, value: i16) {
        self.bytes(&value.to_le_bytes());
    }

    pub fn u16(&mut self, value: u16) {
        self.bytes(&value.to_le_bytes());
    }

    pub fn i32(&mut self, value: i32) {
        self.bytes(&value.to_le_bytes());
    }

    pub fn u32(&mut self, value: u32) {
        self.bytes(&value.to_le_bytes());
    }

    pub fn u64(&mut self, value: u64) {
        self.bytes(&value.to_le_bytes());
    }

    pub fn f32(&mut self, value: f32) {
        self.bytes(&value.to_le_bytes());
    }

    pub fn f64(&mut self, value: f64) {
        self.bytes(&value.to_le_bytes());
    }

    pub fn vector3(&mut self, value: Vector3) {
        self.f32(value.x);
        self.f32(value.y);
        self.f32(value.z);
    }

    pub fn quaternion(&mut self, value: Quaternion) {
        self.f32(value.x);
        self.f32(value.y);
        self.f32(value.z);
        self.f32(value.w);
    }

    pub fn count(&mut self, count: usize) -> Result<()> {
        let count = i32::try_from(count)
            .map_err(|_| NatNetError::malformed(format!("element count {count} exceeds i32")))?;
        self.i32(count);
        Ok(())
    }

    pub fn cstring(&mut self, text: &str) -> Result<()> {
        if text.as_bytes().contains(&0) {
            return Err(NatNetError::malformed("string contains an interior NUL byte"));
        }
        self.bytes(text.as_bytes());
        self.u8(0);
        Ok(())
    }

    /// Writes `text` NUL-padded to `width` bytes; at least one NUL must fit.
    pub fn fixed_string(&mut self, text: &str, width: usize) -> Result<()> {
        let bytes = text.as_bytes();
        if bytes.len() >= width {
            return Err(NatNetError::malformed(format!(
                "string of {} bytes does not fit a {width}-byte field",
                bytes.len()
            )));
        }
        self.bytes(bytes);
        self.buf.resize(self.buf.len() + width - bytes.len(), 0);
        Ok(())
    }

    /// Reserves a 4-byte size slot; pair with [`ByteWriter::end_sized`].
    pub fn begin_sized(&mut self) -> usize {
        let slot = self.buf.len();
        self.i32(0);
        slot
    }

    /// Back-fills the slot with the number of bytes written after it.
    pub fn end_sized(&mut self, slot: usize) -> Result<()> {
        let size = self.buf.len() - slot - 4;
        let size = i32::try_from(size)
            .map_err(|_| NatNetError::malformed(format!("section of {size} bytes exceeds i32")))?;
        self.buf[slot..slot + 4].copy_from_slice(&size.to_le_bytes());
        Ok(())
    }
}

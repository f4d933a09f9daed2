// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bit-level access to tile data.
//!
//! Samples are stored most significant bit first. A cursor keeps three
//! anchors (tile, row and pixel start) so padding can be computed relative
//! to the structure that is being aligned.

use bitreader::BitReader;
use log::warn;

use crate::image::Plane;
use crate::interleave::ChannelEntry;
use crate::{Error, Result};

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Anchors {
    pub(crate) pixel: u64,
    pub(crate) row: u64,
    pub(crate) tile: u64,
}

/// Reverse the order of the low `bytes` bytes of `value`.
fn swap_bytes(value: u64, bytes: u64) -> u64 {
    let mut out = 0;
    for i in 0..bytes {
        out = out << 8 | (value >> (8 * i)) & 0xff;
    }
    out
}

fn sample_mask(bits: u16) -> u64 {
    if bits >= 64 { u64::MAX } else { (1 << bits) - 1 }
}

/// Number of padding bits that brings `used_bits` (a whole number of bytes)
/// to a multiple of `align` bytes.
fn padding_bits(used_bits: u64, align: u32) -> u64 {
    if align == 0 {
        return 0;
    }
    let align = u64::from(align);
    let rem = (used_bits / 8) % align;
    if rem == 0 { 0 } else { (align - rem) * 8 }
}

/// Shared position bookkeeping of [`TileDecoder`] and [`TileEncoder`].
///
/// The interleave walkers are written once against this trait; decoding
/// moves bits into planes and encoding moves them out.
pub(crate) trait TileCursor {
    /// Bits consumed (or produced) since the start of the tile data.
    fn position(&self) -> u64;

    /// Skip, or emit as zero, `bits` bits.
    fn pad(&mut self, bits: u64) -> Result<()>;

    /// Move one sample of `entry` between the stream and its plane at `(x, y)`.
    fn transfer(&mut self, entry: &ChannelEntry, x: u32, y: u32) -> Result<()>;

    fn anchors(&mut self) -> &mut Anchors;

    fn skip_to_byte_boundary(&mut self) -> Result<()> {
        match self.position() % 8 {
            0 => Ok(()),
            rem => self.pad(8 - rem),
        }
    }

    fn mark_tile(&mut self) {
        let position = self.position();
        self.anchors().tile = position;
    }

    fn mark_row(&mut self) {
        let position = self.position();
        self.anchors().row = position;
    }

    fn mark_pixel(&mut self) {
        let position = self.position();
        self.anchors().pixel = position;
    }

    /// With a non-zero `pixel_size`, pad the pixel to exactly that many bytes.
    fn align_pixel(&mut self, pixel_size: u32) -> Result<()> {
        if pixel_size == 0 {
            return Ok(());
        }
        self.skip_to_byte_boundary()?;
        let used = (self.position() - self.anchors().pixel) / 8;
        let pixel_size = u64::from(pixel_size);
        if used > pixel_size {
            warn!("{used} byte pixel does not fit pixel_size {pixel_size}");
            return Err(Error::InvalidData("pixel larger than pixel_size"));
        }
        self.pad((pixel_size - used) * 8)
    }

    fn align_row(&mut self, row_align_size: u32) -> Result<()> {
        self.skip_to_byte_boundary()?;
        let used = self.position() - self.anchors().row;
        self.pad(padding_bits(used, row_align_size))
    }

    fn align_tile(&mut self, tile_align_size: u32) -> Result<()> {
        self.skip_to_byte_boundary()?;
        let used = self.position() - self.anchors().tile;
        self.pad(padding_bits(used, tile_align_size))
    }

    /// One component sample, honoring its byte alignment. Unused components
    /// only advance the position.
    fn component(&mut self, entry: &ChannelEntry, x: u32, y: u32) -> Result<()> {
        if entry.component_alignment != 0 {
            self.skip_to_byte_boundary()?;
        }
        if entry.plane.is_some() {
            self.transfer(entry, x, y)
        } else {
            self.pad(entry.field_bits())
        }
    }
}

/// Reads tile data into destination planes.
pub(crate) struct TileDecoder<'a, 'p> {
    reader: BitReader<'a>,
    planes: &'p mut [Plane],
    anchors: Anchors,
}

impl<'a, 'p> TileDecoder<'a, 'p> {
    pub(crate) fn new(data: &'a [u8], planes: &'p mut [Plane]) -> Self {
        Self { reader: BitReader::new(data), planes, anchors: Anchors::default() }
    }
}

impl TileCursor for TileDecoder<'_, '_> {
    fn position(&self) -> u64 {
        self.reader.position()
    }

    fn pad(&mut self, bits: u64) -> Result<()> {
        Ok(self.reader.skip(bits)?)
    }

    fn transfer(&mut self, entry: &ChannelEntry, x: u32, y: u32) -> Result<()> {
        let field = entry.field_bits();
        let raw = self.reader.read_u64(u8::try_from(field)?)?;
        let value = if entry.little_endian { swap_bytes(raw, field / 8) } else { raw };
        let plane = entry
            .plane
            .and_then(|index| self.planes.get_mut(index))
            .ok_or(Error::InvalidData("channel has no plane"))?;
        plane.set_sample(x, y, value & sample_mask(entry.bits_per_sample))
    }

    fn anchors(&mut self) -> &mut Anchors {
        &mut self.anchors
    }
}

/// MSB-first bit sink.
#[derive(Debug, Default)]
pub(crate) struct BitWriter {
    data: Vec<u8>,
    bit_pos: u64,
}

impl BitWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn position(&self) -> u64 {
        self.bit_pos
    }

    pub(crate) fn write_bits(&mut self, value: u64, bits: u64) -> Result<()> {
        for i in (0..bits).rev() {
            let bit = if i >= 64 { 0 } else { (value >> i) & 1 };
            self.write_bit(bit as u8)?;
        }
        Ok(())
    }

    fn write_bit(&mut self, bit: u8) -> Result<()> {
        let shift = 7 - (self.bit_pos % 8) as u8;
        if shift == 7 {
            self.data.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
            self.data.push(0);
        }
        if let Some(last) = self.data.last_mut() {
            *last |= (bit & 1) << shift;
        }
        self.bit_pos += 1;
        Ok(())
    }

    pub(crate) fn zeros(&mut self, bits: u64) -> Result<()> {
        // Whole zero bytes can be appended directly once byte aligned
        let mut bits = bits;
        while bits > 0 && self.bit_pos % 8 != 0 {
            self.write_bit(0)?;
            bits -= 1;
        }
        let bytes = usize::try_from(bits / 8)?;
        self.data.try_reserve(bytes).map_err(|_| Error::OutOfMemory)?;
        self.data.resize(self.data.len() + bytes, 0);
        self.bit_pos += (bits / 8) * 8;
        self.write_bits(0, bits % 8)
    }

    /// Completed bytes; a trailing partial byte is zero-padded.
    pub(crate) fn finish(self) -> Vec<u8> {
        self.data
    }
}

/// Writes plane samples into tile data.
pub(crate) struct TileEncoder<'p> {
    writer: BitWriter,
    planes: &'p [Plane],
    anchors: Anchors,
}

impl<'p> TileEncoder<'p> {
    pub(crate) fn new(planes: &'p [Plane]) -> Self {
        Self { writer: BitWriter::new(), planes, anchors: Anchors::default() }
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.writer.finish()
    }
}

impl TileCursor for TileEncoder<'_> {
    fn position(&self) -> u64 {
        self.writer.position()
    }

    fn pad(&mut self, bits: u64) -> Result<()> {
        self.writer.zeros(bits)
    }

    fn transfer(&mut self, entry: &ChannelEntry, x: u32, y: u32) -> Result<()> {
        let plane = entry
            .plane
            .and_then(|index| self.planes.get(index))
            .ok_or(Error::InvalidData("channel has no plane"))?;
        let value = plane
            .sample(x, y)
            .ok_or(Error::InvalidData("sample outside plane"))?
            & sample_mask(entry.bits_per_sample);
        let field = entry.field_bits();
        let value = if entry.little_endian { swap_bytes(value, field / 8) } else { value };
        self.writer.write_bits(value, field)
    }

    fn anchors(&mut self) -> &mut Anchors {
        &mut self.anchors
    }
}

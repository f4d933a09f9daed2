// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interleave layouts of ISO/IEC 23001-17 § 5.2.2.
//!
//! A [`TileLayout`] knows how large a tile is, where each tile (or component
//! tile) lives in the item data, and in which order samples appear inside a
//! tile. The walkers drive a [`TileCursor`], so the same code decodes and
//! encodes.

use std::convert::TryFrom;

use log::{debug, warn};

use crate::bits::TileCursor;
use crate::image::{Channel, Chroma, PixelImage};
use crate::properties::{ComponentDefinition, InterleaveType, UncompressedConfig};
use crate::{Error, Result, ToU64};

/// The interleave modes that have a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterleaveMode {
    Component,
    Pixel,
    Mixed,
    Row,
    TileComponent,
}

impl TryFrom<InterleaveType> for InterleaveMode {
    type Error = Error;

    fn try_from(interleave: InterleaveType) -> Result<Self> {
        match interleave {
            InterleaveType::Component => Ok(Self::Component),
            InterleaveType::Pixel => Ok(Self::Pixel),
            InterleaveType::Mixed => Ok(Self::Mixed),
            InterleaveType::Row => Ok(Self::Row),
            InterleaveType::TileComponent => Ok(Self::TileComponent),
            InterleaveType::MultiY => Err(Error::Unsupported("multi-y interleave")),
        }
    }
}

/// Per-component decode descriptor, one per `uncC` component in declared
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChannelEntry {
    pub(crate) channel: Option<Channel>,
    /// Destination plane; `None` for components that are skipped.
    pub(crate) plane: Option<usize>,
    pub(crate) bits_per_sample: u16,
    pub(crate) component_alignment: u8,
    pub(crate) little_endian: bool,
    pub(crate) sub_x: u32,
    pub(crate) sub_y: u32,
}

impl ChannelEntry {
    /// Bits one sample occupies in the stream, not counting the byte
    /// alignment that precedes an aligned sample.
    pub(crate) fn field_bits(&self) -> u64 {
        if self.component_alignment != 0 {
            u64::from(self.component_alignment) * 8
        } else {
            u64::from(self.bits_per_sample)
        }
    }

    fn is_chroma(&self) -> bool {
        self.channel.is_some_and(Channel::is_chroma)
    }

    /// Stream position after one sample starting at `pos`.
    fn advance(&self, pos: u64) -> u64 {
        if self.component_alignment != 0 {
            pos.next_multiple_of(8) + self.field_bits()
        } else {
            pos + self.field_bits()
        }
    }
}

/// Build the channel list against the planes already allocated in `image`.
pub(crate) fn build_channel_list(
    config: &UncompressedConfig,
    cmpd: Option<&ComponentDefinition>,
    chroma: Chroma,
    image: &PixelImage,
) -> Result<std::vec::Vec<ChannelEntry>> {
    let channels = crate::chroma::map_components(config, cmpd)?;
    let mut entries = std::vec::Vec::new();
    entries
        .try_reserve_exact(channels.len())
        .map_err(|_| Error::OutOfMemory)?;
    for (component, channel) in config.components.iter().zip(channels) {
        let plane = match channel {
            Some(channel) => Some(
                image
                    .plane_index(channel)
                    .ok_or(Error::InvalidData("no plane for channel"))?,
            ),
            None => None,
        };
        let (sub_x, sub_y) = match channel {
            Some(channel) if channel.is_chroma() => chroma.subsampling(),
            _ => (1, 1),
        };
        entries.push(ChannelEntry {
            channel,
            plane,
            bits_per_sample: component.bit_depth,
            component_alignment: component.align_size,
            little_endian: config.components_little_endian,
            sub_x,
            sub_y,
        });
    }
    Ok(entries)
}

/// Where one decode step finds its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Segment {
    /// `icef` entry when tiles are compressed individually.
    pub(crate) unit_index: usize,
    /// Offset into the uncompressed item data.
    pub(crate) offset: u64,
    pub(crate) size: u64,
    /// Component entry for tile-component interleave; `None` for a whole tile.
    pub(crate) entry: Option<usize>,
}

fn checked(value: Option<u64>) -> Result<u64> {
    value.ok_or(Error::ResourceLimitExceeded("tile size overflow"))
}

fn round_up(bytes: u64, align: u32) -> Result<u64> {
    if align == 0 {
        return Ok(bytes);
    }
    checked(bytes.checked_next_multiple_of(u64::from(align)))
}

/// Bytes of one row holding `repeat` runs of `entries`.
fn run_bytes(entries: &[&ChannelEntry], repeat: u32, row_align_size: u32) -> Result<u64> {
    let mut pos = 0u64;
    for _ in 0..repeat {
        for entry in entries {
            pos = entry.advance(pos);
        }
    }
    round_up(pos.div_ceil(8), row_align_size)
}

#[derive(Debug)]
pub(crate) struct TileLayout {
    mode: InterleaveMode,
    tile_width: u32,
    tile_height: u32,
    tile_columns: u32,
    tile_count: u64,
    pixel_size: u32,
    row_align_size: u32,
    tile_align_size: u32,
    tile_size: u64,
    /// Tile-component interleave only: bytes of one tile of each component.
    component_tile_sizes: std::vec::Vec<u64>,
}

impl TileLayout {
    pub(crate) fn new(config: &UncompressedConfig, width: u32, height: u32, entries: &[ChannelEntry]) -> Result<Self> {
        let mode = InterleaveMode::try_from(config.interleave_type)?;
        if config.tile_columns == 0 || config.tile_rows == 0 {
            return Err(Error::InvalidData("zero tile count"));
        }
        let mut layout = Self {
            mode,
            tile_width: width / config.tile_columns,
            tile_height: height / config.tile_rows,
            tile_columns: config.tile_columns,
            tile_count: config.number_of_tiles(),
            pixel_size: config.pixel_size,
            row_align_size: config.row_align_size,
            tile_align_size: config.tile_align_size,
            tile_size: 0,
            component_tile_sizes: std::vec::Vec::new(),
        };
        if layout.tile_width == 0 || layout.tile_height == 0 {
            return Err(Error::InvalidData("more tiles than pixels"));
        }
        layout.tile_size = layout.compute_tile_size(entries)?;
        debug!(
            "{mode:?} layout: {}x{} tiles of {}x{}, {} bytes each",
            config.tile_columns, config.tile_rows, layout.tile_width, layout.tile_height, layout.tile_size
        );
        Ok(layout)
    }

    fn entry_dims(&self, entry: &ChannelEntry) -> (u32, u32) {
        (self.tile_width / entry.sub_x, self.tile_height / entry.sub_y)
    }

    fn component_block_bytes(&self, entry: &ChannelEntry) -> Result<u64> {
        let (w, h) = self.entry_dims(entry);
        let row = run_bytes(&[entry], w, self.row_align_size)?;
        checked(row.checked_mul(u64::from(h)))
    }

    fn pixel_row_bytes(&self, entries: &[ChannelEntry]) -> Result<u64> {
        if self.pixel_size == 0 {
            let mut pos = 0u64;
            for _ in 0..self.tile_width {
                for entry in entries {
                    pos = entry.advance(pos);
                }
            }
            return round_up(pos.div_ceil(8), self.row_align_size);
        }

        // Every padded pixel starts on a byte boundary, so all pixels have the same size.
        let used = entries.iter().fold(0u64, |pos, entry| entry.advance(pos)).div_ceil(8);
        if used > u64::from(self.pixel_size) {
            warn!("{} byte pixel does not fit pixel_size {}", used, self.pixel_size);
            return Err(Error::InvalidData("pixel larger than pixel_size"));
        }
        let row = u64::from(self.pixel_size).checked_mul(u64::from(self.tile_width));
        round_up(checked(row)?, self.row_align_size)
    }

    fn compute_tile_size(&mut self, entries: &[ChannelEntry]) -> Result<u64> {
        let tile_height = u64::from(self.tile_height);
        let unaligned = match self.mode {
            InterleaveMode::Component => {
                let mut total = 0u64;
                for entry in entries {
                    total = checked(total.checked_add(self.component_block_bytes(entry)?))?;
                }
                total
            },
            InterleaveMode::Row => {
                let mut row = 0u64;
                for entry in entries {
                    row = checked(row.checked_add(run_bytes(&[entry], self.tile_width, self.row_align_size)?))?;
                }
                checked(row.checked_mul(tile_height))?
            },
            InterleaveMode::Pixel => checked(self.pixel_row_bytes(entries)?.checked_mul(tile_height))?,
            InterleaveMode::Mixed => {
                let mut total = 0u64;
                let chroma: std::vec::Vec<&ChannelEntry> = entries.iter().filter(|e| e.is_chroma()).collect();
                for entry in entries.iter().filter(|e| !e.is_chroma()) {
                    total = checked(total.checked_add(self.component_block_bytes(entry)?))?;
                }
                if let Some(first) = chroma.first() {
                    let (w, h) = self.entry_dims(first);
                    let row = run_bytes(&chroma, w, self.row_align_size)?;
                    total = checked(total.checked_add(checked(row.checked_mul(u64::from(h)))?))?;
                }
                total
            },
            InterleaveMode::TileComponent => {
                let mut total = 0u64;
                self.component_tile_sizes
                    .try_reserve_exact(entries.len())
                    .map_err(|_| Error::OutOfMemory)?;
                for entry in entries {
                    let size = round_up(self.component_block_bytes(entry)?, self.tile_align_size)?;
                    self.component_tile_sizes.push(size);
                    total = checked(total.checked_add(size))?;
                }
                return Ok(total);
            },
        };
        round_up(unaligned, self.tile_align_size)
    }

    pub(crate) fn mode(&self) -> InterleaveMode {
        self.mode
    }

    /// Bytes of one tile; for tile-component interleave, the sum over its
    /// component tiles.
    pub(crate) fn tile_size(&self) -> u64 {
        self.tile_size
    }

    /// Expected size of the uncompressed item data.
    pub(crate) fn item_size(&self) -> Result<u64> {
        checked(self.tile_size.checked_mul(self.tile_count))
    }

    pub(crate) fn tile_index(&self, tile_x: u32, tile_y: u32) -> u64 {
        u64::from(tile_x) + u64::from(tile_y) * u64::from(self.tile_columns)
    }

    /// The byte ranges that make up tile `(tile_x, tile_y)`.
    pub(crate) fn segments(&self, tile_x: u32, tile_y: u32) -> Result<std::vec::Vec<Segment>> {
        let tile_index = self.tile_index(tile_x, tile_y);
        if tile_index >= self.tile_count {
            return Err(Error::InvalidData("tile index out of range"));
        }
        let mut segments = std::vec::Vec::new();
        if self.mode != InterleaveMode::TileComponent {
            segments.push(Segment {
                unit_index: usize::try_from(tile_index)?,
                offset: checked(tile_index.checked_mul(self.tile_size))?,
                size: self.tile_size,
                entry: None,
            });
            return Ok(segments);
        }

        segments
            .try_reserve_exact(self.component_tile_sizes.len())
            .map_err(|_| Error::OutOfMemory)?;
        let mut component_base = 0u64;
        for (index, &size) in self.component_tile_sizes.iter().enumerate() {
            let unit = checked(
                index
                    .to_u64()
                    .checked_mul(self.tile_count)
                    .and_then(|base| base.checked_add(tile_index)),
            )?;
            segments.push(Segment {
                unit_index: usize::try_from(unit)?,
                offset: checked(component_base.checked_add(checked(tile_index.checked_mul(size))?))?,
                size,
                entry: Some(index),
            });
            component_base = checked(component_base.checked_add(checked(size.checked_mul(self.tile_count))?))?;
        }
        Ok(segments)
    }

    fn origin(&self, entry: &ChannelEntry, tile_x: u32, tile_y: u32) -> (u32, u32) {
        let (w, h) = self.entry_dims(entry);
        (tile_x * w, tile_y * h)
    }

    fn component_block<C: TileCursor>(
        &self,
        cursor: &mut C,
        entry: &ChannelEntry,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<()> {
        let (w, h) = self.entry_dims(entry);
        let (x0, y0) = self.origin(entry, tile_x, tile_y);
        for y in y0..y0 + h {
            cursor.mark_row();
            for x in x0..x0 + w {
                cursor.component(entry, x, y)?;
            }
            cursor.align_row(self.row_align_size)?;
        }
        Ok(())
    }

    /// Walk a whole tile. Not used for tile-component interleave, which
    /// walks each component tile separately.
    pub(crate) fn walk<C: TileCursor>(
        &self,
        cursor: &mut C,
        entries: &[ChannelEntry],
        tile_x: u32,
        tile_y: u32,
    ) -> Result<()> {
        cursor.mark_tile();
        match self.mode {
            InterleaveMode::Component => {
                for entry in entries {
                    self.component_block(cursor, entry, tile_x, tile_y)?;
                }
            },
            InterleaveMode::Row => {
                let y0 = tile_y * self.tile_height;
                let x0 = tile_x * self.tile_width;
                for y in y0..y0 + self.tile_height {
                    for entry in entries {
                        cursor.mark_row();
                        for x in x0..x0 + self.tile_width {
                            cursor.component(entry, x, y)?;
                        }
                        cursor.align_row(self.row_align_size)?;
                    }
                }
            },
            InterleaveMode::Pixel => {
                let y0 = tile_y * self.tile_height;
                let x0 = tile_x * self.tile_width;
                for y in y0..y0 + self.tile_height {
                    cursor.mark_row();
                    for x in x0..x0 + self.tile_width {
                        cursor.mark_pixel();
                        for entry in entries {
                            cursor.component(entry, x, y)?;
                        }
                        cursor.align_pixel(self.pixel_size)?;
                    }
                    cursor.align_row(self.row_align_size)?;
                }
            },
            InterleaveMode::Mixed => {
                let mut chroma_done = false;
                for entry in entries {
                    if !entry.is_chroma() {
                        self.component_block(cursor, entry, tile_x, tile_y)?;
                        continue;
                    }
                    if chroma_done {
                        continue;
                    }
                    chroma_done = true;
                    let (w, h) = self.entry_dims(entry);
                    let (x0, y0) = self.origin(entry, tile_x, tile_y);
                    for y in y0..y0 + h {
                        cursor.mark_row();
                        for x in x0..x0 + w {
                            for chroma in entries.iter().filter(|e| e.is_chroma()) {
                                cursor.component(chroma, x, y)?;
                            }
                        }
                        cursor.align_row(self.row_align_size)?;
                    }
                }
            },
            InterleaveMode::TileComponent => {
                return Err(Error::InvalidData("tile-component tiles are walked per component"));
            },
        }
        cursor.align_tile(self.tile_align_size)
    }

    /// Walk one component tile of tile-component interleave.
    pub(crate) fn walk_component_tile<C: TileCursor>(
        &self,
        cursor: &mut C,
        entry: &ChannelEntry,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<()> {
        cursor.mark_tile();
        self.component_block(cursor, entry, tile_x, tile_y)?;
        cursor.align_tile(self.tile_align_size)
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Item properties of the uncompressed codec, ISO/IEC 23001-17 § 5–6.
//!
//! Parsers take a [`BMFFBox`] positioned after the box header; writers emit
//! complete boxes including the header.

use std::convert::TryFrom;
use std::fmt;
use std::io::{Read, Write};

use bitreader::BitReader;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use fallible_collections::{TryClone, TryReserveError};
use log::{debug, warn};

use crate::boxes::{BoxType, FourCC};
use crate::{
    be_u16, be_u32, read_fullbox_extra, read_fullbox_version_no_flags, BMFFBox, Error, ParseOptions, Result, ToU64,
    ToUsize, TryString, TryVec,
};

/// Write a complete box: 32-bit size, type, optional FullBox version/flags, body.
fn write_box(out: &mut Vec<u8>, box_type: BoxType, fullbox: Option<(u8, u32)>, body: &[u8]) -> Result<()> {
    let header_size: usize = if fullbox.is_some() { 12 } else { 8 };
    let size = body
        .len()
        .checked_add(header_size)
        .ok_or(Error::InvalidData("box size overflow"))?;
    let size = u32::try_from(size).map_err(|_| Error::Unsupported("box too large for a 32-bit size"))?;
    out.write_u32::<BigEndian>(size)?;
    out.write_u32::<BigEndian>(box_type.into())?;
    if let Some((version, flags)) = fullbox {
        out.write_u8(version)?;
        out.write_u24::<BigEndian>(flags)?;
    }
    out.write_all(body)?;
    Ok(())
}

/// Image spatial extents (dimensions)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSpatialExtents {
    pub width: u32,
    pub height: u32,
}

impl ImageSpatialExtents {
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut body = Vec::with_capacity(8);
        body.write_u32::<BigEndian>(self.width)?;
        body.write_u32::<BigEndian>(self.height)?;
        write_box(out, BoxType::ImageSpatialExtentsBox, Some((0, 0)), &body)
    }
}

/// Parse an Image Spatial Extents property box
/// See ISO/IEC 23008-12:2017 § 6.5.3
pub(crate) fn read_ispe<T: Read>(src: &mut BMFFBox<'_, T>, options: &ParseOptions) -> Result<ImageSpatialExtents> {
    let _version = read_fullbox_version_no_flags(src, options)?;
    // Version is always 0 for ispe

    let width = be_u32(src)?;
    let height = be_u32(src)?;

    // Validate dimensions are non-zero (0×0 images are invalid)
    if width == 0 || height == 0 {
        return Err(Error::InvalidData("ispe dimensions cannot be zero"));
    }

    Ok(ImageSpatialExtents { width, height })
}

/// Component type from ISO/IEC 23001-17 Table 1.
///
/// Values from `0x8000` up are user-defined and carry a URI in `cmpd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentType(pub u16);

impl ComponentType {
    pub const MONOCHROME: Self = Self(0);
    pub const Y: Self = Self(1);
    pub const CB: Self = Self(2);
    pub const CR: Self = Self(3);
    pub const RED: Self = Self(4);
    pub const GREEN: Self = Self(5);
    pub const BLUE: Self = Self(6);
    pub const ALPHA: Self = Self(7);
    pub const DEPTH: Self = Self(8);
    pub const DISPARITY: Self = Self(9);
    pub const PALETTE: Self = Self(10);
    pub const FILTER_ARRAY: Self = Self(11);
    pub const PADDED: Self = Self(12);
    pub const CYAN: Self = Self(13);
    pub const MAGENTA: Self = Self(14);
    pub const YELLOW: Self = Self(15);
    pub const KEY_BLACK: Self = Self(16);

    pub const fn is_user_defined(self) -> bool {
        self.0 >= 0x8000
    }

    /// Human-readable name, for diagnostics.
    pub fn name(self) -> &'static str {
        const NAMES: [&str; 17] = [
            "monochrome",
            "Y",
            "Cb",
            "Cr",
            "red",
            "green",
            "blue",
            "alpha",
            "depth",
            "disparity",
            "palette",
            "filter-array",
            "padded",
            "cyan",
            "magenta",
            "yellow",
            "key (black)",
        ];
        match NAMES.get(usize::from(self.0)) {
            Some(name) => name,
            None if self.is_user_defined() => "user-defined",
            None => "reserved",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

#[derive(Debug, PartialEq)]
pub struct ComponentDefinitionEntry {
    pub component_type: ComponentType,
    /// Present only for user-defined component types.
    pub component_type_uri: Option<TryString>,
}

impl ComponentDefinitionEntry {
    pub fn new(component_type: ComponentType) -> Self {
        Self { component_type, component_type_uri: None }
    }

    pub fn uri(&self) -> Option<&str> {
        self.component_type_uri
            .as_ref()
            .and_then(|uri| std::str::from_utf8(uri).ok())
    }
}

/// Component definition box 'cmpd'
/// See ISO/IEC 23001-17 § 5.2.1
#[derive(Debug, PartialEq)]
pub struct ComponentDefinition {
    pub components: TryVec<ComponentDefinitionEntry>,
}

impl ComponentDefinition {
    pub fn from_types(types: &[ComponentType]) -> Result<Self> {
        let mut components = TryVec::with_capacity(types.len())?;
        for &component_type in types {
            components.push(ComponentDefinitionEntry::new(component_type))?;
        }
        Ok(Self { components })
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn component_type(&self, index: u16) -> Option<ComponentType> {
        self.components.get(usize::from(index)).map(|c| c.component_type)
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut body = Vec::new();
        body.write_u32::<BigEndian>(u32::try_from(self.components.len())?)?;
        for component in self.components.iter() {
            body.write_u16::<BigEndian>(component.component_type.0)?;
            if component.component_type.is_user_defined() {
                let uri = component
                    .component_type_uri
                    .as_ref()
                    .ok_or(Error::InvalidData("user-defined component type needs a URI"))?;
                body.write_all(uri)?;
                body.write_u8(0)?;
            }
        }
        write_box(out, BoxType::ComponentDefinitionBox, None, &body)
    }
}

pub(crate) fn read_cmpd<T: Read>(src: &mut BMFFBox<'_, T>) -> Result<ComponentDefinition> {
    let component_count = be_u32(src)?;
    // Every component needs at least two bytes
    if u64::from(component_count) * 2 > src.bytes_left() {
        return Err(Error::InvalidData("cmpd component count exceeds box size"));
    }

    let mut components = TryVec::with_capacity(component_count.to_usize())?;
    for _ in 0..component_count {
        let component_type = ComponentType(be_u16(src)?);
        let component_type_uri = if component_type.is_user_defined() {
            let mut uri = TryString::new();
            loop {
                match src.read_u8()? {
                    0 => break,
                    b => uri.push(b)?,
                }
            }
            Some(uri)
        } else {
            None
        };
        components.push(ComponentDefinitionEntry { component_type, component_type_uri })?;
    }

    Ok(ComponentDefinition { components })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentFormat {
    Unsigned,
    Float,
    Complex,
    Signed,
}

impl TryFrom<u8> for ComponentFormat {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Unsigned),
            1 => Ok(Self::Float),
            2 => Ok(Self::Complex),
            3 => Ok(Self::Signed),
            _ => Err(Error::Unsupported("unknown component_format")),
        }
    }
}

impl From<ComponentFormat> for u8 {
    fn from(format: ComponentFormat) -> u8 {
        match format {
            ComponentFormat::Unsigned => 0,
            ComponentFormat::Float => 1,
            ComponentFormat::Complex => 2,
            ComponentFormat::Signed => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingType {
    NoSubsampling,
    S422,
    S420,
    S411,
}

impl SamplingType {
    pub const ALL: [Self; 4] = [Self::NoSubsampling, Self::S422, Self::S420, Self::S411];
}

impl TryFrom<u8> for SamplingType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::NoSubsampling),
            1 => Ok(Self::S422),
            2 => Ok(Self::S420),
            3 => Ok(Self::S411),
            _ => Err(Error::Unsupported("unknown sampling_type")),
        }
    }
}

impl From<SamplingType> for u8 {
    fn from(sampling: SamplingType) -> u8 {
        match sampling {
            SamplingType::NoSubsampling => 0,
            SamplingType::S422 => 1,
            SamplingType::S420 => 2,
            SamplingType::S411 => 3,
        }
    }
}

impl fmt::Display for SamplingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoSubsampling => "no subsampling",
            Self::S422 => "4:2:2",
            Self::S420 => "4:2:0",
            Self::S411 => "4:1:1",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterleaveType {
    Component,
    Pixel,
    Mixed,
    Row,
    TileComponent,
    MultiY,
}

impl InterleaveType {
    pub const ALL: [Self; 6] = [
        Self::Component,
        Self::Pixel,
        Self::Mixed,
        Self::Row,
        Self::TileComponent,
        Self::MultiY,
    ];
}

impl TryFrom<u8> for InterleaveType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Component),
            1 => Ok(Self::Pixel),
            2 => Ok(Self::Mixed),
            3 => Ok(Self::Row),
            4 => Ok(Self::TileComponent),
            5 => Ok(Self::MultiY),
            _ => Err(Error::Unsupported("unknown interleave_type")),
        }
    }
}

impl From<InterleaveType> for u8 {
    fn from(interleave: InterleaveType) -> u8 {
        match interleave {
            InterleaveType::Component => 0,
            InterleaveType::Pixel => 1,
            InterleaveType::Mixed => 2,
            InterleaveType::Row => 3,
            InterleaveType::TileComponent => 4,
            InterleaveType::MultiY => 5,
        }
    }
}

impl fmt::Display for InterleaveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Component => "component",
            Self::Pixel => "pixel",
            Self::Mixed => "mixed",
            Self::Row => "row",
            Self::TileComponent => "tile-component",
            Self::MultiY => "multi-y",
        })
    }
}

/// One entry of the `uncC` component list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UncompressedComponent {
    /// Index into the `cmpd` component list.
    pub index: u16,
    /// 1..=256
    pub bit_depth: u16,
    pub format: ComponentFormat,
    /// Bytes per sample, 0 for bit-packed samples.
    pub align_size: u8,
}

impl UncompressedComponent {
    pub const fn unsigned(index: u16, bit_depth: u16) -> Self {
        Self { index, bit_depth, format: ComponentFormat::Unsigned, align_size: 0 }
    }
}

/// Uncompressed frame configuration box 'uncC'
/// See ISO/IEC 23001-17 § 5.2.2
#[derive(Debug, PartialEq)]
pub struct UncompressedConfig {
    /// 0 for the full form, 1 for the profile shortform.
    pub version: u8,
    /// All zero when no profile is declared.
    pub profile: FourCC,
    pub components: TryVec<UncompressedComponent>,
    pub sampling_type: SamplingType,
    pub interleave_type: InterleaveType,
    pub block_size: u8,
    pub components_little_endian: bool,
    pub block_pad_lsb: bool,
    pub block_little_endian: bool,
    pub block_reversed: bool,
    pub pad_unknown: bool,
    pub pixel_size: u32,
    pub row_align_size: u32,
    pub tile_align_size: u32,
    /// At least 1.
    pub tile_columns: u32,
    /// At least 1.
    pub tile_rows: u32,
}

pub(crate) const PROFILE_RGB3: FourCC = FourCC::new(b"rgb3");
pub(crate) const PROFILE_RGBA: FourCC = FourCC::new(b"rgba");
pub(crate) const PROFILE_ABGR: FourCC = FourCC::new(b"abgr");

impl UncompressedConfig {
    /// A version 0 configuration with no profile, no subsampling, no padding
    /// and a single tile.
    pub fn new(components: TryVec<UncompressedComponent>, interleave_type: InterleaveType) -> Self {
        Self {
            version: 0,
            profile: FourCC::default(),
            components,
            sampling_type: SamplingType::NoSubsampling,
            interleave_type,
            block_size: 0,
            components_little_endian: false,
            block_pad_lsb: false,
            block_little_endian: false,
            block_reversed: false,
            pad_unknown: false,
            pixel_size: 0,
            row_align_size: 0,
            tile_align_size: 0,
            tile_columns: 1,
            tile_rows: 1,
        }
    }

    /// The version 1 form: a profile implying 8-bit, pixel-interleaved RGB(A).
    pub fn shortform(profile: FourCC) -> Result<Self> {
        let count = Self::profile_component_count(profile)?;
        let mut components = TryVec::with_capacity(count)?;
        for index in 0..count {
            components.push(UncompressedComponent::unsigned(u16::try_from(index)?, 8))?;
        }
        Ok(Self {
            version: 1,
            profile,
            ..Self::new(components, InterleaveType::Pixel)
        })
    }

    fn profile_component_count(profile: FourCC) -> Result<usize> {
        if profile == PROFILE_RGB3 {
            Ok(3)
        } else if profile == PROFILE_RGBA || profile == PROFILE_ABGR {
            Ok(4)
        } else {
            warn!("unknown uncC profile '{profile}'");
            Err(Error::Unsupported("unknown uncC shortform profile"))
        }
    }

    pub fn is_shortform(&self) -> bool {
        self.version == 1
    }

    pub fn number_of_tiles(&self) -> u64 {
        u64::from(self.tile_rows) * u64::from(self.tile_columns)
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.components_little_endian {
            flags |= 0x80;
        }
        if self.block_pad_lsb {
            flags |= 0x40;
        }
        if self.block_little_endian {
            flags |= 0x20;
        }
        if self.block_reversed {
            flags |= 0x10;
        }
        if self.pad_unknown {
            flags |= 0x08;
        }
        flags
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut body = Vec::new();
        body.write_u32::<BigEndian>(self.profile.to_u32())?;
        if self.version == 0 {
            body.write_u32::<BigEndian>(u32::try_from(self.components.len())?)?;
            for component in self.components.iter() {
                let bit_depth_minus_one = component
                    .bit_depth
                    .checked_sub(1)
                    .and_then(|d| u8::try_from(d).ok())
                    .ok_or(Error::InvalidData("component bit depth must be 1..=256"))?;
                body.write_u16::<BigEndian>(component.index)?;
                body.write_u8(bit_depth_minus_one)?;
                body.write_u8(component.format.into())?;
                body.write_u8(component.align_size)?;
            }
            body.write_u8(self.sampling_type.into())?;
            body.write_u8(self.interleave_type.into())?;
            body.write_u8(self.block_size)?;
            body.write_u8(self.flags())?;
            body.write_u32::<BigEndian>(self.pixel_size)?;
            body.write_u32::<BigEndian>(self.row_align_size)?;
            body.write_u32::<BigEndian>(self.tile_align_size)?;
            let columns_minus_one = self.tile_columns.checked_sub(1).ok_or(Error::InvalidData("zero tile columns"))?;
            let rows_minus_one = self.tile_rows.checked_sub(1).ok_or(Error::InvalidData("zero tile rows"))?;
            body.write_u32::<BigEndian>(columns_minus_one)?;
            body.write_u32::<BigEndian>(rows_minus_one)?;
        }
        write_box(out, BoxType::UncompressedFrameConfigBox, Some((self.version, 0)), &body)
    }
}

pub(crate) fn read_uncc<T: Read>(src: &mut BMFFBox<'_, T>, options: &ParseOptions) -> Result<UncompressedConfig> {
    let version = read_fullbox_version_no_flags(src, options)?;
    let profile = FourCC::from(be_u32(src)?);

    match version {
        1 => return UncompressedConfig::shortform(profile),
        0 => {},
        _ => return Err(Error::Unsupported("uncC version")),
    }

    let component_count = be_u32(src)?;
    // 5 bytes per component
    if u64::from(component_count) * 5 > src.bytes_left() {
        return Err(Error::InvalidData("uncC component count exceeds box size"));
    }
    let mut components = TryVec::with_capacity(component_count.to_usize())?;
    for _ in 0..component_count {
        let index = be_u16(src)?;
        let bit_depth = u16::from(src.read_u8()?) + 1;
        let format = ComponentFormat::try_from(src.read_u8()?)?;
        let align_size = src.read_u8()?;
        components.push(UncompressedComponent { index, bit_depth, format, align_size })?;
    }

    let sampling_type = SamplingType::try_from(src.read_u8()?)?;
    let interleave_type = InterleaveType::try_from(src.read_u8()?)?;
    let block_size = src.read_u8()?;
    let flags = src.read_u8()?;
    let pixel_size = be_u32(src)?;
    let row_align_size = be_u32(src)?;
    let tile_align_size = be_u32(src)?;
    let tile_columns = be_u32(src)?
        .checked_add(1)
        .ok_or(Error::InvalidData("tile column count overflow"))?;
    let tile_rows = be_u32(src)?
        .checked_add(1)
        .ok_or(Error::InvalidData("tile row count overflow"))?;

    debug!("uncC: {component_count} components, {sampling_type}, {interleave_type} interleave, {tile_columns}x{tile_rows} tiles");

    Ok(UncompressedConfig {
        version,
        profile,
        components,
        sampling_type,
        interleave_type,
        block_size,
        components_little_endian: flags & 0x80 != 0,
        block_pad_lsb: flags & 0x40 != 0,
        block_little_endian: flags & 0x20 != 0,
        block_reversed: flags & 0x10 != 0,
        pad_unknown: flags & 0x08 != 0,
        pixel_size,
        row_align_size,
        tile_align_size,
        tile_columns,
        tile_rows,
    })
}

/// Granularity at which generic compression is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressedUnitType {
    FullItem,
    Image,
    ImageTile,
    ImageRow,
    ImagePixel,
}

impl TryFrom<u8> for CompressedUnitType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::FullItem),
            1 => Ok(Self::Image),
            2 => Ok(Self::ImageTile),
            3 => Ok(Self::ImageRow),
            4 => Ok(Self::ImagePixel),
            _ => Err(Error::InvalidData("compressed_unit_type is taken from the set 0..=4")),
        }
    }
}

impl From<CompressedUnitType> for u8 {
    fn from(unit: CompressedUnitType) -> u8 {
        match unit {
            CompressedUnitType::FullItem => 0,
            CompressedUnitType::Image => 1,
            CompressedUnitType::ImageTile => 2,
            CompressedUnitType::ImageRow => 3,
            CompressedUnitType::ImagePixel => 4,
        }
    }
}

/// Generic compression configuration box 'cmpC'
/// See ISO/IEC 23001-17 § 6.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionConfig {
    /// `zlib`, `defl` or `brot`; other codes are kept so the decoder can
    /// report them.
    pub compression_type: FourCC,
    pub unit_type: CompressedUnitType,
}

impl CompressionConfig {
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut body = Vec::with_capacity(5);
        body.write_u32::<BigEndian>(self.compression_type.to_u32())?;
        body.write_u8(self.unit_type.into())?;
        write_box(out, BoxType::GenericCompressionConfigBox, Some((0, 0)), &body)
    }
}

pub(crate) fn read_cmpc<T: Read>(src: &mut BMFFBox<'_, T>, options: &ParseOptions) -> Result<CompressionConfig> {
    let version = read_fullbox_version_no_flags(src, options)?;
    if version != 0 {
        return Err(Error::Unsupported("cmpC version"));
    }

    let compression_type = FourCC::from(be_u32(src)?);
    let unit_type = CompressedUnitType::try_from(src.read_u8()?)?;
    Ok(CompressionConfig { compression_type, unit_type })
}

/// Location of one compressed unit within the item data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedUnit {
    pub offset: u64,
    pub size: u64,
}

/// Generic compressed units information box 'icef'
/// See ISO/IEC 23001-17 § 6.2
#[derive(Debug, PartialEq)]
pub struct CompressedUnitTable {
    pub units: TryVec<CompressedUnit>,
}

const UNIT_OFFSET_BITS: [u8; 5] = [0, 16, 24, 32, 64];
const UNIT_SIZE_BITS: [u8; 5] = [8, 16, 24, 32, 64];

/// Smallest code whose width holds `max`; code 0 only if its width is non-zero.
fn field_width_code(widths: &[u8; 5], max: u64) -> u8 {
    let mut code = 0;
    for (i, &bits) in widths.iter().enumerate() {
        if bits == 0 {
            continue;
        }
        code = i;
        if bits == 64 || max >> bits == 0 {
            break;
        }
    }
    code as u8
}

impl CompressedUnitTable {
    /// Build a table where each unit directly follows the previous one.
    pub fn from_sizes(sizes: &[u64]) -> Result<Self> {
        let mut units = TryVec::with_capacity(sizes.len())?;
        let mut offset = 0u64;
        for &size in sizes {
            units.push(CompressedUnit { offset, size })?;
            offset = offset.checked_add(size).ok_or(Error::InvalidData("unit offset overflow"))?;
        }
        Ok(Self { units })
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CompressedUnit> {
        self.units.get(index)
    }

    fn offsets_are_implied(&self) -> bool {
        let mut implied = 0u64;
        for unit in self.units.iter() {
            if unit.offset != implied {
                return false;
            }
            implied = match implied.checked_add(unit.size) {
                Some(next) => next,
                None => return false,
            };
        }
        true
    }

    /// Field width codes chosen for serialization: `(offset_code, size_code)`.
    pub fn field_codes(&self) -> (u8, u8) {
        let offset_code = if self.offsets_are_implied() {
            0
        } else {
            let max_offset = self.units.iter().map(|u| u.offset).max().unwrap_or(0);
            field_width_code(&UNIT_OFFSET_BITS, max_offset)
        };
        let max_size = self.units.iter().map(|u| u.size).max().unwrap_or(0);
        (offset_code, field_width_code(&UNIT_SIZE_BITS, max_size))
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let (offset_code, size_code) = self.field_codes();
        let offset_bits = UNIT_OFFSET_BITS[usize::from(offset_code)];
        let size_bits = UNIT_SIZE_BITS[usize::from(size_code)];

        let mut body = Vec::new();
        body.write_u8(offset_code << 5 | size_code << 2)?;
        body.write_u32::<BigEndian>(u32::try_from(self.units.len())?)?;
        for unit in self.units.iter() {
            write_be_bits(&mut body, unit.offset, offset_bits)?;
            write_be_bits(&mut body, unit.size, size_bits)?;
        }
        write_box(out, BoxType::GenericCompressedUnitsInfoBox, Some((0, 0)), &body)
    }
}

fn write_be_bits(out: &mut Vec<u8>, value: u64, bits: u8) -> Result<()> {
    match bits {
        0 => {},
        8 => out.write_u8(u8::try_from(value)?)?,
        16 => out.write_u16::<BigEndian>(u16::try_from(value)?)?,
        24 => out.write_u24::<BigEndian>(u32::try_from(value)?)?,
        32 => out.write_u32::<BigEndian>(u32::try_from(value)?)?,
        64 => out.write_u64::<BigEndian>(value)?,
        _ => return Err(Error::InvalidData("unsupported field width")),
    }
    Ok(())
}

pub(crate) fn read_icef<T: Read>(src: &mut BMFFBox<'_, T>, options: &ParseOptions) -> Result<CompressedUnitTable> {
    let version = read_fullbox_version_no_flags(src, options)?;
    if version != 0 {
        return Err(Error::Unsupported("icef version"));
    }

    let icef = src.read_into_try_vec()?;
    let mut icef = BitReader::new(&icef);

    let offset_code = icef.read_u8(3)?;
    let size_code = icef.read_u8(3)?;
    let _reserved = icef.read_u8(2)?;
    let offset_bits = *UNIT_OFFSET_BITS
        .get(usize::from(offset_code))
        .ok_or(Error::InvalidData("icef unit_offset_code must be 0..=4"))?;
    let size_bits = *UNIT_SIZE_BITS
        .get(usize::from(size_code))
        .ok_or(Error::InvalidData("icef unit_size_code must be 0..=4"))?;

    let unit_count = icef.read_u32(32)?;
    let entry_bits = u64::from(offset_bits) + u64::from(size_bits);
    if u64::from(unit_count) * entry_bits > icef.remaining() {
        return Err(Error::InvalidData("icef unit count exceeds box size"));
    }

    let mut units = TryVec::with_capacity(unit_count.to_usize())?;
    let mut implied_offset = 0u64;
    for _ in 0..unit_count {
        // A zero-width offset means the unit directly follows the previous one.
        let offset = if offset_bits == 0 {
            implied_offset
        } else {
            icef.read_u64(offset_bits)?
        };
        let size = icef.read_u64(size_bits)?;
        implied_offset = offset
            .checked_add(size)
            .ok_or(Error::InvalidData("icef unit end overflow"))?;
        units.push(CompressedUnit { offset, size })?;
    }

    if icef.remaining() == 0 {
        Ok(CompressedUnitTable { units })
    } else {
        Err(Error::InvalidData("invalid icef size"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BayerPatternEntry {
    /// Index into the `cmpd` component list.
    pub component_index: u32,
    pub gain: f32,
}

impl TryClone for BayerPatternEntry {
    fn try_clone(&self) -> Result<Self, TryReserveError> {
        Ok(*self)
    }
}

/// Component pattern definition box 'cpat'
/// See ISO/IEC 23001-17 § 5.2.3
#[derive(Debug, PartialEq)]
pub struct BayerPattern {
    pub width: u16,
    pub height: u16,
    /// Row-major, `width × height` entries.
    pub entries: TryVec<BayerPatternEntry>,
}

impl BayerPattern {
    /// Entry at pattern position `(x, y)`.
    pub fn get(&self, x: u16, y: u16) -> Option<&BayerPatternEntry> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.entries.get(usize::from(y) * usize::from(self.width) + usize::from(x))
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut body = Vec::new();
        body.write_u16::<BigEndian>(self.width)?;
        body.write_u16::<BigEndian>(self.height)?;
        for entry in self.entries.iter() {
            body.write_u32::<BigEndian>(entry.component_index)?;
            body.write_f32::<BigEndian>(entry.gain)?;
        }
        write_box(out, BoxType::ComponentPatternDefinitionBox, Some((0, 0)), &body)
    }
}

impl TryClone for BayerPattern {
    fn try_clone(&self) -> Result<Self, TryReserveError> {
        Ok(Self {
            width: self.width,
            height: self.height,
            entries: self.entries.try_clone()?,
        })
    }
}

pub(crate) fn read_cpat<T: Read>(src: &mut BMFFBox<'_, T>, options: &ParseOptions) -> Result<BayerPattern> {
    let (version, flags) = read_fullbox_extra(src)?;
    if version != 0 {
        return Err(Error::Unsupported("cpat version"));
    }
    if flags != 0 && !options.lenient {
        return Err(Error::Unsupported("expected flags to be 0"));
    }

    let width = be_u16(src)?;
    let height = be_u16(src)?;
    if width == 0 || height == 0 {
        return Err(Error::InvalidData("cpat pattern dimensions cannot be zero"));
    }
    let count = usize::from(width) * usize::from(height);
    if count.to_u64() * 8 > src.bytes_left() {
        return Err(Error::InvalidData("cpat pattern exceeds box size"));
    }

    let mut entries = TryVec::with_capacity(count)?;
    for _ in 0..count {
        let component_index = be_u32(src)?;
        let gain = src.read_f32::<BigEndian>()?;
        entries.push(BayerPatternEntry { component_index, gain })?;
    }
    Ok(BayerPattern { width, height, entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UncompressedProperties;

    fn ispe(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        ImageSpatialExtents { width, height }.write(&mut out).unwrap();
        out
    }

    fn rgb_config() -> UncompressedConfig {
        let mut components = TryVec::new();
        for index in 0..3 {
            components.push(UncompressedComponent::unsigned(index, 8)).unwrap();
        }
        UncompressedConfig::new(components, InterleaveType::Pixel)
    }

    #[test]
    fn cmpd_with_user_defined_uri() {
        let cmpd = ComponentDefinition {
            components: vec![
                ComponentDefinitionEntry::new(ComponentType::Y),
                ComponentDefinitionEntry {
                    component_type: ComponentType(0x8001),
                    component_type_uri: Some(b"urn:example:thermal".to_vec().into()),
                },
            ]
            .into(),
        };

        let mut data = ispe(4, 4);
        cmpd.write(&mut data).unwrap();
        rgb_config().write(&mut data).unwrap();

        let props = UncompressedProperties::from_property_boxes(&data).unwrap();
        let parsed = props.component_definition.unwrap();
        assert_eq!(parsed, cmpd);
        assert_eq!(parsed.components[1].uri(), Some("urn:example:thermal"));
        assert_eq!(parsed.component_type(0), Some(ComponentType::Y));
        assert_eq!(parsed.component_type(2), None);
    }

    #[test]
    fn uncc_v0_fields_survive_serialization() {
        let mut config = rgb_config();
        config.sampling_type = SamplingType::NoSubsampling;
        config.interleave_type = InterleaveType::Row;
        config.components_little_endian = true;
        config.pad_unknown = true;
        config.pixel_size = 0;
        config.row_align_size = 4;
        config.tile_align_size = 16;
        config.tile_columns = 2;
        config.tile_rows = 3;

        let mut data = ispe(8, 9);
        config.write(&mut data).unwrap();
        let props = UncompressedProperties::from_property_boxes(&data).unwrap();
        assert_eq!(props.config, config);
        assert_eq!(props.config.number_of_tiles(), 6);
    }

    #[test]
    fn uncc_flag_bits() {
        let mut config = rgb_config();
        config.block_pad_lsb = true;
        config.block_reversed = true;
        assert_eq!(config.flags(), 0x40 | 0x10);
    }

    #[test]
    fn uncc_shortform_profile() {
        let config = UncompressedConfig::shortform(FourCC::new(b"abgr")).unwrap();
        let mut data = ispe(2, 2);
        config.write(&mut data).unwrap();
        // size + type + version/flags + profile
        assert_eq!(data.len(), 20 + 16);

        let props = UncompressedProperties::from_property_boxes(&data).unwrap();
        assert!(props.config.is_shortform());
        assert_eq!(props.config.components.len(), 4);
        assert!(props.config.components.iter().all(|c| c.bit_depth == 8));
        assert_eq!(props.config.interleave_type, InterleaveType::Pixel);
    }

    #[test]
    fn uncc_unknown_shortform_profile() {
        assert!(matches!(
            UncompressedConfig::shortform(FourCC::new(b"yuv2")),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn icef_picks_24_bit_offsets() {
        let table = CompressedUnitTable {
            units: vec![
                CompressedUnit { offset: 10, size: 100 },
                CompressedUnit { offset: 70_000, size: 300 },
                CompressedUnit { offset: 16_777_215, size: 5 },
            ]
            .into(),
        };
        assert_eq!(table.field_codes(), (2, 1));

        let mut data = Vec::new();
        table.write(&mut data).unwrap();
        // header 12, codes 1, count 4, 3 × (3 + 2)
        assert_eq!(data.len(), 12 + 1 + 4 + 15);
        assert_eq!(data[12] >> 5, 2);

        let mut props = ispe(1, 1);
        rgb_config().write(&mut props).unwrap();
        props.extend_from_slice(&data);
        let parsed = UncompressedProperties::from_property_boxes(&props).unwrap();
        assert_eq!(parsed.unit_table.unwrap(), table);
    }

    #[test]
    fn icef_implied_offsets_use_zero_width() {
        let table = CompressedUnitTable::from_sizes(&[5, 300, 70_000]).unwrap();
        assert_eq!(table.field_codes(), (0, 2));
        assert_eq!(table.get(2).unwrap().offset, 305);

        let mut data = ispe(1, 1);
        rgb_config().write(&mut data).unwrap();
        table.write(&mut data).unwrap();
        let parsed = UncompressedProperties::from_property_boxes(&data).unwrap();
        assert_eq!(parsed.unit_table.unwrap(), table);
    }

    #[test]
    fn icef_large_values_use_64_bits() {
        let table = CompressedUnitTable {
            units: vec![CompressedUnit { offset: 1 << 40, size: 1 << 33 }].into(),
        };
        assert_eq!(table.field_codes(), (4, 4));
    }

    #[test]
    fn icef_truncated_units() {
        // implied offsets, 8-bit sizes, 3 units but only 2 sizes follow
        let body = [0, 0, 0, 0, 3, 7, 9];
        let mut data = ispe(1, 1);
        rgb_config().write(&mut data).unwrap();
        write_box(&mut data, BoxType::GenericCompressedUnitsInfoBox, Some((0, 0)), &body).unwrap();
        assert!(matches!(
            UncompressedProperties::from_property_boxes(&data),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn cmpc_and_cpat() {
        let cmpc = CompressionConfig {
            compression_type: FourCC::new(b"brot"),
            unit_type: CompressedUnitType::ImageTile,
        };
        let cpat = BayerPattern {
            width: 2,
            height: 2,
            entries: vec![
                BayerPatternEntry { component_index: 0, gain: 1.0 },
                BayerPatternEntry { component_index: 1, gain: 1.5 },
                BayerPatternEntry { component_index: 1, gain: 1.5 },
                BayerPatternEntry { component_index: 2, gain: 2.0 },
            ]
            .into(),
        };
        let mut data = ispe(4, 4);
        rgb_config().write(&mut data).unwrap();
        cmpc.write(&mut data).unwrap();
        cpat.write(&mut data).unwrap();

        let props = UncompressedProperties::from_property_boxes(&data).unwrap();
        assert_eq!(props.compression, Some(cmpc));
        let parsed = props.bayer_pattern.unwrap();
        assert_eq!(parsed, cpat);
        assert_eq!(parsed.get(1, 1).unwrap().component_index, 2);
        assert!(parsed.get(2, 0).is_none());
    }

    #[test]
    fn component_type_names() {
        assert_eq!(ComponentType::FILTER_ARRAY.name(), "filter-array");
        assert_eq!(ComponentType(0x8123).name(), "user-defined");
        assert_eq!(ComponentType(200).name(), "reserved");
        assert_eq!(ComponentType::CB.to_string(), "Cb (2)");
    }
}

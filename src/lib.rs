#![deny(unsafe_code)]
//! Decoding and encoding of ISO/IEC 23001-17 uncompressed image items, as
//! stored in HEIF-family files.
//!
//! The crate covers the uncompressed-codec item properties (`cmpd`, `uncC`,
//! `cmpC`, `icef`, `cpat`, plus `ispe` for the image size), the rules that
//! decide which combinations of sampling, interleaving and alignment are
//! legal, and the tiled bit-level decoders that turn item data into image
//! planes. Generic compression (`zlib`, `defl`, `brot`) is applied per
//! compressed unit before the interleave decoders see the bytes.
//!
//! Locating the item data inside a file is left to the container parser: the
//! decoder only needs the property boxes and a [`DataExtent`] over the item's
//! bytes.
//!
//! ```no_run
//! use heif_uncompressed::{DataExtent, DecodeLimits, UncompressedProperties};
//!
//! # fn run(property_boxes: &[u8], item_data: &[u8]) -> heif_uncompressed::Result<()> {
//! let properties = UncompressedProperties::from_property_boxes(property_boxes)?;
//! let extent = DataExtent::from_memory(item_data);
//! let image = heif_uncompressed::decode_uncompressed_image(&properties, extent, &DecodeLimits::default())?;
//! println!("{}x{} {:?}", image.width(), image.height(), image.colorspace());
//! # Ok(())
//! # }
//! ```

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use log::{debug, warn};

use byteorder::ReadBytesExt;
use fallible_collections::TryReserveError;
use std::convert::{TryFrom, TryInto as _};

use std::io::{Read, Take};

mod bits;
mod boxes;
mod chroma;
mod compression;
mod decode;
mod encode;
mod extent;
mod image;
mod interleave;
mod properties;
mod validate;

use crate::boxes::BoxType;

pub use crate::boxes::FourCC;
pub use crate::chroma::{derive_chroma, map_component_to_channel, ChromaInfo};
pub use crate::compression::{resolve_tile_bytes, CompressedUnitResolver, CompressionType};
pub use crate::decode::{decode_uncompressed_image, decode_uncompressed_image_with_stop, UncompressedDecoder};
pub use crate::encode::{encode_image, EncodeOptions, EncodedImage};
pub use crate::extent::{ByteSource, DataExtent, ReaderSource};
pub use crate::image::{Channel, Chroma, Colorspace, PixelImage, Plane};
pub use crate::interleave::InterleaveMode;
pub use crate::properties::{
    BayerPattern, BayerPatternEntry, CompressedUnit, CompressedUnitTable, CompressedUnitType, ComponentDefinition,
    ComponentDefinitionEntry, ComponentFormat, ComponentType, CompressionConfig, ImageSpatialExtents, InterleaveType,
    SamplingType, UncompressedComponent, UncompressedConfig,
};
pub use crate::validate::{validate, validate_geometry};

pub use enough::{Stop, StopReason, Unstoppable};

/// A trait to indicate a type can be infallibly converted to `u64`.
/// This should only be implemented for infallible conversions, so only unsigned types are valid.
pub(crate) trait ToU64 {
    fn to_u64(self) -> u64;
}

/// Statically verify that the platform `usize` can fit within a `u64`.
/// If the size won't fit on the given platform, this will fail at compile time, but if a type
/// which can fail `TryInto<usize>` is used, it may panic.
impl ToU64 for usize {
    fn to_u64(self) -> u64 {
        const _: () = assert!(std::mem::size_of::<usize>() <= std::mem::size_of::<u64>());
        self.try_into().ok().unwrap()
    }
}

/// A trait to indicate a type can be infallibly converted to `usize`.
/// This should only be implemented for infallible conversions, so only unsigned types are valid.
pub(crate) trait ToUsize {
    fn to_usize(self) -> usize;
}

/// Statically verify that the given type can fit within a `usize`.
/// If the size won't fit on the given platform, this will fail at compile time, but if a type
/// which can fail `TryInto<usize>` is used, it may panic.
macro_rules! impl_to_usize_from {
    ( $from_type:ty ) => {
        impl ToUsize for $from_type {
            fn to_usize(self) -> usize {
                const _: () = assert!(std::mem::size_of::<$from_type>() <= std::mem::size_of::<usize>());
                self.try_into().ok().unwrap()
            }
        }
    };
}

impl_to_usize_from!(u8);
impl_to_usize_from!(u16);
impl_to_usize_from!(u32);

#[doc(hidden)]
pub type TryVec<T> = fallible_collections::TryVec<T>;
pub(crate) type TryString = fallible_collections::TryVec<u8>;

// To ensure we don't use stdlib allocating types by accident
#[allow(dead_code)]
struct Vec;
#[allow(dead_code)]
struct Box;
#[allow(dead_code)]
struct HashMap;
#[allow(dead_code)]
struct String;

/// Describes decoder failures.
///
/// This enum wraps the standard `io::Error` type, unified with
/// our own decoder error states and those of crates we use.
#[derive(Debug)]
pub enum Error {
    /// Malformed or inconsistent box fields, out-of-range indices, short
    /// item data or misaligned sizes.
    InvalidData(&'static str),
    /// Legal input that uses a feature this crate does not implement.
    Unsupported(&'static str),
    /// Reflect `std::io::ErrorKind::UnexpectedEof` for short data.
    UnexpectedEOF,
    /// Propagate underlying errors from `std::io` and byte sources.
    Io(std::io::Error),
    /// Out of memory
    OutOfMemory,
    /// A configured [`DecodeLimits`] ceiling was exceeded
    ResourceLimitExceeded(&'static str),
    /// Operation was stopped/cancelled
    Stopped(enough::StopReason),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::InvalidData(s) | Self::Unsupported(s) | Self::ResourceLimitExceeded(s) => s,
            Self::UnexpectedEOF => "EOF",
            Self::Io(err) => return err.fmt(f),
            Self::OutOfMemory => "OOM",
            Self::Stopped(reason) => return write!(f, "Stopped: {}", reason),
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {}

impl From<bitreader::BitReaderError> for Error {
    #[cold]
    #[cfg_attr(debug_assertions, track_caller)]
    fn from(err: bitreader::BitReaderError) -> Self {
        log::warn!("bitreader: {err}");
        debug_assert!(!matches!(err, bitreader::BitReaderError::TooManyBitsForType { .. })); // bug
        Self::InvalidData("truncated bits")
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::UnexpectedEOF,
            _ => Self::Io(err),
        }
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(_: std::string::FromUtf8Error) -> Self {
        Self::InvalidData("invalid utf8")
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(_: std::num::TryFromIntError) -> Self {
        Self::Unsupported("integer conversion failed")
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::InvalidData(_) => std::io::ErrorKind::InvalidData,
            Error::UnexpectedEOF => std::io::ErrorKind::UnexpectedEof,
            Error::Io(io_err) => return io_err,
            _ => std::io::ErrorKind::Other,
        };
        Self::new(kind, err)
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

impl From<enough::StopReason> for Error {
    fn from(reason: enough::StopReason) -> Self {
        Self::Stopped(reason)
    }
}

/// Result shorthand using our Error enum.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Basic ISO box structure.
///
/// Item properties are stored as a sequence of 'box' structures. Each box
/// begins with a header describing the length of the box's data and a
/// four-byte box type which identifies the type of the box.
///
/// See ISO 14496-12:2015 § 4.2
#[derive(Debug, Clone, Copy)]
pub(crate) struct BoxHeader {
    /// Box type.
    pub(crate) name: BoxType,
    /// Size of the box in bytes.
    pub(crate) size: u64,
    /// Offset to the start of the contained data (or header size).
    pub(crate) offset: u64,
    /// Uuid for extended type.
    #[allow(unused)]
    pub(crate) uuid: Option<[u8; 16]>,
}

impl BoxHeader {
    /// 4-byte size + 4-byte type
    const MIN_SIZE: u64 = 8;
    /// 4-byte size + 4-byte type + 16-byte size
    const MIN_LARGE_SIZE: u64 = 16;
}

/// Options for parsing property boxes
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Enable lenient parsing mode
    ///
    /// When true, non-zero flags in boxes that expect zero flags are
    /// ignored instead of returning errors.
    ///
    /// Default: false (strict validation)
    pub lenient: bool,
}

/// Resource limits applied while decoding untrusted items.
///
/// Limits are checked **before** allocations occur, so a hostile `uncC` or
/// `icef` claiming huge dimensions or counts fails early instead of running
/// out of memory.
///
/// # Examples
///
/// ```rust
/// use heif_uncompressed::DecodeLimits;
///
/// // Default limits (suitable for most apps)
/// let limits = DecodeLimits::default();
///
/// // Strict limits for untrusted input
/// let limits = DecodeLimits::default()
///     .with_max_image_pixels(16_000_000)
///     .with_max_tiles(256)
///     .with_max_memory_block(64_000_000);
///
/// // No limits
/// let limits = DecodeLimits::unlimited();
/// ```
#[derive(Debug, Clone)]
pub struct DecodeLimits {
    /// Maximum `width × height` of the decoded image.
    /// Default: 2^28 pixels
    pub max_image_pixels: Option<u64>,

    /// Maximum number of components in `uncC`/`cmpd`.
    /// Default: 256
    pub max_components: Option<u32>,

    /// Maximum number of tiles.
    /// Default: 65,536 tiles
    pub max_tiles: Option<u32>,

    /// Largest single buffer: one plane, a materialized extent or the output
    /// of one decompression.
    /// Default: 1GB (1,000,000,000 bytes)
    pub max_memory_block: Option<u64>,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_image_pixels: Some(1 << 28),
            max_components: Some(256),
            max_tiles: Some(65_536),
            max_memory_block: Some(1_000_000_000),
        }
    }
}

impl DecodeLimits {
    /// Create a configuration with no resource limits.
    pub fn unlimited() -> Self {
        Self {
            max_image_pixels: None,
            max_components: None,
            max_tiles: None,
            max_memory_block: None,
        }
    }

    /// Set the maximum image size in pixels
    pub fn with_max_image_pixels(mut self, pixels: u64) -> Self {
        self.max_image_pixels = Some(pixels);
        self
    }

    /// Set the maximum component count
    pub fn with_max_components(mut self, components: u32) -> Self {
        self.max_components = Some(components);
        self
    }

    /// Set the maximum tile count
    pub fn with_max_tiles(mut self, tiles: u32) -> Self {
        self.max_tiles = Some(tiles);
        self
    }

    /// Set the largest single allocation in bytes
    pub fn with_max_memory_block(mut self, bytes: u64) -> Self {
        self.max_memory_block = Some(bytes);
        self
    }
}

pub(crate) struct ResourceTracker<'a> {
    limits: &'a DecodeLimits,
}

impl<'a> ResourceTracker<'a> {
    pub(crate) fn new(limits: &'a DecodeLimits) -> Self {
        Self { limits }
    }

    pub(crate) fn validate_image_pixels(&self, width: u32, height: u32) -> Result<()> {
        if let Some(limit) = self.limits.max_image_pixels {
            let pixels = u64::from(width)
                .checked_mul(u64::from(height))
                .ok_or(Error::InvalidData("dimension overflow"))?;

            if pixels > limit {
                warn!("image {width}x{height} exceeds the {limit} pixel limit");
                return Err(Error::ResourceLimitExceeded("image pixel limit exceeded"));
            }
        }

        Ok(())
    }

    pub(crate) fn validate_components(&self, count: usize) -> Result<()> {
        if let Some(limit) = self.limits.max_components {
            if count.to_u64() > u64::from(limit) {
                return Err(Error::ResourceLimitExceeded("component count limit exceeded"));
            }
        }

        Ok(())
    }

    pub(crate) fn validate_tiles(&self, count: u64) -> Result<()> {
        if let Some(limit) = self.limits.max_tiles {
            if count > u64::from(limit) {
                return Err(Error::ResourceLimitExceeded("tile count limit exceeded"));
            }
        }

        Ok(())
    }

    pub(crate) fn validate_block(&self, bytes: u64) -> Result<()> {
        if let Some(limit) = self.limits.max_memory_block {
            if bytes > limit {
                warn!("{bytes} byte block exceeds the {limit} byte limit");
                return Err(Error::ResourceLimitExceeded("memory block limit exceeded"));
            }
        }

        Ok(())
    }
}

/// The item properties that drive an uncompressed image item.
///
/// Built once from the item's property boxes and read-only afterwards.
#[derive(Debug)]
pub struct UncompressedProperties {
    /// `ispe`: the image dimensions.
    pub spatial_extents: ImageSpatialExtents,
    /// `cmpd`: absent for `uncC` version 1 profiles.
    pub component_definition: Option<ComponentDefinition>,
    /// `uncC`
    pub config: UncompressedConfig,
    /// `cmpC`: present when the item data is generically compressed.
    pub compression: Option<CompressionConfig>,
    /// `icef`: compressed unit offsets and sizes.
    pub unit_table: Option<CompressedUnitTable>,
    /// `cpat`: Bayer / filter array pattern.
    pub bayer_pattern: Option<BayerPattern>,
}

impl UncompressedProperties {
    /// Parse a sequence of complete property boxes, as found in `ipco`.
    ///
    /// Boxes unrelated to the uncompressed codec are skipped.
    pub fn from_property_boxes(data: &[u8]) -> Result<Self> {
        Self::from_property_boxes_with_options(data, &ParseOptions::default())
    }

    /// Parse property boxes with explicit parse options.
    pub fn from_property_boxes_with_options(data: &[u8], options: &ParseOptions) -> Result<Self> {
        let mut cursor = std::io::Cursor::new(data);
        read_property_boxes(&mut cursor, options)
    }

    pub fn width(&self) -> u32 {
        self.spatial_extents.width
    }

    pub fn height(&self) -> u32 {
        self.spatial_extents.height
    }

    /// Serialize all present boxes in canonical order:
    /// `ispe`, `cmpd`, `uncC`, `cmpC`, `icef`, `cpat`.
    pub fn write_boxes(&self) -> Result<std::vec::Vec<u8>> {
        let mut out = std::vec::Vec::new();
        self.spatial_extents.write(&mut out)?;
        if let Some(cmpd) = &self.component_definition {
            cmpd.write(&mut out)?;
        }
        self.config.write(&mut out)?;
        if let Some(cmpc) = &self.compression {
            cmpc.write(&mut out)?;
        }
        if let Some(icef) = &self.unit_table {
            icef.write(&mut out)?;
        }
        if let Some(cpat) = &self.bayer_pattern {
            cpat.write(&mut out)?;
        }
        Ok(out)
    }
}

fn read_property_boxes<T: Read>(src: &mut T, options: &ParseOptions) -> Result<UncompressedProperties> {
    let mut ispe = None;
    let mut cmpd = None;
    let mut uncc = None;
    let mut cmpc = None;
    let mut icef = None;
    let mut cpat = None;

    let mut iter = BoxIter::new(src);
    while let Some(mut b) = iter.next_box()? {
        match b.head.name {
            BoxType::ImageSpatialExtentsBox => {
                set_once(&mut ispe, properties::read_ispe(&mut b, options)?, "duplicate ispe")?;
            },
            BoxType::ComponentDefinitionBox => {
                set_once(&mut cmpd, properties::read_cmpd(&mut b)?, "duplicate cmpd")?;
            },
            BoxType::UncompressedFrameConfigBox => {
                set_once(&mut uncc, properties::read_uncc(&mut b, options)?, "duplicate uncC")?;
            },
            BoxType::GenericCompressionConfigBox => {
                set_once(&mut cmpc, properties::read_cmpc(&mut b, options)?, "duplicate cmpC")?;
            },
            BoxType::GenericCompressedUnitsInfoBox => {
                set_once(&mut icef, properties::read_icef(&mut b, options)?, "duplicate icef")?;
            },
            BoxType::ComponentPatternDefinitionBox => {
                set_once(&mut cpat, properties::read_cpat(&mut b, options)?, "duplicate cpat")?;
            },
            _ => skip_box_content(&mut b)?,
        }
        check_parser_state(&b.head, &b.content)?;
    }

    Ok(UncompressedProperties {
        spatial_extents: ispe.ok_or(Error::InvalidData("missing ispe"))?,
        component_definition: cmpd,
        config: uncc.ok_or(Error::InvalidData("missing uncC"))?,
        compression: cmpc,
        unit_table: icef,
        bayer_pattern: cpat,
    })
}

fn set_once<T>(slot: &mut Option<T>, value: T, msg: &'static str) -> Result<()> {
    if slot.is_some() {
        return Err(Error::InvalidData(msg));
    }
    *slot = Some(value);
    Ok(())
}

/// See ISO 14496-12:2015 § 4.2
pub(crate) struct BMFFBox<'a, T> {
    pub(crate) head: BoxHeader,
    pub(crate) content: Take<&'a mut T>,
}

impl<T: Read> BMFFBox<'_, T> {
    pub(crate) fn read_into_try_vec(&mut self) -> std::io::Result<TryVec<u8>> {
        let limit = self.content.limit();
        let mut vec = std::vec::Vec::new();
        vec.try_reserve_exact(usize::try_from(limit).map_err(|_| std::io::ErrorKind::OutOfMemory)?)
            .map_err(|_| std::io::ErrorKind::OutOfMemory)?;
        self.content.read_to_end(&mut vec)?; // The default impl
        Ok(vec.into())
    }

    pub(crate) fn bytes_left(&self) -> u64 {
        self.content.limit()
    }

    pub(crate) const fn get_header(&self) -> &BoxHeader {
        &self.head
    }
}

impl<T: Read> Read for BMFFBox<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.content.read(buf)
    }
}

impl<T> Drop for BMFFBox<'_, T> {
    fn drop(&mut self) {
        if self.content.limit() > 0 {
            let name: FourCC = From::from(self.head.name);
            debug!("Dropping {} bytes in '{}'", self.content.limit(), name);
        }
    }
}

pub(crate) struct BoxIter<'a, T> {
    src: &'a mut T,
}

impl<T: Read> BoxIter<'_, T> {
    pub(crate) fn new(src: &mut T) -> BoxIter<'_, T> {
        BoxIter { src }
    }

    pub(crate) fn next_box(&mut self) -> Result<Option<BMFFBox<'_, T>>> {
        let r = read_box_header(self.src);
        match r {
            Ok(h) => Ok(Some(BMFFBox {
                head: h,
                content: self.src.take(h.size - h.offset),
            })),
            Err(Error::UnexpectedEOF) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Read and parse a box header.
///
/// Call this first to determine the type of a particular box
/// and its length. Used internally for dispatching to specific
/// parsers for the internal content, or to get the length to
/// skip unknown or uninteresting boxes.
///
/// See ISO 14496-12:2015 § 4.2
fn read_box_header<T: ReadBytesExt>(src: &mut T) -> Result<BoxHeader> {
    let size32 = be_u32(src)?;
    let name = BoxType::from(be_u32(src)?);
    let size = match size32 {
        // Only meaningful for the last top-level box; properties always carry a size.
        0 => return Err(Error::InvalidData("unsized property box")),
        1 => {
            let size64 = be_u64(src)?;
            if size64 < BoxHeader::MIN_LARGE_SIZE {
                return Err(Error::InvalidData("malformed wide size"));
            }
            size64
        },
        _ => {
            if u64::from(size32) < BoxHeader::MIN_SIZE {
                return Err(Error::InvalidData("malformed size"));
            }
            u64::from(size32)
        },
    };
    let mut offset = match size32 {
        1 => BoxHeader::MIN_LARGE_SIZE,
        _ => BoxHeader::MIN_SIZE,
    };
    let uuid = if name == BoxType::UuidBox {
        if size >= offset + 16 {
            let mut buffer = [0u8; 16];
            let count = src.read(&mut buffer)?;
            offset += count.to_u64();
            if count == 16 {
                Some(buffer)
            } else {
                debug!("malformed uuid (short read), skipping");
                None
            }
        } else {
            debug!("malformed uuid, skipping");
            None
        }
    } else {
        None
    };
    if offset > size {
        return Err(Error::InvalidData("box header larger than box"));
    }
    Ok(BoxHeader { name, size, offset, uuid })
}

/// Parse the extra header fields for a full box.
pub(crate) fn read_fullbox_extra<T: ReadBytesExt>(src: &mut T) -> Result<(u8, u32)> {
    let version = src.read_u8()?;
    let flags_a = src.read_u8()?;
    let flags_b = src.read_u8()?;
    let flags_c = src.read_u8()?;
    Ok((
        version,
        u32::from(flags_a) << 16 | u32::from(flags_b) << 8 | u32::from(flags_c),
    ))
}

// Parse the extra fields for a full box whose flag fields must be zero.
pub(crate) fn read_fullbox_version_no_flags<T: ReadBytesExt>(src: &mut T, options: &ParseOptions) -> Result<u8> {
    let (version, flags) = read_fullbox_extra(src)?;

    if flags != 0 && !options.lenient {
        return Err(Error::Unsupported("expected flags to be 0"));
    }

    Ok(version)
}

/// Skip over the entire contents of a box.
fn skip_box_content<T: Read>(src: &mut BMFFBox<'_, T>) -> Result<()> {
    // Skip the contents of unknown chunks.
    let to_skip = {
        let header = src.get_header();
        debug!("{header:?} (skipped)");
        header
            .size
            .checked_sub(header.offset)
            .ok_or(Error::InvalidData("header offset > size"))?
    };
    skip(src, to_skip)
}

#[cfg_attr(debug_assertions, track_caller)]
pub(crate) fn check_parser_state<T>(header: &BoxHeader, left: &Take<T>) -> Result<(), Error> {
    let limit = left.limit();
    if limit == 0 {
        Ok(())
    } else {
        let name: FourCC = From::from(header.name);
        warn!("{limit} bytes left unread in '{name}'");
        Err(Error::InvalidData("unread box content or bad parser sync"))
    }
}

/// Skip a number of bytes that we don't care to parse.
pub(crate) fn skip<T: Read>(src: &mut T, bytes: u64) -> Result<()> {
    let copied = std::io::copy(&mut src.take(bytes), &mut std::io::sink())?;
    if copied != bytes {
        return Err(Error::UnexpectedEOF);
    }
    Ok(())
}

pub(crate) fn be_u16<T: ReadBytesExt>(src: &mut T) -> Result<u16> {
    src.read_u16::<byteorder::BigEndian>().map_err(From::from)
}

pub(crate) fn be_u32<T: ReadBytesExt>(src: &mut T) -> Result<u32> {
    src.read_u32::<byteorder::BigEndian>().map_err(From::from)
}

pub(crate) fn be_u64<T: ReadBytesExt>(src: &mut T) -> Result<u64> {
    src.read_u64::<byteorder::BigEndian>().map_err(From::from)
}

#[test]
fn box_read_to_end() {
    let tmp = &mut b"1234567890".as_slice();
    let mut src = BMFFBox {
        head: BoxHeader { name: BoxType::ComponentDefinitionBox, size: 13, offset: 8, uuid: None },
        content: <_ as Read>::take(tmp, 5),
    };
    let buf = src.read_into_try_vec().unwrap();
    assert_eq!(buf.len(), 5);
    assert_eq!(buf, b"12345".as_ref());
}

#[test]
fn box_read_to_end_oom() {
    let tmp = &mut b"1234567890".as_slice();
    let mut src = BMFFBox {
        head: BoxHeader { name: BoxType::ComponentDefinitionBox, size: 5, offset: 0, uuid: None },
        content: <_ as Read>::take(tmp, u64::MAX / 2),
    };
    assert!(src.read_into_try_vec().is_err());
}

#[test]
fn truncated_box_header_is_end_of_stream() {
    let mut data: &[u8] = &[0, 0, 0];
    let mut iter = BoxIter::new(&mut data);
    assert!(iter.next_box().unwrap().is_none());
}

#[test]
fn unsized_property_box_is_rejected() {
    let mut data: &[u8] = &[0, 0, 0, 0, b'u', b'n', b'c', b'C'];
    let mut iter = BoxIter::new(&mut data);
    assert!(matches!(iter.next_box(), Err(Error::InvalidData(_))));
}

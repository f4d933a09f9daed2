// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Generic compression (`cmpC`/`icef`), ISO/IEC 23001-17 § 6.
//!
//! The resolver maps a tile's raw byte range to bytes, decompressing
//! compressed units as needed.

use std::borrow::Cow;
use std::cell::OnceCell;
use std::fmt;
#[cfg(any(feature = "deflate", feature = "brotli"))]
use std::io::{Read, Write};

use log::{debug, warn};

use crate::boxes::FourCC;
use crate::extent::DataExtent;
use crate::properties::{CompressedUnitTable, CompressedUnitType, CompressionConfig};
use crate::{DecodeLimits, Error, Result, ToU64, UncompressedProperties};

/// Generic compression algorithm named by `cmpC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    /// `zlib`: RFC 1950
    Zlib,
    /// `defl`: RFC 1951
    Deflate,
    /// `brot`: RFC 7932
    Brotli,
    Other(FourCC),
}

impl From<FourCC> for CompressionType {
    fn from(fourcc: FourCC) -> Self {
        match &fourcc.value {
            b"zlib" => Self::Zlib,
            b"defl" => Self::Deflate,
            b"brot" => Self::Brotli,
            _ => Self::Other(fourcc),
        }
    }
}

impl From<CompressionType> for FourCC {
    fn from(t: CompressionType) -> Self {
        match t {
            CompressionType::Zlib => Self::new(b"zlib"),
            CompressionType::Deflate => Self::new(b"defl"),
            CompressionType::Brotli => Self::new(b"brot"),
            CompressionType::Other(fourcc) => fourcc,
        }
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zlib => f.write_str("zlib"),
            Self::Deflate => f.write_str("deflate"),
            Self::Brotli => f.write_str("brotli"),
            Self::Other(fourcc) => write!(f, "unknown ({fourcc})"),
        }
    }
}

impl CompressionConfig {
    pub fn algorithm(&self) -> CompressionType {
        self.compression_type.into()
    }
}

#[cfg(any(feature = "deflate", feature = "brotli"))]
fn read_capped<R: Read>(mut reader: R, max_len: Option<u64>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let result = match max_len {
        Some(max) => reader.take(max.saturating_add(1)).read_to_end(&mut out),
        None => reader.read_to_end(&mut out),
    };
    if let Err(err) = result {
        warn!("decompression failed: {err}");
        return Err(Error::InvalidData("corrupt compressed data"));
    }
    if let Some(max) = max_len {
        if out.len().to_u64() > max {
            warn!("decompressed unit exceeds the {max} byte limit");
            return Err(Error::ResourceLimitExceeded("memory block limit exceeded"));
        }
    }
    Ok(out)
}

/// Decompress one unit, failing once the output would exceed `max_len`.
pub(crate) fn decompress(algorithm: CompressionType, data: &[u8], max_len: Option<u64>) -> Result<Vec<u8>> {
    match algorithm {
        #[cfg(feature = "deflate")]
        CompressionType::Zlib => read_capped(flate2::read::ZlibDecoder::new(data), max_len),
        #[cfg(feature = "deflate")]
        CompressionType::Deflate => read_capped(flate2::read::DeflateDecoder::new(data), max_len),
        #[cfg(feature = "brotli")]
        CompressionType::Brotli => read_capped(brotli::Decompressor::new(data, 4096), max_len),
        other => {
            warn!("no decompressor for {other}");
            Err(Error::Unsupported("compression type not available"))
        },
    }
}

pub(crate) fn compress(algorithm: CompressionType, data: &[u8]) -> Result<Vec<u8>> {
    match algorithm {
        #[cfg(feature = "deflate")]
        CompressionType::Zlib => {
            let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        },
        #[cfg(feature = "deflate")]
        CompressionType::Deflate => {
            let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        },
        #[cfg(feature = "brotli")]
        CompressionType::Brotli => {
            let mut compressed = Vec::new();
            let mut compressor = brotli::CompressorWriter::new(&mut compressed, 4096, 11, 22);
            compressor.write_all(data)?;
            drop(compressor);
            Ok(compressed)
        },
        other => {
            warn!("no compressor for {other}");
            Err(Error::Unsupported("compression type not available"))
        },
    }
}

fn read_unit<'e>(extent: &'e DataExtent<'_>, table: &CompressedUnitTable, index: usize) -> Result<Cow<'e, [u8]>> {
    let unit = table.get(index).ok_or_else(|| {
        warn!("no icef entry for unit {index} of {}", table.len());
        Error::InvalidData("missing icef entry")
    })?;
    let end = unit
        .offset
        .checked_add(unit.size)
        .ok_or(Error::InvalidData("icef unit end overflow"))?;
    if end > extent.size()? {
        warn!("icef unit {index} ends at {end}, past the item data");
        return Err(Error::InvalidData("compressed unit exceeds the item data"));
    }
    extent.read(unit.offset, unit.size)
}

fn slice_range(data: &[u8], offset: u64, size: u64) -> Result<&[u8]> {
    let start = usize::try_from(offset).map_err(|_| Error::InvalidData("range past decompressed data"))?;
    let len = usize::try_from(size).map_err(|_| Error::InvalidData("range past decompressed data"))?;
    start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| {
            warn!("range {offset}+{size} past {} decompressed bytes", data.len());
            Error::InvalidData("range past decompressed data")
        })
}

/// How a tile's bytes are located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Raw,
    TileUnit,
    FullItemUnits,
    WholeExtent,
}

fn strategy(compression: Option<&CompressionConfig>, unit_table: Option<&CompressedUnitTable>) -> Result<Strategy> {
    let Some(cmpc) = compression else {
        return Ok(Strategy::Raw);
    };
    if unit_table.is_none() {
        return Ok(Strategy::WholeExtent);
    }
    match cmpc.unit_type {
        CompressedUnitType::ImageTile => Ok(Strategy::TileUnit),
        CompressedUnitType::FullItem => Ok(Strategy::FullItemUnits),
        CompressedUnitType::Image | CompressedUnitType::ImageRow | CompressedUnitType::ImagePixel => {
            Err(Error::Unsupported("compressed unit type"))
        },
    }
}

/// Decompressed item data, either every `icef` unit concatenated or the
/// whole extent as one unit.
fn decompress_full_item(
    extent: &DataExtent<'_>,
    cmpc: &CompressionConfig,
    unit_table: Option<&CompressedUnitTable>,
    max_len: Option<u64>,
) -> Result<Vec<u8>> {
    let algorithm = cmpc.algorithm();
    match unit_table {
        Some(table) => {
            let mut out = Vec::new();
            for index in 0..table.len() {
                let unit = read_unit(extent, table, index)?;
                let remaining = max_len.map(|max| max.saturating_sub(out.len().to_u64()));
                let data = decompress(algorithm, &unit, remaining)?;
                out.try_reserve(data.len()).map_err(|_| Error::OutOfMemory)?;
                out.extend_from_slice(&data);
            }
            debug!("decompressed {} full-item units into {} bytes", table.len(), out.len());
            Ok(out)
        },
        None => {
            let data = extent.read_all()?;
            let out = decompress(algorithm, &data, max_len)?;
            debug!("decompressed {} byte item into {} bytes", data.len(), out.len());
            Ok(out)
        },
    }
}

fn resolve_uncached<'e>(
    extent: &'e DataExtent<'_>,
    compression: Option<&CompressionConfig>,
    unit_table: Option<&CompressedUnitTable>,
    unit_index: usize,
    offset: u64,
    size: u64,
    max_len: Option<u64>,
) -> Result<Cow<'e, [u8]>> {
    match (strategy(compression, unit_table)?, compression, unit_table) {
        (Strategy::Raw, ..) => extent.read(offset, size),
        (Strategy::TileUnit, Some(cmpc), Some(table)) => {
            let unit = read_unit(extent, table, unit_index)?;
            let data = decompress(cmpc.algorithm(), &unit, max_len)?;
            if data.len().to_u64() < size {
                warn!("unit {unit_index} holds {} bytes, tile needs {size}", data.len());
                return Err(Error::InvalidData("compressed unit shorter than the tile"));
            }
            Ok(Cow::Owned(data))
        },
        (Strategy::FullItemUnits | Strategy::WholeExtent, Some(cmpc), _) => {
            let data = decompress_full_item(extent, cmpc, unit_table, max_len)?;
            Ok(Cow::Owned(slice_range(&data, offset, size)?.to_vec()))
        },
        _ => Err(Error::InvalidData("inconsistent compression boxes")),
    }
}

/// Resolve the bytes of one tile (or, for tile-component interleave, one
/// component tile).
///
/// `unit_index` selects the `icef` entry for tile units; `offset`/`size` locate
/// the tile in the uncompressed item data. Full-item results are not cached;
/// use [`CompressedUnitResolver`] to decode several tiles.
pub fn resolve_tile_bytes<'e>(
    extent: &'e DataExtent<'_>,
    compression: Option<&CompressionConfig>,
    unit_table: Option<&CompressedUnitTable>,
    unit_index: usize,
    offset: u64,
    size: u64,
) -> Result<Cow<'e, [u8]>> {
    resolve_uncached(extent, compression, unit_table, unit_index, offset, size, None)
}

/// Tile byte resolver that decompresses a full-item payload at most once.
pub struct CompressedUnitResolver<'p> {
    compression: Option<&'p CompressionConfig>,
    unit_table: Option<&'p CompressedUnitTable>,
    strategy: Strategy,
    max_block: Option<u64>,
    full_item: OnceCell<Vec<u8>>,
}

impl<'p> CompressedUnitResolver<'p> {
    pub fn new(properties: &'p UncompressedProperties, limits: &DecodeLimits) -> Result<Self> {
        let compression = properties.compression.as_ref();
        let unit_table = properties.unit_table.as_ref();
        let strategy = strategy(compression, unit_table)?;
        if let Some(cmpc) = compression {
            debug!("{strategy:?} resolution of {} {:?} units", cmpc.algorithm(), cmpc.unit_type);
        }
        Ok(Self {
            compression,
            unit_table,
            strategy,
            max_block: limits.max_memory_block,
            full_item: OnceCell::new(),
        })
    }

    /// Whether tiles are stored as separately compressed units.
    pub fn uses_tile_units(&self) -> bool {
        self.strategy == Strategy::TileUnit
    }

    pub fn resolve<'s>(
        &'s self,
        extent: &'s DataExtent<'_>,
        unit_index: usize,
        offset: u64,
        size: u64,
    ) -> Result<Cow<'s, [u8]>> {
        match (self.strategy, self.compression) {
            (Strategy::FullItemUnits | Strategy::WholeExtent, Some(cmpc)) => {
                let data = match self.full_item.get() {
                    Some(data) => data,
                    None => {
                        let data = decompress_full_item(extent, cmpc, self.unit_table, self.max_block)?;
                        self.full_item.get_or_init(|| data)
                    },
                };
                Ok(Cow::Borrowed(slice_range(data, offset, size)?))
            },
            _ => resolve_uncached(
                extent,
                self.compression,
                self.unit_table,
                unit_index,
                offset,
                size,
                self.max_block,
            ),
        }
    }
}

#[cfg(all(test, feature = "deflate"))]
mod tests {
    use super::*;
    use crate::extent::ByteSource;
    use crate::properties::CompressedUnit;
    use std::cell::Cell;

    struct CountingSource {
        data: Vec<u8>,
        reads: Cell<usize>,
    }

    impl ByteSource for CountingSource {
        fn len(&self) -> Result<u64> {
            Ok(self.data.len().to_u64())
        }

        fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
            self.reads.set(self.reads.get() + 1);
            self.data.as_slice().read_at(offset, buf)
        }
    }

    fn zlib() -> CompressionConfig {
        CompressionConfig { compression_type: FourCC::new(b"zlib"), unit_type: CompressedUnitType::FullItem }
    }

    #[test]
    fn compression_type_codes() {
        assert_eq!(CompressionType::from(FourCC::new(b"defl")), CompressionType::Deflate);
        assert_eq!(FourCC::from(CompressionType::Brotli), FourCC::new(b"brot"));
        assert_eq!(CompressionType::from(FourCC::new(b"lzma")).to_string(), "unknown (lzma)");
    }

    #[test]
    fn unknown_algorithm_is_unsupported() {
        let algorithm = CompressionType::Other(FourCC::new(b"lzma"));
        assert!(matches!(decompress(algorithm, &[1, 2, 3], None), Err(Error::Unsupported(_))));
    }

    #[test]
    fn decompression_is_capped() {
        let data = compress(CompressionType::Deflate, &[7u8; 1000]).unwrap();
        assert_eq!(decompress(CompressionType::Deflate, &data, Some(1000)).unwrap().len(), 1000);
        assert!(matches!(
            decompress(CompressionType::Deflate, &data, Some(999)),
            Err(Error::ResourceLimitExceeded(_))
        ));
    }

    #[test]
    fn corrupt_stream_is_invalid() {
        assert!(matches!(
            decompress(CompressionType::Zlib, &[0xff, 0x00, 0x12, 0x34], None),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn raw_tiles_are_read_verbatim() {
        let data: std::vec::Vec<u8> = (0..16).collect();
        let extent = DataExtent::from_memory(&data);
        assert_eq!(&*resolve_tile_bytes(&extent, None, None, 3, 4, 4).unwrap(), &[4, 5, 6, 7]);
    }

    #[test]
    fn whole_extent_is_decompressed_and_sliced() {
        let raw: std::vec::Vec<u8> = (0..64).collect();
        let item = compress(CompressionType::Zlib, &raw).unwrap();
        let extent = DataExtent::from_memory(&item);
        let cmpc = zlib();
        assert_eq!(&*resolve_tile_bytes(&extent, Some(&cmpc), None, 0, 60, 4).unwrap(), &[60, 61, 62, 63]);
        assert!(matches!(
            resolve_tile_bytes(&extent, Some(&cmpc), None, 0, 62, 4),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn tile_units_are_read_individually() {
        let tiles = [[1u8; 8], [2u8; 8], [3u8; 8]];
        let mut item = std::vec::Vec::new();
        let mut sizes = std::vec::Vec::new();
        for tile in &tiles {
            let unit = compress(CompressionType::Zlib, tile).unwrap();
            sizes.push(unit.len() as u64);
            item.extend_from_slice(&unit);
        }
        let source = CountingSource { data: item, reads: Cell::new(0) };
        let extent = DataExtent::from_file_range(&source, 0..source.data.len() as u64).unwrap();

        let properties = crate::UncompressedProperties {
            spatial_extents: crate::ImageSpatialExtents { width: 3, height: 1 },
            component_definition: None,
            config: crate::UncompressedConfig::shortform(FourCC::new(b"rgb3")).unwrap(),
            compression: Some(CompressionConfig {
                compression_type: FourCC::new(b"zlib"),
                unit_type: CompressedUnitType::ImageTile,
            }),
            unit_table: Some(CompressedUnitTable::from_sizes(&sizes).unwrap()),
            bayer_pattern: None,
        };
        let resolver = CompressedUnitResolver::new(&properties, &DecodeLimits::default()).unwrap();
        assert!(resolver.uses_tile_units());
        assert_eq!(&*resolver.resolve(&extent, 2, 16, 8).unwrap(), &[3u8; 8]);
        assert_eq!(&*resolver.resolve(&extent, 0, 0, 8).unwrap(), &[1u8; 8]);
        assert_eq!(source.reads.get(), 2);

        // A unit shorter than the tile it should hold
        assert!(matches!(resolver.resolve(&extent, 1, 8, 9), Err(Error::InvalidData(_))));
        assert!(matches!(resolver.resolve(&extent, 3, 24, 8), Err(Error::InvalidData(_))));
    }

    #[test]
    fn full_item_units_are_decompressed_once() {
        let raw: std::vec::Vec<u8> = (0..100).collect();
        let first = compress(CompressionType::Zlib, &raw[..40]).unwrap();
        let second = compress(CompressionType::Zlib, &raw[40..]).unwrap();
        let mut item = first.clone();
        item.extend_from_slice(&second);
        let source = CountingSource { data: item, reads: Cell::new(0) };
        let extent = DataExtent::from_file_range(&source, 0..source.data.len() as u64).unwrap();

        let properties = crate::UncompressedProperties {
            spatial_extents: crate::ImageSpatialExtents { width: 10, height: 10 },
            component_definition: None,
            config: crate::UncompressedConfig::shortform(FourCC::new(b"rgb3")).unwrap(),
            compression: Some(zlib()),
            unit_table: Some(CompressedUnitTable::from_sizes(&[first.len() as u64, second.len() as u64]).unwrap()),
            bayer_pattern: None,
        };
        let resolver = CompressedUnitResolver::new(&properties, &DecodeLimits::default()).unwrap();
        assert_eq!(&*resolver.resolve(&extent, 0, 38, 4).unwrap(), &[38, 39, 40, 41]);
        let reads = source.reads.get();
        assert_eq!(&*resolver.resolve(&extent, 1, 90, 10).unwrap(), &raw[90..]);
        assert_eq!(source.reads.get(), reads);
    }

    #[test]
    fn unit_past_extent_is_invalid() {
        let table = CompressedUnitTable { units: vec![CompressedUnit { offset: 4, size: 10 }].into() };
        let data = [0u8; 8];
        let extent = DataExtent::from_memory(&data);
        assert!(matches!(read_unit(&extent, &table, 0), Err(Error::InvalidData(_))));
    }
}

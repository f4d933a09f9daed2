// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Writing a [`PixelImage`] as an uncompressed image item.

use fallible_collections::TryClone;
use log::{debug, warn};

use crate::bits::TileEncoder;
use crate::chroma::derive_chroma;
use crate::compression::{compress, CompressionType};
use crate::image::{Channel, Chroma, Colorspace, PixelImage};
use crate::interleave::{build_channel_list, Segment, TileLayout};
use crate::properties::{
    CompressedUnitTable, CompressedUnitType, ComponentDefinition, ComponentFormat, ComponentType, CompressionConfig,
    ImageSpatialExtents, InterleaveType, SamplingType, UncompressedComponent, UncompressedConfig, PROFILE_RGB3,
    PROFILE_RGBA,
};
use crate::validate::{validate, validate_geometry};
use crate::{Error, Result, ToU64, TryVec, UncompressedProperties};

/// Layout choices for [`encode_image`].
///
/// ```
/// use heif_uncompressed::{CompressedUnitType, CompressionType, EncodeOptions, InterleaveType};
///
/// let options = EncodeOptions::new(InterleaveType::Row)
///     .with_tiles(4, 2)
///     .with_row_align_size(4)
///     .with_compression(CompressionType::Zlib, CompressedUnitType::ImageTile);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub interleave: InterleaveType,
    pub tile_columns: u32,
    pub tile_rows: u32,
    /// Bytes per pixel for pixel interleave; 0 packs pixels back to back.
    pub pixel_size: u32,
    pub row_align_size: u32,
    pub tile_align_size: u32,
    /// `align_size` of every component: 0 (bit packed), 1 or 2.
    pub component_align_size: u8,
    pub components_little_endian: bool,
    /// Generic compression and the unit it applies to (full item or tile).
    pub compression: Option<(CompressionType, CompressedUnitType)>,
    /// Write `uncC` version 1 with an `rgb3`/`rgba` profile and no `cmpd`.
    pub shortform: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self::new(InterleaveType::Component)
    }
}

impl EncodeOptions {
    pub fn new(interleave: InterleaveType) -> Self {
        Self {
            interleave,
            tile_columns: 1,
            tile_rows: 1,
            pixel_size: 0,
            row_align_size: 0,
            tile_align_size: 0,
            component_align_size: 0,
            components_little_endian: false,
            compression: None,
            shortform: false,
        }
    }

    pub fn with_tiles(mut self, columns: u32, rows: u32) -> Self {
        self.tile_columns = columns;
        self.tile_rows = rows;
        self
    }

    pub fn with_pixel_size(mut self, bytes: u32) -> Self {
        self.pixel_size = bytes;
        self
    }

    pub fn with_row_align_size(mut self, bytes: u32) -> Self {
        self.row_align_size = bytes;
        self
    }

    pub fn with_tile_align_size(mut self, bytes: u32) -> Self {
        self.tile_align_size = bytes;
        self
    }

    pub fn with_component_align_size(mut self, bytes: u8) -> Self {
        self.component_align_size = bytes;
        self
    }

    pub fn with_little_endian_components(mut self) -> Self {
        self.components_little_endian = true;
        self
    }

    pub fn with_compression(mut self, algorithm: CompressionType, unit_type: CompressedUnitType) -> Self {
        self.compression = Some((algorithm, unit_type));
        self
    }

    pub fn with_shortform(mut self) -> Self {
        self.shortform = true;
        self
    }
}

/// An encoded item: its data and the properties describing it.
#[derive(Debug)]
pub struct EncodedImage {
    /// Item data, compressed when requested.
    pub bitstream: Vec<u8>,
    pub properties: UncompressedProperties,
    /// `properties` serialized as ispe, cmpd, uncC, cmpC, icef and cpat boxes.
    pub property_boxes: Vec<u8>,
}

fn shortform_config(image: &PixelImage, options: &EncodeOptions) -> Result<UncompressedConfig> {
    let plain_layout = options.interleave == InterleaveType::Pixel
        && options.tile_columns == 1
        && options.tile_rows == 1
        && options.pixel_size == 0
        && options.row_align_size == 0
        && options.tile_align_size == 0
        && options.component_align_size == 0
        && !options.components_little_endian;
    let rgb8 = image.colorspace() == Colorspace::Rgb && image.planes().iter().all(|plane| plane.bit_depth() == 8);
    if !plain_layout || !rgb8 {
        warn!("shortform requested for a {:?} image with {:?}", image.colorspace(), options);
        return Err(Error::Unsupported("shortform needs untiled, unpadded, pixel interleaved 8-bit RGB(A)"));
    }
    UncompressedConfig::shortform(if image.has_alpha() { PROFILE_RGBA } else { PROFILE_RGB3 })
}

/// Component types in stream order for the image's colorspace.
fn component_types(image: &PixelImage) -> Result<TryVec<(Channel, ComponentType)>> {
    let mut types = TryVec::with_capacity(4)?;
    match image.colorspace() {
        Colorspace::Monochrome => {
            let luma = if image.bayer_pattern.is_some() { ComponentType::FILTER_ARRAY } else { ComponentType::MONOCHROME };
            types.push((Channel::Y, luma))?;
        },
        Colorspace::YCbCr => {
            if image.has_alpha() {
                return Err(Error::Unsupported("Y/Cb/Cr with alpha has no component set"));
            }
            types.push((Channel::Y, ComponentType::Y))?;
            types.push((Channel::Cb, ComponentType::CB))?;
            types.push((Channel::Cr, ComponentType::CR))?;
        },
        Colorspace::Rgb => {
            types.push((Channel::R, ComponentType::RED))?;
            types.push((Channel::G, ComponentType::GREEN))?;
            types.push((Channel::B, ComponentType::BLUE))?;
        },
    }
    if image.has_alpha() {
        types.push((Channel::Alpha, ComponentType::ALPHA))?;
    }
    if types.len() != image.planes().len() {
        warn!("{:?} image has {} planes, expected {}", image.colorspace(), image.planes().len(), types.len());
        return Err(Error::InvalidData("image planes do not match its colorspace"));
    }
    Ok(types)
}

fn full_config(image: &PixelImage, options: &EncodeOptions) -> Result<(UncompressedConfig, ComponentDefinition)> {
    let types = component_types(image)?;
    let mut components = TryVec::with_capacity(types.len())?;
    let mut cmpd_types = TryVec::with_capacity(types.len())?;
    for (index, &(channel, component_type)) in types.iter().enumerate() {
        let plane = image.plane(channel).ok_or(Error::InvalidData("image is missing a plane"))?;
        components.push(UncompressedComponent {
            index: u16::try_from(index)?,
            bit_depth: plane.bit_depth(),
            format: ComponentFormat::Unsigned,
            align_size: options.component_align_size,
        })?;
        cmpd_types.push(component_type)?;
    }

    let mut config = UncompressedConfig::new(components, options.interleave);
    config.sampling_type = match image.chroma() {
        Chroma::C420 => SamplingType::S420,
        Chroma::C422 => SamplingType::S422,
        Chroma::C444 | Chroma::Monochrome => SamplingType::NoSubsampling,
    };
    config.components_little_endian = options.components_little_endian;
    config.pixel_size = options.pixel_size;
    config.row_align_size = options.row_align_size;
    config.tile_align_size = options.tile_align_size;
    config.tile_columns = options.tile_columns;
    config.tile_rows = options.tile_rows;
    Ok((config, ComponentDefinition::from_types(&cmpd_types)?))
}

fn alloc_zeroed(len: u64) -> Result<Vec<u8>> {
    let len = usize::try_from(len).map_err(|_| Error::OutOfMemory)?;
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
    data.resize(len, 0);
    Ok(data)
}

fn byte_range(segment: &Segment) -> Result<std::ops::Range<usize>> {
    let start = usize::try_from(segment.offset)?;
    let end = start
        .checked_add(usize::try_from(segment.size)?)
        .ok_or(Error::InvalidData("segment end overflow"))?;
    Ok(start..end)
}

/// Encode `image` as uncompressed item data plus its property boxes.
pub fn encode_image(image: &PixelImage, options: &EncodeOptions) -> Result<EncodedImage> {
    let (config, cmpd) = if options.shortform {
        (shortform_config(image, options)?, None)
    } else {
        let (config, cmpd) = full_config(image, options)?;
        (config, Some(cmpd))
    };
    let bayer_pattern = match (&cmpd, &image.bayer_pattern) {
        (Some(_), Some(pattern)) if image.colorspace() == Colorspace::Monochrome => Some(pattern.try_clone()?),
        _ => None,
    };
    let mut properties = UncompressedProperties {
        spatial_extents: ImageSpatialExtents { width: image.width(), height: image.height() },
        component_definition: cmpd,
        config,
        compression: None,
        unit_table: None,
        bayer_pattern,
    };
    validate(&properties.config, properties.component_definition.as_ref())?;
    validate_geometry(&properties)?;

    let chroma = derive_chroma(&properties.config, properties.component_definition.as_ref())?;
    if chroma.chroma != image.chroma() || chroma.colorspace != image.colorspace() {
        return Err(Error::InvalidData("image chroma does not match its planes"));
    }

    let config = &properties.config;
    let entries = build_channel_list(config, properties.component_definition.as_ref(), chroma.chroma, image)?;
    let layout = TileLayout::new(config, image.width(), image.height(), &entries)?;
    let mut item = alloc_zeroed(layout.item_size()?)?;
    let mut segments = std::vec::Vec::new();

    for tile_y in 0..config.tile_rows {
        for tile_x in 0..config.tile_columns {
            for segment in layout.segments(tile_x, tile_y)? {
                let mut encoder = TileEncoder::new(image.planes());
                match segment.entry {
                    Some(index) => {
                        let entry = entries
                            .get(index)
                            .ok_or(Error::InvalidData("component tile without a component"))?;
                        layout.walk_component_tile(&mut encoder, entry, tile_x, tile_y)?;
                    },
                    None => layout.walk(&mut encoder, &entries, tile_x, tile_y)?,
                }
                let bytes = encoder.finish();
                if bytes.len().to_u64() != segment.size {
                    warn!("tile ({tile_x}, {tile_y}) encoded to {} bytes, layout says {}", bytes.len(), segment.size);
                    return Err(Error::InvalidData("encoded tile size mismatch"));
                }
                item.get_mut(byte_range(&segment)?)
                    .ok_or(Error::InvalidData("tile outside the item data"))?
                    .copy_from_slice(&bytes);
                segments.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
                segments.push(segment);
            }
        }
    }
    debug!(
        "encoded {}x{} {:?} image as {} bytes in {} segments",
        image.width(),
        image.height(),
        layout.mode(),
        item.len(),
        segments.len()
    );

    let bitstream = match options.compression {
        None => item,
        Some((algorithm, CompressedUnitType::FullItem)) => compress(algorithm, &item)?,
        Some((algorithm, CompressedUnitType::ImageTile)) => {
            segments.sort_by_key(|segment| segment.unit_index);
            let mut out = Vec::new();
            let mut sizes = std::vec::Vec::new();
            sizes.try_reserve_exact(segments.len()).map_err(|_| Error::OutOfMemory)?;
            for segment in &segments {
                let unit = item
                    .get(byte_range(segment)?)
                    .ok_or(Error::InvalidData("tile outside the item data"))?;
                let compressed = compress(algorithm, unit)?;
                sizes.push(compressed.len().to_u64());
                out.try_reserve(compressed.len()).map_err(|_| Error::OutOfMemory)?;
                out.extend_from_slice(&compressed);
            }
            properties.unit_table = Some(CompressedUnitTable::from_sizes(&sizes)?);
            out
        },
        Some((_, _)) => return Err(Error::Unsupported("compressed unit type")),
    };
    if let Some((algorithm, unit_type)) = options.compression {
        debug!("{algorithm} compressed {unit_type:?} units into {} bytes", bitstream.len());
        properties.compression = Some(CompressionConfig { compression_type: algorithm.into(), unit_type });
    }

    let property_boxes = properties.write_boxes()?;
    Ok(EncodedImage { bitstream, properties, property_boxes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_uncompressed_image;
    use crate::extent::DataExtent;
    use crate::properties::{BayerPattern, BayerPatternEntry};
    use crate::{DecodeLimits, FourCC};

    fn gradient(width: u32, height: u32, colorspace: Colorspace, chroma: Chroma, planes: &[(Channel, u16)]) -> PixelImage {
        let mut image = PixelImage::new(width, height, colorspace, chroma);
        for (n, &(channel, depth)) in planes.iter().enumerate() {
            let plane = image.add_plane(channel, depth).unwrap();
            let max = (1u64 << depth) - 1;
            for y in 0..plane.height() {
                for x in 0..plane.width() {
                    let value = (u64::from(x) * 7 + u64::from(y) * 13 + n as u64 * 29) % (max + 1);
                    plane.set_sample(x, y, value).unwrap();
                }
            }
        }
        image
    }

    fn assert_same_samples(a: &PixelImage, b: &PixelImage) {
        assert_eq!(a.planes().len(), b.planes().len());
        for plane in a.planes() {
            let other = b.plane(plane.channel()).unwrap();
            assert_eq!((plane.width(), plane.height()), (other.width(), other.height()));
            for y in 0..plane.height() {
                for x in 0..plane.width() {
                    assert_eq!(plane.sample(x, y), other.sample(x, y), "{:?} at ({x}, {y})", plane.channel());
                }
            }
        }
    }

    fn round_trip(image: &PixelImage, options: &EncodeOptions) -> PixelImage {
        let encoded = encode_image(image, options).unwrap();
        decode_uncompressed_image(
            &encoded.properties,
            DataExtent::from_memory(&encoded.bitstream),
            &DecodeLimits::default(),
        )
        .unwrap()
    }

    #[test]
    fn monochrome_component() {
        let image = gradient(5, 3, Colorspace::Monochrome, Chroma::Monochrome, &[(Channel::Y, 8)]);
        let encoded = encode_image(&image, &EncodeOptions::default()).unwrap();
        assert_eq!(encoded.bitstream.len(), 15);
        assert_eq!(encoded.bitstream[..5], [0, 7, 14, 21, 28]);
        assert!(encoded.properties.compression.is_none());
        assert_same_samples(&image, &round_trip(&image, &EncodeOptions::default()));
    }

    #[test]
    fn shortform_rgba() {
        let planes = [(Channel::R, 8), (Channel::G, 8), (Channel::B, 8), (Channel::Alpha, 8)];
        let image = gradient(3, 2, Colorspace::Rgb, Chroma::C444, &planes);
        let options = EncodeOptions::new(InterleaveType::Pixel).with_shortform();
        let encoded = encode_image(&image, &options).unwrap();
        assert!(encoded.properties.config.is_shortform());
        assert_eq!(encoded.properties.config.profile, FourCC::new(b"rgba"));
        assert!(encoded.properties.component_definition.is_none());

        let parsed = UncompressedProperties::from_property_boxes(&encoded.property_boxes).unwrap();
        assert_eq!(parsed.config, encoded.properties.config);
        assert_same_samples(&image, &round_trip(&image, &options));
    }

    #[test]
    fn shortform_needs_plain_8_bit_rgb() {
        let image = gradient(2, 2, Colorspace::Rgb, Chroma::C444, &[(Channel::R, 10), (Channel::G, 10), (Channel::B, 10)]);
        let options = EncodeOptions::new(InterleaveType::Pixel).with_shortform();
        assert!(matches!(encode_image(&image, &options), Err(Error::Unsupported(_))));

        let image = gradient(2, 2, Colorspace::Rgb, Chroma::C444, &[(Channel::R, 8), (Channel::G, 8), (Channel::B, 8)]);
        let options = EncodeOptions::new(InterleaveType::Row).with_shortform();
        assert!(matches!(encode_image(&image, &options), Err(Error::Unsupported(_))));
    }

    #[test]
    fn ycbcr_alpha_is_unsupported() {
        let planes = [(Channel::Y, 8), (Channel::Cb, 8), (Channel::Cr, 8), (Channel::Alpha, 8)];
        let image = gradient(2, 2, Colorspace::YCbCr, Chroma::C444, &planes);
        assert!(matches!(encode_image(&image, &EncodeOptions::default()), Err(Error::Unsupported(_))));
    }

    #[test]
    fn missing_planes_are_invalid() {
        let image = gradient(2, 2, Colorspace::Rgb, Chroma::C444, &[(Channel::R, 8), (Channel::G, 8)]);
        assert!(matches!(encode_image(&image, &EncodeOptions::default()), Err(Error::InvalidData(_))));
    }

    #[test]
    fn bayer_pattern_is_written() {
        let mut image = gradient(4, 4, Colorspace::Monochrome, Chroma::Monochrome, &[(Channel::Y, 12)]);
        let entry = |gain| BayerPatternEntry { component_index: 0, gain };
        image.bayer_pattern = Some(BayerPattern {
            width: 2,
            height: 1,
            entries: vec![entry(1.0), entry(0.5)].into(),
        });
        let encoded = encode_image(&image, &EncodeOptions::default()).unwrap();
        let cmpd = encoded.properties.component_definition.as_ref().unwrap();
        assert_eq!(cmpd.component_type(0), Some(ComponentType::FILTER_ARRAY));
        assert_eq!(encoded.properties.bayer_pattern, image.bayer_pattern);

        let decoded = round_trip(&image, &EncodeOptions::default());
        assert_eq!(decoded.bayer_pattern, image.bayer_pattern);
        assert_same_samples(&image, &decoded);
    }

    #[cfg(feature = "deflate")]
    #[test]
    fn tile_units_get_an_icef() {
        let image = gradient(8, 4, Colorspace::Monochrome, Chroma::Monochrome, &[(Channel::Y, 8)]);
        let options = EncodeOptions::new(InterleaveType::Component)
            .with_tiles(2, 2)
            .with_compression(CompressionType::Zlib, CompressedUnitType::ImageTile);
        let encoded = encode_image(&image, &options).unwrap();
        let table = encoded.properties.unit_table.as_ref().unwrap();
        assert_eq!(table.len(), 4);
        let total: u64 = table.units.iter().map(|unit| unit.size).sum();
        assert_eq!(total, encoded.bitstream.len() as u64);
        assert_same_samples(&image, &round_trip(&image, &options));
    }

    #[test]
    fn unimplemented_unit_types() {
        let image = gradient(2, 2, Colorspace::Monochrome, Chroma::Monochrome, &[(Channel::Y, 8)]);
        let options = EncodeOptions::default().with_compression(CompressionType::Zlib, CompressedUnitType::ImageRow);
        assert!(matches!(encode_image(&image, &options), Err(Error::Unsupported(_))));
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use fallible_collections::TryClone;
use log::{debug, warn};

use crate::bits::TileDecoder;
use crate::chroma::{derive_chroma, map_components, ChromaInfo};
use crate::compression::CompressedUnitResolver;
use crate::extent::DataExtent;
use crate::image::{PixelImage, Plane};
use crate::interleave::{build_channel_list, ChannelEntry, TileLayout};
use crate::validate::{validate, validate_geometry};
use crate::{DecodeLimits, Error, ResourceTracker, Result, Stop, ToU64, Unstoppable, UncompressedProperties};

/// Decoder for one uncompressed image item.
///
/// Construction validates the properties and checks the resource limits;
/// tiles can then be decoded individually or all at once.
pub struct UncompressedDecoder<'a> {
    properties: &'a UncompressedProperties,
    extent: DataExtent<'a>,
    chroma: ChromaInfo,
    resolver: CompressedUnitResolver<'a>,
    limits: DecodeLimits,
}

impl<'a> UncompressedDecoder<'a> {
    pub fn new(properties: &'a UncompressedProperties, extent: DataExtent<'a>, limits: &DecodeLimits) -> Result<Self> {
        let config = &properties.config;
        validate(config, properties.component_definition.as_ref())?;
        validate_geometry(properties)?;

        let tracker = ResourceTracker::new(limits);
        tracker.validate_image_pixels(properties.width(), properties.height())?;
        tracker.validate_components(config.components.len())?;
        tracker.validate_tiles(config.number_of_tiles())?;

        let chroma = derive_chroma(config, properties.component_definition.as_ref())?;
        let resolver = CompressedUnitResolver::new(properties, limits)?;
        debug!(
            "{}x{} {:?} {:?} image, {} interleave",
            properties.width(),
            properties.height(),
            chroma.colorspace,
            chroma.chroma,
            config.interleave_type
        );
        Ok(Self { properties, extent: extent.with_limits(limits), chroma, resolver, limits: limits.clone() })
    }

    pub fn chroma_info(&self) -> ChromaInfo {
        self.chroma
    }

    pub fn tile_columns(&self) -> u32 {
        self.properties.config.tile_columns
    }

    pub fn tile_rows(&self) -> u32 {
        self.properties.config.tile_rows
    }

    /// Allocate the destination image: one zeroed plane per channel the
    /// components map to, chroma planes sized by the subsampling.
    pub fn allocate_image(&self) -> Result<PixelImage> {
        let config = &self.properties.config;
        let tracker = ResourceTracker::new(&self.limits);
        let mut image = PixelImage::new(
            self.properties.width(),
            self.properties.height(),
            self.chroma.colorspace,
            self.chroma.chroma,
        );

        let channels = map_components(config, self.properties.component_definition.as_ref())?;
        for (component, channel) in config.components.iter().zip(channels) {
            let Some(channel) = channel else { continue };
            tracker.validate_block(Plane::byte_size(image.width(), image.height(), component.bit_depth))?;
            image.add_plane(channel, component.bit_depth)?;
        }

        image.bayer_pattern = match &self.properties.bayer_pattern {
            Some(pattern) => Some(pattern.try_clone()?),
            None => None,
        };
        Ok(image)
    }

    fn layout(&self, image: &PixelImage) -> Result<(std::vec::Vec<ChannelEntry>, TileLayout)> {
        let config = &self.properties.config;
        let entries = build_channel_list(
            config,
            self.properties.component_definition.as_ref(),
            self.chroma.chroma,
            image,
        )?;
        let layout = TileLayout::new(config, self.properties.width(), self.properties.height(), &entries)?;
        Ok((entries, layout))
    }

    /// Decode tile `(tile_x, tile_y)` into `image`, which must come from
    /// [`allocate_image`](Self::allocate_image).
    pub fn decode_tile(&self, image: &mut PixelImage, tile_x: u32, tile_y: u32) -> Result<()> {
        if tile_x >= self.tile_columns() || tile_y >= self.tile_rows() {
            return Err(Error::InvalidData("tile index out of range"));
        }
        let (entries, layout) = self.layout(image)?;
        self.decode_tile_with(image, &entries, &layout, tile_x, tile_y)
    }

    fn decode_tile_with(
        &self,
        image: &mut PixelImage,
        entries: &[ChannelEntry],
        layout: &TileLayout,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<()> {
        for segment in layout.segments(tile_x, tile_y)? {
            let bytes = self
                .resolver
                .resolve(&self.extent, segment.unit_index, segment.offset, segment.size)?;
            if bytes.len().to_u64() < segment.size {
                warn!("tile ({tile_x}, {tile_y}) has {} of {} bytes", bytes.len(), segment.size);
                return Err(Error::InvalidData("tile data shorter than the tile size"));
            }

            let mut cursor = TileDecoder::new(&bytes, image.planes_mut());
            match segment.entry {
                Some(index) => {
                    let entry = entries
                        .get(index)
                        .ok_or(Error::InvalidData("component tile without a component"))?;
                    layout.walk_component_tile(&mut cursor, entry, tile_x, tile_y)?;
                },
                None => layout.walk(&mut cursor, entries, tile_x, tile_y)?,
            }
        }
        Ok(())
    }

    pub fn decode(&self) -> Result<PixelImage> {
        self.decode_with_stop(&Unstoppable)
    }

    /// Decode every tile in row-major order, checking `stop` before each.
    pub fn decode_with_stop(&self, stop: &dyn Stop) -> Result<PixelImage> {
        let mut image = self.allocate_image()?;
        let (entries, layout) = self.layout(&image)?;
        for tile_y in 0..self.tile_rows() {
            for tile_x in 0..self.tile_columns() {
                stop.check()?;
                self.decode_tile_with(&mut image, &entries, &layout, tile_x, tile_y)?;
            }
        }
        Ok(image)
    }
}

/// Decode a complete uncompressed image item.
pub fn decode_uncompressed_image(
    properties: &UncompressedProperties,
    extent: DataExtent<'_>,
    limits: &DecodeLimits,
) -> Result<PixelImage> {
    decode_uncompressed_image_with_stop(properties, extent, limits, &Unstoppable)
}

/// [`decode_uncompressed_image`] with cooperative cancellation between tiles.
pub fn decode_uncompressed_image_with_stop(
    properties: &UncompressedProperties,
    extent: DataExtent<'_>,
    limits: &DecodeLimits,
    stop: &dyn Stop,
) -> Result<PixelImage> {
    UncompressedDecoder::new(properties, extent, limits)?.decode_with_stop(stop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{Channel, Chroma, Colorspace};
    use crate::properties::{
        ComponentDefinition, ComponentType, ImageSpatialExtents, InterleaveType, SamplingType, UncompressedComponent,
        UncompressedConfig,
    };
    use crate::{FourCC, StopReason};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn properties(
        width: u32,
        height: u32,
        types: &[ComponentType],
        depths: &[u16],
        interleave: InterleaveType,
    ) -> UncompressedProperties {
        let components = depths
            .iter()
            .enumerate()
            .map(|(i, &depth)| UncompressedComponent::unsigned(i as u16, depth))
            .collect::<std::vec::Vec<_>>();
        UncompressedProperties {
            spatial_extents: ImageSpatialExtents { width, height },
            component_definition: Some(ComponentDefinition::from_types(types).unwrap()),
            config: UncompressedConfig::new(components.into(), interleave),
            compression: None,
            unit_table: None,
            bayer_pattern: None,
        }
    }

    #[test]
    fn rgb_pixel_interleave() {
        let props = properties(
            2,
            1,
            &[ComponentType::RED, ComponentType::GREEN, ComponentType::BLUE],
            &[8, 8, 8],
            InterleaveType::Pixel,
        );
        let data = [1u8, 2, 3, 4, 5, 6];
        let image = decode_uncompressed_image(&props, DataExtent::from_memory(&data), &DecodeLimits::default()).unwrap();
        assert_eq!(image.colorspace(), Colorspace::Rgb);
        assert_eq!(image.chroma(), Chroma::C444);
        assert_eq!(image.plane(Channel::R).unwrap().data(), &[1, 4]);
        assert_eq!(image.plane(Channel::G).unwrap().data(), &[2, 5]);
        assert_eq!(image.plane(Channel::B).unwrap().data(), &[3, 6]);
    }

    #[test]
    fn shortform_abgr() {
        let props = UncompressedProperties {
            spatial_extents: ImageSpatialExtents { width: 1, height: 1 },
            component_definition: None,
            config: UncompressedConfig::shortform(FourCC::new(b"abgr")).unwrap(),
            compression: None,
            unit_table: None,
            bayer_pattern: None,
        };
        let data = [0xaa, 0x0b, 0x0c, 0x0d];
        let image = decode_uncompressed_image(&props, DataExtent::from_memory(&data), &DecodeLimits::default()).unwrap();
        assert!(image.has_alpha());
        assert_eq!(image.plane(Channel::Alpha).unwrap().data(), &[0xaa]);
        assert_eq!(image.plane(Channel::B).unwrap().data(), &[0x0b]);
        assert_eq!(image.plane(Channel::G).unwrap().data(), &[0x0c]);
        assert_eq!(image.plane(Channel::R).unwrap().data(), &[0x0d]);
    }

    #[test]
    fn ycbcr_420_component() {
        let mut props = properties(
            4,
            2,
            &[ComponentType::Y, ComponentType::CB, ComponentType::CR],
            &[8, 8, 8],
            InterleaveType::Component,
        );
        props.config.sampling_type = SamplingType::S420;
        let data = [10u8, 11, 12, 13, 14, 15, 16, 17, 20, 21, 30, 31];
        let image = decode_uncompressed_image(&props, DataExtent::from_memory(&data), &DecodeLimits::default()).unwrap();
        assert_eq!(image.chroma(), Chroma::C420);
        assert_eq!(image.plane(Channel::Y).unwrap().data(), &data[..8]);
        let cb = image.plane(Channel::Cb).unwrap();
        assert_eq!((cb.width(), cb.height()), (2, 1));
        assert_eq!(cb.data(), &[20, 21]);
        assert_eq!(image.plane(Channel::Cr).unwrap().data(), &[30, 31]);
    }

    #[test]
    fn short_item_data_is_invalid() {
        let props = properties(2, 2, &[ComponentType::MONOCHROME], &[8], InterleaveType::Component);
        let data = [1u8, 2, 3];
        assert!(matches!(
            decode_uncompressed_image(&props, DataExtent::from_memory(&data), &DecodeLimits::default()),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn limits_are_checked_before_decoding() {
        let props = properties(64, 64, &[ComponentType::MONOCHROME], &[8], InterleaveType::Component);
        let data = [0u8; 64 * 64];
        let limits = DecodeLimits::default().with_max_image_pixels(4095);
        assert!(matches!(
            UncompressedDecoder::new(&props, DataExtent::from_memory(&data), &limits),
            Err(Error::ResourceLimitExceeded(_))
        ));

        let limits = DecodeLimits::default().with_max_memory_block(1000);
        let decoder = UncompressedDecoder::new(&props, DataExtent::from_memory(&data), &limits).unwrap();
        assert!(matches!(decoder.allocate_image(), Err(Error::ResourceLimitExceeded(_))));
        drop(decoder);

        let mut props = props;
        props.config.tile_columns = 8;
        props.config.tile_rows = 8;
        let limits = DecodeLimits::default().with_max_tiles(63);
        assert!(matches!(
            UncompressedDecoder::new(&props, DataExtent::from_memory(&data), &limits),
            Err(Error::ResourceLimitExceeded(_))
        ));
    }

    struct StopAfter(AtomicU32);

    impl Stop for StopAfter {
        fn check(&self) -> std::result::Result<(), StopReason> {
            match self.0.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |left| left.checked_sub(1)) {
                Ok(_) => Ok(()),
                Err(_) => Err(StopReason::Cancelled),
            }
        }
    }

    #[test]
    fn decoding_stops_between_tiles() {
        let mut props = properties(4, 4, &[ComponentType::MONOCHROME], &[8], InterleaveType::Component);
        props.config.tile_columns = 2;
        props.config.tile_rows = 2;
        let data = [0u8; 16];
        let stop = StopAfter(AtomicU32::new(2));
        assert!(matches!(
            decode_uncompressed_image_with_stop(&props, DataExtent::from_memory(&data), &DecodeLimits::default(), &stop),
            Err(Error::Stopped(StopReason::Cancelled))
        ));
    }

    #[test]
    fn single_tile_decode() {
        let mut props = properties(4, 2, &[ComponentType::MONOCHROME], &[8], InterleaveType::Component);
        props.config.tile_columns = 2;
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let decoder = UncompressedDecoder::new(&props, DataExtent::from_memory(&data), &DecodeLimits::default()).unwrap();
        assert_eq!(decoder.chroma_info().colorspace, Colorspace::Monochrome);
        assert_eq!((decoder.tile_columns(), decoder.tile_rows()), (2, 1));
        let mut image = decoder.allocate_image().unwrap();
        decoder.decode_tile(&mut image, 1, 0).unwrap();
        // Second tile holds bytes 4..8, columns 2..4
        assert_eq!(image.plane(Channel::Y).unwrap().data(), &[0, 0, 5, 6, 0, 0, 7, 8]);
        assert!(decoder.decode_tile(&mut image, 2, 0).is_err());
    }
}

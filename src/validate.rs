// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Which combinations of `uncC` settings are legal, and which of the legal
//! ones this crate can decode.

use log::warn;

use crate::properties::{
    ComponentDefinition, ComponentFormat, ComponentType, CompressedUnitType, InterleaveType, SamplingType,
    UncompressedConfig,
};
use crate::{Error, Result, UncompressedProperties};

/// Check `uncC` (and `cmpd`) against the format rules.
///
/// Pure: the first failing rule determines the error.
pub fn validate(config: &UncompressedConfig, cmpd: Option<&ComponentDefinition>) -> Result<()> {
    if config.is_shortform() {
        // Profiles imply a fixed, supported layout
        return crate::chroma::derive_chroma(config, None).map(|_| ());
    }

    let cmpd = cmpd.ok_or(Error::InvalidData("uncC version 0 requires cmpd"))?;

    for component in config.components.iter() {
        let component_type = cmpd.component_type(component.index).ok_or_else(|| {
            warn!("uncC component index {} >= cmpd length {}", component.index, cmpd.len());
            Error::InvalidData("uncC component index out of range")
        })?;
        if component_type.0 > ComponentType::ALPHA.0
            && component_type != ComponentType::PADDED
            && component_type != ComponentType::FILTER_ARRAY
        {
            warn!("unsupported component type {component_type}");
            return Err(Error::Unsupported("component type"));
        }
        if component.bit_depth > 16 {
            warn!("unsupported bit depth {}", component.bit_depth);
            return Err(Error::Unsupported("component bit depth above 16"));
        }
        if component.format != ComponentFormat::Unsigned {
            return Err(Error::Unsupported("non-unsigned component format"));
        }
        match component.align_size {
            0 => {},
            1 | 2 => {
                if u16::from(component.align_size) * 8 < component.bit_depth {
                    return Err(Error::InvalidData("component_align_size smaller than bit depth"));
                }
            },
            4 | 8 => return Err(Error::Unsupported("component_align_size 4 or 8")),
            _ => return Err(Error::InvalidData("component_align_size must be 0, 1, 2, 4 or 8")),
        }
        if config.components_little_endian && component.bit_depth % 8 != 0 {
            return Err(Error::Unsupported("little-endian components need a whole-byte depth"));
        }
    }

    match config.sampling_type {
        SamplingType::S422 => {
            if !matches!(
                config.interleave_type,
                InterleaveType::Component | InterleaveType::Mixed | InterleaveType::MultiY
            ) {
                return Err(Error::InvalidData("4:2:2 requires component, mixed or multi-y interleave"));
            }
            if config.interleave_type == InterleaveType::Component && config.row_align_size % 2 != 0 {
                return Err(Error::InvalidData("4:2:2 row_align_size must be a multiple of 2"));
            }
            if config.tile_align_size % 2 != 0 {
                return Err(Error::InvalidData("4:2:2 tile_align_size must be a multiple of 2"));
            }
        },
        SamplingType::S420 => {
            if !matches!(config.interleave_type, InterleaveType::Component | InterleaveType::Mixed) {
                return Err(Error::InvalidData("4:2:0 requires component or mixed interleave"));
            }
            if config.interleave_type == InterleaveType::Component && config.row_align_size % 2 != 0 {
                return Err(Error::InvalidData("4:2:0 row_align_size must be a multiple of 2"));
            }
            if config.tile_align_size % 4 != 0 {
                return Err(Error::InvalidData("4:2:0 tile_align_size must be a multiple of 4"));
            }
        },
        SamplingType::NoSubsampling | SamplingType::S411 => {},
    }

    if config.interleave_type == InterleaveType::Mixed && config.sampling_type == SamplingType::NoSubsampling {
        return Err(Error::InvalidData("mixed interleave requires subsampling"));
    }
    if config.interleave_type == InterleaveType::MultiY
        && !matches!(config.sampling_type, SamplingType::S422 | SamplingType::S411)
    {
        return Err(Error::InvalidData("multi-y interleave requires 4:2:2 or 4:1:1"));
    }
    if config.pixel_size != 0 && !matches!(config.interleave_type, InterleaveType::Pixel | InterleaveType::MultiY) {
        return Err(Error::Unsupported("pixel_size with a non-pixel interleave"));
    }

    if config.sampling_type == SamplingType::S411 {
        return Err(Error::Unsupported("4:1:1 subsampling"));
    }
    if config.interleave_type == InterleaveType::MultiY {
        return Err(Error::Unsupported("multi-y interleave"));
    }
    if config.block_size != 0 {
        return Err(Error::Unsupported("block_size"));
    }
    if config.block_pad_lsb || config.block_little_endian || config.block_reversed {
        return Err(Error::Unsupported("block flags"));
    }

    Ok(())
}

/// Check the tile grid and the optional boxes against the image size and
/// component list.
pub fn validate_geometry(properties: &UncompressedProperties) -> Result<()> {
    let config = &properties.config;
    let width = properties.width();
    let height = properties.height();

    if config.tile_columns > width || config.tile_rows > height {
        warn!("{}x{} tiles for a {width}x{height} image", config.tile_columns, config.tile_rows);
        return Err(Error::InvalidData("more tiles than pixels"));
    }
    if width % config.tile_columns != 0 || height % config.tile_rows != 0 {
        return Err(Error::InvalidData("tile grid does not evenly divide the image"));
    }

    let tile_width = width / config.tile_columns;
    let tile_height = height / config.tile_rows;
    match config.sampling_type {
        SamplingType::S422 if tile_width % 2 != 0 => {
            return Err(Error::InvalidData("4:2:2 tiles need an even width"));
        },
        SamplingType::S420 if tile_width % 2 != 0 || tile_height % 2 != 0 => {
            return Err(Error::InvalidData("4:2:0 tiles need an even width and height"));
        },
        _ => {},
    }

    if let Some(cpat) = &properties.bayer_pattern {
        let component_count = properties.component_definition.as_ref().map_or(0, |c| c.len());
        if cpat
            .entries
            .iter()
            .any(|e| usize::try_from(e.component_index).map_or(true, |i| i >= component_count))
        {
            return Err(Error::InvalidData("cpat component index out of range"));
        }
    }

    if let Some(cmpc) = &properties.compression {
        match cmpc.unit_type {
            CompressedUnitType::FullItem => {},
            CompressedUnitType::ImageTile => {
                if properties.unit_table.is_none() {
                    return Err(Error::InvalidData("tile compression units require icef"));
                }
            },
            CompressedUnitType::Image | CompressedUnitType::ImageRow | CompressedUnitType::ImagePixel => {
                return Err(Error::Unsupported("compressed unit type"));
            },
        }
    }

    Ok(())
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mapping from declared components to output planes.

use arrayvec::ArrayVec;
use log::warn;

use crate::image::{Channel, Chroma, Colorspace};
use crate::properties::{
    ComponentDefinition, ComponentType, SamplingType, UncompressedConfig, PROFILE_ABGR, PROFILE_RGB3, PROFILE_RGBA,
};
use crate::{Error, Result};

/// Image-level layout derived from the component set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChromaInfo {
    pub chroma: Chroma,
    pub colorspace: Colorspace,
    pub has_alpha: bool,
}

const fn bit(t: ComponentType) -> u32 {
    1 << t.0
}

const RGB: u32 = bit(ComponentType::RED) | bit(ComponentType::GREEN) | bit(ComponentType::BLUE);
const RGBA: u32 = RGB | bit(ComponentType::ALPHA);
const YCBCR: u32 = bit(ComponentType::Y) | bit(ComponentType::CB) | bit(ComponentType::CR);
const MONO: u32 = bit(ComponentType::MONOCHROME);
const MONO_ALPHA: u32 = MONO | bit(ComponentType::ALPHA);
const FILTER_ARRAY: u32 = bit(ComponentType::FILTER_ARRAY);

fn profile_channels(config: &UncompressedConfig) -> Result<&'static [Channel]> {
    let profile = config.profile;
    if profile == PROFILE_RGB3 {
        Ok(&[Channel::R, Channel::G, Channel::B])
    } else if profile == PROFILE_RGBA {
        Ok(&[Channel::R, Channel::G, Channel::B, Channel::Alpha])
    } else if profile == PROFILE_ABGR {
        Ok(&[Channel::Alpha, Channel::B, Channel::G, Channel::R])
    } else {
        warn!("unknown uncC profile '{profile}'");
        Err(Error::Unsupported("unknown uncC shortform profile"))
    }
}

fn component_type(
    config: &UncompressedConfig,
    cmpd: Option<&ComponentDefinition>,
    position: usize,
) -> Result<ComponentType> {
    let component = config
        .components
        .get(position)
        .ok_or(Error::InvalidData("component position out of range"))?;
    cmpd.ok_or(Error::InvalidData("missing cmpd"))?
        .component_type(component.index)
        .ok_or(Error::InvalidData("uncC component index out of range"))
}

/// Derive chroma, colorspace and alpha presence from the component set.
pub fn derive_chroma(config: &UncompressedConfig, cmpd: Option<&ComponentDefinition>) -> Result<ChromaInfo> {
    if config.is_shortform() {
        let channels = profile_channels(config)?;
        return Ok(ChromaInfo {
            chroma: Chroma::C444,
            colorspace: Colorspace::Rgb,
            has_alpha: channels.contains(&Channel::Alpha),
        });
    }

    let mut present = 0u32;
    for position in 0..config.components.len() {
        let component_type = component_type(config, cmpd, position)?;
        if component_type == ComponentType::PADDED {
            continue;
        }
        if component_type.0 >= 32 {
            warn!("component type {component_type} has no plane mapping");
            return Err(Error::Unsupported("component type"));
        }
        present |= bit(component_type);
    }

    let info = match present {
        RGB | RGBA => ChromaInfo {
            chroma: Chroma::C444,
            colorspace: Colorspace::Rgb,
            has_alpha: present == RGBA,
        },
        YCBCR => ChromaInfo {
            chroma: match config.sampling_type {
                SamplingType::NoSubsampling => Chroma::C444,
                SamplingType::S422 => Chroma::C422,
                SamplingType::S420 => Chroma::C420,
                SamplingType::S411 => return Err(Error::Unsupported("4:1:1 subsampling")),
            },
            colorspace: Colorspace::YCbCr,
            has_alpha: false,
        },
        MONO | MONO_ALPHA | FILTER_ARRAY => ChromaInfo {
            chroma: Chroma::Monochrome,
            colorspace: Colorspace::Monochrome,
            has_alpha: present == MONO_ALPHA,
        },
        _ => {
            warn!("unsupported component set {present:#x}");
            return Err(Error::Unsupported("component set has no colorspace mapping"));
        },
    };

    if config.sampling_type != SamplingType::NoSubsampling && info.colorspace != Colorspace::YCbCr {
        return Err(Error::InvalidData("subsampling requires a Y/Cb/Cr component set"));
    }
    Ok(info)
}

/// Channel written by the component at `position` in the `uncC` list, or
/// `None` for components that are skipped (`padded`).
pub fn map_component_to_channel(
    position: usize,
    config: &UncompressedConfig,
    cmpd: Option<&ComponentDefinition>,
) -> Result<Option<Channel>> {
    if config.is_shortform() {
        let channels = profile_channels(config)?;
        return channels
            .get(position)
            .copied()
            .map(Some)
            .ok_or(Error::InvalidData("component position out of range"));
    }

    let component_type = component_type(config, cmpd, position)?;
    Ok(Some(match component_type {
        ComponentType::MONOCHROME | ComponentType::Y | ComponentType::FILTER_ARRAY => Channel::Y,
        ComponentType::CB => Channel::Cb,
        ComponentType::CR => Channel::Cr,
        ComponentType::RED => Channel::R,
        ComponentType::GREEN => Channel::G,
        ComponentType::BLUE => Channel::B,
        ComponentType::ALPHA => Channel::Alpha,
        ComponentType::PADDED => return Ok(None),
        other => {
            warn!("component type {other} has no plane mapping");
            return Err(Error::Unsupported("component type"));
        },
    }))
}

/// Channel of every component in `uncC` order; duplicate channels are rejected.
pub(crate) fn map_components(
    config: &UncompressedConfig,
    cmpd: Option<&ComponentDefinition>,
) -> Result<std::vec::Vec<Option<Channel>>> {
    let mut seen = ArrayVec::<Channel, { Channel::COUNT }>::new();
    let mut channels = std::vec::Vec::new();
    channels
        .try_reserve_exact(config.components.len())
        .map_err(|_| Error::OutOfMemory)?;
    for position in 0..config.components.len() {
        let channel = map_component_to_channel(position, config, cmpd)?;
        if let Some(channel) = channel {
            if seen.contains(&channel) {
                warn!("{channel:?} is declared twice");
                return Err(Error::Unsupported("duplicate channel"));
            }
            seen.push(channel);
        }
        channels.push(channel);
    }
    Ok(channels)
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use arrayvec::ArrayVec;
use log::warn;

use crate::properties::BayerPattern;
use crate::{Error, Result, ToU64, ToUsize};

/// Output channel of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Y,
    Cb,
    Cr,
    R,
    G,
    B,
    Alpha,
}

impl Channel {
    pub(crate) const COUNT: usize = 7;

    pub fn is_chroma(self) -> bool {
        matches!(self, Self::Cb | Self::Cr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colorspace {
    Monochrome,
    YCbCr,
    Rgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chroma {
    Monochrome,
    C420,
    C422,
    C444,
}

impl Chroma {
    /// Horizontal and vertical subsampling factors of the chroma planes.
    pub const fn subsampling(self) -> (u32, u32) {
        match self {
            Self::C420 => (2, 2),
            Self::C422 => (2, 1),
            Self::Monochrome | Self::C444 => (1, 1),
        }
    }
}

/// One sample plane. Samples are stored in native byte order, `bytes_per_sample`
/// bytes each, `stride` bytes per row.
#[derive(Debug)]
pub struct Plane {
    channel: Channel,
    width: u32,
    height: u32,
    bit_depth: u16,
    bytes_per_sample: u8,
    stride: usize,
    data: Vec<u8>,
}

impl Plane {
    /// Zero-filled plane. Fails with `OutOfMemory` instead of aborting.
    pub fn new(channel: Channel, width: u32, height: u32, bit_depth: u16) -> Result<Self> {
        let bytes_per_sample: u8 = match bit_depth {
            1..=8 => 1,
            9..=16 => 2,
            17..=32 => 4,
            33..=64 => 8,
            _ => return Err(Error::Unsupported("plane bit depth")),
        };
        let stride = width
            .to_usize()
            .checked_mul(usize::from(bytes_per_sample))
            .ok_or(Error::InvalidData("plane stride overflow"))?;
        let size = stride
            .checked_mul(height.to_usize())
            .ok_or(Error::InvalidData("plane size overflow"))?;
        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|_| Error::OutOfMemory)?;
        data.resize(size, 0);
        Ok(Self { channel, width, height, bit_depth, bytes_per_sample, stride, data })
    }

    pub(crate) fn byte_size(width: u32, height: u32, bit_depth: u16) -> u64 {
        let bytes = match bit_depth {
            0..=8 => 1,
            9..=16 => 2,
            17..=32 => 4,
            _ => 8,
        };
        u64::from(width) * u64::from(height) * bytes
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }

    pub fn bytes_per_sample(&self) -> u8 {
        self.bytes_per_sample
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn range(&self, x: u32, y: u32) -> Option<std::ops::Range<usize>> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bps = usize::from(self.bytes_per_sample);
        let start = y.to_usize() * self.stride + x.to_usize() * bps;
        Some(start..start + bps)
    }

    /// Sample at `(x, y)`, or `None` outside the plane.
    pub fn sample(&self, x: u32, y: u32) -> Option<u64> {
        let bytes = self.data.get(self.range(x, y)?)?;
        Some(match *bytes {
            [a] => u64::from(a),
            [a, b] => u64::from(u16::from_ne_bytes([a, b])),
            [a, b, c, d] => u64::from(u32::from_ne_bytes([a, b, c, d])),
            _ => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                u64::from_ne_bytes(buf)
            },
        })
    }

    /// Store a sample. Values are truncated to the storage width.
    pub fn set_sample(&mut self, x: u32, y: u32, value: u64) -> Result<()> {
        let range = self.range(x, y).ok_or(Error::InvalidData("sample outside plane"))?;
        let bytes = self
            .data
            .get_mut(range)
            .ok_or(Error::InvalidData("sample outside plane"))?;
        match bytes.len() {
            1 => bytes.copy_from_slice(&[value as u8]),
            2 => bytes.copy_from_slice(&(value as u16).to_ne_bytes()),
            4 => bytes.copy_from_slice(&(value as u32).to_ne_bytes()),
            _ => bytes.copy_from_slice(&value.to_ne_bytes()),
        }
        Ok(())
    }
}

/// A decoded (or to-be-encoded) multi-plane image.
#[derive(Debug)]
pub struct PixelImage {
    width: u32,
    height: u32,
    colorspace: Colorspace,
    chroma: Chroma,
    planes: ArrayVec<Plane, { Channel::COUNT }>,
    /// Filter array layout for `filter-array` images, from `cpat`.
    pub bayer_pattern: Option<BayerPattern>,
}

impl PixelImage {
    pub fn new(width: u32, height: u32, colorspace: Colorspace, chroma: Chroma) -> Self {
        Self { width, height, colorspace, chroma, planes: ArrayVec::new(), bayer_pattern: None }
    }

    /// Allocate a plane for `channel`. Chroma planes of subsampled images are
    /// sized by the subsampling factors.
    pub fn add_plane(&mut self, channel: Channel, bit_depth: u16) -> Result<&mut Plane> {
        if self.plane_index(channel).is_some() {
            warn!("duplicate {channel:?} plane");
            return Err(Error::Unsupported("duplicate channel"));
        }
        let (sx, sy) = if channel.is_chroma() { self.chroma.subsampling() } else { (1, 1) };
        let plane = Plane::new(channel, self.width.div_ceil(sx), self.height.div_ceil(sy), bit_depth)?;
        self.planes
            .try_push(plane)
            .map_err(|_| Error::Unsupported("too many planes"))?;
        let last = self.planes.len() - 1;
        Ok(&mut self.planes[last])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn colorspace(&self) -> Colorspace {
        self.colorspace
    }

    pub fn chroma(&self) -> Chroma {
        self.chroma
    }

    pub fn has_alpha(&self) -> bool {
        self.plane_index(Channel::Alpha).is_some()
    }

    pub fn plane_index(&self, channel: Channel) -> Option<usize> {
        self.planes.iter().position(|p| p.channel == channel)
    }

    pub fn plane(&self, channel: Channel) -> Option<&Plane> {
        self.planes.iter().find(|p| p.channel == channel)
    }

    pub fn plane_mut(&mut self, channel: Channel) -> Option<&mut Plane> {
        self.planes.iter_mut().find(|p| p.channel == channel)
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub(crate) fn planes_mut(&mut self) -> &mut [Plane] {
        &mut self.planes
    }

    /// Total bytes held by all planes.
    pub fn byte_size(&self) -> u64 {
        self.planes.iter().map(|p| p.data.len().to_u64()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chroma_planes_are_subsampled() {
        let mut image = PixelImage::new(5, 3, Colorspace::YCbCr, Chroma::C420);
        image.add_plane(Channel::Y, 8).unwrap();
        image.add_plane(Channel::Cb, 8).unwrap();
        image.add_plane(Channel::Cr, 10).unwrap();

        let cb = image.plane(Channel::Cb).unwrap();
        assert_eq!((cb.width(), cb.height()), (3, 2));
        let cr = image.plane(Channel::Cr).unwrap();
        assert_eq!(cr.bytes_per_sample(), 2);
        assert_eq!(cr.stride(), 6);
        assert_eq!(image.plane(Channel::Y).unwrap().width(), 5);
        assert!(!image.has_alpha());
        assert_eq!(image.byte_size(), 15 + 6 + 12);
    }

    #[test]
    fn duplicate_plane_is_rejected() {
        let mut image = PixelImage::new(2, 2, Colorspace::Rgb, Chroma::C444);
        image.add_plane(Channel::R, 8).unwrap();
        assert!(matches!(image.add_plane(Channel::R, 8), Err(Error::Unsupported(_))));
    }

    #[test]
    fn samples_use_native_byte_order() {
        let mut plane = Plane::new(Channel::Y, 2, 2, 12).unwrap();
        plane.set_sample(1, 1, 0x0abc).unwrap();
        assert_eq!(plane.sample(1, 1), Some(0x0abc));
        assert_eq!(&plane.data()[6..8], &0x0abcu16.to_ne_bytes());
        assert_eq!(plane.sample(2, 0), None);
        assert!(plane.set_sample(0, 2, 1).is_err());
    }

    #[test]
    fn wide_samples() {
        let mut plane = Plane::new(Channel::Alpha, 1, 1, 40).unwrap();
        assert_eq!(plane.bytes_per_sample(), 8);
        plane.set_sample(0, 0, 0xff_1234_5678).unwrap();
        assert_eq!(plane.sample(0, 0), Some(0xff_1234_5678));
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte access to an item's data.
//!
//! The container parser knows where an item's bytes live (`iloc` extents,
//! `idat`, an explicit file range); the decoder only sees a [`DataExtent`].

use std::borrow::Cow;
use std::cell::{OnceCell, RefCell};
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;

use log::debug;

use crate::{DecodeLimits, Error, ResourceTracker, Result, ToU64, TryVec};

/// A random-access byte source, typically the file holding the item.
pub trait ByteSource {
    /// Total size in bytes.
    fn len(&self) -> Result<u64>;

    /// Fill `buf` from `offset`. Short sources fail with `UnexpectedEOF`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl ByteSource for [u8] {
    fn len(&self) -> Result<u64> {
        Ok(<[u8]>::len(self).to_u64())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = usize::try_from(offset).map_err(|_| Error::UnexpectedEOF)?;
        let end = start.checked_add(buf.len()).ok_or(Error::UnexpectedEOF)?;
        let src = self.get(start..end).ok_or(Error::UnexpectedEOF)?;
        buf.copy_from_slice(src);
        Ok(())
    }
}

/// [`ByteSource`] over anything seekable, e.g. a `File` or `Cursor`.
pub struct ReaderSource<R> {
    reader: RefCell<R>,
}

impl<R: Read + Seek> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader: RefCell::new(reader) }
    }

    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

impl<R: Read + Seek> ByteSource for ReaderSource<R> {
    fn len(&self) -> Result<u64> {
        let mut reader = self.reader.try_borrow_mut().map_err(|_| Error::Unsupported("reentrant read"))?;
        Ok(reader.seek(SeekFrom::End(0))?)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut reader = self.reader.try_borrow_mut().map_err(|_| Error::Unsupported("reentrant read"))?;
        reader.seek(SeekFrom::Start(offset))?;
        reader.read_exact(buf)?;
        Ok(())
    }
}

enum Extent<'a> {
    Memory(Cow<'a, [u8]>),
    /// Item stored as a sequence of ranges, logically concatenated.
    ItemRanges {
        source: &'a dyn ByteSource,
        ranges: TryVec<Range<u64>>,
    },
    /// Item stored as one contiguous range of a larger source.
    FileRange {
        source: &'a dyn ByteSource,
        range: Range<u64>,
    },
}

/// The bytes of one image item.
///
/// Multi-range items are materialized on first access and cached; single
/// file ranges are read on demand, except for [`read_all`](Self::read_all)
/// which caches the whole range.
///
/// Buffers read from a source are checked against `max_memory_block` of the
/// limits given to [`with_limits`](Self::with_limits).
pub struct DataExtent<'a> {
    extent: Extent<'a>,
    cache: OnceCell<Vec<u8>>,
    limits: DecodeLimits,
}

fn checked_len(range: &Range<u64>) -> Result<u64> {
    range
        .end
        .checked_sub(range.start)
        .ok_or(Error::InvalidData("extent range start > end"))
}

fn alloc_buffer(len: u64, limits: &DecodeLimits) -> Result<Vec<u8>> {
    ResourceTracker::new(limits).validate_block(len)?;
    let len = usize::try_from(len).map_err(|_| Error::OutOfMemory)?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
    buf.resize(len, 0);
    Ok(buf)
}

impl<'a> DataExtent<'a> {
    pub fn from_memory(data: &'a [u8]) -> Self {
        Self::new(Extent::Memory(Cow::Borrowed(data)))
    }

    pub fn from_owned(data: Vec<u8>) -> Self {
        Self::new(Extent::Memory(Cow::Owned(data)))
    }

    /// An item whose data is the concatenation of `ranges` within `source`.
    pub fn from_item_ranges(source: &'a dyn ByteSource, ranges: &[Range<u64>]) -> Result<Self> {
        let mut owned = TryVec::with_capacity(ranges.len())?;
        for range in ranges {
            checked_len(range)?;
            owned.push(range.clone())?;
        }
        Ok(Self::new(Extent::ItemRanges { source, ranges: owned }))
    }

    pub fn from_file_range(source: &'a dyn ByteSource, range: Range<u64>) -> Result<Self> {
        checked_len(&range)?;
        Ok(Self::new(Extent::FileRange { source, range }))
    }

    fn new(extent: Extent<'a>) -> Self {
        Self { extent, cache: OnceCell::new(), limits: DecodeLimits::unlimited() }
    }

    /// Apply `limits` to every buffer this extent allocates.
    pub fn with_limits(mut self, limits: &DecodeLimits) -> Self {
        self.limits = limits.clone();
        self
    }

    /// Size of the item data in bytes.
    pub fn size(&self) -> Result<u64> {
        match &self.extent {
            Extent::Memory(data) => Ok(data.len().to_u64()),
            Extent::ItemRanges { ranges, .. } => ranges.iter().try_fold(0u64, |total, range| {
                total
                    .checked_add(checked_len(range)?)
                    .ok_or(Error::InvalidData("extent size overflow"))
            }),
            Extent::FileRange { range, .. } => checked_len(range),
        }
    }

    /// `len` bytes starting `offset` bytes into the item.
    pub fn read(&self, offset: u64, len: u64) -> Result<Cow<'_, [u8]>> {
        let end = offset
            .checked_add(len)
            .ok_or(Error::InvalidData("extent read overflow"))?;
        if end > self.size()? {
            debug!("read {offset}+{len} past the {} byte extent", self.size()?);
            return Err(Error::InvalidData("read past the end of the item data"));
        }

        let slice_of = |data: &[u8]| -> Result<Range<usize>> {
            let start = usize::try_from(offset)?;
            let end = usize::try_from(end)?;
            data.get(start..end)
                .map(|_| start..end)
                .ok_or(Error::InvalidData("read past the end of the item data"))
        };

        match &self.extent {
            Extent::Memory(data) => {
                let range = slice_of(data.as_ref())?;
                Ok(Cow::Borrowed(&data[range]))
            },
            Extent::ItemRanges { .. } => {
                let data = self.materialized()?;
                let range = slice_of(data)?;
                Ok(Cow::Borrowed(&data[range]))
            },
            Extent::FileRange { source, range } => {
                if let Some(data) = self.cache.get() {
                    let range = slice_of(data)?;
                    return Ok(Cow::Borrowed(&data[range]));
                }
                let start = range
                    .start
                    .checked_add(offset)
                    .ok_or(Error::InvalidData("extent read overflow"))?;
                let mut buf = alloc_buffer(len, &self.limits)?;
                source.read_at(start, &mut buf)?;
                Ok(Cow::Owned(buf))
            },
        }
    }

    /// The complete item data.
    pub fn read_all(&self) -> Result<Cow<'_, [u8]>> {
        match &self.extent {
            Extent::Memory(data) => Ok(Cow::Borrowed(data)),
            Extent::ItemRanges { .. } | Extent::FileRange { .. } => Ok(Cow::Borrowed(self.materialized()?)),
        }
    }

    fn materialized(&self) -> Result<&[u8]> {
        if let Some(data) = self.cache.get() {
            return Ok(data);
        }
        let mut buf = alloc_buffer(self.size()?, &self.limits)?;
        match &self.extent {
            Extent::Memory(data) => buf.copy_from_slice(data),
            Extent::ItemRanges { source, ranges } => {
                let mut pos = 0usize;
                for range in ranges.iter() {
                    let len = usize::try_from(checked_len(range)?)?;
                    let dst = buf
                        .get_mut(pos..pos + len)
                        .ok_or(Error::InvalidData("extent size mismatch"))?;
                    source.read_at(range.start, dst)?;
                    pos += len;
                }
            },
            Extent::FileRange { source, range } => source.read_at(range.start, &mut buf)?,
        }
        debug!("materialized {} bytes of item data", buf.len());
        Ok(self.cache.get_or_init(|| buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingSource<'a> {
        data: &'a [u8],
        reads: Cell<usize>,
    }

    impl ByteSource for CountingSource<'_> {
        fn len(&self) -> Result<u64> {
            ByteSource::len(self.data)
        }

        fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
            self.reads.set(self.reads.get() + 1);
            self.data.read_at(offset, buf)
        }
    }

    #[test]
    fn memory_reads_borrow() {
        let data = [1u8, 2, 3, 4, 5];
        let extent = DataExtent::from_memory(&data);
        assert_eq!(extent.size().unwrap(), 5);
        assert!(matches!(extent.read(1, 3).unwrap(), Cow::Borrowed(&[2, 3, 4])));
        assert!(matches!(extent.read(3, 3), Err(Error::InvalidData(_))));
        assert_eq!(&*extent.read_all().unwrap(), &data);
    }

    #[test]
    fn item_ranges_are_concatenated_once() {
        let file: std::vec::Vec<u8> = (0..32).collect();
        let source = CountingSource { data: &file, reads: Cell::new(0) };
        let extent = DataExtent::from_item_ranges(&source, &[4..8, 20..22]).unwrap();
        assert_eq!(extent.size().unwrap(), 6);
        assert_eq!(&*extent.read(2, 3).unwrap(), &[6, 7, 20]);
        assert_eq!(&*extent.read_all().unwrap(), &[4, 5, 6, 7, 20, 21]);
        assert_eq!(source.reads.get(), 2);
    }

    #[test]
    fn file_range_reads_on_demand() {
        let file: std::vec::Vec<u8> = (0..16).collect();
        let source = CountingSource { data: &file, reads: Cell::new(0) };
        let extent = DataExtent::from_file_range(&source, 8..16).unwrap();
        assert_eq!(&*extent.read(1, 2).unwrap(), &[9, 10]);
        assert_eq!(&*extent.read(4, 1).unwrap(), &[12]);
        assert_eq!(source.reads.get(), 2);
        assert_eq!(extent.read_all().unwrap().len(), 8);
        assert_eq!(&*extent.read(7, 1).unwrap(), &[15]);
        assert_eq!(source.reads.get(), 3);
    }

    #[test]
    fn buffers_respect_the_memory_limit() {
        let file: std::vec::Vec<u8> = (0..64).collect();
        let source = CountingSource { data: &file, reads: Cell::new(0) };
        let limits = DecodeLimits::default().with_max_memory_block(16);

        let extent = DataExtent::from_file_range(&source, 0..64).unwrap().with_limits(&limits);
        assert_eq!(&*extent.read(16, 4).unwrap(), &[16, 17, 18, 19]);
        assert!(matches!(extent.read(0, 32), Err(Error::ResourceLimitExceeded(_))));
        assert!(matches!(extent.read_all(), Err(Error::ResourceLimitExceeded(_))));

        let extent = DataExtent::from_item_ranges(&source, &[0..8, 32..52]).unwrap().with_limits(&limits);
        assert!(matches!(extent.read(0, 2), Err(Error::ResourceLimitExceeded(_))));
        assert_eq!(source.reads.get(), 1);

        let extent = DataExtent::from_item_ranges(&source, &[0..8, 32..40]).unwrap().with_limits(&limits);
        assert_eq!(extent.read_all().unwrap().len(), 16);
    }

    #[test]
    fn reader_source() {
        let source = ReaderSource::new(std::io::Cursor::new((0u8..10).collect::<std::vec::Vec<_>>()));
        assert_eq!(source.len().unwrap(), 10);
        let mut buf = [0u8; 3];
        source.read_at(7, &mut buf).unwrap();
        assert_eq!(buf, [7, 8, 9]);
        assert!(matches!(source.read_at(8, &mut buf), Err(Error::UnexpectedEOF)));
    }

    #[test]
    fn inverted_range_is_invalid() {
        let source = CountingSource { data: &[0u8; 4], reads: Cell::new(0) };
        #[allow(clippy::reversed_empty_ranges)]
        let range = 3..1;
        assert!(matches!(DataExtent::from_file_range(&source, range), Err(Error::InvalidData(_))));
    }
}

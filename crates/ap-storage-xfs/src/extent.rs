//! Extent descriptors inside the data fork of an inode.
//!
//! Two decoders exist and they must not be mixed:
//!
//! - [`LegacyFixedWidth`] reads byte-aligned (u64 start, u32 count) pairs every 16 bytes
//!   behind a 60 byte header.  This is not the real on-disk encoding but it is what the
//!   scanner did historically, so it stays the default to produce the same files.
//! - [`Packed`] reads the real 128-bit bmbt records starting at the data fork.

use crate::be;
use crate::inode::InodeCore;
use ap_storage::{Error, Offset};

/// A contiguous run of blocks on the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub start_block: u64,
    pub block_count: u32,
    /// Preallocated blocks that were never written.
    pub unwritten: bool,
}

impl Extent {
    pub fn new(start_block: u64, block_count: u32) -> Self {
        Self {
            start_block,
            block_count,
            unwritten: false,
        }
    }

    /// The byte offset on the disk. None on overflow.
    pub fn offset(&self, block_size: u32) -> Option<Offset> {
        self.start_block.checked_mul(block_size as Offset)
    }
}

/// Decode extent descriptors from a raw inode record.
pub trait ExtentDecoder {
    /// A short name for diagnostics.
    fn name(&self) -> &'static str;

    /// The number of descriptors in the record.
    fn count(&self, raw: &[u8]) -> usize;

    /// Decode the descriptor with the given number.
    fn entry(&self, raw: &[u8], nr: usize) -> Result<Extent, Error>;
}

/// Fixed-width descriptors directly behind a 60 byte header.
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyFixedWidth;

impl LegacyFixedWidth {
    const HEADER: usize = 60;
    const ENTRY: usize = 16;
}

impl ExtentDecoder for LegacyFixedWidth {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn count(&self, raw: &[u8]) -> usize {
        raw.len().saturating_sub(Self::HEADER) / Self::ENTRY
    }

    fn entry(&self, raw: &[u8], nr: usize) -> Result<Extent, Error> {
        let ofs = Self::HEADER + nr * Self::ENTRY;
        let start = be::u64_at(raw, ofs);
        let count = be::u32_at(raw, ofs + 8);
        match (start, count) {
            (Some(start), Some(count)) => Ok(Extent::new(start, count)),
            _ => Err(anyhow::anyhow!("extent {} at byte {} outside the record", nr, ofs)),
        }
    }
}

/// The 128-bit packed extent records of the data fork.
///
/// ```text
/// | 1 bit | 54 bits     | 52 bits     | 21 bits |
/// | flag  | file offset | start block | count   |
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct Packed;

impl Packed {
    const ENTRY: usize = 16;
    /// Offset of the number of data fork extents.
    const NEXTENTS: usize = 0x4c;

    /// The data fork follows the inode core which grew with version 3.
    fn fork_offset(raw: &[u8]) -> usize {
        match raw.get(4) {
            Some(v) if *v >= 3 => 176,
            _ => 100,
        }
    }

    /// Split a packed record into its fields.
    pub fn unpack(hi: u64, lo: u64) -> (bool, u64, u64, u32) {
        let unwritten = hi >> 63 != 0;
        let file_offset = (hi >> 9) & 0x003f_ffff_ffff_ffff;
        let start_block = ((hi & 0x1ff) << 43) | (lo >> 21);
        let block_count = (lo & 0x1f_ffff) as u32;
        (unwritten, file_offset, start_block, block_count)
    }
}

impl ExtentDecoder for Packed {
    fn name(&self) -> &'static str {
        "packed"
    }

    fn count(&self, raw: &[u8]) -> usize {
        let fits = raw.len().saturating_sub(Self::fork_offset(raw)) / Self::ENTRY;
        let stored = be::u32_at(raw, Self::NEXTENTS).unwrap_or_default() as usize;
        core::cmp::min(fits, stored)
    }

    fn entry(&self, raw: &[u8], nr: usize) -> Result<Extent, Error> {
        let ofs = Self::fork_offset(raw) + nr * Self::ENTRY;
        let (Some(hi), Some(lo)) = (be::u64_at(raw, ofs), be::u64_at(raw, ofs + 8)) else {
            return Err(anyhow::anyhow!("extent {} at byte {} outside the record", nr, ofs));
        };
        let (unwritten, _, start_block, block_count) = Self::unpack(hi, lo);
        Ok(Extent {
            start_block,
            block_count,
            unwritten,
        })
    }
}

/// Iterate over all descriptors of an inode record.
///
/// Only extent-format inodes have descriptors.
pub fn descriptors<'a>(
    decoder: &'a dyn ExtentDecoder,
    core: &InodeCore,
    raw: &'a [u8],
) -> impl Iterator<Item = (usize, Result<Extent, Error>)> + 'a {
    let count = match core.format {
        crate::inode::Format::Extents => decoder.count(raw),
        _ => 0,
    };
    (0..count).map(move |nr| (nr, decoder.entry(raw, nr)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_record(entries: &[(u64, u32)]) -> [u8; 512] {
        let mut buf = [0u8; 512];
        buf[0..2].copy_from_slice(&0x494eu16.to_be_bytes());
        buf[5] = 2;
        for (i, (start, count)) in entries.iter().enumerate() {
            let ofs = 60 + 16 * i;
            buf[ofs..ofs + 8].copy_from_slice(&start.to_be_bytes());
            buf[ofs + 8..ofs + 12].copy_from_slice(&count.to_be_bytes());
        }
        buf
    }

    fn pack(unwritten: bool, file_offset: u64, start: u64, count: u32) -> [u8; 16] {
        let hi = (unwritten as u64) << 63 | (file_offset & 0x003f_ffff_ffff_ffff) << 9 | (start >> 43) & 0x1ff;
        let lo = (start & 0x7ff_ffff_ffff) << 21 | (count as u64 & 0x1f_ffff);
        let mut buf = [0u8; 16];
        buf[..8].copy_from_slice(&hi.to_be_bytes());
        buf[8..].copy_from_slice(&lo.to_be_bytes());
        buf
    }

    #[test]
    fn legacy_count_from_record_size() {
        let d = LegacyFixedWidth;
        assert_eq!(d.count(&[0u8; 256]), 12);
        assert_eq!(d.count(&[0u8; 512]), 28);
        assert_eq!(d.count(&[0u8; 75]), 0);
        assert_eq!(d.count(&[0u8; 76]), 1);
        assert_eq!(d.count(&[0u8; 10]), 0);
    }

    #[test]
    fn legacy_entries() {
        let raw = legacy_record(&[(1, 1), (0x1_0000_0007, 3)]);
        let raw = &raw[..256];
        let d = LegacyFixedWidth;
        assert_eq!(d.entry(raw, 0).unwrap(), Extent::new(1, 1));
        assert_eq!(d.entry(raw, 1).unwrap(), Extent::new(0x1_0000_0007, 3));
        assert_eq!(d.entry(raw, 2).unwrap(), Extent::new(0, 0));
        assert!(d.entry(raw, 12).is_err());
    }

    #[test]
    fn descriptors_only_for_extent_format() {
        let raw = legacy_record(&[(1, 1)]);
        let mut core = crate::inode::InodeCore::parse(&raw[..256]).unwrap();
        assert_eq!(descriptors(&LegacyFixedWidth, &core, &raw[..256]).count(), 12);
        core.format = crate::inode::Format::Btree;
        assert_eq!(descriptors(&LegacyFixedWidth, &core, &raw[..256]).count(), 0);
    }

    #[test]
    fn packed_fields() {
        let rec = pack(true, 0x2a, 0x000f_ffff_ffff_fffe, 0x1f_ffff);
        let hi = u64::from_be_bytes(rec[..8].try_into().unwrap());
        let lo = u64::from_be_bytes(rec[8..].try_into().unwrap());
        assert_eq!(Packed::unpack(hi, lo), (true, 0x2a, 0x000f_ffff_ffff_fffe, 0x1f_ffff));
    }

    #[test]
    fn packed_entries_at_data_fork() {
        let mut raw = [0u8; 256];
        raw[4] = 2;
        raw[5] = 2;
        raw[0x4c..0x50].copy_from_slice(&2u32.to_be_bytes());
        raw[100..116].copy_from_slice(&pack(false, 0, 5, 2));
        raw[116..132].copy_from_slice(&pack(true, 2, 9, 1));
        let d = Packed;
        assert_eq!(d.count(&raw), 2);
        assert_eq!(d.entry(&raw, 0).unwrap(), Extent::new(5, 2));
        let second = d.entry(&raw, 1).unwrap();
        assert_eq!((second.start_block, second.block_count, second.unwritten), (9, 1, true));
    }

    #[test]
    fn packed_count_is_clamped() {
        let mut raw = [0u8; 512];
        raw[4] = 3;
        raw[0x4c..0x50].copy_from_slice(&1000u32.to_be_bytes());
        assert_eq!(Packed.count(&raw), (512 - 176) / 16);
        assert_eq!(Packed.count(&raw[..100]), 0);
    }

    #[test]
    fn offsets_overflow() {
        assert_eq!(Extent::new(3, 1).offset(4096), Some(3 * 4096));
        assert_eq!(Extent::new(u64::MAX / 2, 1).offset(4096), None);
    }
}

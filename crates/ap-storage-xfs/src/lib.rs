//! On-disk structures for XFS.
//!
//! Only the fields needed to find and recover deleted files are decoded.
//! All multi-byte integers on disk are big-endian.

#![no_std]

pub mod extent;
pub mod inode;
pub mod superblock;

/// Big-endian field access into raw on-disk records.
pub(crate) mod be {
    fn field<const N: usize>(buf: &[u8], ofs: usize) -> Option<[u8; N]> {
        buf.get(ofs..ofs.checked_add(N)?)?.try_into().ok()
    }

    pub fn u16_at(buf: &[u8], ofs: usize) -> Option<u16> {
        field(buf, ofs).map(u16::from_be_bytes)
    }

    pub fn u32_at(buf: &[u8], ofs: usize) -> Option<u32> {
        field(buf, ofs).map(u32::from_be_bytes)
    }

    pub fn u64_at(buf: &[u8], ofs: usize) -> Option<u64> {
        field(buf, ofs).map(u64::from_be_bytes)
    }

    pub fn bytes_at<const N: usize>(buf: &[u8], ofs: usize) -> Option<[u8; N]> {
        field(buf, ofs)
    }
}

/// Format bytes as lowercase hex.
pub struct Hex<'a>(pub &'a [u8]);

impl core::fmt::Display for Hex<'_> {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> Result<(), core::fmt::Error> {
        for b in self.0 {
            write!(fmt, "{:02x}", b)?;
        }
        Ok(())
    }
}

//! The inode core as used by the undelete scanner.

use crate::be;
use ap_storage::Error;

/// "IN" read as a big-endian integer.
pub const XFS_DINODE_MAGIC: u16 = 0x494e;

/// The bytes needed to decode the fields below.
pub const INODE_CORE_MIN: usize = 64;

/// Storage format of the data fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Device number only.
    Dev,
    /// Data stored inline in the inode.
    Local,
    /// A list of extents in the inode.
    Extents,
    /// A B+-tree of extents.
    Btree,
    /// Anything else.
    Unknown(u8),
}

impl From<u8> for Format {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Dev,
            1 => Self::Local,
            2 => Self::Extents,
            3 => Self::Btree,
            x => Self::Unknown(x),
        }
    }
}

impl From<Format> for u8 {
    fn from(v: Format) -> Self {
        match v {
            Format::Dev => 0,
            Format::Local => 1,
            Format::Extents => 2,
            Format::Btree => 3,
            Format::Unknown(x) => x,
        }
    }
}

/// Sparse inode core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeCore {
    pub magic: u16,
    pub mode: u16,
    pub version: u8,
    pub format: Format,
    pub nlink: u16,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
}

impl InodeCore {
    /// Decode the core from the start of an inode record.
    pub fn parse(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < INODE_CORE_MIN {
            return Err(anyhow::anyhow!("inode record of {} bytes too short", buf.len()));
        }
        let short = || anyhow::anyhow!("inode field outside the record");
        Ok(Self {
            magic: be::u16_at(buf, 0).ok_or_else(short)?,
            mode: be::u16_at(buf, 2).ok_or_else(short)?,
            version: buf[4],
            format: buf[5].into(),
            nlink: be::u16_at(buf, 16).ok_or_else(short)?,
            uid: be::u32_at(buf, 18).ok_or_else(short)?,
            gid: be::u32_at(buf, 22).ok_or_else(short)?,
            size: be::u64_at(buf, 56).ok_or_else(short)?,
        })
    }

    /// Does the record carry the inode signature?
    pub fn is_valid(&self) -> bool {
        self.magic == XFS_DINODE_MAGIC
    }

    /// A valid inode without any links.
    pub fn is_deleted(&self) -> bool {
        self.nlink == 0 && self.is_valid()
    }

    /// A deleted inode whose data can be found through its extent list.
    pub fn is_recoverable(&self) -> bool {
        self.is_deleted() && self.format == Format::Extents
    }

    /// Nothing in the record that the scanner reports.
    pub fn is_blank(&self) -> bool {
        self.magic == 0 && u8::from(self.format) == 0 && self.size == 0
    }
}

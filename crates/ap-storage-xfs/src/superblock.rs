//! The primary superblock.

use crate::{be, Hex};
use ap_storage::{msg2err, Error};

/// "XFSB" read as a big-endian integer.
pub const XFS_SB_MAGIC: u32 = 0x5846_5342;

/// The bytes of the superblock region at the start of the disk.
pub const SUPERBLOCK_SIZE: usize = 512;

/// The decoded superblock fields.
///
/// The UUID is taken from the same offset as the inode size. That is how
/// the scanner has always reported it and it does not match any single
/// on-disk revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    pub magic: u32,
    pub block_size: u32,
    pub data_blocks: u64,
    pub inode_size: u16,
    pub inode_count: u64,
    pub free_inodes: u64,
    pub crc: u32,
    pub uuid: [u8; 16],
}

impl SuperBlock {
    /// Decode the superblock from the first bytes of the disk.
    pub fn parse(buf: &[u8]) -> Result<Self, Error> {
        let short = || msg2err!("superblock truncated");
        Ok(Self {
            magic: be::u32_at(buf, 0).ok_or_else(short)?,
            block_size: be::u32_at(buf, 4).ok_or_else(short)?,
            data_blocks: be::u64_at(buf, 8).ok_or_else(short)?,
            crc: be::u32_at(buf, 32).ok_or_else(short)?,
            inode_size: be::u16_at(buf, 100).ok_or_else(short)?,
            uuid: be::bytes_at(buf, 100).ok_or_else(short)?,
            inode_count: be::u64_at(buf, 104).ok_or_else(short)?,
            free_inodes: be::u64_at(buf, 112).ok_or_else(short)?,
        })
    }

    /// Does the magic match?
    pub fn is_valid(&self) -> bool {
        self.magic == XFS_SB_MAGIC
    }

    /// The UUID as hex string.
    pub fn uuid(&self) -> Hex<'_> {
        Hex(&self.uuid)
    }
}

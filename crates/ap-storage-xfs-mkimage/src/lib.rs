//! Build synthetic XFS images.
//!
//! The images only contain what the undelete scanner looks at: a primary
//! superblock, a linear inode table directly behind it and data blocks.
#![no_std]

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;
use ap_storage::{Error, Offset};
use ap_storage_xfs::inode::{Format, XFS_DINODE_MAGIC};
use ap_storage_xfs::superblock::{SUPERBLOCK_SIZE, XFS_SB_MAGIC};

/// An image builder.
#[derive(Debug, Clone)]
pub struct MakeXfsImage {
    magic: u32,
    block_size: u32,
    blocks: u64,
    inode_size: u16,
    inode_count: u64,
    free_inodes: u64,
}

impl Default for MakeXfsImage {
    fn default() -> Self {
        Self {
            magic: XFS_SB_MAGIC,
            block_size: 4096,
            blocks: 4,
            inode_size: 256,
            inode_count: 4,
            free_inodes: 0,
        }
    }
}

impl MakeXfsImage {
    /// Override the superblock magic.
    pub fn magic(self, v: u32) -> Self {
        Self { magic: v, ..self }
    }

    /// The size of a block in bytes.
    pub fn block_size(self, v: u32) -> Result<Self, Error> {
        if !v.is_power_of_two() || v < 512 {
            return Err(anyhow::anyhow!("block_size must be a power of two and at least 512"));
        }
        Ok(Self { block_size: v, ..self })
    }

    /// The number of blocks in the image.
    pub fn blocks(self, v: u64) -> Self {
        Self { blocks: v, ..self }
    }

    /// The size of an inode record in bytes.
    pub fn inode_size(self, v: u16) -> Self {
        Self { inode_size: v, ..self }
    }

    /// The inode count stored in the superblock.
    pub fn inode_count(self, v: u64) -> Self {
        Self { inode_count: v, ..self }
    }

    /// The free inode count stored in the superblock.
    pub fn free_inodes(self, v: u64) -> Self {
        Self { free_inodes: v, ..self }
    }

    /// Create the zeroed image with the superblock.
    pub fn build(&self) -> XfsImage {
        let len = core::cmp::max(self.blocks * self.block_size as u64, SUPERBLOCK_SIZE as u64);
        let mut data = vec![0u8; len as usize];
        data[0..4].copy_from_slice(&self.magic.to_be_bytes());
        data[4..8].copy_from_slice(&self.block_size.to_be_bytes());
        data[8..16].copy_from_slice(&self.blocks.to_be_bytes());
        data[100..102].copy_from_slice(&self.inode_size.to_be_bytes());
        data[104..112].copy_from_slice(&self.inode_count.to_be_bytes());
        data[112..120].copy_from_slice(&self.free_inodes.to_be_bytes());
        XfsImage {
            data,
            block_size: self.block_size,
            inode_size: self.inode_size,
        }
    }
}

/// An image in memory.
pub struct XfsImage {
    data: Vec<u8>,
    block_size: u32,
    inode_size: u16,
}

impl XfsImage {
    fn region(&mut self, ofs: Offset, len: usize) -> Result<&mut [u8], Error> {
        let size = self.data.len();
        let ofs = usize::try_from(ofs).map_err(|_| anyhow::anyhow!("offset {:#x} too large", ofs))?;
        match ofs.checked_add(len) {
            Some(end) if end <= size => Ok(&mut self.data[ofs..end]),
            _ => Err(anyhow::anyhow!("{} bytes at {:#x} outside the image of {:#x} bytes", len, ofs, size)),
        }
    }

    /// Write an inode record into the slot with the given index.
    pub fn put_inode(&mut self, index: u64, inode: &MakeInode) -> Result<(), Error> {
        let size = self.inode_size as usize;
        let ofs = SUPERBLOCK_SIZE as Offset + index * size as Offset;
        inode.write(self.region(ofs, size)?)
    }

    /// Write data at the start of a block.
    pub fn put_block(&mut self, block: u64, data: &[u8]) -> Result<(), Error> {
        let ofs = block * self.block_size as Offset;
        self.region(ofs, data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// Append bytes that do not fill a whole block.
    pub fn append(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    /// The image bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access for corrupting the image.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// An inode record builder.
#[derive(Debug, Clone)]
pub struct MakeInode {
    magic: u16,
    mode: u16,
    version: u8,
    format: Format,
    nlink: u16,
    size: u64,
    legacy: Vec<(u64, u32)>,
    packed: Vec<(bool, u64, u64, u32)>,
}

impl Default for MakeInode {
    fn default() -> Self {
        Self {
            magic: XFS_DINODE_MAGIC,
            mode: 0o100644,
            version: 2,
            format: Format::Extents,
            nlink: 1,
            size: 0,
            legacy: Vec::new(),
            packed: Vec::new(),
        }
    }
}

impl MakeInode {
    /// A regular file without links.
    pub fn deleted() -> Self {
        Self { nlink: 0, ..Self::default() }
    }

    /// A regular file with the given number of links.
    pub fn linked(nlink: u16) -> Self {
        Self { nlink, ..Self::default() }
    }

    pub fn magic(self, v: u16) -> Self {
        Self { magic: v, ..self }
    }

    pub fn version(self, v: u8) -> Self {
        Self { version: v, ..self }
    }

    pub fn format(self, v: Format) -> Self {
        Self { format: v, ..self }
    }

    /// The file size.
    ///
    /// The upper half of the first fixed-width descriptor shares bytes with the low half of the size.
    pub fn size(self, v: u64) -> Self {
        Self { size: v, ..self }
    }

    /// Add a fixed-width descriptor.
    pub fn extent(mut self, start_block: u64, block_count: u32) -> Self {
        self.legacy.push((start_block, block_count));
        self
    }

    /// Add a packed descriptor and count it in the data fork extents.
    pub fn packed_extent(mut self, file_offset: u64, start_block: u64, block_count: u32, unwritten: bool) -> Self {
        self.packed.push((unwritten, file_offset, start_block, block_count));
        self
    }

    /// Serialize into a zeroed record.
    pub fn write(&self, buf: &mut [u8]) -> Result<(), Error> {
        buf.fill(0);
        let mut put = |ofs: usize, v: &[u8]| match buf.get_mut(ofs..ofs + v.len()) {
            Some(dst) => {
                dst.copy_from_slice(v);
                Ok(())
            }
            None => Err(anyhow::anyhow!("inode field at {} does not fit", ofs)),
        };
        put(0, &self.magic.to_be_bytes())?;
        put(2, &self.mode.to_be_bytes())?;
        put(4, &[self.version, self.format.into()])?;
        put(16, &self.nlink.to_be_bytes())?;
        put(56, &self.size.to_be_bytes())?;
        for (i, (start, count)) in self.legacy.iter().enumerate() {
            let ofs = 60 + 16 * i;
            put(ofs, &start.to_be_bytes())?;
            put(ofs + 8, &count.to_be_bytes())?;
        }
        if !self.packed.is_empty() {
            put(0x4c, &(self.packed.len() as u32).to_be_bytes())?;
            let fork = if self.version >= 3 { 176 } else { 100 };
            for (i, (unwritten, file_offset, start, count)) in self.packed.iter().enumerate() {
                let hi = (*unwritten as u64) << 63 | (file_offset & 0x003f_ffff_ffff_ffff) << 9 | (start >> 43) & 0x1ff;
                let lo = (start & 0x7ff_ffff_ffff) << 21 | (*count as u64 & 0x1f_ffff);
                put(fork + 16 * i, &hi.to_be_bytes())?;
                put(fork + 16 * i + 8, &lo.to_be_bytes())?;
            }
        }
        Ok(())
    }
}

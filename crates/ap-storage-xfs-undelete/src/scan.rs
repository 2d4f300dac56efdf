//! Walk the linear inode table behind the superblock.

use crate::block::BlockReader;
use ap_storage::{Error, Offset};
use ap_storage_xfs::inode::InodeCore;
use ap_storage_xfs::superblock::SUPERBLOCK_SIZE;

/// A decoded inode slot.
#[derive(Debug, Clone)]
pub struct InodeRecord {
    /// The slot number counted from the start of the table.
    pub index: u64,
    /// The byte offset of the slot on the disk.
    pub offset: Offset,
    pub core: InodeCore,
    /// The whole record as the extent descriptors live in it.
    pub raw: Vec<u8>,
}

/// Iterate over the inode slots.
///
/// The table is assumed to start directly behind the superblock and to be
/// contiguous.  The scan ends after `count` slots or when the disk has no room
/// for another full slot.  A slot that cannot be read or decoded is returned as
/// error and the scan continues with the next one.
pub struct InodeScanner<'a> {
    reader: BlockReader<'a>,
    inode_size: usize,
    count: u64,
    next: u64,
}

impl<'a> InodeScanner<'a> {
    pub fn new(reader: BlockReader<'a>, inode_size: u16, count: u64) -> Self {
        Self {
            reader,
            inode_size: inode_size as usize,
            count,
            next: 0,
        }
    }

    /// The byte offset of a slot.
    pub fn slot_offset(&self, index: u64) -> Option<Offset> {
        index
            .checked_mul(self.inode_size as Offset)?
            .checked_add(SUPERBLOCK_SIZE as Offset)
    }

    fn read(&self, index: u64, offset: Offset) -> Result<InodeRecord, Error> {
        let raw = self.reader.read_at(offset, self.inode_size)?;
        let core = InodeCore::parse(&raw)?;
        Ok(InodeRecord {
            index,
            offset,
            core,
            raw,
        })
    }
}

impl Iterator for InodeScanner<'_> {
    type Item = (u64, Result<InodeRecord, Error>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count || self.inode_size == 0 {
            return None;
        }
        let index = self.next;
        let offset = self.slot_offset(index)?;
        if self.reader.available(offset) < self.inode_size as Offset {
            return None;
        }
        self.next += 1;
        Some((index, self.read(index, offset)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ap_storage_memory::ReadSlice;
    use ap_storage_xfs::inode::Format;
    use ap_storage_xfs_mkimage::{MakeInode, MakeXfsImage};

    #[test]
    fn stops_at_inode_count() {
        let mut img = MakeXfsImage::default().inode_count(3).build();
        img.put_inode(0, &MakeInode::linked(1)).unwrap();
        img.put_inode(2, &MakeInode::deleted().extent(1, 1)).unwrap();
        img.put_inode(3, &MakeInode::deleted()).unwrap();
        let disk = ReadSlice(img.bytes());
        let items: Vec<_> = InodeScanner::new(BlockReader::new(&disk, disk.size()), 256, 3).collect();
        assert_eq!(items.len(), 3);
        let indexes: Vec<u64> = items.iter().map(|(i, _)| *i).collect();
        assert_eq!(indexes, [0, 1, 2]);

        let records: Vec<InodeRecord> = items.into_iter().map(|(_, r)| r.unwrap()).collect();
        assert_eq!(records[0].offset, 512);
        assert_eq!(records[0].core.nlink, 1);
        assert!(records[1].core.is_blank());
        assert!(records[2].core.is_recoverable());
        assert_eq!(records[2].offset, 512 + 2 * 256);
        assert_eq!(records[2].raw.len(), 256);
    }

    #[test]
    fn stops_at_end_of_data() {
        // room for the superblock and one and a half slots
        let mut img = MakeXfsImage::default().blocks(0).inode_count(1000).build();
        img.append(&[0u8; 256 + 128]);
        let disk = ReadSlice(img.bytes());
        let scan = InodeScanner::new(BlockReader::new(&disk, disk.size()), 256, 1000);
        assert_eq!(scan.count(), 1);
    }

    #[test]
    fn short_records_are_errors_not_the_end() {
        let img = MakeXfsImage::default().inode_size(32).inode_count(4).build();
        let disk = ReadSlice(img.bytes());
        let items: Vec<_> = InodeScanner::new(BlockReader::new(&disk, disk.size()), 32, 4).collect();
        assert_eq!(items.len(), 4);
        assert!(items.iter().all(|(_, r)| r.is_err()));
    }

    #[test]
    fn unknown_formats_decode() {
        let mut img = MakeXfsImage::default().build();
        img.put_inode(1, &MakeInode::deleted().format(Format::Unknown(9))).unwrap();
        let disk = ReadSlice(img.bytes());
        let mut scan = InodeScanner::new(BlockReader::new(&disk, disk.size()), 256, 4).skip(1);
        let (index, record) = scan.next().unwrap();
        assert_eq!(index, 1);
        assert_eq!(record.unwrap().core.format, Format::Unknown(9));
    }

    #[test]
    fn zero_sized_slots_end_the_scan() {
        let img = MakeXfsImage::default().build();
        let disk = ReadSlice(img.bytes());
        assert_eq!(InodeScanner::new(BlockReader::new(&disk, disk.size()), 0, 4).count(), 0);
    }
}

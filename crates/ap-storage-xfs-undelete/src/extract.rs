//! Turn the descriptors of an inode into extents that point into the disk.

use crate::scan::InodeRecord;
use ap_storage::Offset;
use ap_storage_xfs::extent::{descriptors, Extent, ExtentDecoder};
use log::{info, warn};

/// The extents of one inode.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Valid extents in descriptor order.
    pub extents: Vec<Extent>,
    /// Descriptors that were dropped.
    pub dropped: u64,
}

/// Decode and validate extents against the disk size.
pub struct ExtentExtractor<'a> {
    decoder: &'a dyn ExtentDecoder,
    block_size: u32,
    disk_size: Offset,
}

impl<'a> ExtentExtractor<'a> {
    pub fn new(decoder: &'a dyn ExtentDecoder, block_size: u32, disk_size: Offset) -> Self {
        Self {
            decoder,
            block_size,
            disk_size,
        }
    }

    /// Does the extent start inside the disk?
    pub fn in_range(&self, extent: &Extent) -> bool {
        matches!(extent.offset(self.block_size), Some(ofs) if ofs < self.disk_size)
    }

    /// Collect the usable extents of the inode.
    ///
    /// A bad descriptor is dropped with a diagnostic; the others are still returned.
    pub fn extract(&self, record: &InodeRecord) -> Extraction {
        let mut res = Extraction::default();
        for (nr, entry) in descriptors(self.decoder, &record.core, &record.raw) {
            let extent = match entry {
                Ok(extent) => extent,
                Err(e) => {
                    warn!("  Undecodable extent {nr} of inode {}: {e:#}", record.index);
                    res.dropped += 1;
                    continue;
                }
            };
            if !self.in_range(&extent) {
                warn!(
                    "  Invalid extent found: Start Block = {}, exceeds image size.",
                    extent.start_block
                );
                res.dropped += 1;
                continue;
            }
            if extent.unwritten {
                warn!(
                    "  Unwritten extent skipped: Start Block = {}, Block Count = {}",
                    extent.start_block, extent.block_count
                );
                res.dropped += 1;
                continue;
            }
            info!(
                "  Found extent: Start Block = {}, Block Count = {}",
                extent.start_block, extent.block_count
            );
            res.extents.push(extent);
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockReader;
    use crate::scan::InodeScanner;
    use ap_storage_memory::ReadSlice;
    use ap_storage_xfs::extent::{LegacyFixedWidth, Packed};
    use ap_storage_xfs::inode::Format;
    use ap_storage_xfs_mkimage::{MakeInode, MakeXfsImage};

    fn first(img: &[u8], inode_size: u16) -> InodeRecord {
        let disk = ReadSlice(img);
        let mut scan = InodeScanner::new(BlockReader::new(&disk, disk.size()), inode_size, 1);
        scan.next().unwrap().1.unwrap()
    }

    #[test]
    fn out_of_range_extents_are_dropped() {
        let mut img = MakeXfsImage::default().blocks(4).build();
        img.put_inode(0, &MakeInode::deleted().extent(1, 1).extent(4, 1).extent(u64::MAX, 1).extent(3, 2))
            .unwrap();
        let record = first(img.bytes(), 256);
        let extraction = ExtentExtractor::new(&LegacyFixedWidth, 4096, 4 * 4096).extract(&record);
        assert_eq!(extraction.dropped, 2);
        assert_eq!(extraction.extents[0], Extent::new(1, 1));
        assert_eq!(extraction.extents[1], Extent::new(3, 2));
        // the remaining descriptors are zero
        assert_eq!(extraction.extents.len(), 12 - 2);
        assert!(extraction.extents[2..].iter().all(|e| *e == Extent::new(0, 0)));
    }

    #[test]
    fn order_is_kept() {
        let mut img = MakeXfsImage::default().blocks(8).build();
        img.put_inode(0, &MakeInode::deleted().extent(7, 1).extent(2, 1)).unwrap();
        let record = first(img.bytes(), 256);
        let extraction = ExtentExtractor::new(&LegacyFixedWidth, 4096, 8 * 4096).extract(&record);
        assert_eq!(extraction.extents[..2], [Extent::new(7, 1), Extent::new(2, 1)]);
    }

    #[test]
    fn packed_skips_unwritten() {
        let mut img = MakeXfsImage::default().inode_size(512).blocks(8).build();
        img.put_inode(
            0,
            &MakeInode::deleted().version(3).packed_extent(0, 2, 1, false).packed_extent(1, 5, 1, true),
        )
        .unwrap();
        let record = first(img.bytes(), 512);
        let extraction = ExtentExtractor::new(&Packed, 4096, 8 * 4096).extract(&record);
        assert_eq!(extraction.extents, [Extent::new(2, 1)]);
        assert_eq!(extraction.dropped, 1);
    }

    #[test]
    fn other_formats_have_no_extents() {
        let mut img = MakeXfsImage::default().build();
        img.put_inode(0, &MakeInode::deleted().format(Format::Local).extent(1, 1)).unwrap();
        let record = first(img.bytes(), 256);
        let extraction = ExtentExtractor::new(&LegacyFixedWidth, 4096, 4 * 4096).extract(&record);
        assert!(extraction.extents.is_empty());
        assert_eq!(extraction.dropped, 0);
    }
}

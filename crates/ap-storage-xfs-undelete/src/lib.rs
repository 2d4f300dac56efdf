//! Recover deleted files from an XFS image.
//!
//! The image is never mounted.  The primary superblock is decoded, the inode
//! table is walked as one linear array directly behind it and every inode
//! without links that stores its data in extents is copied into a new file.
//!
//! Allocation groups, B+-trees, the log and metadata checksums are not looked
//! at.  The table layout is therefore only right for images where the inodes
//! follow the superblock.

pub mod block;
pub mod digest;
pub mod extract;
pub mod reconstruct;
pub mod report;
pub mod scan;

use anyhow::Context;
use ap_storage::{msg2err, Error, Offset, Read};
use ap_storage_xfs::extent::{ExtentDecoder, LegacyFixedWidth, Packed};
use ap_storage_xfs::inode::Format;
use ap_storage_xfs::superblock::{SuperBlock, SUPERBLOCK_SIZE};
use block::BlockReader;
use extract::ExtentExtractor;
use log::{debug, error, info, warn};
use reconstruct::{FileId, FileReconstructor};
use scan::{InodeRecord, InodeScanner};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// The superblock magic did not match.
#[derive(Debug)]
pub struct NotXfs(pub u32);

impl core::fmt::Display for NotXfs {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> Result<(), core::fmt::Error> {
        write!(fmt, "Not a valid XFS filesystem (magic {:#010x}).", self.0)
    }
}

/// Which extent decoder to use.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderKind {
    /// Fixed-width descriptors as the scanner always read them.
    #[default]
    Legacy,
    /// The real packed extent records.
    Packed,
}

impl DecoderKind {
    pub fn decoder(&self) -> &'static dyn ExtentDecoder {
        match self {
            Self::Legacy => &LegacyFixedWidth,
            Self::Packed => &Packed,
        }
    }
}

impl core::str::FromStr for DecoderKind {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "legacy" => Ok(Self::Legacy),
            "packed" => Ok(Self::Packed),
            _ => Err(anyhow::anyhow!("unknown decoder {s:?}, expected legacy or packed")),
        }
    }
}

/// How recovered files are written.
#[derive(Debug, Clone)]
pub struct Settings {
    /// The directory for recovered files.
    pub output: PathBuf,
    /// The start of every file name.
    pub prefix: String,
    pub decoder: DecoderKind,
    /// Only report what would be recovered.
    pub dry_run: bool,
    /// The image file.  A recovered file never replaces it.
    pub source: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output: PathBuf::from("."),
            prefix: "recovered_inode".into(),
            decoder: DecoderKind::default(),
            dry_run: false,
            source: None,
        }
    }
}

/// A file written for a deleted inode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveredArtifact {
    /// The slot of the inode in the table.
    pub inode: u64,
    pub path: PathBuf,
    pub bytes: u64,
    pub extents: usize,
    /// Hex BLAKE3 of the file content.
    pub digest: String,
}

/// Counters of a run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Summary {
    /// Slots read from the table.
    pub scanned: u64,
    /// Slots with anything in them.
    pub reported: u64,
    /// Deleted extent-format inodes.
    pub eligible: u64,
    pub malformed: u64,
    pub unknown_format: u64,
    pub extents_dropped: u64,
    /// Eligible inodes where writing the file failed.
    pub failed: u64,
    pub artifacts: Vec<RecoveredArtifact>,
    /// The scan was stopped before its end.
    pub cancelled: bool,
}

/// The recovery engine over one disk.
pub struct Undelete<'a> {
    reader: BlockReader<'a>,
    sb: SuperBlock,
}

impl<'a> Undelete<'a> {
    /// Read and validate the superblock.
    ///
    /// Fails if the disk does not start with an XFS superblock or its geometry is unusable.
    pub fn new(disk: &'a dyn Read, size: Offset) -> Result<Self, Error> {
        let reader = BlockReader::new(disk, size);
        let len = core::cmp::min(size, SUPERBLOCK_SIZE as Offset) as usize;
        let raw = reader.read_at(0, len).context("read superblock")?;
        let sb = SuperBlock::parse(&raw)?;
        if !sb.is_valid() {
            return Err(Error::msg(NotXfs(sb.magic)));
        }
        if sb.block_size == 0 || sb.inode_size == 0 {
            return Err(msg2err!("zero block or inode size in the superblock"));
        }
        Ok(Self { reader, sb })
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.sb
    }

    /// Log the superblock summary.
    pub fn log_superblock(&self) {
        let sb = &self.sb;
        info!("XFS Superblock Information:");
        info!("  Block Size: {} bytes", sb.block_size);
        info!("  Inode Size: {} bytes", sb.inode_size);
        info!("  Total Data Blocks: {}", sb.data_blocks);
        info!("  Total Inodes: {}", sb.inode_count);
        info!("  Free Inodes: {}", sb.free_inodes);
        info!("  UUID: {}", sb.uuid());
        debug!("  CRC: {:#010x}", sb.crc);
    }

    /// Iterate over the inode table.
    pub fn scan(&self) -> InodeScanner<'a> {
        InodeScanner::new(self.reader, self.sb.inode_size, self.sb.inode_count)
    }

    /// Scan the whole table and recover every deleted file.
    ///
    /// Problems with single inodes or extents are logged and counted.  The
    /// `stop` flag is checked before every slot.
    pub fn run(&self, settings: &Settings, stop: &AtomicBool) -> Result<Summary, Error> {
        if !settings.dry_run {
            std::fs::create_dir_all(&settings.output)
                .with_context(|| format!("create {}", settings.output.display()))?;
        }
        let extractor = ExtentExtractor::new(settings.decoder.decoder(), self.sb.block_size, self.reader.size());
        let source = match &settings.source {
            Some(path) => Some(FileId::of(path)?),
            None => None,
        };
        let reconstructor = FileReconstructor::new(self.reader, self.sb.block_size).source(source);
        let mut summary = Summary::default();
        let mut scan = self.scan();
        loop {
            if stop.load(Ordering::Relaxed) {
                warn!("Scan cancelled after {} inodes.", summary.scanned);
                summary.cancelled = true;
                break;
            }
            let Some((index, item)) = scan.next() else {
                break;
            };
            summary.scanned += 1;
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    warn!("Inode {index}: skipping malformed record: {e:#}");
                    summary.malformed += 1;
                    continue;
                }
            };
            let core = &record.core;
            if core.is_blank() {
                continue;
            }
            summary.reported += 1;
            info!(
                "Inode {}: Magic = {:#x}, Format = {}, Size = {}",
                index,
                core.magic,
                u8::from(core.format),
                core.size
            );
            if let Format::Unknown(format) = core.format {
                warn!("Unknown inode format {format} at index {index}; skipping...");
                summary.unknown_format += 1;
                continue;
            }
            if !core.is_recoverable() {
                debug!(
                    "Inode {index}: not recoverable (valid {}, links {}, format {:?})",
                    core.is_valid(),
                    core.nlink,
                    core.format
                );
                continue;
            }
            summary.eligible += 1;
            info!("Deleted inode found at index {index}, attempting recovery...");
            match self.recover(&record, settings, &extractor, &reconstructor, &mut summary) {
                Ok(Some(artifact)) => summary.artifacts.push(artifact),
                Ok(None) => {}
                Err(e) => {
                    error!("Recovery of inode {index} failed: {e:#}");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Recover a single eligible inode.
    fn recover(
        &self,
        record: &InodeRecord,
        settings: &Settings,
        extractor: &ExtentExtractor,
        reconstructor: &FileReconstructor,
        summary: &mut Summary,
    ) -> Result<Option<RecoveredArtifact>, Error> {
        let extraction = extractor.extract(record);
        summary.extents_dropped += extraction.dropped;
        if extraction.extents.is_empty() {
            info!("No extents found for this inode.");
            return Ok(None);
        }
        let path = reconstruct::output_name(&settings.output, &settings.prefix, record.index);
        if settings.dry_run {
            info!(
                "Would write {} extents to {}",
                extraction.extents.len(),
                path.display()
            );
            return Ok(None);
        }
        let written = reconstructor.reconstruct(&extraction.extents, &path)?;
        info!("Recovered file written to {} ({} bytes)", path.display(), written.bytes);
        if written.truncated != 0 {
            warn!("  {} extents of inode {} were incomplete", written.truncated, record.index);
        }
        let digest = digest::digest(&path)?;
        info!("BLAKE3 hash of {}: {}", path.display(), digest);
        Ok(Some(RecoveredArtifact {
            inode: record.index,
            path,
            bytes: written.bytes,
            extents: extraction.extents.len(),
            digest,
        }))
    }
}

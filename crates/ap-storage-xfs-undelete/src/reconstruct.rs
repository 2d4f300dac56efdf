//! Copy the blocks of extents into a new file.

use crate::block::BlockReader;
use anyhow::Context;
use ap_storage::{Error, Offset};
use ap_storage_xfs::extent::Extent;
use log::{debug, warn};
use std::fs::{Metadata, OpenOptions};
use std::io::{BufWriter, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

/// The deterministic name of the file recovered from an inode slot.
pub fn output_name(dir: &Path, prefix: &str, index: u64) -> PathBuf {
    dir.join(format!("{prefix}_{index}.dat"))
}

/// Device and inode number of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    pub fn of(path: &Path) -> Result<Self, Error> {
        let meta = std::fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
        Ok(Self::from(&meta))
    }
}

impl From<&Metadata> for FileId {
    fn from(meta: &Metadata) -> Self {
        Self {
            dev: meta.dev(),
            ino: meta.ino(),
        }
    }
}

/// An output name resolved to the image that is being read.
#[derive(Debug)]
pub struct SourceOverwrite(pub PathBuf);

impl core::fmt::Display for SourceOverwrite {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> Result<(), core::fmt::Error> {
        write!(fmt, "{} is the source image, refusing to overwrite it", self.0.display())
    }
}

/// What was written for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconstruction {
    /// Bytes in the new file.
    pub bytes: u64,
    /// Extents that ended before all of their blocks were copied.
    pub truncated: u64,
}

/// Stream blocks from the disk into files.
pub struct FileReconstructor<'a> {
    reader: BlockReader<'a>,
    block_size: u32,
    source: Option<FileId>,
}

impl<'a> FileReconstructor<'a> {
    pub fn new(reader: BlockReader<'a>, block_size: u32) -> Self {
        Self {
            reader,
            block_size,
            source: None,
        }
    }

    /// The file behind the disk.  It is never truncated or written.
    pub fn source(self, source: Option<FileId>) -> Self {
        Self { source, ..self }
    }

    /// Create the file and append the blocks of every extent in list order.
    ///
    /// A block running past the end of the disk is copied as far as it goes and
    /// ends its extent.  The partial file is kept.  An existing file is
    /// truncated unless it is the source.
    pub fn reconstruct(&self, extents: &[Extent], path: &Path) -> Result<Reconstruction, Error> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("create {}", path.display()))?;
        let meta = file.metadata().with_context(|| format!("stat {}", path.display()))?;
        if self.source == Some(FileId::from(&meta)) {
            return Err(Error::msg(SourceOverwrite(path.to_path_buf())));
        }
        file.set_len(0).with_context(|| format!("truncate {}", path.display()))?;
        let mut out = BufWriter::new(file);
        let mut res = Reconstruction { bytes: 0, truncated: 0 };
        let mut buf = vec![0u8; self.block_size as usize];
        for extent in extents {
            let (copied, complete) = self.copy_extent(extent, &mut buf, &mut out)?;
            res.bytes += copied;
            if !complete {
                res.truncated += 1;
            }
        }
        out.flush().with_context(|| format!("write {}", path.display()))?;
        Ok(res)
    }

    /// Copy one extent.  Returns the bytes written and whether all blocks were there.
    fn copy_extent(&self, extent: &Extent, buf: &mut [u8], out: &mut impl Write) -> Result<(Offset, bool), Error> {
        let block_size = self.block_size as Offset;
        let Some(offset) = extent.offset(self.block_size).filter(|ofs| *ofs < self.reader.size()) else {
            warn!(
                "Error: extent at block {} is outside the image bounds.",
                extent.start_block
            );
            return Ok((0, false));
        };
        debug!(
            "Reading data from offset {} for {} blocks of size {}.",
            offset, extent.block_count, block_size
        );
        let mut copied = 0;
        for nr in 0..extent.block_count as Offset {
            let pos = offset + nr * block_size;
            let n = core::cmp::min(block_size, self.reader.available(pos)) as usize;
            if n == 0 {
                debug!("  short read at block {} of extent {}", nr, extent.start_block);
                return Ok((copied, false));
            }
            if let Err(e) = self.reader.read_into(pos, &mut buf[..n]) {
                warn!("  read error at offset {}: {:#}", pos, e);
                return Ok((copied, false));
            }
            out.write_all(&buf[..n])?;
            copied += n as Offset;
            if n < buf.len() {
                debug!("  partial block at offset {}", pos);
                return Ok((copied, false));
            }
        }
        Ok((copied, true))
    }
}

//! Linux specific storage interface.

use anyhow::Context;
use ap_storage::{Error, Offset, Read};
use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::Path;

/// A read-only disk backed by an image file or a block device.
///
/// The file is closed when the disk is dropped.
pub struct LinuxDisk {
    file: File,
    offset: u64,
    size: Offset,
}

impl LinuxDisk {
    /// Open a read-only disk at the given offset.
    pub fn new(filename: impl AsRef<Path>, offset: u64) -> Result<Self, Error> {
        let filename = filename.as_ref();
        let file = File::open(filename).with_context(|| format!("open {}", filename.display()))?;
        let end = Self::seek_end(&file).with_context(|| format!("size of {}", filename.display()))?;
        Ok(Self {
            file,
            offset,
            size: end.saturating_sub(offset),
        })
    }

    /// The usable bytes behind the offset.
    pub fn size(&self) -> Offset {
        self.size
    }

    /// Block devices report a zero length in their metadata, so ask the kernel for the end.
    fn seek_end(file: &File) -> Result<Offset, Error> {
        let res = unsafe { libc::lseek(file.as_raw_fd(), 0, libc::SEEK_END) };
        if res == -1 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(res as Offset)
    }
}

impl Read for LinuxDisk {
    fn read_bytes(&self, offset: Offset, buf: &mut [u8]) -> Result<usize, Error> {
        if offset >= self.size {
            return Ok(0);
        }
        let n = core::cmp::min(buf.len() as Offset, self.size - offset) as usize;
        let res = unsafe {
            libc::pread(
                self.file.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                n,
                (self.offset + offset) as libc::off_t,
            )
        };
        if res == -1 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(res as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ap_storage::ReadExt;
    use std::io::Write;

    fn image(len: usize) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        f.write_all(&data).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn read_with_offset() {
        let f = image(8192);
        let disk = LinuxDisk::new(f.path(), 512).unwrap();
        assert_eq!(disk.size(), 8192 - 512);

        let mut buf = [0u8; 4];
        (&disk as &dyn Read).read_exact(0, &mut buf).unwrap();
        assert_eq!(buf, [(512 % 251) as u8, (513 % 251) as u8, (514 % 251) as u8, (515 % 251) as u8]);
    }

    #[test]
    fn reads_stop_at_the_end() {
        let f = image(1000);
        let disk = LinuxDisk::new(f.path(), 0).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(disk.read_bytes(990, &mut buf).unwrap(), 10);
        assert_eq!(disk.read_bytes(1000, &mut buf).unwrap(), 0);
        assert_eq!((&disk as &dyn Read).read_full(0, &mut [0u8; 1024]).unwrap(), 1000);
    }

    #[test]
    fn offset_beyond_the_end() {
        let f = image(100);
        let disk = LinuxDisk::new(f.path(), 4096).unwrap();
        assert_eq!(disk.size(), 0);
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LinuxDisk::new(dir.path().join("nope.img"), 0).is_err());
    }
}

//! Content digests of recovered files.
//!
//! The digest only confirms to the operator what was written.  It is not used for security.

use anyhow::Context;
use ap_storage::Error;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

const CHUNK: usize = 4096;

/// The BLAKE3 hex digest of a whole file.
pub fn digest(path: &Path) -> Result<String, Error> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; CHUNK];
    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                hasher.update(&buf[..n]);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::new(e).context(format!("read {}", path.display()))),
        }
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// The digest of bytes in memory.
pub fn digest_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

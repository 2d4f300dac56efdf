//! Machine readable summary of a run for front ends.

use crate::{DecoderKind, Summary, Undelete};
use anyhow::Context;
use ap_storage::Error;
use serde::Serialize;
use std::path::Path;

/// The superblock fields shown to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct SuperblockInfo {
    pub block_size: u32,
    pub inode_size: u16,
    pub data_blocks: u64,
    pub inode_count: u64,
    pub free_inodes: u64,
    pub uuid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report<'a> {
    pub image: &'a str,
    pub decoder: DecoderKind,
    pub superblock: SuperblockInfo,
    pub summary: &'a Summary,
}

impl<'a> Report<'a> {
    pub fn new(image: &'a str, undelete: &Undelete, decoder: DecoderKind, summary: &'a Summary) -> Self {
        let sb = undelete.superblock();
        Self {
            image,
            decoder,
            superblock: SuperblockInfo {
                block_size: sb.block_size,
                inode_size: sb.inode_size,
                data_blocks: sb.data_blocks,
                inode_count: sb.inode_count,
                free_inodes: sb.free_inodes,
                uuid: sb.uuid().to_string(),
            },
            summary,
        }
    }

    /// Write the report as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json + "\n").with_context(|| format!("write {}", path.display()))
    }
}

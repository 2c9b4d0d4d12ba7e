//! Pack data file: `PACK` magic, format version, object count, then per
//! object a 20-byte hash, a 4-byte compressed length and the compressed
//! bytes. Objects are located by byte offset through the side index.

use crate::artifacts::core::zlib_decompress;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use byteorder::ReadBytesExt;
use bytes::Bytes;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct PackFile {
    path: PathBuf,
}

impl PackFile {
    pub fn new(path: PathBuf) -> Self {
        PackFile { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and decompress the object stored at `offset`. The result is
    /// either a whole serialized object or a delta payload starting with
    /// the delta marker; resolving deltas is the object database's job.
    pub fn read_object_at(&self, offset: u64) -> anyhow::Result<Bytes> {
        let mut file = std::fs::File::open(&self.path)
            .with_context(|| format!("Unable to open pack file {}", self.path.display()))?;
        file.seek(SeekFrom::Start(offset))?;

        let _oid = ObjectId::read_raw_from(&mut file)?;
        let length = file.read_u32::<byteorder::NetworkEndian>()?;

        let mut compressed = vec![0u8; length as usize];
        file.read_exact(&mut compressed)
            .context("Truncated pack entry")?;

        zlib_decompress(&compressed)
    }
}

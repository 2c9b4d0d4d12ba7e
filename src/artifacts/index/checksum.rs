//! Checksummed reader/writer over the locked index file.
//!
//! Every byte read or written through this wrapper feeds a running SHA-1.
//! On write the digest is appended as the trailing checksum; on load the
//! stored trailer must match the recomputed digest or the index is
//! rejected as corrupt.

use crate::artifacts::index::CHECKSUM_SIZE;
use crate::errors::EngineError;
use bytes::Bytes;
use file_guard::FileGuard;
use sha1::{Digest, Sha1};
use std::io::{Read, Write};
use std::ops::DerefMut;

#[derive(Debug)]
pub struct Checksum<'f> {
    file: FileGuard<&'f mut std::fs::File>,
    digest: Sha1,
}

impl<'f> Checksum<'f> {
    pub(crate) fn new(file: FileGuard<&'f mut std::fs::File>) -> Self {
        Checksum {
            file,
            digest: Sha1::new(),
        }
    }

    pub(crate) fn read(&mut self, size: usize) -> anyhow::Result<Bytes> {
        let mut buffer = vec![0; size];
        self.file.deref_mut().read_exact(&mut buffer).map_err(|_| {
            EngineError::CorruptIndex("unexpected end-of-file while reading index".into())
        })?;

        self.digest.update(&buffer);
        Ok(Bytes::from(buffer))
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.file.deref_mut().write_all(data)?;
        self.digest.update(data);
        Ok(())
    }

    pub(crate) fn write_checksum(&mut self) -> anyhow::Result<()> {
        let checksum = self.digest.clone().finalize();
        self.file.deref_mut().write_all(checksum.as_slice())?;

        Ok(())
    }

    pub(crate) fn verify(&mut self) -> anyhow::Result<()> {
        let mut expected_checksum = [0u8; CHECKSUM_SIZE];
        self.file
            .deref_mut()
            .read_exact(&mut expected_checksum)
            .map_err(|_| EngineError::CorruptIndex("missing index checksum trailer".into()))?;

        let actual_checksum = self.digest.clone().finalize();

        if expected_checksum != actual_checksum.as_slice() {
            return Err(EngineError::CorruptIndex(
                "checksum does not match value stored on disk".into(),
            )
            .into());
        }

        Ok(())
    }
}

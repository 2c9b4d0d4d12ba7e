//! Pack index file: `IDX1` magic, entry count, then one `(20-byte hash,
//! 8-byte big-endian offset)` record per packed object.

use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::pack::INDEX_MAGIC;
use anyhow::Context;
use byteorder::{ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::collections::HashMap;
use std::io::{BufReader, Read, Write};
use std::path::Path;

#[derive(Debug)]
pub struct PackIndex {
    offsets: HashMap<ObjectId, u64>,
}

impl PackIndex {
    pub fn load(idx_path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(idx_path)
            .with_context(|| format!("Unable to open pack index {}", idx_path.display()))?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != INDEX_MAGIC {
            anyhow::bail!("Invalid pack index magic in {}", idx_path.display());
        }

        let count = reader.read_u32::<byteorder::NetworkEndian>()?;
        let mut offsets = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let oid = ObjectId::read_raw_from(&mut reader)?;
            let offset = reader.read_u64::<byteorder::NetworkEndian>()?;
            offsets.insert(oid, offset);
        }

        Ok(PackIndex { offsets })
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.offsets.contains_key(oid)
    }

    pub fn offset_of(&self, oid: &ObjectId) -> Option<u64> {
        self.offsets.get(oid).copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Serialize the writer side: offsets in pack order.
    pub fn serialize(entries: &[(ObjectId, u64)]) -> anyhow::Result<Bytes> {
        let mut out = Vec::new();
        out.write_all(INDEX_MAGIC)?;
        out.write_u32::<byteorder::NetworkEndian>(entries.len() as u32)?;

        for (oid, offset) in entries {
            oid.write_raw_to(&mut out)?;
            out.write_u64::<byteorder::NetworkEndian>(*offset)?;
        }

        Ok(Bytes::from(out))
    }
}

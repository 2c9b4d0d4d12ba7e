//! Index entry codec
//!
//! One entry per staged file: path, blob hash, and the stat metadata that
//! lets change detection skip rehashing content.
//!
//! ## Entry Format
//!
//! Ten big-endian u32 fields (ctime sec/nsec, mtime sec/nsec, dev, ino,
//! mode, uid, gid, size), the 20-byte content hash, a 2-byte flags field
//! whose low 12 bits hold the clamped path length, the NUL-terminated path,
//! then zero padding until the entry length is a multiple of 8 bytes.

use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use is_executable::IsExecutable;
use std::cmp::min;
use std::fs::Metadata;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// Maximum path length representable in the flags field (12 bits)
const MAX_PATH_SIZE: usize = 0xFFF;

/// Block size for entry alignment (8 bytes)
pub const ENTRY_BLOCK: usize = 8;

/// Minimum size of an index entry in bytes
pub const ENTRY_MIN_SIZE: usize = 64;

/// A staged file: path (the unique key), blob hash, stat metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, new)]
pub struct IndexEntry {
    /// File path relative to the repository root, forward-slash separated
    pub name: PathBuf,
    /// Hash of the staged blob
    pub oid: ObjectId,
    /// Stat metadata captured when the file was staged
    pub metadata: EntryMetadata,
}

impl IndexEntry {
    pub fn basename(&self) -> anyhow::Result<&str> {
        self.name
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid file name"))
    }

    /// Parent directories from outermost to innermost, excluding the root.
    pub fn parent_dirs(&self) -> Vec<&Path> {
        let mut dirs = Vec::new();
        let mut parent = self.name.parent();

        while let Some(new_parent) = parent {
            dirs.push(new_parent);
            parent = new_parent.parent();
        }
        dirs.reverse();

        // drop the empty root component
        dirs.into_iter().skip(1).collect()
    }
}

impl PartialOrd for IndexEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

/// Stat metadata stored alongside each entry.
///
/// All fields are serialized as 4-byte big-endian integers; `dev` and `ino`
/// are recorded as zero placeholders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    /// Status-change time, seconds since the Unix epoch
    pub ctime: u32,
    pub ctime_nsec: u32,
    /// Content-modification time, seconds since the Unix epoch
    pub mtime: u32,
    pub mtime_nsec: u32,
    /// Device id placeholder
    pub dev: u32,
    /// Inode placeholder
    pub ino: u32,
    /// File mode (regular or executable)
    pub mode: FileMode,
    pub uid: u32,
    pub gid: u32,
    /// File size in bytes
    pub size: u32,
}

impl Packable for IndexEntry {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let entry_name = self
            .name
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid entry name"))?;
        let entry_mode = EntryMode::from(self.metadata.mode).as_u32();
        let flags = min(entry_name.len(), MAX_PATH_SIZE) as u16;

        let mut entry_bytes = Vec::new();
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ctime)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ctime_nsec)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.mtime)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.mtime_nsec)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.dev)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ino)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(entry_mode)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.uid)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.gid)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.size)?;
        self.oid.write_raw_to(&mut entry_bytes)?;
        entry_bytes.write_u16::<byteorder::NetworkEndian>(flags)?;
        entry_bytes.write_all(entry_name.as_bytes())?;

        // NUL terminator, then pad the entry to ENTRY_BLOCK alignment
        entry_bytes.push(0);
        while entry_bytes.len() % ENTRY_BLOCK != 0 {
            entry_bytes.push(0);
        }

        Ok(Bytes::from(entry_bytes))
    }
}

impl Unpackable for IndexEntry {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let bytes = reader
            .bytes()
            .collect::<Result<Vec<u8>, std::io::Error>>()?;

        if bytes.len() < ENTRY_MIN_SIZE {
            return Err(anyhow::anyhow!("Invalid index entry size"));
        }

        let ctime = byteorder::NetworkEndian::read_u32(&bytes[0..4]);
        let ctime_nsec = byteorder::NetworkEndian::read_u32(&bytes[4..8]);
        let mtime = byteorder::NetworkEndian::read_u32(&bytes[8..12]);
        let mtime_nsec = byteorder::NetworkEndian::read_u32(&bytes[12..16]);
        let dev = byteorder::NetworkEndian::read_u32(&bytes[16..20]);
        let ino = byteorder::NetworkEndian::read_u32(&bytes[20..24]);
        let mode = EntryMode::try_from(byteorder::NetworkEndian::read_u32(&bytes[24..28]))?;
        let mode = FileMode::try_from(mode)?;
        let uid = byteorder::NetworkEndian::read_u32(&bytes[28..32]);
        let gid = byteorder::NetworkEndian::read_u32(&bytes[32..36]);
        let size = byteorder::NetworkEndian::read_u32(&bytes[36..40]);
        let mut oid_bytes = std::io::Cursor::new(&bytes[40..60]);
        let oid = ObjectId::read_raw_from(&mut oid_bytes)?;
        let _flags = byteorder::NetworkEndian::read_u16(&bytes[60..62]);

        // the path is NUL-terminated
        let name_end = bytes[62..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| anyhow::anyhow!("Missing null terminator in entry name"))?;
        let name_bytes = &bytes[62..62 + name_end];
        let name = PathBuf::from(
            std::str::from_utf8(name_bytes)
                .map_err(|_| anyhow::anyhow!("Invalid UTF-8 in entry name"))?,
        );

        Ok(IndexEntry {
            name,
            oid,
            metadata: EntryMetadata {
                ctime,
                ctime_nsec,
                mtime,
                mtime_nsec,
                dev,
                ino,
                mode,
                uid,
                gid,
                size,
            },
        })
    }
}

impl TryFrom<(&Path, Metadata)> for EntryMetadata {
    type Error = anyhow::Error;

    fn try_from((file_path, metadata): (&Path, Metadata)) -> Result<Self, Self::Error> {
        use std::os::unix::prelude::MetadataExt;

        let mode = match file_path.is_executable() {
            true => FileMode::Executable,
            false => FileMode::Regular,
        };

        Ok(Self {
            ctime: metadata.ctime() as u32,
            ctime_nsec: metadata.ctime_nsec() as u32,
            mtime: metadata.mtime() as u32,
            mtime_nsec: metadata.mtime_nsec() as u32,
            dev: 0,
            ino: 0,
            mode,
            uid: metadata.uid(),
            gid: metadata.gid(),
            size: metadata.size() as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::{fixture, rstest};
    use std::io::Cursor;

    #[fixture]
    fn oid() -> ObjectId {
        ObjectId::digest(b"test data")
    }

    #[rstest]
    fn entry_parent_dirs(oid: ObjectId) {
        let entry = IndexEntry::new(PathBuf::from("a/b/c"), oid, EntryMetadata::default());

        pretty_assertions::assert_eq!(
            entry.parent_dirs(),
            vec![Path::new("a"), Path::new("a/b")]
        );
    }

    #[rstest]
    fn entry_parent_dirs_root(oid: ObjectId) {
        let entry = IndexEntry::new(PathBuf::from("a"), oid, EntryMetadata::default());

        pretty_assertions::assert_eq!(entry.parent_dirs(), Vec::<&Path>::new());
    }

    #[rstest]
    fn entry_basename(oid: ObjectId) {
        let entry = IndexEntry::new(PathBuf::from("a/b/c"), oid, EntryMetadata::default());

        pretty_assertions::assert_eq!(entry.basename().unwrap(), "c");
    }

    #[rstest]
    fn serialized_entry_is_block_aligned(oid: ObjectId) {
        let entry = IndexEntry::new(PathBuf::from("src/main.rs"), oid, EntryMetadata::default());

        let bytes = entry.serialize().unwrap();
        assert_eq!(bytes.len() % ENTRY_BLOCK, 0);
        assert_eq!(*bytes.last().unwrap(), 0);
    }

    #[rstest]
    #[case("héllo/wörld.txt")]
    #[case("日本語/ファイル.rs")]
    #[case("a/b/c/d/e/f/g/h/deeply-nested.txt")]
    fn unicode_and_nested_paths_round_trip(oid: ObjectId, #[case] path: &str) {
        let entry = IndexEntry::new(PathBuf::from(path), oid, EntryMetadata::default());

        let bytes = entry.serialize().unwrap();
        let reparsed = IndexEntry::deserialize(Cursor::new(bytes)).unwrap();

        pretty_assertions::assert_eq!(reparsed, entry);
    }

    fn metadata_strategy() -> impl Strategy<Value = EntryMetadata> {
        (
            any::<u32>(),
            any::<u32>(),
            any::<u32>(),
            any::<u32>(),
            any::<u32>(),
            any::<u32>(),
            any::<u32>(),
            prop::bool::ANY,
        )
            .prop_map(
                |(ctime, ctime_nsec, mtime, mtime_nsec, uid, gid, size, executable)| {
                    EntryMetadata {
                        ctime,
                        ctime_nsec,
                        mtime,
                        mtime_nsec,
                        dev: 0,
                        ino: 0,
                        mode: if executable {
                            FileMode::Executable
                        } else {
                            FileMode::Regular
                        },
                        uid,
                        gid,
                        size,
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn any_entry_round_trips(
            path in "[a-zA-Z0-9_.-]{1,12}(/[a-zA-Z0-9_.-]{1,12}){0,4}",
            metadata in metadata_strategy(),
        ) {
            let entry = IndexEntry::new(
                PathBuf::from(path),
                ObjectId::digest(b"content"),
                metadata,
            );

            let bytes = entry.serialize().unwrap();
            prop_assert_eq!(bytes.len() % ENTRY_BLOCK, 0);

            let reparsed = IndexEntry::deserialize(Cursor::new(bytes)).unwrap();
            prop_assert_eq!(reparsed, entry);
        }
    }
}

//! Staging area (index).
//!
//! A flat, path-ordered list of staged files persisted in the binary format
//! of `artifacts::index`. Duplicate paths are resolved by replace-in-place;
//! a file entry replacing a directory (or the reverse) evicts whatever it
//! conflicts with. Loads take a shared file lock and verify the trailing
//! checksum; writes take an exclusive lock, the single-writer guard around
//! index mutation.

use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::index::index_entry::{ENTRY_BLOCK, ENTRY_MIN_SIZE, IndexEntry};
use crate::artifacts::index::index_header::IndexHeader;
use crate::artifacts::index::{HEADER_SIZE, SIGNATURE, VERSION};
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::errors::EngineError;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::DerefMut;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Index {
    /// Path to the index file (typically `.grit/index`)
    path: Box<Path>,
    /// Staged files keyed by path
    entries: BTreeMap<Box<Path>, IndexEntry>,
    /// Directory hierarchy for parent/child conflict eviction
    children: BTreeMap<Box<Path>, BTreeSet<Box<Path>>>,
    header: IndexHeader,
    /// Whether the in-memory state diverged from disk
    changed: bool,
}

impl Index {
    pub fn new(path: Box<Path>) -> Self {
        Index {
            path,
            entries: BTreeMap::new(),
            children: BTreeMap::new(),
            header: IndexHeader::new(String::from(SIGNATURE), VERSION, 0),
            changed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_by_path(&self, path: &Path) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.children.clear();
        self.header = IndexHeader::empty();
        self.changed = false;
    }

    /// Drop every staged entry (used when a merge adopts a whole tree).
    pub fn clear_entries(&mut self) {
        self.entries.clear();
        self.children.clear();
        self.header.entries_count = 0;
        self.changed = true;
    }

    /// Load the index from disk under a shared lock, validating the header
    /// and the trailing checksum. A missing or empty file yields an empty
    /// index.
    pub fn rehydrate(&mut self) -> anyhow::Result<()> {
        if !self.path().exists() {
            self.clear();
            std::fs::File::create(self.path())?;
        }

        let mut index_file = std::fs::OpenOptions::new().read(true).open(self.path())?;
        let mut lock = file_guard::lock(&mut index_file, file_guard::Lock::Shared, 0, 1)?;

        self.clear();

        if lock.deref_mut().metadata()?.len() == 0 {
            return Ok(());
        }

        let mut reader = Checksum::new(lock);
        let entries_count = self.parse_header(&mut reader)?;
        self.parse_entries(entries_count, &mut reader)?;

        reader.verify()
    }

    fn parse_header(&self, reader: &mut Checksum) -> anyhow::Result<u32> {
        let header_bytes = reader.read(HEADER_SIZE)?;
        let header = IndexHeader::deserialize(std::io::Cursor::new(header_bytes))?;

        if header.marker != SIGNATURE {
            return Err(EngineError::CorruptIndex("invalid signature".into()).into());
        }

        if header.version != VERSION {
            return Err(EngineError::CorruptIndex(format!(
                "unsupported version: {}",
                header.version
            ))
            .into());
        }

        Ok(header.entries_count)
    }

    /// Entries are 8-byte aligned and NUL-padded, so keep reading blocks
    /// until the last byte of the entry is a NUL terminator.
    fn parse_entries(&mut self, entries_count: u32, reader: &mut Checksum) -> anyhow::Result<()> {
        for _ in 0..entries_count {
            let mut entry_bytes = reader.read(ENTRY_MIN_SIZE)?.to_vec();

            while entry_bytes[entry_bytes.len() - 1] != 0 {
                entry_bytes.extend_from_slice(&reader.read(ENTRY_BLOCK)?);
            }

            let entry = IndexEntry::deserialize(std::io::Cursor::new(Bytes::from(entry_bytes)))
                .map_err(|err| EngineError::CorruptIndex(err.to_string()))?;

            self.store_entry(&entry);
        }

        self.header.entries_count = entries_count;

        Ok(())
    }

    /// Remove whatever conflicts with the new entry: parent directories
    /// staged as files, and children when the entry replaces a directory.
    fn discard_conflicts(&mut self, entry: &IndexEntry) {
        for parent in entry.parent_dirs() {
            self.remove_entry(parent);
        }
        self.remove_children(&entry.name);
    }

    fn store_entry(&mut self, entry: &IndexEntry) {
        let entry_parents = entry
            .parent_dirs()
            .into_iter()
            .map(|parent| parent.to_owned().into_boxed_path())
            .collect::<BTreeSet<_>>();

        self.entries
            .insert(entry.name.clone().into_boxed_path(), entry.clone());

        for parent in entry_parents {
            self.children
                .entry(parent)
                .or_default()
                .insert(entry.name.clone().into_boxed_path());
        }
    }

    fn remove_children(&mut self, path_name: &Path) {
        if let Some(children) = self.children.remove(path_name) {
            for child in children {
                self.remove_entry(&child);
            }
        }
    }

    fn remove_entry(&mut self, path_name: &Path) {
        let Some(entry) = self.entries.remove(path_name) else {
            return;
        };

        for parent in entry.parent_dirs() {
            let parent = parent.to_owned().into_boxed_path();
            if let Some(children) = self.children.get_mut(&parent) {
                children.remove(path_name);
                if children.is_empty() {
                    self.children.remove(&parent);
                }
            }
        }
    }

    pub fn add(&mut self, entry: IndexEntry) -> anyhow::Result<()> {
        self.discard_conflicts(&entry);
        self.store_entry(&entry);

        self.header.entries_count = self.entries.len() as u32;
        self.changed = true;

        Ok(())
    }

    pub fn remove(&mut self, path: PathBuf) -> anyhow::Result<()> {
        self.remove_entry(&path);
        self.remove_children(&path);

        self.header.entries_count = self.entries.len() as u32;
        self.changed = true;

        Ok(())
    }

    /// Persist the index under an exclusive lock, appending the checksum of
    /// everything written.
    pub fn write_updates(&mut self) -> anyhow::Result<()> {
        let mut index_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.path())?;
        let lock = file_guard::lock(&mut index_file, file_guard::Lock::Exclusive, 0, 1)?;

        let mut writer = Checksum::new(lock);

        self.header = IndexHeader {
            entries_count: self.entries.len() as u32,
            ..self.header.clone()
        };
        writer.write(&self.header.serialize()?)?;

        for entry in self.entries() {
            writer.write(&entry.serialize()?)?;
        }

        writer.write_checksum()?;
        self.changed = false;

        Ok(())
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    /// Whether the in-memory state diverged from what was last persisted.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn into_entries(self) -> impl Iterator<Item = IndexEntry> {
        self.entries.into_values()
    }

    pub fn is_directly_tracked(&self, path: &Path) -> bool {
        self.entries.contains_key(path) || self.children.contains_key(path)
    }
}

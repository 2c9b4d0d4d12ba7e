//! Tree object
//!
//! A tree is one directory level of a snapshot: an ordered list of
//! `(mode, name, child-object-hash)` records. The builder side turns the
//! flat index entry list into a trie and emits one tree object per
//! directory, children before the parent so child hashes exist before the
//! parent tree is hashed.
//!
//! ## Format
//!
//! On disk: `tree <size>\0<records>`, each record `<mode> <name>\0<20-byte-sha>`.
//! The `40000` mode marks a record as a subdirectory.
//!
//! ## Ordering
//!
//! Within one directory all subdirectory records come first, then file
//! records, each group sorted by name. The ordering is an internal
//! convention of this engine; because both groups iterate sorted maps, the
//! root hash is a pure function of the staged `(path, mode, hash)` set,
//! independent of staging order.

use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use derive_new::new;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::Path;

/// One record of a tree read back from the database.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct TreeRecord {
    pub mode: EntryMode,
    pub name: String,
    pub oid: ObjectId,
}

impl TreeRecord {
    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }
}

/// A file reference inside a tree being built.
#[derive(Debug, Clone, new)]
struct FileRef {
    mode: EntryMode,
    oid: ObjectId,
}

/// Tree object with a dual representation: a directory trie on the write
/// side (built from index entries), a flat record list on the read side
/// (parsed from the database).
#[derive(Debug, Clone, Default)]
pub struct Tree {
    /// Immediate subdirectories, name-sorted (write mode)
    subtrees: BTreeMap<String, Tree>,
    /// Immediate files, name-sorted (write mode)
    files: BTreeMap<String, FileRef>,
    /// Records as stored on disk (read mode)
    records: Vec<TreeRecord>,
}

impl Tree {
    /// Build the directory trie for a full set of index entries.
    pub fn build<'e>(entries: impl Iterator<Item = &'e IndexEntry>) -> anyhow::Result<Self> {
        let mut root = Self::default();

        for entry in entries {
            let parents = entry.parent_dirs();
            root.add_entry(&parents, entry)?;
        }

        Ok(root)
    }

    fn add_entry(&mut self, parents: &[&Path], entry: &IndexEntry) -> anyhow::Result<()> {
        match parents.split_first() {
            None => {
                self.files.insert(
                    entry.basename()?.to_string(),
                    FileRef::new(entry.metadata.mode.into(), entry.oid.clone()),
                );
            }
            Some((parent, rest)) => {
                let parent = parent
                    .file_name()
                    .and_then(|s| s.to_str())
                    .context("Invalid parent directory name")?;

                self.subtrees
                    .entry(parent.to_string())
                    .or_default()
                    .add_entry(rest, entry)?;
            }
        }

        Ok(())
    }

    /// Visit every subtree depth-first, children before parents, so each
    /// subtree can be stored before its parent's records reference it.
    pub fn traverse<F>(&self, func: &F) -> anyhow::Result<()>
    where
        F: Fn(&Tree) -> anyhow::Result<()>,
    {
        for subtree in self.subtrees.values() {
            subtree.traverse(func)?;
        }
        func(self)?;

        Ok(())
    }

    /// Records parsed from the database (empty for trees being built).
    pub fn records(&self) -> &[TreeRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TreeRecord> {
        self.records
    }
}

impl Packable for Tree {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut content_bytes = Vec::new();

        // subdirectories first, then files; both maps iterate name-sorted
        for (name, subtree) in &self.subtrees {
            let header = format!("{} {}", EntryMode::Directory.as_str(), name);
            content_bytes.write_all(header.as_bytes())?;
            content_bytes.push(0);
            subtree.object_id()?.write_raw_to(&mut content_bytes)?;
        }
        for (name, file) in &self.files {
            let header = format!("{} {}", file.mode.as_str(), name);
            content_bytes.write_all(header.as_bytes())?;
            content_bytes.push(0);
            file.oid.write_raw_to(&mut content_bytes)?;
        }

        let mut tree_bytes = Vec::new();
        let header = format!("{} {}\0", self.object_type().as_str(), content_bytes.len());
        tree_bytes.write_all(header.as_bytes())?;
        tree_bytes.write_all(&content_bytes)?;

        Ok(Bytes::from(tree_bytes))
    }
}

impl Unpackable for Tree {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut records = Vec::new();

        // Reuse scratch buffers to reduce allocs
        let mut mode_bytes = Vec::new();
        let mut name_bytes = Vec::new();

        loop {
            mode_bytes.clear();
            let n = reader.read_until(b' ', &mut mode_bytes)?;
            if n == 0 {
                break; // clean EOF: no more records
            }
            if *mode_bytes.last().unwrap() != b' ' {
                return Err(anyhow::anyhow!("unexpected EOF in mode"));
            }
            mode_bytes.pop();

            let mode_str = std::str::from_utf8(&mode_bytes)?;
            let mode = EntryMode::try_from(mode_str)?;

            name_bytes.clear();
            let n = reader.read_until(b'\0', &mut name_bytes)?;
            if n == 0 || *name_bytes.last().unwrap() != b'\0' {
                return Err(anyhow::anyhow!("unexpected EOF in name"));
            }
            name_bytes.pop();
            let name = std::str::from_utf8(&name_bytes)?.to_owned();

            let oid =
                ObjectId::read_raw_from(&mut reader).context("unexpected EOF in object id")?;

            records.push(TreeRecord::new(mode, name, oid));
        }

        Ok(Tree {
            records,
            ..Default::default()
        })
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }
}

//! Three-way merger.
//!
//! Flattens the base, ours and theirs trees into `path -> (mode, hash)`
//! maps, classifies every path, synthesizes conflict blobs where both sides
//! changed, and synchronizes the working tree and the staging index with
//! the merged result so a subsequent status check reports a clean tree.
//!
//! On conflict no commit is created: the conflict-marker files and the
//! rebuilt index are left in place for manual resolution, and the returned
//! [`MergeOutcome`] carries the conflicted paths.

use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::refs::Refs;
use crate::areas::workspace::Workspace;
use crate::artifacts::index::entry_mode::FileMode;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::merge::lca_finder::LcaFinder;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::{Author, Commit};
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::Tree;
use crate::errors::EngineError;
use anyhow::Context;
use bytes::Bytes;
use derive_new::new;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Fraction of bytes outside the common text ranges above which content is
/// treated as binary.
const BINARY_RATIO: f64 = 0.3;

/// Result of a merge: either a commit with no conflicts, or no commit and
/// the list of conflicted paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub commit: Option<ObjectId>,
    pub conflicts: Vec<PathBuf>,
}

/// A flattened tree entry: file mode plus blob hash.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct PathEntry {
    pub mode: FileMode,
    pub oid: ObjectId,
}

pub struct Merger<'r> {
    database: &'r Database,
    workspace: &'r Workspace,
    index: &'r mut Index,
    refs: &'r Refs,
}

impl<'r> Merger<'r> {
    pub fn new(
        database: &'r Database,
        workspace: &'r Workspace,
        index: &'r mut Index,
        refs: &'r Refs,
    ) -> Self {
        Merger {
            database,
            workspace,
            index,
            refs,
        }
    }

    /// Merge `theirs` into `ours`. The first parent of the resulting commit
    /// is `ours`, the receiving branch.
    pub fn merge(
        &mut self,
        ours: &ObjectId,
        theirs: &ObjectId,
        author: Author,
        message: &str,
    ) -> anyhow::Result<MergeOutcome> {
        let database = self.database;
        let finder = LcaFinder::new(|oid: &ObjectId| {
            let commit = database
                .parse_object_as_commit(oid)?
                .with_context(|| format!("{oid} is not a commit"))?;
            Ok(commit.parents().to_vec())
        });

        let base = finder
            .find_merge_base(ours, theirs)?
            .ok_or_else(|| EngineError::NoCommonAncestor {
                ours: ours.clone(),
                theirs: theirs.clone(),
            })?;

        let base_map = self.flatten_tree(&self.tree_of(&base)?)?;
        let our_map = self.flatten_tree(&self.tree_of(ours)?)?;
        let their_map = self.flatten_tree(&self.tree_of(theirs)?)?;

        let (result, conflicts) = self.resolve_paths(&base_map, &our_map, &their_map)?;

        self.sync_workspace_and_index(&result)?;

        if !conflicts.is_empty() {
            return Ok(MergeOutcome {
                commit: None,
                conflicts,
            });
        }

        let tree = Tree::build(self.index.entries())?;
        tree.traverse(&|subtree| self.database.store(subtree).map(|_| ()))?;
        let tree_oid = tree.object_id()?;

        let commit = Commit::new(
            vec![ours.clone(), theirs.clone()],
            tree_oid,
            author,
            message.to_string(),
        );
        let commit_oid = self.database.store(&commit)?;
        self.refs.update_head(commit_oid.clone())?;

        Ok(MergeOutcome {
            commit: Some(commit_oid),
            conflicts,
        })
    }

    fn tree_of(&self, commit_oid: &ObjectId) -> anyhow::Result<ObjectId> {
        let commit = self
            .database
            .parse_object_as_commit(commit_oid)?
            .with_context(|| format!("{commit_oid} is not a commit"))?;
        Ok(commit.tree_oid().clone())
    }

    /// Flatten a tree into `path -> (mode, blob hash)` with an explicit
    /// worklist over subtrees.
    pub fn flatten_tree(
        &self,
        tree_oid: &ObjectId,
    ) -> anyhow::Result<BTreeMap<PathBuf, PathEntry>> {
        let mut map = BTreeMap::new();
        let mut worklist = vec![(PathBuf::new(), tree_oid.clone())];

        while let Some((prefix, oid)) = worklist.pop() {
            let tree = self
                .database
                .parse_object_as_tree(&oid)?
                .with_context(|| format!("{oid} is not a tree"))?;

            for record in tree.into_records() {
                let path = prefix.join(&record.name);
                if record.is_tree() {
                    worklist.push((path, record.oid));
                } else {
                    map.insert(path, PathEntry::new(record.mode.try_into()?, record.oid));
                }
            }
        }

        Ok(map)
    }

    /// Classify every path across the three maps, synthesizing conflict
    /// blobs where both sides changed.
    fn resolve_paths(
        &self,
        base_map: &BTreeMap<PathBuf, PathEntry>,
        our_map: &BTreeMap<PathBuf, PathEntry>,
        their_map: &BTreeMap<PathBuf, PathEntry>,
    ) -> anyhow::Result<(BTreeMap<PathBuf, PathEntry>, Vec<PathBuf>)> {
        let all_paths: BTreeSet<&PathBuf> = base_map
            .keys()
            .chain(our_map.keys())
            .chain(their_map.keys())
            .collect();

        let mut result = BTreeMap::new();
        let mut conflicts = Vec::new();

        for path in all_paths {
            let base = base_map.get(path);
            let ours = our_map.get(path);
            let theirs = their_map.get(path);

            let base_oid = base.map(|e| &e.oid);
            let our_oid = ours.map(|e| &e.oid);
            let their_oid = theirs.map(|e| &e.oid);

            if our_oid == their_oid {
                // same content on both sides, including both-deleted
                if let Some(entry) = ours {
                    result.insert(path.clone(), entry.clone());
                }
                continue;
            }
            if our_oid == base_oid {
                // only their side changed
                if let Some(entry) = theirs {
                    result.insert(path.clone(), entry.clone());
                }
                continue;
            }
            if their_oid == base_oid {
                // only our side changed
                if let Some(entry) = ours {
                    result.insert(path.clone(), entry.clone());
                }
                continue;
            }

            conflicts.push(path.clone());

            let our_content = self.read_blob_content(our_oid)?;
            let their_content = self.read_blob_content(their_oid)?;

            let merged = if is_binary(&our_content) || is_binary(&their_content) {
                binary_placeholder(our_oid, their_oid)
            } else {
                conflict_markers(&our_content, &their_content)
            };

            let mode = ours
                .or(theirs)
                .map(|e| e.mode)
                .unwrap_or(FileMode::Regular);
            let merged_oid = self.database.store(&Blob::new(merged, mode))?;

            result.insert(path.clone(), PathEntry::new(mode, merged_oid));
        }

        Ok((result, conflicts))
    }

    fn read_blob_content(&self, oid: Option<&ObjectId>) -> anyhow::Result<Bytes> {
        let Some(oid) = oid else {
            return Ok(Bytes::new());
        };
        match self.database.parse_object_as_blob(oid)? {
            Some(blob) => Ok(blob.into_content()),
            None => Ok(Bytes::new()),
        }
    }

    /// Write every merged path to the working tree and rebuild the on-disk
    /// index with fresh stat metadata.
    fn sync_workspace_and_index(
        &mut self,
        result: &BTreeMap<PathBuf, PathEntry>,
    ) -> anyhow::Result<()> {
        self.index.clear_entries();

        for (path, entry) in result {
            let content = self.read_blob_content(Some(&entry.oid))?;
            self.workspace
                .write_file(path, &content, entry.mode == FileMode::Executable)?;

            let metadata = self.workspace.stat_file(path)?;
            self.index
                .add(IndexEntry::new(path.clone(), entry.oid.clone(), metadata))?;
        }

        self.index.write_updates()
    }
}

/// Binary heuristic: a NUL byte anywhere, or more than [`BINARY_RATIO`] of
/// bytes outside tab/CR/LF and printable ASCII.
pub fn is_binary(data: &[u8]) -> bool {
    if data.is_empty() {
        return false;
    }

    let mut non_printable = 0usize;
    for &byte in data {
        if byte == 0 {
            return true;
        }
        if byte == b'\t' || byte == b'\n' || byte == b'\r' {
            continue;
        }
        if !(32..=126).contains(&byte) {
            non_printable += 1;
        }
    }

    non_printable as f64 / data.len() as f64 > BINARY_RATIO
}

/// Synthesize a text conflict blob, each side newline-terminated.
fn conflict_markers(ours: &[u8], theirs: &[u8]) -> Bytes {
    let ours = String::from_utf8_lossy(ours);
    let theirs = String::from_utf8_lossy(theirs);

    let mut out = String::new();
    out.push_str("<<<<<<< OURS\n");
    out.push_str(&ours);
    if !ours.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("=======\n");
    out.push_str(&theirs);
    if !theirs.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(">>>>>>> THEIRS\n");

    Bytes::from(out)
}

/// Synthesize a placeholder recording both blob hashes when either side is
/// binary.
fn binary_placeholder(ours: Option<&ObjectId>, theirs: Option<&ObjectId>) -> Bytes {
    let describe = |oid: Option<&ObjectId>| match oid {
        Some(oid) => format!("Blob: {oid}\n"),
        None => "<deleted>\n".to_string(),
    };

    let mut out = String::new();
    out.push_str("<<<<< OURS (binary)\n");
    out.push_str(&describe(ours));
    out.push_str("=====\n");
    out.push_str(&describe(theirs));
    out.push_str(">>>>> THEIRS (binary)\n");

    Bytes::from(out)
}

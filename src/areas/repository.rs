//! Repository facade.
//!
//! The narrow surface collaborators drive: staging, committing, merging,
//! branch management with the deletion guard, packing and GC, reachability
//! queries. Owns one instance of each area.

use crate::areas::config::Config;
use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::refs::Refs;
use crate::areas::workspace::Workspace;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::merge::merger::{MergeOutcome, Merger};
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::{Author, Commit};
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::Tree;
use crate::artifacts::pack::pack_writer::{PackArtifacts, PackWriter};
use crate::artifacts::reachability::ReachabilityWalker;
use crate::errors::EngineError;
use anyhow::Context;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// Name of the repository directory under the workspace root
pub const REPOSITORY_DIR: &str = ".grit";

pub struct Repository {
    path: Box<Path>,
    database: Database,
    index: RefCell<Index>,
    refs: Refs,
    workspace: Workspace,
    config: Config,
}

impl Repository {
    pub fn new(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            std::fs::create_dir_all(path)?;
        }
        let path = path.canonicalize()?;
        let repo_dir = path.join(REPOSITORY_DIR);

        Ok(Repository {
            database: Database::new(repo_dir.join("objects").into_boxed_path()),
            index: RefCell::new(Index::new(repo_dir.join("index").into_boxed_path())),
            refs: Refs::new(repo_dir.clone().into_boxed_path()),
            workspace: Workspace::new(path.clone().into_boxed_path()),
            config: Config::new(repo_dir.join("config").into_boxed_path()),
            path: path.into_boxed_path(),
        })
    }

    /// Create the repository layout: object store, refs, stash area, a HEAD
    /// attached to the default branch and an empty config. Idempotent.
    pub fn init(&self) -> anyhow::Result<()> {
        let repo_dir = self.path.join(REPOSITORY_DIR);

        std::fs::create_dir_all(self.database.objects_path())?;
        std::fs::create_dir_all(self.refs.heads_path())?;
        std::fs::create_dir_all(repo_dir.join("stash"))?;

        if !self.refs.head_path().exists() {
            self.refs.init_head()?;
        }

        let config_path = repo_dir.join("config");
        if !config_path.exists() {
            std::fs::write(&config_path, "")?;
        }

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Author identity from the repository config, stamped now.
    pub fn author(&self) -> anyhow::Result<Author> {
        self.config.author()
    }

    /// Stage one file: hash its content into a blob and record the entry.
    pub fn stage(&self, file_path: &Path) -> anyhow::Result<IndexEntry> {
        let mut index = self.index.borrow_mut();
        index.rehydrate()?;

        let content = self.workspace.read_file(file_path)?;
        let metadata = self.workspace.stat_file(file_path)?;

        let blob = Blob::new(content, metadata.mode);
        let oid = self.database.store(&blob)?;

        let entry = IndexEntry::new(file_path.to_path_buf(), oid, metadata);
        index.add(entry.clone())?;
        index.write_updates()?;

        Ok(entry)
    }

    /// Remove a staged entry (and any children when it is a directory).
    pub fn unstage(&self, file_path: &Path) -> anyhow::Result<()> {
        let mut index = self.index.borrow_mut();
        index.rehydrate()?;

        index.remove(file_path.to_path_buf())?;
        index.write_updates()
    }

    /// Paths currently staged, in index order.
    pub fn staged_paths(&self) -> anyhow::Result<Vec<PathBuf>> {
        let mut index = self.index.borrow_mut();
        index.rehydrate()?;

        Ok(index.entries().map(|entry| entry.name.clone()).collect())
    }

    /// Commit the staged tree. The parent is the resolved HEAD; a missing
    /// HEAD makes this the root commit.
    pub fn commit(&self, author: Author, message: &str) -> anyhow::Result<ObjectId> {
        let mut index = self.index.borrow_mut();
        index.rehydrate()?;

        let tree = Tree::build(index.entries())?;
        tree.traverse(&|subtree| self.database.store(subtree).map(|_| ()))?;
        let tree_oid = tree.object_id()?;

        let parents = self.refs.read_head()?.into_iter().collect();
        let commit = Commit::new(parents, tree_oid, author, message.to_string());
        let commit_oid = self.database.store(&commit)?;

        self.refs.update_head(commit_oid.clone())?;

        Ok(commit_oid)
    }

    /// Three-way merge of `theirs` into `ours`. Conflicts are a normal
    /// outcome, not an error; see [`MergeOutcome`].
    pub fn merge(
        &self,
        ours: &ObjectId,
        theirs: &ObjectId,
        author: Author,
        message: &str,
    ) -> anyhow::Result<MergeOutcome> {
        let mut index = self.index.borrow_mut();
        index.rehydrate()?;

        let mut merger = Merger::new(&self.database, &self.workspace, &mut index, &self.refs);
        merger.merge(ours, theirs, author, message)
    }

    /// Pack the given objects into `objects/pack`, returning the pack and
    /// index paths.
    pub fn pack(&self, oids: &BTreeSet<ObjectId>) -> anyhow::Result<PackArtifacts> {
        let writer = PackWriter::new(&self.database, self.database.pack_path());
        let artifacts = writer.pack_objects(oids)?;

        self.database.reload_packs();

        Ok(artifacts)
    }

    /// Garbage collection: pack everything reachable, then relocate the
    /// packed loose objects to the backup area. Nothing is moved until the
    /// pack and its index are confirmed written, so a failed pack leaves
    /// loose storage untouched.
    pub fn gc(&self) -> anyhow::Result<PackArtifacts> {
        let reachable = self.reachable_from_refs()?;
        let oids: BTreeSet<ObjectId> = reachable.into_iter().collect();

        let artifacts = self.pack(&oids)?;

        let sorted: Vec<ObjectId> = oids.into_iter().collect();
        self.database.relocate_to_backup(&sorted)?;

        Ok(artifacts)
    }

    /// Everything reachable from branch tips and a detached HEAD.
    pub fn reachable_from_refs(&self) -> anyhow::Result<HashSet<ObjectId>> {
        ReachabilityWalker::new(&self.database).reachable_from_refs(&self.refs)
    }

    /// Whether `candidate` is an ancestor of `tip`.
    pub fn is_ancestor(&self, tip: &ObjectId, candidate: &ObjectId) -> anyhow::Result<bool> {
        ReachabilityWalker::new(&self.database).is_ancestor(tip, candidate)
    }

    /// Create a branch at the current HEAD commit.
    pub fn create_branch(&self, name: &str) -> anyhow::Result<()> {
        let head = self.refs.read_head()?.ok_or(EngineError::NoCommitsYet)?;
        self.refs.create_branch(name, head)
    }

    /// Delete a branch. Refuses the current branch, and refuses a tip that
    /// is not an ancestor of HEAD ([`EngineError::BranchNotFullyMerged`]).
    pub fn delete_branch(&self, name: &str) -> anyhow::Result<ObjectId> {
        if self.refs.current_branch()?.as_deref() == Some(name) {
            anyhow::bail!("cannot delete the current branch: {name}");
        }

        let tip = self
            .refs
            .read_branch(name)?
            .with_context(|| format!("branch {name} does not exist"))?;
        let head = self.refs.read_head()?.ok_or(EngineError::NoCommitsYet)?;

        if !self.is_ancestor(&head, &tip)? {
            return Err(EngineError::BranchNotFullyMerged(name.to_string()).into());
        }

        self.refs.delete_branch(name)
    }

    pub fn list_branches(&self) -> anyhow::Result<Vec<String>> {
        self.refs.list_branches()
    }

    pub fn current_branch(&self) -> anyhow::Result<Option<String>> {
        self.refs.current_branch()
    }
}

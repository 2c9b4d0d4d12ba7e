//! References: branch pointer files and HEAD.
//!
//! A reference file contains either a 40-character commit hash (direct) or
//! `ref: <path>` (symbolic). HEAD is symbolic while a branch is checked out
//! and direct when detached. Updates take an exclusive file lock.

use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::EngineError;
use anyhow::Context;
use derive_new::new;
use file_guard::Lock;
use std::io::Write;
use std::ops::DerefMut;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Regex pattern for parsing symbolic references
const SYMREF_REGEX: &str = r"^ref: (.+)$";

/// Name of the HEAD reference
pub const HEAD_REF_NAME: &str = "HEAD";

/// Branch HEAD attaches to in a fresh repository
pub const DEFAULT_BRANCH: &str = "main";

/// A reference file's content: symbolic or direct.
#[derive(Debug, Clone)]
enum SymRefOrOid {
    SymRef(String),
    Oid(ObjectId),
}

impl SymRefOrOid {
    fn read(path: &Path) -> anyhow::Result<Option<SymRefOrOid>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        let content = content.trim();

        if content.is_empty() {
            return Ok(None);
        }

        let symref_match = regex::Regex::new(SYMREF_REGEX)?.captures(content);
        match symref_match {
            Some(symref_match) => Ok(Some(SymRefOrOid::SymRef(symref_match[1].to_string()))),
            None => Ok(Some(SymRefOrOid::Oid(ObjectId::try_parse(
                content.to_string(),
            )?))),
        }
    }
}

/// Reference manager rooted at the repository directory (e.g. `.grit`).
#[derive(Debug, new)]
pub struct Refs {
    path: Box<Path>,
}

impl Refs {
    pub fn head_path(&self) -> PathBuf {
        self.path.join(HEAD_REF_NAME)
    }

    pub fn refs_path(&self) -> PathBuf {
        self.path.join("refs")
    }

    pub fn heads_path(&self) -> PathBuf {
        self.refs_path().join("heads")
    }

    /// Attach HEAD to the default branch. Used at init time; no branch file
    /// is created until the first commit.
    pub fn init_head(&self) -> anyhow::Result<()> {
        self.update_ref_file(
            &self.head_path(),
            format!("ref: refs/heads/{DEFAULT_BRANCH}\n"),
        )
    }

    /// Resolve HEAD to a commit hash, following symbolic references.
    pub fn read_head(&self) -> anyhow::Result<Option<ObjectId>> {
        self.read_symref(&self.head_path())
    }

    /// Whether HEAD holds a raw commit hash instead of a branch pointer.
    pub fn is_detached(&self) -> anyhow::Result<bool> {
        match SymRefOrOid::read(&self.head_path())? {
            Some(SymRefOrOid::Oid(_)) => Ok(true),
            _ => Ok(false),
        }
    }

    /// Advance HEAD to a commit: through the current branch ref when
    /// attached, in place when detached. A missing HEAD is bootstrapped
    /// onto the default branch.
    pub fn update_head(&self, oid: ObjectId) -> anyhow::Result<()> {
        match SymRefOrOid::read(&self.head_path())? {
            None => {
                self.update_ref_file(
                    &self.heads_path().join(DEFAULT_BRANCH),
                    format!("{}\n", oid.as_ref()),
                )?;
                self.init_head()
            }
            Some(SymRefOrOid::SymRef(target)) => {
                self.update_ref_file(&self.path.join(target), format!("{}\n", oid.as_ref()))
            }
            Some(SymRefOrOid::Oid(_)) => {
                self.update_ref_file(&self.head_path(), format!("{}\n", oid.as_ref()))
            }
        }
    }

    /// Detach HEAD onto a raw commit hash.
    pub fn detach_head(&self, oid: &ObjectId) -> anyhow::Result<()> {
        self.update_ref_file(&self.head_path(), format!("{}\n", oid.as_ref()))
    }

    /// Attach HEAD to an existing branch.
    pub fn set_head_branch(&self, name: &str) -> anyhow::Result<()> {
        if !self.heads_path().join(name).exists() {
            anyhow::bail!("branch {name} does not exist");
        }
        self.update_ref_file(&self.head_path(), format!("ref: refs/heads/{name}\n"))
    }

    /// The branch HEAD is attached to, if any.
    pub fn current_branch(&self) -> anyhow::Result<Option<String>> {
        match SymRefOrOid::read(&self.head_path())? {
            Some(SymRefOrOid::SymRef(target)) => Ok(target
                .strip_prefix("refs/heads/")
                .map(|name| name.to_string())),
            _ => Ok(None),
        }
    }

    pub fn read_branch(&self, name: &str) -> anyhow::Result<Option<ObjectId>> {
        self.read_symref(&self.heads_path().join(name))
    }

    pub fn create_branch(&self, name: &str, source_oid: ObjectId) -> anyhow::Result<()> {
        let branch_path = self.heads_path().join(name);

        if branch_path.exists() {
            return Err(EngineError::BranchAlreadyExists(name.to_string()).into());
        }

        self.update_ref_file(&branch_path, format!("{}\n", source_oid.as_ref()))
    }

    pub fn delete_branch(&self, name: &str) -> anyhow::Result<ObjectId> {
        let branch_path = self.heads_path().join(name);

        match self.read_symref(&branch_path)? {
            Some(oid) => {
                std::fs::remove_file(&branch_path).with_context(|| {
                    format!("failed to delete branch file at {}", branch_path.display())
                })?;
                self.prune_branch_empty_parent_dirs(&branch_path)?;

                Ok(oid)
            }
            None => anyhow::bail!("branch {name} does not exist"),
        }
    }

    /// Branch names under `refs/heads`, sorted.
    pub fn list_branches(&self) -> anyhow::Result<Vec<String>> {
        let heads = self.heads_path();
        if !heads.exists() {
            return Ok(Vec::new());
        }

        let mut branches = WalkDir::new(&heads)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(&heads)
                    .ok()
                    .map(|relative| relative.to_string_lossy().to_string())
            })
            .collect::<Vec<_>>();
        branches.sort();

        Ok(branches)
    }

    fn read_symref(&self, path: &Path) -> anyhow::Result<Option<ObjectId>> {
        match SymRefOrOid::read(path)? {
            Some(SymRefOrOid::SymRef(target)) => self.read_symref(&self.path.join(target)),
            Some(SymRefOrOid::Oid(oid)) => Ok(Some(oid)),
            None => Ok(None),
        }
    }

    fn update_ref_file(&self, path: &Path, raw_ref: String) -> anyhow::Result<()> {
        std::fs::create_dir_all(path.parent().with_context(|| {
            format!(
                "failed to create parent directories for ref file at {}",
                path.display()
            )
        })?)?;

        let mut ref_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to open ref file at {}", path.display()))?;
        let mut lock = file_guard::lock(&mut ref_file, Lock::Exclusive, 0, 1)?;
        lock.deref_mut().write_all(raw_ref.as_bytes())?;

        Ok(())
    }

    fn prune_branch_empty_parent_dirs(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent()
            && parent != self.heads_path().as_path()
            && parent.read_dir()?.next().is_none()
        {
            std::fs::remove_dir(parent).with_context(|| {
                format!("failed to remove empty branch directory at {}", parent.display())
            })?;
            self.prune_branch_empty_parent_dirs(parent)?;
        }

        Ok(())
    }
}

#![allow(dead_code)]

use assert_fs::TempDir;
use chrono::{FixedOffset, TimeZone};
use grit::areas::repository::Repository;
use grit::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use grit::artifacts::objects::blob::Blob;
use grit::artifacts::objects::commit::{Author, Commit};
use grit::artifacts::objects::object::Object;
use grit::artifacts::objects::object_id::ObjectId;
use grit::artifacts::objects::tree::Tree;
use rstest::fixture;
use std::path::{Path, PathBuf};

/// A fresh initialized repository in a temp dir. The TempDir must stay
/// alive for the duration of the test.
#[fixture]
pub fn repository() -> (TempDir, Repository) {
    let dir = TempDir::new().unwrap();
    let repository = Repository::new(dir.path()).unwrap();
    repository.init().unwrap();

    (dir, repository)
}

/// Fixed-timestamp author so directly built commits are reproducible.
pub fn test_author() -> Author {
    let timestamp = FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2024, 6, 1, 10, 0, 0)
        .unwrap();
    Author::new_with_timestamp("Test User".into(), "test@example.com".into(), timestamp)
}

/// Write a working-tree file and stage it.
pub fn stage_file(repository: &Repository, path: &str, content: &[u8]) -> IndexEntry {
    repository
        .workspace()
        .write_file(Path::new(path), content, false)
        .unwrap();
    repository.stage(Path::new(path)).unwrap()
}

/// Write, stage and commit a set of files through the normal flow.
pub fn commit_files(repository: &Repository, files: &[(&str, &str)], message: &str) -> ObjectId {
    for &(path, content) in files {
        stage_file(repository, path, content.as_bytes());
    }
    repository.commit(test_author(), message).unwrap()
}

/// Build a commit directly in the object database, bypassing the index and
/// HEAD. Useful for constructing divergent histories without a checkout
/// operation.
pub fn build_commit(
    repository: &Repository,
    files: &[(&str, &str)],
    parents: Vec<ObjectId>,
    message: &str,
) -> ObjectId {
    let database = repository.database();

    let entries: Vec<IndexEntry> = files
        .iter()
        .map(|(path, content)| {
            let blob = Blob::new(content.as_bytes().to_vec().into(), Default::default());
            let oid = database.store(&blob).unwrap();
            IndexEntry::new(PathBuf::from(path), oid, EntryMetadata::default())
        })
        .collect();

    let tree = Tree::build(entries.iter()).unwrap();
    tree.traverse(&|subtree| database.store(subtree).map(|_| ()))
        .unwrap();

    let commit = Commit::new(
        parents,
        tree.object_id().unwrap(),
        test_author(),
        message.to_string(),
    );
    database.store(&commit).unwrap()
}

/// The tree hash a commit snapshots.
pub fn tree_oid_of(repository: &Repository, commit: &ObjectId) -> ObjectId {
    repository
        .database()
        .parse_object_as_commit(commit)
        .unwrap()
        .unwrap()
        .tree_oid()
        .clone()
}

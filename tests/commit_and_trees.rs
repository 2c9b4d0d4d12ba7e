mod common;

use assert_fs::TempDir;
use common::{commit_files, repository, stage_file, test_author, tree_oid_of};
use grit::areas::repository::Repository;
use grit::artifacts::objects::object::ObjectBox;
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
fn root_commit_has_no_parent_and_advances_head(repository: (TempDir, Repository)) {
    let (_dir, repository) = repository;

    let first = commit_files(&repository, &[("file.txt", "one\n")], "first");

    let commit = repository
        .database()
        .parse_object_as_commit(&first)
        .unwrap()
        .unwrap();
    assert!(commit.parents().is_empty());
    assert_eq!(repository.refs().read_head().unwrap(), Some(first.clone()));
    assert_eq!(
        repository.current_branch().unwrap(),
        Some("main".to_string())
    );
}

#[rstest]
fn second_commit_chains_to_the_first(repository: (TempDir, Repository)) {
    let (_dir, repository) = repository;

    let first = commit_files(&repository, &[("file.txt", "one\n")], "first");
    let second = commit_files(&repository, &[("file.txt", "two\n")], "second");

    let commit = repository
        .database()
        .parse_object_as_commit(&second)
        .unwrap()
        .unwrap();
    assert_eq!(commit.parents(), &[first]);
    assert_eq!(repository.refs().read_head().unwrap(), Some(second));
}

#[rstest]
fn tree_hash_is_independent_of_staging_order() {
    let files = [
        ("src/lib.rs", "pub mod a;\n"),
        ("src/a/mod.rs", "pub fn a() {}\n"),
        ("README.md", "# readme\n"),
        ("Makefile", "all:\n"),
    ];

    let dir_a = TempDir::new().unwrap();
    let repo_a = Repository::new(dir_a.path()).unwrap();
    repo_a.init().unwrap();
    for (path, content) in files {
        stage_file(&repo_a, path, content.as_bytes());
    }
    let commit_a = repo_a.commit(test_author(), "forward").unwrap();

    let dir_b = TempDir::new().unwrap();
    let repo_b = Repository::new(dir_b.path()).unwrap();
    repo_b.init().unwrap();
    for &(path, content) in files.iter().rev() {
        stage_file(&repo_b, path, content.as_bytes());
    }
    let commit_b = repo_b.commit(test_author(), "reversed").unwrap();

    assert_eq!(
        tree_oid_of(&repo_a, &commit_a),
        tree_oid_of(&repo_b, &commit_b)
    );
}

#[rstest]
fn nested_directories_become_nested_trees(repository: (TempDir, Repository)) {
    let (_dir, repository) = repository;

    let commit = commit_files(
        &repository,
        &[("a/b/c.txt", "deep\n"), ("a/top.txt", "top\n"), ("root.txt", "root\n")],
        "nested",
    );

    let root_tree = repository
        .database()
        .parse_object_as_tree(&tree_oid_of(&repository, &commit))
        .unwrap()
        .unwrap();

    let names: Vec<&str> = root_tree.records().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["a", "root.txt"]);
    assert!(root_tree.records()[0].is_tree());

    let ObjectBox::Tree(a_tree) = repository
        .database()
        .parse_object(&root_tree.records()[0].oid)
        .unwrap()
    else {
        panic!("expected a tree under 'a'");
    };
    let a_names: Vec<&str> = a_tree.records().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(a_names, vec!["b", "top.txt"]);
}

#[rstest]
fn committed_blob_contents_are_recoverable(repository: (TempDir, Repository)) {
    let (_dir, repository) = repository;

    let commit = commit_files(&repository, &[("data.bin", "payload\n")], "data");

    let tree = repository
        .database()
        .parse_object_as_tree(&tree_oid_of(&repository, &commit))
        .unwrap()
        .unwrap();
    let blob = repository
        .database()
        .parse_object_as_blob(&tree.records()[0].oid)
        .unwrap()
        .unwrap();

    assert_eq!(blob.content().as_ref(), b"payload\n");
}

mod common;

use assert_fs::TempDir;
use common::repository;
use grit::areas::repository::Repository;
use grit::artifacts::core::zlib_compress;
use grit::artifacts::index::entry_mode::FileMode;
use grit::artifacts::objects::blob::Blob;
use grit::artifacts::objects::object_id::ObjectId;
use grit::errors::EngineError;
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
fn blob_round_trips_through_loose_storage(repository: (TempDir, Repository)) {
    let (_dir, repository) = repository;
    let database = repository.database();

    let content: &[u8] = b"line one\nline two\n";
    let blob = Blob::new(content.to_vec().into(), FileMode::Regular);
    let oid = database.store(&blob).unwrap();

    let loaded = database.parse_object_as_blob(&oid).unwrap().unwrap();
    assert_eq!(loaded.content().as_ref(), content);
}

#[rstest]
fn nul_bytes_and_empty_payloads_survive(repository: (TempDir, Repository)) {
    let (_dir, repository) = repository;
    let database = repository.database();

    for content in [b"".as_slice(), b"\0".as_slice(), b"a\0b\0\0c".as_slice()] {
        let blob = Blob::new(content.to_vec().into(), FileMode::Regular);
        let oid = database.store(&blob).unwrap();

        let loaded = database.parse_object_as_blob(&oid).unwrap().unwrap();
        assert_eq!(loaded.content().as_ref(), content);
    }
}

#[rstest]
fn storing_the_same_blob_twice_is_idempotent(repository: (TempDir, Repository)) {
    let (_dir, repository) = repository;
    let database = repository.database();

    let blob = Blob::new(b"same bytes".to_vec().into(), FileMode::Regular);
    let first = database.store(&blob).unwrap();
    let second = database.store(&blob).unwrap();

    assert_eq!(first, second);

    // exactly one on-disk object in the fan-out directory
    let fan_out = database.objects_path().join(&first.as_ref()[..2]);
    let files: Vec<_> = std::fs::read_dir(&fan_out).unwrap().collect();
    assert_eq!(files.len(), 1);
}

#[rstest]
fn known_content_is_stored_under_its_known_hash(repository: (TempDir, Repository)) {
    let (_dir, repository) = repository;

    let blob = Blob::new(b"hello\n".to_vec().into(), FileMode::Regular);
    let oid = repository.database().store(&blob).unwrap();

    assert_eq!(oid.as_ref(), "ce013625030ba8dba906f756967f9e9ca394464a");
    assert!(repository.database().has_loose(&oid));
}

#[rstest]
fn missing_object_fails_with_object_not_found(repository: (TempDir, Repository)) {
    let (_dir, repository) = repository;

    let absent = ObjectId::digest(b"never stored");
    let err = repository.database().load(&absent).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::ObjectNotFound(oid)) if oid == &absent
    ));
}

#[rstest]
fn header_length_disagreement_fails_with_size_mismatch(repository: (TempDir, Repository)) {
    let (_dir, repository) = repository;
    let database = repository.database();

    // declared length 10, actual payload 3
    let corrupt: &[u8] = b"blob 10\0abc";
    let oid = ObjectId::digest(corrupt);

    let object_path = database.objects_path().join(oid.to_path());
    std::fs::create_dir_all(object_path.parent().unwrap()).unwrap();
    std::fs::write(&object_path, zlib_compress(corrupt).unwrap()).unwrap();

    let err = repository.database().parse_object(&oid).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::SizeMismatch {
            declared: 10,
            actual: 3
        })
    ));
}

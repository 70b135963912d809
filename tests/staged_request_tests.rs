//! Staging trees built from a request's transport payload.

use std::fs;

use serde_json::json;
use tempfile::TempDir;
use uploadable::staging::{require, resolve};
use uploadable::{
    ErrorKind, InMemoryRecordStore, RecordChange, RecordRef, StagedValue, UploadableConfig,
    UploadableManager,
};

#[test]
fn test_request_payload_drives_a_unit() {
    let temp = TempDir::new().unwrap();
    let staged = temp.path().join("phpA1b2");
    fs::write(&staged, "hello").unwrap();
    let root = temp.path().join("uploads");

    let payload = json!({
        "image": {
            "tmp_name": staged,
            "name": "../../etc/hello.txt",
            "size": 5,
            "type": "text/plain",
            "error": 0
        },
        "article": { "title": "not a file" }
    });
    let staging = StagedValue::from_json(&payload).unwrap();

    let mut manager = UploadableManager::new();
    manager
        .register("Image", UploadableConfig::new(&root))
        .unwrap();
    let mut store = InMemoryRecordStore::new();
    let image = RecordRef::new("Image", 1).staged_at(["image"]);
    store.insert(image.key.clone());

    let mut unit = manager.begin(staging);
    unit.on_validate(&mut store, &image, RecordChange::Created).unwrap();
    unit.on_transaction_committed(&mut store).unwrap();

    // Only the last path component of a client filename is used.
    let placed = store.get(&image.key, "filePath").as_path().unwrap();
    assert_eq!(placed, root.join("hello.txt"));
    assert_eq!(fs::read_to_string(placed).unwrap(), "hello");
}

#[test]
fn test_scalar_slot_is_malformed() {
    let staging = StagedValue::from_json(&json!({
        "article": { "title": "not a file" }
    }))
    .unwrap();

    let mut manager = UploadableManager::new();
    manager
        .register("Article", UploadableConfig::new("/srv/uploads"))
        .unwrap();
    let mut store = InMemoryRecordStore::new();
    let article = RecordRef::new("Article", 1).staged_at(["article", "title"]);
    store.insert(article.key.clone());

    let mut unit = manager.begin(staging);
    let err = unit
        .on_validate(&mut store, &article, RecordChange::Created)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDescriptor);
}

#[test]
fn test_lookup_by_key_path() {
    let staging = StagedValue::from_json(&json!({
        "test": { "test2": "value" },
        "files": [{ "tmp_name": "/tmp/a", "name": "a.txt" }]
    }))
    .unwrap();

    assert!(resolve(&staging, &["test", "test2"]).unwrap().is_some());
    assert!(resolve(&staging, &["files", "0"]).unwrap().unwrap().as_file().is_some());
    assert!(resolve(&staging, &["test", "missing"]).unwrap().is_none());

    let empty: [&str; 0] = [];
    assert_eq!(
        resolve(&staging, &empty).unwrap_err().kind(),
        ErrorKind::InvalidDescriptorPath
    );
    assert_eq!(
        require(&staging, &["nope"]).unwrap_err().kind(),
        ErrorKind::DescriptorNotFound
    );
}

#[test]
fn test_malformed_descriptor_reports_location() {
    let err = StagedValue::from_json(&json!({
        "image": { "tmp_name": "/tmp/a", "name": "a.txt", "size": "big" }
    }))
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedDescriptor);
    assert!(err.to_string().contains("$.image"));
}

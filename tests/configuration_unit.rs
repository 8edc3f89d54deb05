//! Configuration document and manager behavior: canonical hashing,
//! optimistic saves, wire-shape round trips, and storage provisioning.

mod common;

use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::tempdir;

use inkboard::errors::CoreError;
use inkboard::plugins::PluginRegistry;
use inkboard::sources::SourceRegistry;
use inkboard::storage::wire::{apply_with_rev, document_with_rev};
use inkboard::storage::{canonical_hash, ConfigurationObject, Document, FileStore};

fn doc_from(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

fn file_object(path: &std::path::Path) -> ConfigurationObject {
    ConfigurationObject::new(&path.to_string_lossy(), Arc::new(FileStore))
}

#[test]
fn hash_is_invariant_under_key_order() {
    let a = doc_from(serde_json::from_str(r#"{"b":1,"a":{"y":2,"x":3}}"#).unwrap());
    let b = doc_from(serde_json::from_str(r#"{"a":{"x":3,"y":2},"b":1}"#).unwrap());
    assert_eq!(canonical_hash(&a), canonical_hash(&b));

    let c = doc_from(json!({"a": {"x": 3, "y": 2}, "b": 2}));
    assert_ne!(canonical_hash(&a), canonical_hash(&c));
}

#[test]
fn hash_ignores_reserved_keys() {
    let plain = doc_from(json!({"value": 1}));
    let stamped = doc_from(json!({"value": 1, "_rev": "abc", "_id": "thing"}));
    assert_eq!(canonical_hash(&plain), canonical_hash(&stamped));
}

#[test]
fn save_round_trip_and_stale_rejection() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("system-settings.json");
    std::fs::write(&path, r#"{"timezoneName":"US/Eastern"}"#).unwrap();
    let object = file_object(&path);

    let (hash, content) = object.get().unwrap();
    let hash = hash.unwrap();
    let mut content = content.unwrap();
    assert_eq!(content["timezoneName"], json!("US/Eastern"));

    content.insert("timezoneName".into(), json!("UTC"));
    let (committed, new_hash) = object.save(&hash, content.clone()).unwrap();
    assert!(committed);
    let new_hash = new_hash.unwrap();
    assert_eq!(new_hash, canonical_hash(&content));

    // The next read reloads from storage and sees the new content/hash.
    let (hash2, content2) = object.get().unwrap();
    assert_eq!(hash2.unwrap(), new_hash);
    assert_eq!(content2.unwrap()["timezoneName"], json!("UTC"));

    // The old revision no longer saves.
    let (committed, rejected) = object.save(&hash, doc_from(json!({"x": 1}))).unwrap();
    assert!(!committed);
    assert!(rejected.is_none());
    let (_, unchanged) = object.get().unwrap();
    assert_eq!(unchanged.unwrap()["timezoneName"], json!("UTC"));
}

#[test]
fn save_on_missing_document_fails() {
    let dir = tempdir().unwrap();
    let object = file_object(&dir.path().join("absent.json"));
    let (hash, content) = object.get().unwrap();
    assert!(hash.is_none());
    assert!(content.is_none());
    let (committed, rev) = object.save("anything", doc_from(json!({"a": 1}))).unwrap();
    assert!(!committed);
    assert!(rev.is_none());
    assert!(!dir.path().join("absent.json").exists());
}

#[test]
fn wire_round_trip_settings_put() {
    // GET -> modify -> PUT with the same rev -> GET shows the new value.
    let dir = tempdir().unwrap();
    let path = dir.path().join("system-settings.json");
    std::fs::write(&path, r#"{"timezoneName":"US/Eastern","locale":"en-US"}"#).unwrap();
    let object = file_object(&path);

    let fetched = document_with_rev("system-settings", &object).unwrap();
    assert_eq!(fetched["_id"], json!("system-settings"));
    let rev_a = fetched["_rev"].as_str().unwrap().to_string();

    let mut update = fetched.clone();
    update.insert("timezoneName".into(), json!("UTC"));
    let receipt = apply_with_rev("system-settings", update, &object).unwrap();
    assert_eq!(receipt.id, "system-settings");
    assert_ne!(receipt.rev, rev_a);

    let fetched2 = document_with_rev("system-settings", &object).unwrap();
    assert_eq!(fetched2["timezoneName"], json!("UTC"));
    assert_eq!(fetched2["_rev"].as_str().unwrap(), receipt.rev);
}

#[test]
fn wire_revision_conflict_leaves_content_unchanged() {
    // Two clients read rev A; the second writer gets a conflict.
    let dir = tempdir().unwrap();
    let path = dir.path().join("system-settings.json");
    std::fs::write(&path, r#"{"timezoneName":"US/Eastern"}"#).unwrap();
    let object = file_object(&path);

    let client1 = document_with_rev("system-settings", &object).unwrap();
    let client2 = client1.clone();

    let mut update1 = client1;
    update1.insert("timezoneName".into(), json!("UTC"));
    apply_with_rev("system-settings", update1, &object).unwrap();

    let mut update2 = client2;
    update2.insert("timezoneName".into(), json!("Europe/Paris"));
    let err = apply_with_rev("system-settings", update2, &object).unwrap_err();
    assert!(matches!(err, CoreError::Concurrency { .. }));

    let current = document_with_rev("system-settings", &object).unwrap();
    assert_eq!(current["timezoneName"], json!("UTC"));
}

#[test]
fn wire_rejects_missing_rev_and_id_mismatch() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("doc.json");
    std::fs::write(&path, r#"{"v":1}"#).unwrap();
    let object = file_object(&path);
    let fetched = document_with_rev("doc", &object).unwrap();

    let mut no_rev = fetched.clone();
    no_rev.remove("_rev");
    assert!(matches!(
        apply_with_rev("doc", no_rev, &object),
        Err(CoreError::InvalidInput(_))
    ));

    let mut wrong_id = fetched;
    wrong_id.insert("_id".into(), json!("other"));
    assert!(matches!(
        apply_with_rev("doc", wrong_id, &object),
        Err(CoreError::InvalidInput(_))
    ));
}

#[test]
fn wire_missing_document_maps_to_not_found() {
    let dir = tempdir().unwrap();
    let object = file_object(&dir.path().join("absent.json"));
    assert!(matches!(
        document_with_rev("absent", &object),
        Err(CoreError::NotFound(_))
    ));
}

#[test]
fn hard_reset_provisions_settings_and_plugin_defaults() {
    let dir = tempdir().unwrap();
    let base = dir.path();
    common::write_schemas(base);
    common::write_schedule(base, "master_schedule.json", &common::master_doc("main"));
    common::write_schedule(base, "main.json", &common::playlist_doc("main", "main", &["One"]));

    let cm = common::make_cm(base, PluginRegistry::builtin(), SourceRegistry::new());

    // Schema defaults became settings families.
    let settings = cm.settings_manager();
    let (hash, content) = settings.open("system").unwrap().get().unwrap();
    assert!(hash.is_some());
    assert_eq!(content.unwrap()["timezoneName"], json!("US/Eastern"));

    // Template schedules were copied over.
    assert!(cm.schedules_dir().join("master_schedule.json").is_file());

    // Built-in plugins got their default settings provisioned.
    let slide_show = cm.plugin_manager("slide-show").unwrap().open();
    let (_, slide_settings) = slide_show.get().unwrap();
    assert_eq!(slide_settings.unwrap()["slideMinutes"], json!(15));
}

#[test]
fn manager_shares_one_object_per_moniker() {
    let dir = tempdir().unwrap();
    let base = dir.path();
    common::write_schemas(base);
    common::write_schedule(base, "master_schedule.json", &common::master_doc("main"));
    common::write_schedule(base, "main.json", &common::playlist_doc("main", "main", &["One"]));

    let cm = common::make_cm(base, PluginRegistry::builtin(), SourceRegistry::new());

    let settings = cm.settings_manager();
    let first = settings.open("system").unwrap();
    let second = settings.open("system").unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    // A save through one handle is observed through the other.
    let (hash, content) = first.get().unwrap();
    let mut content = content.unwrap();
    content.insert("locale".into(), json!("fr-FR"));
    first.save(&hash.unwrap(), content).unwrap();
    let (_, seen) = second.get().unwrap();
    assert_eq!(seen.unwrap()["locale"], json!("fr-FR"));
}

//! Integration tests for manifest persistence.

mod common;

use common::{Harness, manifest};
use jetpack::pod::{Isolator, Volume};
use jetpack::{Error, Pod};
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use uuid::Uuid;

// =============================================================================
// Save / Load
// =============================================================================

#[test]
fn test_save_then_load_round_trip() {
    let h = Harness::new();
    let mut original = manifest(&[("data", "data")]);
    original.volumes.push(Volume::empty("data"));
    original.volumes.push(Volume::host("logs", "/var/log/web"));
    original.annotations.set("hostname", "web01");

    let pod = h.create_pod(original.clone());
    assert!(pod.is_sealed());

    let loaded = h.host.get_pod(pod.uuid()).unwrap();
    assert!(loaded.is_sealed());
    assert_eq!(loaded.manifest(), &original);
}

#[test]
fn test_manifest_is_owner_read_only() {
    let h = Harness::new();
    let pod = h.create_pod(manifest(&[]));

    let meta = std::fs::metadata(pod.path(["manifest"])).unwrap();
    assert_eq!(meta.permissions().mode() & 0o777, 0o400);
}

#[test]
fn test_load_missing_pod() {
    let h = Harness::new();
    let id = Uuid::new_v4();

    let err = h.host.get_pod(id).unwrap_err();
    assert!(matches!(err, Error::PodNotFound(missing) if missing == id));
    assert!(err.is_not_found());
}

#[test]
fn test_load_sealed_pod_is_fatal() {
    let h = Harness::new();
    let mut pod = h.create_pod(manifest(&[]));

    let err = pod.load().unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_exists_checks_manifest_only() {
    let h = Harness::new();
    let pod = Pod::new(Arc::clone(&h.host), Uuid::new_v4());
    assert!(!pod.exists().unwrap());

    std::fs::create_dir_all(pod.dir()).unwrap();
    std::fs::write(pod.path(["manifest"]), b"not json").unwrap();
    assert!(pod.exists().unwrap());
}

// =============================================================================
// Validation
// =============================================================================

fn write_raw_manifest(h: &Harness, json: serde_json::Value) -> Uuid {
    let id = Uuid::new_v4();
    let dir = h.host.path(["pods", id.to_string().as_str()]);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("manifest"), serde_json::to_vec(&json).unwrap()).unwrap();
    id
}

#[test]
fn test_load_rejects_multi_app() {
    let h = Harness::new();
    let app = serde_json::json!({ "name": "a", "image": { "id": "sha512-1" } });
    let mut other = app.clone();
    other["name"] = "b".into();
    let id = write_raw_manifest(
        &h,
        serde_json::json!({ "acKind": "PodManifest", "apps": [app, other] }),
    );

    let err = h.host.get_pod(id).unwrap_err();
    assert!(matches!(err, Error::InvalidManifest(_)));
    assert!(err.is_validation());
}

#[test]
fn test_load_rejects_isolators() {
    let h = Harness::new();
    let id = write_raw_manifest(
        &h,
        serde_json::json!({
            "apps": [{ "name": "a", "image": { "id": "sha512-1" } }],
            "isolators": [{ "name": "resource/cpu", "value": { "limit": "1" } }],
        }),
    );

    let err = h.host.get_pod(id).unwrap_err();
    assert!(matches!(err, Error::InvalidManifest(_)));
}

#[test]
fn test_load_rejects_garbage() {
    let h = Harness::new();
    let id = Uuid::new_v4();
    let dir = h.host.path(["pods", id.to_string().as_str()]);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("manifest"), b"{ nope").unwrap();

    let err = h.host.get_pod(id).unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));
}

#[test]
fn test_create_pod_validates_first() {
    let h = Harness::new();
    let mut bad = manifest(&[]);
    bad.isolators.push(Isolator {
        name: "resource/memory".to_string(),
        value: serde_json::Value::Null,
    });

    assert!(h.host.create_pod(bad).is_err());
    assert!(h.host.pod_ids().unwrap().is_empty());
}

// =============================================================================
// Sealing
// =============================================================================

#[test]
fn test_manifest_mut_only_before_seal() {
    let h = Harness::new();
    let mut pod = Pod::create(Arc::clone(&h.host), Uuid::new_v4(), manifest(&[]));

    pod.manifest_mut()
        .unwrap()
        .annotations
        .set("hostname", "early");
    pod.save().unwrap();

    assert!(pod.manifest_mut().is_err());
    pod.set_annotation("hostname", "late");
    assert_eq!(pod.manifest().annotations.get("hostname"), Some("late"));
}

#[test]
fn test_pod_ids_lists_created_pods() {
    let h = Harness::new();
    let a = h.create_pod(manifest(&[]));
    let b = h.create_pod(manifest(&[]));

    let mut expected = vec![a.uuid(), b.uuid()];
    expected.sort();
    assert_eq!(h.host.pod_ids().unwrap(), expected);
}

//! Manifest files on disk: lookup, config resolution and starter output.

use std::fs;

use pretty_assertions::assert_eq;
use tempfile::tempdir;

use stasis::error::ManifestError;
use stasis::manifest::{Environment, write_starter};

#[test]
fn missing_manifest_suggests_init() {
    let dir = tempdir().unwrap();
    let err = Environment::load(&dir.path().join("stasis.yaml")).unwrap_err();

    assert!(matches!(err, ManifestError::NotFound { .. }));
    assert!(err.to_string().contains("Run 'stasis init'"));
}

#[test]
fn service_order_follows_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stasis.yaml");
    fs::write(
        &path,
        "name: shop\nservices:\n  web:\n    image: nginx:1\n  api:\n    image: node:22\n  db:\n    image: postgres:16\n",
    )
    .unwrap();

    let env = Environment::load(&path).unwrap();
    assert_eq!(env.service_names().collect::<Vec<_>>(), vec!["web", "api", "db"]);
    assert_eq!(env.network_name(), "stasis-shop");
}

#[test]
fn broken_yaml_names_the_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dev.yaml");
    fs::write(&path, "name: [unclosed\n").unwrap();

    let err = Environment::load(&path).unwrap_err();
    assert!(matches!(err, ManifestError::Parse { .. }));
    assert!(err.to_string().contains("dev.yaml"));
}

#[test]
fn starter_manifest_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stasis.yaml");

    write_starter(&path, "demo").unwrap();
    let env = Environment::load(&path).unwrap();

    assert_eq!(env.name, "demo");
    assert_eq!(env.version.as_deref(), Some("1"));
    let cache = env.service("cache").unwrap();
    assert_eq!(cache.image, "redis:7");
    assert_eq!(cache.ports, vec!["6379:6379"]);
    assert_eq!(cache.volumes, vec!["data:/data"]);
}

#[test]
fn starter_rejects_invalid_project_name() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stasis.yaml");

    assert!(matches!(
        write_starter(&path, "-bad name"),
        Err(ManifestError::Invalid { .. })
    ));
    assert!(!path.exists());
}

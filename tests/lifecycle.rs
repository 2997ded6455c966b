//! End-to-end lifecycle tests against the in-memory runtime.
//!
//! Each test loads a manifest, drives an `Orchestrator` against a
//! `FakeRuntime` and checks the resulting daemon state. Volume directories
//! land in a tempdir.

use std::path::Path;

use pretty_assertions::assert_eq;
use tempfile::{TempDir, tempdir};

use stasis::StasisError;
use stasis::binding::{ContainerPort, HostBinding, PortBindings, Protocol, VolumeRoot};
use stasis::manifest::Environment;
use stasis::naming::{LABEL_MANAGED, LABEL_PROJECT, LABEL_SERVICE};
use stasis::reconcile::{Orchestrator, container_spec};
use stasis::testing::{FakeRuntime, PullFailure};

const DEMO: &str = r#"
name: demo
services:
  cache:
    image: redis:7
    ports:
      - "6379:6379"
    volumes:
      - "data:/data"
  db:
    image: postgres:16
    environment:
      - POSTGRES_PASSWORD=secret
"#;

fn manifest(yaml: &str) -> Environment {
    Environment::parse(yaml, Path::new("stasis.yaml")).unwrap()
}

fn setup() -> (FakeRuntime, TempDir) {
    (FakeRuntime::new(), tempdir().unwrap())
}

// ── Bring-up ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn up_creates_network_and_labelled_containers() {
    let (runtime, home) = setup();
    let env = manifest(DEMO);
    let orchestrator = Orchestrator::new(&runtime, VolumeRoot::new(home.path()));

    let report = orchestrator.up(&env).await.unwrap();

    assert!(report.network_created);
    assert_eq!(
        report
            .services
            .iter()
            .map(|s| s.container.as_str())
            .collect::<Vec<_>>(),
        vec!["stasis-demo-cache", "stasis-demo-db"]
    );
    assert_eq!(runtime.network_names(), vec!["stasis-demo"]);

    let cache = runtime.container("stasis-demo-cache").unwrap();
    assert!(cache.running);
    assert_eq!(cache.spec.network, "stasis-demo");
    assert_eq!(cache.spec.labels[LABEL_PROJECT], "demo");
    assert_eq!(cache.spec.labels[LABEL_SERVICE], "cache");
    assert_eq!(cache.spec.labels[LABEL_MANAGED], "true");

    let redis = ContainerPort {
        port: 6379,
        protocol: Protocol::Tcp,
    };
    assert!(cache.spec.ports.exposed.contains(&redis));
    assert_eq!(
        cache.spec.ports.bindings[&redis],
        vec![HostBinding {
            host_ip: "0.0.0.0".to_string(),
            host_port: Some(6379),
        }]
    );

    let data = home.path().join("volumes/demo/cache/data");
    assert!(data.is_dir());
    assert_eq!(cache.spec.binds, vec![format!("{}:/data", data.display())]);

    let db = runtime.container("stasis-demo-db").unwrap();
    assert_eq!(db.spec.env, vec!["POSTGRES_PASSWORD=secret"]);
    assert!(db.spec.ports.is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn volume_directories_are_private() {
    use std::os::unix::fs::PermissionsExt;

    let (runtime, home) = setup();
    let env = manifest(DEMO);
    Orchestrator::new(&runtime, VolumeRoot::new(home.path()))
        .up(&env)
        .await
        .unwrap();

    let mode = std::fs::metadata(home.path().join("volumes/demo/cache/data"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o700);
}

#[tokio::test]
async fn up_twice_replaces_containers() {
    let (runtime, home) = setup();
    let env = manifest(DEMO);
    let orchestrator = Orchestrator::new(&runtime, VolumeRoot::new(home.path()));

    let first = orchestrator.up(&env).await.unwrap();
    let second = orchestrator.up(&env).await.unwrap();

    assert!(!second.network_created);
    assert_eq!(runtime.network_creates(), 1);
    assert_eq!(
        runtime.container_names(),
        vec!["stasis-demo-cache", "stasis-demo-db"]
    );
    assert_eq!(runtime.container_creates(), 4);
    assert_ne!(first.services[0].id, second.services[0].id);
    // Images are pulled on every bring-up.
    assert_eq!(runtime.pulls_started(), 4);
}

#[tokio::test]
async fn up_aborts_at_first_failing_service() {
    let (runtime, home) = setup();
    runtime.fail_pull("redis:7", PullFailure::Rejected);
    let env = manifest(DEMO);
    let orchestrator = Orchestrator::new(&runtime, VolumeRoot::new(home.path()));

    let err = orchestrator.up(&env).await.unwrap_err();

    match &err {
        StasisError::Service { service, source } => {
            assert_eq!(service, "cache");
            assert!(matches!(**source, StasisError::ImagePull { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    // The later service is never attempted.
    assert!(runtime.container_names().is_empty());
    assert_eq!(runtime.pulls_started(), 1);
    // The network stays for the next attempt.
    assert_eq!(runtime.network_names(), vec!["stasis-demo"]);
}

#[tokio::test]
async fn network_create_failure_stops_before_any_pull() {
    let (runtime, home) = setup();
    runtime.fail_create_network();
    let env = manifest(DEMO);

    let err = Orchestrator::new(&runtime, VolumeRoot::new(home.path()))
        .up(&env)
        .await
        .unwrap_err();

    assert!(matches!(err, StasisError::NetworkCreate { ref name, .. } if name == "stasis-demo"));
    assert_eq!(runtime.pulls_started(), 0);
    assert!(runtime.container_names().is_empty());
}

#[tokio::test]
async fn port_ranges_bind_each_port() {
    let (runtime, home) = setup();
    let env = manifest(
        r#"
name: demo
services:
  web:
    image: nginx:1
    ports: ["8000-8001:80-81"]
"#,
    );

    Orchestrator::new(&runtime, VolumeRoot::new(home.path()))
        .up(&env)
        .await
        .unwrap();

    let web = runtime.container("stasis-demo-web").unwrap();
    let host_ports: Vec<Option<u16>> = web
        .spec
        .ports
        .mappings()
        .iter()
        .map(|m| m.host_port)
        .collect();
    assert_eq!(host_ports, vec![Some(8000), Some(8001)]);
}

#[tokio::test]
async fn invalid_port_is_reported_with_service() {
    let (runtime, home) = setup();
    let env = manifest(
        r#"
name: demo
services:
  web:
    image: nginx:1
    ports: ["eighty:80"]
"#,
    );

    let err = Orchestrator::new(&runtime, VolumeRoot::new(home.path()))
        .up(&env)
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("Service 'web': Invalid port mapping"));
    assert!(runtime.container_names().is_empty());
}

#[tokio::test]
async fn malformed_volume_is_skipped() {
    let (runtime, home) = setup();
    let env = manifest(
        r#"
name: demo
services:
  web:
    image: nginx:1
    volumes: ["just-a-name", "html:/usr/share/nginx/html"]
"#,
    );

    Orchestrator::new(&runtime, VolumeRoot::new(home.path()))
        .up(&env)
        .await
        .unwrap();

    let web = runtime.container("stasis-demo-web").unwrap();
    assert_eq!(web.spec.binds.len(), 1);
    assert!(web.spec.binds[0].ends_with("/html:/usr/share/nginx/html"));
}

// ── Teardown ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn down_removes_everything_but_volumes() {
    let (runtime, home) = setup();
    let env = manifest(DEMO);
    let orchestrator = Orchestrator::new(&runtime, VolumeRoot::new(home.path()));
    orchestrator.up(&env).await.unwrap();

    let report = orchestrator.down(&env, false).await;

    assert!(report.is_clean());
    assert!(report.network_removed);
    assert_eq!(report.removed, vec!["stasis-demo-cache", "stasis-demo-db"]);
    assert!(runtime.container_names().is_empty());
    assert!(runtime.network_names().is_empty());
    assert!(home.path().join("volumes/demo/cache/data").is_dir());
}

#[tokio::test]
async fn down_on_empty_runtime_is_clean() {
    let (runtime, home) = setup();
    let env = manifest(DEMO);

    let report = Orchestrator::new(&runtime, VolumeRoot::new(home.path()))
        .down(&env, false)
        .await;

    assert!(report.is_clean());
    assert!(!report.network_removed);
    assert_eq!(report.missing, vec!["stasis-demo-cache", "stasis-demo-db"]);
}

#[tokio::test]
async fn down_continues_past_failures() {
    let (runtime, home) = setup();
    let env = manifest(DEMO);
    let orchestrator = Orchestrator::new(&runtime, VolumeRoot::new(home.path()));
    orchestrator.up(&env).await.unwrap();
    runtime.fail_remove("stasis-demo-cache");

    let report = orchestrator.down(&env, false).await;

    assert!(!report.is_clean());
    // db is still removed after cache failed.
    assert_eq!(report.removed, vec!["stasis-demo-db"]);
    let targets: Vec<&str> = report.failures.iter().map(|f| f.target.as_str()).collect();
    // The network is still in use by the surviving container.
    assert_eq!(targets, vec!["stasis-demo-cache", "stasis-demo"]);
    assert_eq!(runtime.container_names(), vec!["stasis-demo-cache"]);
}

// ── Status and orphans ──────────────────────────────────────────────────────

fn leftover(project: &str, service: &str) -> stasis::runtime::ContainerSpec {
    let spec = manifest(DEMO).service("db").cloned().unwrap();
    container_spec(project, service, &spec, PortBindings::default(), Vec::new())
}

#[tokio::test]
async fn status_lists_only_this_project() {
    let (runtime, home) = setup();
    let env = manifest(DEMO);
    let orchestrator = Orchestrator::new(&runtime, VolumeRoot::new(home.path()));
    orchestrator.up(&env).await.unwrap();
    runtime.insert_container(leftover("demo", "worker"), false);
    runtime.insert_container(leftover("other", "db"), true);

    let containers = orchestrator.status("demo").await.unwrap();

    let names: Vec<&str> = containers.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["stasis-demo-cache", "stasis-demo-db", "stasis-demo-worker"]
    );
    let cache = &containers[0];
    assert_eq!(cache.state, "running");
    assert_eq!(cache.ports[0].host_port, Some(6379));
    assert_eq!(containers[2].state, "exited");
}

#[tokio::test]
async fn remove_orphans_is_opt_in() {
    let (runtime, home) = setup();
    let env = manifest(DEMO);
    let orchestrator = Orchestrator::new(&runtime, VolumeRoot::new(home.path()));
    orchestrator.up(&env).await.unwrap();
    runtime.insert_container(leftover("demo", "worker"), true);
    runtime.insert_container(leftover("other", "db"), true);

    let report = orchestrator.down(&env, false).await;
    assert_eq!(
        runtime.container_names(),
        vec!["stasis-demo-worker", "stasis-other-db"]
    );
    // The orphan keeps the network alive.
    assert!(!report.is_clean());

    let report = orchestrator.down(&env, true).await;
    assert!(report.is_clean());
    assert_eq!(report.removed, vec!["stasis-demo-worker"]);
    assert!(report.network_removed);
    assert_eq!(runtime.container_names(), vec!["stasis-other-db"]);
}

#[tokio::test]
async fn status_reports_listing_failure() {
    let (runtime, home) = setup();
    runtime.fail_list_containers();

    let err = Orchestrator::new(&runtime, VolumeRoot::new(home.path()))
        .status("demo")
        .await
        .unwrap_err();

    assert!(matches!(err, StasisError::ContainerList { ref project, .. } if project == "demo"));
}

#[tokio::test]
async fn orphan_listing_failure_does_not_stop_teardown() {
    let (runtime, home) = setup();
    let env = manifest(DEMO);
    let orchestrator = Orchestrator::new(&runtime, VolumeRoot::new(home.path()));
    orchestrator.up(&env).await.unwrap();
    runtime.fail_list_containers();

    let report = orchestrator.down(&env, true).await;

    assert_eq!(report.removed, vec!["stasis-demo-cache", "stasis-demo-db"]);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        report.failures[0].error,
        StasisError::ContainerList { .. }
    ));
    assert!(report.network_removed);
    assert!(runtime.network_names().is_empty());
}

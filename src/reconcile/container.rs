//! Container reconciliation.
//!
//! A service container is never patched in place. Each bring-up walks
//!
//! ```text
//! Absent ──▶ Removed ──▶ Created ──▶ Started
//! ```
//!
//! force-removing whatever holds the derived name, then creating a fresh
//! container from the current declaration, so the running container always
//! matches the manifest.

use std::fmt;

use crate::binding::PortBindings;
use crate::error::{Result, StasisError};
use crate::manifest::ServiceSpec;
use crate::naming;
use crate::runtime::{ContainerRuntime, ContainerSpec, RemoveOptions};

/// Lifecycle position of a service container during bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Absent,
    Removed,
    Created,
    Started,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContainerState::Absent => "absent",
            ContainerState::Removed => "removed",
            ContainerState::Created => "created",
            ContainerState::Started => "started",
        })
    }
}

/// Builds the full creation request for one service.
pub fn container_spec(
    project: &str,
    service: &str,
    spec: &ServiceSpec,
    ports: PortBindings,
    binds: Vec<String>,
) -> ContainerSpec {
    ContainerSpec {
        name: naming::container_name(project, service),
        image: spec.image.clone(),
        labels: naming::labels(project, service),
        env: spec.environment.clone(),
        ports,
        binds,
        network: naming::network_name(project),
    }
}

/// Replaces any container holding `spec.name` with a new one and starts it.
///
/// Returns the id of the started container.
pub async fn recreate_container(
    runtime: &dyn ContainerRuntime,
    spec: &ContainerSpec,
) -> Result<String> {
    let name = spec.name.as_str();

    let state = remove_existing(runtime, name).await;
    tracing::debug!("{}: {}", name, state);

    tracing::info!("Creating container {}...", name);
    let id = runtime
        .create_container(spec)
        .await
        .map_err(|source| StasisError::ContainerCreate {
            name: name.to_string(),
            source,
        })?;
    tracing::debug!("{}: {} ({})", name, ContainerState::Created, id);

    tracing::info!("Starting container {}...", name);
    runtime
        .start_container(&id)
        .await
        .map_err(|source| StasisError::ContainerStart {
            name: name.to_string(),
            source,
        })?;
    tracing::debug!("{}: {}", name, ContainerState::Started);

    Ok(id)
}

/// Force-removes a same-named container. Never fails: absence is expected and
/// other errors are only logged, letting the create step report the conflict.
async fn remove_existing(runtime: &dyn ContainerRuntime, name: &str) -> ContainerState {
    let options = RemoveOptions {
        force: true,
        remove_volumes: false,
    };

    match runtime.remove_container(name, options).await {
        Ok(()) => {
            tracing::info!("Removed previous container {}", name);
            ContainerState::Removed
        }
        Err(e) if e.is_not_found() => ContainerState::Absent,
        Err(e) => {
            tracing::warn!("Could not remove previous container {}: {}", name, e);
            ContainerState::Absent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::translate_port;
    use crate::reconcile::{ensure_image, ensure_network};
    use crate::runtime::NetworkSpec;
    use crate::testing::FakeRuntime;

    fn cache_spec() -> ServiceSpec {
        ServiceSpec {
            image: "redis:7".to_string(),
            ports: vec!["6379:6379".to_string()],
            environment: vec!["REDIS_ARGS=--save 60 1".to_string()],
            volumes: Vec::new(),
        }
    }

    fn bare_container() -> ContainerSpec {
        container_spec("demo", "cache", &cache_spec(), PortBindings::default(), Vec::new())
    }

    async fn prepared_runtime() -> FakeRuntime {
        let runtime = FakeRuntime::new();
        ensure_network(&runtime, &NetworkSpec::for_project("demo"))
            .await
            .unwrap();
        ensure_image(&runtime, "redis:7").await.unwrap();
        runtime
    }

    #[test]
    fn test_container_spec_fields() {
        let service = cache_spec();
        let ports = translate_port("6379:6379").unwrap();
        let spec = container_spec("demo", "cache", &service, ports.clone(), Vec::new());

        assert_eq!(spec.name, "stasis-demo-cache");
        assert_eq!(spec.network, "stasis-demo");
        assert_eq!(spec.image, "redis:7");
        assert_eq!(spec.env, service.environment);
        assert_eq!(spec.labels, naming::labels("demo", "cache"));
        assert_eq!(spec.ports, ports);
    }

    #[tokio::test]
    async fn test_recreate_from_absent() {
        let runtime = prepared_runtime().await;
        let spec = bare_container();

        let id = recreate_container(&runtime, &spec).await.unwrap();

        let container = runtime.container("stasis-demo-cache").unwrap();
        assert_eq!(container.id, id);
        assert!(container.running);
    }

    #[tokio::test]
    async fn test_recreate_replaces_existing() {
        let runtime = prepared_runtime().await;
        let spec = bare_container();

        let first = recreate_container(&runtime, &spec).await.unwrap();
        let second = recreate_container(&runtime, &spec).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(runtime.container_names(), vec!["stasis-demo-cache"]);
        assert_eq!(runtime.container_creates(), 2);
    }

    #[tokio::test]
    async fn test_create_failure() {
        let runtime = prepared_runtime().await;
        runtime.fail_create("stasis-demo-cache");
        let spec = bare_container();

        let err = recreate_container(&runtime, &spec).await.unwrap_err();
        assert!(matches!(err, StasisError::ContainerCreate { .. }));
    }

    #[tokio::test]
    async fn test_start_failure_leaves_created_container() {
        let runtime = prepared_runtime().await;
        runtime.fail_start("stasis-demo-cache");
        let spec = bare_container();

        let err = recreate_container(&runtime, &spec).await.unwrap_err();
        assert!(matches!(err, StasisError::ContainerStart { .. }));
        assert!(!runtime.container("stasis-demo-cache").unwrap().running);
    }

    #[tokio::test]
    async fn test_stale_remove_error_is_not_fatal() {
        let runtime = prepared_runtime().await;
        runtime.fail_remove("stasis-demo-cache");
        let spec = bare_container();

        // Nothing to remove yet, so create proceeds.
        recreate_container(&runtime, &spec).await.unwrap();
    }
}

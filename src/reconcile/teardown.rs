//! Discovery and removal of managed containers.
//!
//! Discovery is by label only, so containers left behind by an older manifest
//! still show up.

use crate::error::{Result, StasisError};
use crate::naming;
use crate::runtime::{ContainerRuntime, ContainerSummary, RemoveOptions};

/// All containers labelled with `project`, running or stopped.
pub async fn list_containers(
    runtime: &dyn ContainerRuntime,
    project: &str,
) -> Result<Vec<ContainerSummary>> {
    let mut containers = runtime
        .list_containers(&naming::project_filter(project))
        .await
        .map_err(|source| StasisError::ContainerList {
            project: project.to_string(),
            source,
        })?;
    containers.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(containers)
}

/// Stops and removes a service's container.
pub async fn stop_and_remove(
    runtime: &dyn ContainerRuntime,
    project: &str,
    service: &str,
    timeout_secs: u32,
) -> Result<bool> {
    stop_and_remove_named(runtime, &naming::container_name(project, service), timeout_secs).await
}

/// Stops then force-removes a container by name, keeping its volumes.
///
/// Stop failures (already stopped, missing) are logged and removal proceeds.
/// Returns `false` if there was no container to remove.
pub async fn stop_and_remove_named(
    runtime: &dyn ContainerRuntime,
    name: &str,
    timeout_secs: u32,
) -> Result<bool> {
    tracing::info!("Stopping {}...", name);
    if let Err(e) = runtime.stop_container(name, timeout_secs).await {
        if e.is_not_modified() {
            tracing::warn!("{} was not running", name);
        } else {
            tracing::warn!("Failed to stop {} (might not be running): {}", name, e);
        }
    }

    tracing::info!("Removing {}...", name);
    let options = RemoveOptions {
        force: true,
        remove_volumes: false,
    };
    match runtime.remove_container(name, options).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => {
            tracing::warn!("{} does not exist", name);
            Ok(false)
        }
        Err(source) => Err(StasisError::ContainerRemove {
            name: name.to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::PortBindings;
    use crate::runtime::ContainerSpec;
    use crate::testing::FakeRuntime;

    fn seeded(runtime: &FakeRuntime, project: &str, service: &str, running: bool) {
        runtime.insert_container(
            ContainerSpec {
                name: naming::container_name(project, service),
                image: "busybox".to_string(),
                labels: naming::labels(project, service),
                env: Vec::new(),
                ports: PortBindings::default(),
                binds: Vec::new(),
                network: naming::network_name(project),
            },
            running,
        );
    }

    #[tokio::test]
    async fn test_missing_container_is_success() {
        let runtime = FakeRuntime::new();
        let removed = stop_and_remove(&runtime, "demo", "ghost", 1).await.unwrap();
        assert!(!removed);
    }

    #[tokio::test]
    async fn test_stopped_container_removed() {
        let runtime = FakeRuntime::new();
        seeded(&runtime, "demo", "cache", false);

        assert!(stop_and_remove(&runtime, "demo", "cache", 1).await.unwrap());
        assert!(runtime.container_names().is_empty());
    }

    #[tokio::test]
    async fn test_remove_failure_surfaces() {
        let runtime = FakeRuntime::new();
        seeded(&runtime, "demo", "cache", true);
        runtime.fail_remove("stasis-demo-cache");

        let err = stop_and_remove(&runtime, "demo", "cache", 1).await.unwrap_err();
        assert!(matches!(err, StasisError::ContainerRemove { .. }));
    }

    #[tokio::test]
    async fn test_list_filters_by_project() {
        let runtime = FakeRuntime::new();
        seeded(&runtime, "demo", "web", true);
        seeded(&runtime, "demo", "cache", false);
        seeded(&runtime, "other", "cache", true);

        let names: Vec<String> = list_containers(&runtime, "demo")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["stasis-demo-cache", "stasis-demo-web"]);
    }
}

//! Reconciliation of a declared environment against the container runtime.
//!
//! ```text
//! up:     ensure_network ─▶ for each service (manifest order):
//!                             ensure_image ─▶ translate ports/volumes ─▶ recreate_container
//! down:   for each service: stop_and_remove ─▶ [orphans] ─▶ remove_network
//! status: list_containers (label filter)
//! ```
//!
//! Everything runs sequentially. Bring-up aborts on the first failing
//! service; teardown keeps going and reports every failure at the end.

mod container;
mod image;
mod network;
mod teardown;

pub use container::{ContainerState, container_spec, recreate_container};
pub use image::{PullSummary, ensure_image};
pub use network::{ensure_network, remove_network};
pub use teardown::{list_containers, stop_and_remove, stop_and_remove_named};

use crate::binding::{VolumeRoot, translate_ports};
use crate::config::DEFAULT_STOP_TIMEOUT_SECS;
use crate::error::{Result, StasisError};
use crate::manifest::{Environment, ServiceSpec};
use crate::naming;
use crate::runtime::{ContainerRuntime, ContainerSummary, NetworkSpec};

/// A service brought up by [`Orchestrator::up`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedService {
    pub service: String,
    pub container: String,
    pub id: String,
}

/// Outcome of a successful bring-up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpReport {
    /// Whether the network had to be created.
    pub network_created: bool,
    pub services: Vec<StartedService>,
}

/// One thing teardown could not remove.
#[derive(Debug)]
pub struct TeardownFailure {
    /// Container or network name.
    pub target: String,
    pub error: StasisError,
}

/// Outcome of a teardown. Teardown never stops early, so this may hold
/// several failures.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Containers that were removed.
    pub removed: Vec<String>,
    /// Declared containers that did not exist.
    pub missing: Vec<String>,
    pub network_removed: bool,
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, target: String, result: Result<bool>) {
        match result {
            Ok(true) => self.removed.push(target),
            Ok(false) => self.missing.push(target),
            Err(error) => {
                tracing::error!("Error cleaning up {}: {}", target, error);
                self.failures.push(TeardownFailure { target, error });
            }
        }
    }
}

/// Drives the reconcilers for one command invocation.
pub struct Orchestrator<'a> {
    runtime: &'a dyn ContainerRuntime,
    volumes: VolumeRoot,
    stop_timeout_secs: u32,
}

impl<'a> Orchestrator<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, volumes: VolumeRoot) -> Self {
        Self {
            runtime,
            volumes,
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
        }
    }

    /// Grace period given to containers on `down`.
    pub fn with_stop_timeout(mut self, secs: u32) -> Self {
        self.stop_timeout_secs = secs;
        self
    }

    /// Brings the environment up: network first, then every service in
    /// manifest order. Stops at the first service that fails.
    pub async fn up(&self, env: &Environment) -> Result<UpReport> {
        let network = NetworkSpec::for_project(&env.name);
        let network_created = ensure_network(self.runtime, &network).await?;

        let mut report = UpReport {
            network_created,
            services: Vec::with_capacity(env.services.len()),
        };

        for (service, spec) in &env.services {
            let id = self
                .up_service(&env.name, service, spec)
                .await
                .map_err(|e| e.for_service(service))?;
            report.services.push(StartedService {
                service: service.clone(),
                container: naming::container_name(&env.name, service),
                id,
            });
        }

        Ok(report)
    }

    /// Pulls, translates and (re)creates a single service container.
    pub async fn up_service(
        &self,
        project: &str,
        service: &str,
        spec: &ServiceSpec,
    ) -> Result<String> {
        tracing::info!("--- Setting up {} ---", service);

        ensure_image(self.runtime, &spec.image).await?;

        let ports = translate_ports(&spec.ports)?;
        let binds = self.volumes.translate(project, service, &spec.volumes)?;

        let container = container_spec(project, service, spec, ports, binds);
        recreate_container(self.runtime, &container).await
    }

    /// Tears the environment down, best-effort.
    ///
    /// With `remove_orphans`, managed containers of this project whose service
    /// is no longer declared are removed too. Volumes are always kept.
    pub async fn down(&self, env: &Environment, remove_orphans: bool) -> TeardownReport {
        let mut report = TeardownReport::default();

        for service in env.service_names() {
            let name = naming::container_name(&env.name, service);
            let result =
                stop_and_remove(self.runtime, &env.name, service, self.stop_timeout_secs).await;
            report.record(name, result);
        }

        if remove_orphans {
            self.remove_orphans(env, &mut report).await;
        }

        let network = env.network_name();
        match remove_network(self.runtime, &network).await {
            Ok(removed) => report.network_removed = removed,
            Err(error) => {
                tracing::error!("Error removing network: {}", error);
                report.failures.push(TeardownFailure {
                    target: network,
                    error,
                });
            }
        }

        report
    }

    async fn remove_orphans(&self, env: &Environment, report: &mut TeardownReport) {
        let containers = match list_containers(self.runtime, &env.name).await {
            Ok(containers) => containers,
            Err(error) => {
                report.failures.push(TeardownFailure {
                    target: format!("orphans of {}", env.name),
                    error,
                });
                return;
            }
        };

        for orphan in containers
            .iter()
            .filter(|c| c.service().is_none_or(|s| env.service(s).is_none()))
        {
            tracing::info!("Removing orphaned container {}", orphan.name);
            let result =
                stop_and_remove_named(self.runtime, &orphan.name, self.stop_timeout_secs).await;
            report.record(orphan.name.clone(), result);
        }
    }

    /// Every container owned by the project, declared or not.
    pub async fn status(&self, project: &str) -> Result<Vec<ContainerSummary>> {
        list_containers(self.runtime, project).await
    }
}

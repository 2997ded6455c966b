//! [`ContainerRuntime`] backed by the Docker Engine API via bollard.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, NetworkingConfig,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{EndpointSettings, HostConfig, PortBinding};
use bollard::network::{CreateNetworkOptions, ListNetworksOptions};
use futures::StreamExt;

use crate::error::{RuntimeError, StasisError};
use crate::runtime::{
    ContainerRuntime, ContainerSpec, ContainerSummary, NetworkSpec, NetworkSummary, PublishedPort,
    PullProgress, PullStream, RemoveOptions,
};

impl From<bollard::errors::Error> for RuntimeError {
    fn from(err: bollard::errors::Error) -> Self {
        use bollard::errors::Error;

        match err {
            Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => RuntimeError::NotFound { message },
            Error::DockerResponseServerError {
                status_code: 304,
                message,
            } => RuntimeError::NotModified { message },
            Error::DockerResponseServerError {
                status_code,
                message,
            } => RuntimeError::Daemon {
                status: status_code,
                message,
            },
            Error::DockerStreamError { error } => RuntimeError::Stream { reason: error },
            other => RuntimeError::Transport {
                reason: other.to_string(),
            },
        }
    }
}

/// Connection to a Docker (or API-compatible) daemon.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects using the standard environment (`DOCKER_HOST` etc.),
    /// negotiates the API version and pings the daemon.
    ///
    /// When `DOCKER_HOST` is unset and the default socket does not answer,
    /// well-known per-user socket locations are tried as well.
    pub async fn connect() -> Result<Self, StasisError> {
        let docker = connect_docker().await?;
        tracing::debug!("Connected to container runtime");
        Ok(Self { docker })
    }
}

/// Establish a negotiated, pinged connection to the daemon.
async fn connect_docker() -> Result<Docker, StasisError> {
    let primary = match Docker::connect_with_defaults() {
        Ok(docker) => negotiate(docker).await,
        Err(e) => Err(e.to_string()),
    };

    let reason = match primary {
        Ok(docker) => return Ok(docker),
        Err(reason) => reason,
    };

    if std::env::var_os("DOCKER_HOST").is_none() {
        for socket in fallback_sockets() {
            if !socket.exists() {
                continue;
            }
            let Some(path) = socket.to_str() else {
                continue;
            };
            tracing::debug!("Trying Docker socket at {}", path);
            if let Ok(docker) = Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION)
                && let Ok(docker) = negotiate(docker).await
            {
                return Ok(docker);
            }
        }
    }

    Err(StasisError::Connection { reason })
}

async fn negotiate(docker: Docker) -> Result<Docker, String> {
    let docker = docker.negotiate_version().await.map_err(|e| e.to_string())?;
    docker.ping().await.map_err(|e| e.to_string())?;
    Ok(docker)
}

/// Per-user sockets used by Docker Desktop and rootless Docker.
#[cfg(unix)]
fn fallback_sockets() -> Vec<std::path::PathBuf> {
    let mut sockets = Vec::new();
    if let Some(home) = dirs::home_dir() {
        sockets.push(home.join(".docker/run/docker.sock"));
        sockets.push(home.join(".docker/desktop/docker.sock"));
    }
    if let Some(runtime_dir) = dirs::runtime_dir() {
        sockets.push(runtime_dir.join("docker.sock"));
    }
    sockets
}

#[cfg(not(unix))]
fn fallback_sockets() -> Vec<std::path::PathBuf> {
    Vec::new()
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_networks(&self) -> Result<Vec<NetworkSummary>, RuntimeError> {
        let networks = self
            .docker
            .list_networks(None::<ListNetworksOptions<String>>)
            .await?;

        Ok(networks
            .into_iter()
            .filter_map(|n| {
                Some(NetworkSummary {
                    name: n.name?,
                    id: n.id,
                })
            })
            .collect())
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<(), RuntimeError> {
        let options = CreateNetworkOptions {
            name: spec.name.clone(),
            driver: spec.driver.clone(),
            labels: spec
                .labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            ..Default::default()
        };

        self.docker.create_network(options).await?;
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker.remove_network(name).await?;
        Ok(())
    }

    fn pull_image(&self, image: &str) -> PullStream<'_> {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        self.docker
            .create_image(Some(options), None, None)
            .map(|item| {
                item.map(|info| PullProgress {
                    id: info.id,
                    status: info.status,
                    progress: info.progress,
                })
                .map_err(RuntimeError::from)
            })
            .boxed()
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        // bollard expects HashMap<String, HashMap<(), ()>> for exposed ports
        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .ports
            .exposed
            .iter()
            .map(|port| (port.to_string(), HashMap::new()))
            .collect();

        let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
            .ports
            .bindings
            .iter()
            .map(|(port, hosts)| {
                let bindings = hosts
                    .iter()
                    .map(|h| PortBinding {
                        host_ip: Some(h.host_ip.clone()),
                        host_port: h.host_port.map(|p| p.to_string()),
                    })
                    .collect();
                (port.to_string(), Some(bindings))
            })
            .collect();

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            binds: if spec.binds.is_empty() {
                None
            } else {
                Some(spec.binds.clone())
            },
            ..Default::default()
        };

        let networking_config = NetworkingConfig {
            endpoints_config: HashMap::from([(spec.network.clone(), EndpointSettings::default())]),
        };

        let config = Config {
            image: Some(spec.image.clone()),
            labels: Some(
                spec.labels
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            env: if spec.env.is_empty() {
                None
            } else {
                Some(spec.env.clone())
            },
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            networking_config: Some(networking_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = self.docker.create_container(Some(options), config).await?;
        for warning in &response.warnings {
            tracing::warn!("{}: {}", spec.name, warning);
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop_container(&self, name: &str, timeout_secs: u32) -> Result<(), RuntimeError> {
        self.docker
            .stop_container(
                name,
                Some(StopContainerOptions {
                    t: i64::from(timeout_secs),
                }),
            )
            .await?;
        Ok(())
    }

    async fn remove_container(
        &self,
        name: &str,
        options: RemoveOptions,
    ) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force: options.force,
                    v: options.remove_volumes,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }

    async fn list_containers(&self, label: &str) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let options = ListContainersOptions {
            all: true,
            filters: HashMap::from([("label".to_string(), vec![label.to_string()])]),
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers.into_iter().map(summarize).collect())
    }
}

fn summarize(c: bollard::models::ContainerSummary) -> ContainerSummary {
    let name = c
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_default();

    let ports = c
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|p| PublishedPort {
            host_ip: p.ip,
            host_port: p.public_port,
            container_port: p.private_port,
            protocol: p
                .typ
                .map(|t| t.to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "tcp".to_string()),
        })
        .collect();

    ContainerSummary {
        id: c.id.unwrap_or_default(),
        name,
        image: c.image.unwrap_or_default(),
        state: c.state.unwrap_or_default(),
        status: c.status.unwrap_or_default(),
        ports,
        labels: c.labels.unwrap_or_default().into_iter().collect(),
    }
}

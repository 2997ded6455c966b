//! Container runtime adapter.
//!
//! Reconcilers talk to the runtime only through [`ContainerRuntime`], which
//! exposes the handful of control-plane calls stasis needs. The production
//! implementation is [`DockerRuntime`] (bollard); tests use
//! [`FakeRuntime`](crate::testing::FakeRuntime).
//!
//! One handle is created per command invocation and passed down by
//! reference; nothing below the CLI constructs its own client.

pub mod detect;
pub mod docker;

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::binding::PortBindings;
use crate::error::RuntimeError;
use crate::naming;

pub use detect::{DockerDetection, DockerStatus, Platform, diagnose_unreachable};
pub use docker::DockerRuntime;

/// Progress events emitted while an image is pulled.
pub type PullStream<'a> = BoxStream<'a, Result<PullProgress, RuntimeError>>;

/// Driver used for project networks.
pub const BRIDGE_DRIVER: &str = "bridge";

/// A network as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSummary {
    pub id: Option<String>,
    pub name: String,
}

/// Desired network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    pub name: String,
    pub driver: String,
    pub labels: BTreeMap<String, String>,
}

impl NetworkSpec {
    /// The bridge network owned by a project.
    pub fn for_project(project: &str) -> Self {
        Self {
            name: naming::network_name(project),
            driver: BRIDGE_DRIVER.to_string(),
            labels: naming::network_labels(project),
        }
    }
}

/// One progress line from an image pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullProgress {
    /// Layer id, when the event is about a layer.
    pub id: Option<String>,
    pub status: Option<String>,
    pub progress: Option<String>,
}

/// Full creation request for a managed container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub labels: BTreeMap<String, String>,
    /// `KEY=VALUE` entries, passed through unchanged.
    pub env: Vec<String>,
    pub ports: PortBindings,
    /// `hostPath:containerPath` bind mounts.
    pub binds: Vec<String>,
    /// Network the container's single endpoint is attached to.
    pub network: String,
}

/// A port published by a running container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPort {
    pub host_ip: Option<String>,
    pub host_port: Option<u16>,
    pub container_port: u16,
    pub protocol: String,
}

/// A container as reported by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    /// Name without the leading `/`.
    pub name: String,
    pub image: String,
    /// Machine state, e.g. `running` or `exited`.
    pub state: String,
    /// Human status, e.g. `Up 3 minutes`.
    pub status: String,
    pub ports: Vec<PublishedPort>,
    pub labels: BTreeMap<String, String>,
}

impl ContainerSummary {
    /// The service label, if this container is managed by stasis.
    pub fn service(&self) -> Option<&str> {
        self.labels.get(naming::LABEL_SERVICE).map(String::as_str)
    }
}

/// Options for container removal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Kill the container if it is still running.
    pub force: bool,
    /// Also delete anonymous volumes attached to the container.
    pub remove_volumes: bool,
}

/// Control-plane operations used by the reconcilers.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn list_networks(&self) -> Result<Vec<NetworkSummary>, RuntimeError>;

    async fn create_network(&self, spec: &NetworkSpec) -> Result<(), RuntimeError>;

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError>;

    /// Starts pulling an image. The pull is only complete once the returned
    /// stream has been drained.
    fn pull_image(&self, image: &str) -> PullStream<'_>;

    /// Creates a container and returns its id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    async fn stop_container(&self, name: &str, timeout_secs: u32) -> Result<(), RuntimeError>;

    async fn remove_container(&self, name: &str, options: RemoveOptions)
    -> Result<(), RuntimeError>;

    /// Lists running and stopped containers matching a `key=value` label.
    async fn list_containers(&self, label: &str) -> Result<Vec<ContainerSummary>, RuntimeError>;
}

//! In-memory container runtime for tests.
//!
//! [`FakeRuntime`] implements [`ContainerRuntime`] with the daemon behaviours
//! the reconcilers depend on:
//! - 404 for missing containers, networks and images
//! - 304 when stopping a container that is not running
//! - 409 for name conflicts and removing a running container without force
//! - 403 when removing a network that still has containers attached
//! - images count as present only after their pull stream is fully drained
//!
//! Failures can be injected per image or container name.
//!
//! # Usage
//!
//! ```rust,no_run
//! use stasis::testing::FakeRuntime;
//!
//! let runtime = FakeRuntime::new();
//! runtime.fail_start("stasis-demo-cache");
//! // drive an Orchestrator against &runtime ...
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;

use crate::error::RuntimeError;
use crate::runtime::{
    ContainerRuntime, ContainerSpec, ContainerSummary, NetworkSpec, NetworkSummary, PublishedPort,
    PullProgress, PullStream, RemoveOptions,
};

/// How a fake pull should fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PullFailure {
    /// The daemon rejects the pull before any progress.
    Rejected,
    /// Progress starts, then the stream errors.
    MidStream,
}

/// A container held by the fake daemon.
#[derive(Clone, Debug)]
pub struct FakeContainer {
    pub id: String,
    pub spec: ContainerSpec,
    pub running: bool,
}

#[derive(Default)]
struct State {
    networks: BTreeMap<String, NetworkSpec>,
    containers: BTreeMap<String, FakeContainer>,
    images: HashSet<String>,
    next_id: u32,
    network_creates: u32,
    container_creates: u32,
    pulls_started: u32,
    fail_pull: HashMap<String, PullFailure>,
    fail_create: HashSet<String>,
    fail_start: HashSet<String>,
    fail_remove: HashSet<String>,
    fail_list_networks: bool,
    fail_create_network: bool,
    fail_list_containers: bool,
}

/// An in-memory [`ContainerRuntime`].
#[derive(Clone, Default)]
pub struct FakeRuntime {
    state: Arc<Mutex<State>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("fake runtime state poisoned")
    }

    /// Make pulls of `image` fail.
    pub fn fail_pull(&self, image: &str, failure: PullFailure) {
        self.state().fail_pull.insert(image.to_string(), failure);
    }

    /// Make creating the container named `name` fail.
    pub fn fail_create(&self, name: &str) {
        self.state().fail_create.insert(name.to_string());
    }

    /// Make starting the container named `name` fail.
    pub fn fail_start(&self, name: &str) {
        self.state().fail_start.insert(name.to_string());
    }

    /// Make removing the container named `name` fail.
    pub fn fail_remove(&self, name: &str) {
        self.state().fail_remove.insert(name.to_string());
    }

    pub fn fail_list_networks(&self) {
        self.state().fail_list_networks = true;
    }

    pub fn fail_create_network(&self) {
        self.state().fail_create_network = true;
    }

    pub fn fail_list_containers(&self) {
        self.state().fail_list_containers = true;
    }

    /// Seed a container directly, bypassing create (e.g. a leftover from an
    /// older manifest).
    pub fn insert_container(&self, spec: ContainerSpec, running: bool) -> String {
        let mut state = self.state();
        state.next_id += 1;
        let id = format!("fake{:08}", state.next_id);
        state.containers.insert(
            spec.name.clone(),
            FakeContainer {
                id: id.clone(),
                spec,
                running,
            },
        );
        id
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.state().containers.get(name).cloned()
    }

    pub fn container_names(&self) -> Vec<String> {
        self.state().containers.keys().cloned().collect()
    }

    pub fn network_names(&self) -> Vec<String> {
        self.state().networks.keys().cloned().collect()
    }

    pub fn network(&self, name: &str) -> Option<NetworkSpec> {
        self.state().networks.get(name).cloned()
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.state().images.contains(image)
    }

    /// Number of successful network creations.
    pub fn network_creates(&self) -> u32 {
        self.state().network_creates
    }

    /// Number of successful container creations.
    pub fn container_creates(&self) -> u32 {
        self.state().container_creates
    }

    pub fn pulls_started(&self) -> u32 {
        self.state().pulls_started
    }
}

fn not_found(what: &str, name: &str) -> RuntimeError {
    RuntimeError::NotFound {
        message: format!("No such {}: {}", what, name),
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_networks(&self) -> Result<Vec<NetworkSummary>, RuntimeError> {
        let state = self.state();
        if state.fail_list_networks {
            return Err(RuntimeError::Transport {
                reason: "connection reset".to_string(),
            });
        }
        Ok(state
            .networks
            .keys()
            .map(|name| NetworkSummary {
                id: Some(format!("net-{}", name)),
                name: name.clone(),
            })
            .collect())
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<(), RuntimeError> {
        let mut state = self.state();
        if state.fail_create_network {
            return Err(RuntimeError::Daemon {
                status: 500,
                message: "injected network create failure".to_string(),
            });
        }
        if state.networks.contains_key(&spec.name) {
            return Err(RuntimeError::Daemon {
                status: 409,
                message: format!("network with name {} already exists", spec.name),
            });
        }
        state.networks.insert(spec.name.clone(), spec.clone());
        state.network_creates += 1;
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.state();
        if !state.networks.contains_key(name) {
            return Err(not_found("network", name));
        }
        if state.containers.values().any(|c| c.spec.network == name) {
            return Err(RuntimeError::Daemon {
                status: 403,
                message: format!(
                    "error while removing network: network {} has active endpoints",
                    name
                ),
            });
        }
        state.networks.remove(name);
        Ok(())
    }

    fn pull_image(&self, image: &str) -> PullStream<'_> {
        let failure = {
            let mut state = self.state();
            state.pulls_started += 1;
            state.fail_pull.get(image).copied()
        };

        let progress = |status: &str| PullProgress {
            id: Some("layer0".to_string()),
            status: Some(status.to_string()),
            progress: None,
        };

        match failure {
            Some(PullFailure::Rejected) => stream::iter(vec![Err(RuntimeError::NotFound {
                message: format!("pull access denied for {}", image),
            })])
            .boxed(),
            Some(PullFailure::MidStream) => stream::iter(vec![
                Ok(progress("Pulling fs layer")),
                Err(RuntimeError::Stream {
                    reason: "unexpected EOF".to_string(),
                }),
            ])
            .boxed(),
            None => {
                let state = Arc::clone(&self.state);
                let image = image.to_string();
                let done = stream::once(async move {
                    state
                        .lock()
                        .expect("fake runtime state poisoned")
                        .images
                        .insert(image.clone());
                    Ok(PullProgress {
                        id: None,
                        status: Some(format!("Status: Downloaded newer image for {}", image)),
                        progress: None,
                    })
                });
                stream::iter(vec![
                    Ok(progress("Pulling fs layer")),
                    Ok(progress("Downloading")),
                    Ok(progress("Pull complete")),
                ])
                .chain(done)
                .boxed()
            }
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let mut state = self.state();
        if state.fail_create.contains(&spec.name) {
            return Err(RuntimeError::Daemon {
                status: 500,
                message: "injected create failure".to_string(),
            });
        }
        if state.containers.contains_key(&spec.name) {
            return Err(RuntimeError::Daemon {
                status: 409,
                message: format!(
                    "Conflict. The container name \"/{}\" is already in use",
                    spec.name
                ),
            });
        }
        if !state.images.contains(&spec.image) {
            return Err(not_found("image", &spec.image));
        }
        if !state.networks.contains_key(&spec.network) {
            return Err(not_found("network", &spec.network));
        }

        state.next_id += 1;
        let id = format!("fake{:08}", state.next_id);
        state.containers.insert(
            spec.name.clone(),
            FakeContainer {
                id: id.clone(),
                spec: spec.clone(),
                running: false,
            },
        );
        state.container_creates += 1;
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state();
        let fail_start = state.fail_start.clone();
        let container = state
            .containers
            .values_mut()
            .find(|c| c.id == id || c.spec.name == id)
            .ok_or_else(|| not_found("container", id))?;
        if fail_start.contains(&container.spec.name) {
            return Err(RuntimeError::Daemon {
                status: 500,
                message: "injected start failure".to_string(),
            });
        }
        container.running = true;
        Ok(())
    }

    async fn stop_container(&self, name: &str, _timeout_secs: u32) -> Result<(), RuntimeError> {
        let mut state = self.state();
        let container = state
            .containers
            .get_mut(name)
            .ok_or_else(|| not_found("container", name))?;
        if !container.running {
            return Err(RuntimeError::NotModified {
                message: String::new(),
            });
        }
        container.running = false;
        Ok(())
    }

    async fn remove_container(
        &self,
        name: &str,
        options: RemoveOptions,
    ) -> Result<(), RuntimeError> {
        let mut state = self.state();
        if state.fail_remove.contains(name) {
            return Err(RuntimeError::Daemon {
                status: 500,
                message: "injected remove failure".to_string(),
            });
        }
        let container = state
            .containers
            .get(name)
            .ok_or_else(|| not_found("container", name))?;
        if container.running && !options.force {
            return Err(RuntimeError::Daemon {
                status: 409,
                message: format!("cannot remove running container {}", name),
            });
        }
        state.containers.remove(name);
        Ok(())
    }

    async fn list_containers(&self, label: &str) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let (key, value) = label.split_once('=').unwrap_or((label, ""));
        let state = self.state();
        if state.fail_list_containers {
            return Err(RuntimeError::Transport {
                reason: "connection reset".to_string(),
            });
        }

        Ok(state
            .containers
            .values()
            .filter(|c| c.spec.labels.get(key).is_some_and(|v| value.is_empty() || v == value))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.spec.name.clone(),
                image: c.spec.image.clone(),
                state: if c.running { "running" } else { "exited" }.to_string(),
                status: if c.running {
                    "Up Less than a second".to_string()
                } else {
                    "Exited (0) Less than a second ago".to_string()
                },
                ports: if c.running {
                    c.spec
                        .ports
                        .mappings()
                        .into_iter()
                        .map(|m| PublishedPort {
                            host_ip: Some(m.host_ip),
                            host_port: m.host_port,
                            container_port: m.container.port,
                            protocol: m.container.protocol.to_string(),
                        })
                        .collect()
                } else {
                    Vec::new()
                },
                labels: c.spec.labels.clone(),
            })
            .collect())
    }
}

//! Project network reconciliation.

use crate::error::{Result, StasisError};
use crate::runtime::{ContainerRuntime, NetworkSpec};

/// Ensures the network exists exactly once.
///
/// Returns `true` if it was created, `false` if a network with that exact name
/// was already present.
pub async fn ensure_network(runtime: &dyn ContainerRuntime, spec: &NetworkSpec) -> Result<bool> {
    let networks = runtime
        .list_networks()
        .await
        .map_err(|source| StasisError::NetworkList { source })?;

    if networks.iter().any(|n| n.name == spec.name) {
        tracing::info!("Network {} already exists", spec.name);
        return Ok(false);
    }

    tracing::info!("Creating network: {}...", spec.name);
    runtime
        .create_network(spec)
        .await
        .map_err(|source| StasisError::NetworkCreate {
            name: spec.name.clone(),
            source,
        })?;

    Ok(true)
}

/// Deletes the project network.
///
/// Containers attached to it must be removed first. A network that does not
/// exist is reported as a warning and treated as removed.
pub async fn remove_network(runtime: &dyn ContainerRuntime, name: &str) -> Result<bool> {
    tracing::info!("Removing network {}...", name);
    match runtime.remove_network(name).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => {
            tracing::warn!("Network {} does not exist", name);
            Ok(false)
        }
        Err(source) => Err(StasisError::NetworkRemove {
            name: name.to_string(),
            source,
        }),
    }
}

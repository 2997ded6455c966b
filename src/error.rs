//! Error types for stasis.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, StasisError>;

/// Errors surfaced by the reconcilers and the orchestrator.
#[derive(Debug, Error)]
pub enum StasisError {
    /// The container runtime could not be reached.
    #[error("Cannot connect to the container runtime: {reason}")]
    Connection {
        /// Reason for failure.
        reason: String,
    },

    /// Listing networks failed.
    #[error("Failed to list networks: {source}")]
    NetworkList {
        #[source]
        source: RuntimeError,
    },

    /// Creating the project network failed.
    #[error("Failed to create network '{name}': {source}")]
    NetworkCreate {
        /// Network name.
        name: String,
        #[source]
        source: RuntimeError,
    },

    /// Removing the project network failed.
    #[error("Failed to remove network '{name}': {source}")]
    NetworkRemove {
        /// Network name.
        name: String,
        #[source]
        source: RuntimeError,
    },

    /// The pull request for an image was rejected.
    #[error("Failed to pull image '{image}': {source}")]
    ImagePull {
        /// Image reference.
        image: String,
        #[source]
        source: RuntimeError,
    },

    /// The pull progress stream failed mid-transfer.
    #[error("Error reading pull output for '{image}': {source}")]
    ImageStream {
        /// Image reference.
        image: String,
        #[source]
        source: RuntimeError,
    },

    /// A port declaration could not be parsed.
    #[error("Invalid port mapping '{spec}': {reason}")]
    InvalidPortSpec {
        /// The declared port string.
        spec: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A host volume directory could not be created.
    #[error("Failed to provision volume directory {}: {source}", path.display())]
    VolumeProvision {
        /// Host path that could not be created.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Creating a container failed.
    #[error("Failed to create container '{name}': {source}")]
    ContainerCreate {
        /// Container name.
        name: String,
        #[source]
        source: RuntimeError,
    },

    /// Starting a created container failed.
    #[error("Failed to start container '{name}': {source}")]
    ContainerStart {
        /// Container name.
        name: String,
        #[source]
        source: RuntimeError,
    },

    /// Removing a container failed after the stop step.
    #[error("Failed to remove container '{name}': {source}")]
    ContainerRemove {
        /// Container name.
        name: String,
        #[source]
        source: RuntimeError,
    },

    /// Listing containers failed.
    #[error("Failed to list containers for project '{project}': {source}")]
    ContainerList {
        /// Project name.
        project: String,
        #[source]
        source: RuntimeError,
    },

    /// Bring-up of one service failed; carries the service name.
    #[error("Service '{service}': {source}")]
    Service {
        /// Service name from the manifest.
        service: String,
        #[source]
        source: Box<StasisError>,
    },
}

impl StasisError {
    /// Attach the service name to an error raised while reconciling it.
    pub fn for_service(self, service: &str) -> Self {
        StasisError::Service {
            service: service.to_string(),
            source: Box::new(self),
        }
    }
}

/// Classified failure from a container runtime call.
///
/// The reconcilers only care whether something was absent, already in the
/// requested state, or genuinely broken, so daemon responses are folded into
/// these variants by the adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    /// The referenced object does not exist (HTTP 404).
    #[error("not found: {message}")]
    NotFound { message: String },

    /// The object is already in the requested state (HTTP 304).
    #[error("not modified: {message}")]
    NotModified { message: String },

    /// The daemon rejected the request.
    #[error("daemon returned {status}: {message}")]
    Daemon { status: u16, message: String },

    /// A streamed response failed part-way through.
    #[error("stream error: {reason}")]
    Stream { reason: String },

    /// The request never reached the daemon.
    #[error("transport error: {reason}")]
    Transport { reason: String },
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound { .. })
    }

    pub fn is_not_modified(&self) -> bool {
        matches!(self, RuntimeError::NotModified { .. })
    }
}

/// Errors resolving process configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Could not determine the home directory; set STASIS_HOME")]
    MissingHome,

    #[error("Environment variable {key} is not valid unicode")]
    NotUnicode { key: String },
}

/// Errors loading or validating the service manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Config file {} not found. Run 'stasis init' to create one", path.display())]
    NotFound { path: PathBuf },

    #[error("Error reading config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error writing config file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} already exists", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("Unable to decode {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yml::Error,
    },

    #[error("Invalid manifest field '{key}': {message}")]
    Invalid { key: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_error_classification() {
        let nf = RuntimeError::NotFound {
            message: "No such container".to_string(),
        };
        assert!(nf.is_not_found());
        assert!(!nf.is_not_modified());

        let nm = RuntimeError::NotModified {
            message: String::new(),
        };
        assert!(nm.is_not_modified());
        assert!(!nm.is_not_found());
    }

    #[test]
    fn test_service_context_in_message() {
        let err = StasisError::InvalidPortSpec {
            spec: "abc".to_string(),
            reason: "not a number".to_string(),
        }
        .for_service("cache");

        assert_eq!(
            err.to_string(),
            "Service 'cache': Invalid port mapping 'abc': not a number"
        );
    }
}

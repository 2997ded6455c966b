//! Deterministic names and ownership labels.
//!
//! Every runtime object stasis creates is named from the project (and, for
//! containers, the service) so repeated runs address the same objects, and is
//! labelled so it can be discovered without knowing its name.

use std::collections::BTreeMap;

/// Prefix shared by every network and container name.
pub const NAME_PREFIX: &str = "stasis";

pub const LABEL_PROJECT: &str = "stasis.project";
pub const LABEL_SERVICE: &str = "stasis.service";
pub const LABEL_MANAGED: &str = "stasis.managed";

/// Name of the project network: `stasis-<project>`.
pub fn network_name(project: &str) -> String {
    format!("{}-{}", NAME_PREFIX, project)
}

/// Name of a service container: `stasis-<project>-<service>`.
pub fn container_name(project: &str, service: &str) -> String {
    format!("{}-{}-{}", NAME_PREFIX, project, service)
}

/// Ownership labels attached to a service container.
pub fn labels(project: &str, service: &str) -> BTreeMap<String, String> {
    let mut labels = network_labels(project);
    labels.insert(LABEL_SERVICE.to_string(), service.to_string());
    labels
}

/// Ownership labels attached to the project network.
pub fn network_labels(project: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_PROJECT.to_string(), project.to_string()),
        (LABEL_MANAGED.to_string(), "true".to_string()),
    ])
}

/// Label filter value selecting everything owned by a project.
pub fn project_filter(project: &str) -> String {
    format!("{}={}", LABEL_PROJECT, project)
}

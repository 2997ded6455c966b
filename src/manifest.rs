//! The declared environment: project name plus ordered service specs.
//!
//! Loaded from `stasis.yaml`:
//!
//! ```yaml
//! name: demo
//! services:
//!   cache:
//!     image: redis:7
//!     ports: ["6379:6379"]
//!   db:
//!     image: postgres:16
//!     environment: ["POSTGRES_PASSWORD=secret"]
//!     volumes: ["pgdata:/var/lib/postgresql/data"]
//! ```
//!
//! Services keep the order they are declared in; bring-up follows it.

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use crate::error::ManifestError;
use crate::naming;

/// Default manifest file name, looked up in the working directory.
pub const DEFAULT_MANIFEST: &str = "stasis.yaml";

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").expect("name regex is valid"));

/// One container definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceSpec {
    /// Image reference, e.g. `postgres:16`.
    pub image: String,
    /// `host:container` port declarations.
    #[serde(default)]
    pub ports: Vec<String>,
    /// `KEY=VALUE` entries passed verbatim to the container.
    #[serde(default)]
    pub environment: Vec<String>,
    /// `name:containerPath` volume declarations.
    #[serde(default)]
    pub volumes: Vec<String>,
}

/// A project's declared services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Environment {
    /// Project name; scopes every runtime object.
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "ordered_services")]
    pub services: Vec<(String, ServiceSpec)>,
}

impl Environment {
    /// Reads and validates a manifest file.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ManifestError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ManifestError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        Self::parse(&contents, path)
    }

    /// Parses and validates manifest text; `origin` is used in error messages.
    pub fn parse(contents: &str, origin: &Path) -> Result<Self, ManifestError> {
        let env: Environment =
            serde_yml::from_str(contents).map_err(|source| ManifestError::Parse {
                path: origin.to_path_buf(),
                source,
            })?;
        env.validate()?;
        Ok(env)
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        if !NAME_RE.is_match(&self.name) {
            return Err(ManifestError::Invalid {
                key: "name".to_string(),
                message: format!(
                    "'{}' must start with a letter or digit and contain only [a-zA-Z0-9_.-]",
                    self.name
                ),
            });
        }

        for (service, spec) in &self.services {
            if !NAME_RE.is_match(service) {
                return Err(ManifestError::Invalid {
                    key: format!("services.{}", service),
                    message: "service names may contain only [a-zA-Z0-9_.-]".to_string(),
                });
            }
            if spec.image.trim().is_empty() {
                return Err(ManifestError::Invalid {
                    key: format!("services.{}.image", service),
                    message: "image is required".to_string(),
                });
            }
            if let Some(bad) = spec.environment.iter().find(|e| !e.contains('=')) {
                return Err(ManifestError::Invalid {
                    key: format!("services.{}.environment", service),
                    message: format!("'{}' is not KEY=VALUE", bad),
                });
            }
        }

        Ok(())
    }

    /// Name of this environment's network.
    pub fn network_name(&self) -> String {
        naming::network_name(&self.name)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, spec)| spec)
    }

    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|(name, _)| name.as_str())
    }
}

/// Deserializes the `services` mapping into a vector, keeping file order and
/// rejecting duplicate keys.
fn ordered_services<'de, D>(deserializer: D) -> Result<Vec<(String, ServiceSpec)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ServicesVisitor;

    impl<'de> Visitor<'de> for ServicesVisitor {
        type Value = Vec<(String, ServiceSpec)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping of service name to service definition")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut services: Vec<(String, ServiceSpec)> = Vec::new();
            while let Some((name, spec)) = map.next_entry::<String, ServiceSpec>()? {
                if services.iter().any(|(n, _)| *n == name) {
                    return Err(de::Error::custom(format!("duplicate service '{}'", name)));
                }
                services.push((name, spec));
            }
            Ok(services)
        }
    }

    deserializer.deserialize_any(ServicesVisitor)
}

/// Writes a starter manifest, refusing to overwrite an existing file.
pub fn write_starter(path: &Path, project: &str) -> Result<(), ManifestError> {
    if !NAME_RE.is_match(project) {
        return Err(ManifestError::Invalid {
            key: "name".to_string(),
            message: format!("'{}' is not a valid project name", project),
        });
    }

    let contents = format!(
        "name: {project}\n\
         version: \"1\"\n\
         services:\n\
         \x20 cache:\n\
         \x20   image: redis:7\n\
         \x20   ports:\n\
         \x20     - \"6379:6379\"\n\
         \x20   volumes:\n\
         \x20     - \"data:/data\"\n"
    );

    let write_error = |source: std::io::Error| ManifestError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => ManifestError::AlreadyExists {
                path: path.to_path_buf(),
            },
            _ => write_error(e),
        })?;

    file.write_all(contents.as_bytes()).map_err(write_error)
}

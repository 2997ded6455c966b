//! Process configuration.
//!
//! Resolved from environment variables (a `.env` file in the working
//! directory is loaded first by the binary). Priority: CLI flag > env > default.
//!
//! | Variable | Default |
//! |---|---|
//! | `STASIS_FILE` | `stasis.yaml` |
//! | `STASIS_HOME` | `~/.stasis` |
//! | `STASIS_STOP_TIMEOUT_SECS` | `10` |
//!
//! The runtime endpoint itself (`DOCKER_HOST` and friends) is read by the
//! Docker client, not here.

use std::path::PathBuf;
use std::str::FromStr;

use crate::binding::VolumeRoot;
use crate::error::ConfigError;
use crate::manifest::DEFAULT_MANIFEST;

/// Seconds a container gets to stop before it is killed.
pub const DEFAULT_STOP_TIMEOUT_SECS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Manifest to load.
    pub manifest_path: PathBuf,
    /// Root for persistent state; volumes live under `<home>/volumes`.
    pub home: PathBuf,
    /// Grace period for `down`.
    pub stop_timeout_secs: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(|key| match std::env::var(key) {
            Ok(v) => Ok(Some(v)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode {
                key: key.to_string(),
            }),
        })
    }

    /// Resolves configuration from an arbitrary variable source.
    pub(crate) fn resolve<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<Option<String>, ConfigError>,
    {
        let optional = |key: &str| -> Result<Option<String>, ConfigError> {
            Ok(lookup(key)?.filter(|v| !v.trim().is_empty()))
        };

        let manifest_path = optional("STASIS_FILE")?
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST));

        let home = match optional("STASIS_HOME")? {
            Some(home) => PathBuf::from(home),
            None => VolumeRoot::from_home()
                .map(|root| root.root().to_path_buf())
                .ok_or(ConfigError::MissingHome)?,
        };

        let stop_timeout_secs = parse_optional(
            "STASIS_STOP_TIMEOUT_SECS",
            optional("STASIS_STOP_TIMEOUT_SECS")?,
            DEFAULT_STOP_TIMEOUT_SECS,
        )?;

        Ok(Self {
            manifest_path,
            home,
            stop_timeout_secs,
        })
    }

    /// Where service volumes are materialized.
    pub fn volume_root(&self) -> VolumeRoot {
        VolumeRoot::new(&self.home)
    }
}

fn parse_optional<T>(key: &str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{}': {}", v, e),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn resolve(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::resolve(|key| Ok(vars.get(key).cloned()))
    }

    #[test]
    fn test_explicit_values() {
        let config = resolve(&[
            ("STASIS_FILE", "envs/dev.yaml"),
            ("STASIS_HOME", "/tmp/stasis-home"),
            ("STASIS_STOP_TIMEOUT_SECS", "3"),
        ])
        .unwrap();

        assert_eq!(config.manifest_path, PathBuf::from("envs/dev.yaml"));
        assert_eq!(config.home, PathBuf::from("/tmp/stasis-home"));
        assert_eq!(config.stop_timeout_secs, 3);
        assert_eq!(
            config.volume_root().service_dir("demo", "db"),
            PathBuf::from("/tmp/stasis-home/volumes/demo/db")
        );
    }

    #[test]
    fn test_defaults() {
        let config = resolve(&[("STASIS_HOME", "/h")]).unwrap();
        assert_eq!(config.manifest_path, PathBuf::from(DEFAULT_MANIFEST));
        assert_eq!(config.stop_timeout_secs, DEFAULT_STOP_TIMEOUT_SECS);
    }

    #[test]
    fn test_empty_values_fall_back() {
        let config = resolve(&[("STASIS_HOME", "/h"), ("STASIS_FILE", "  ")]).unwrap();
        assert_eq!(config.manifest_path, PathBuf::from(DEFAULT_MANIFEST));
    }

    #[test]
    fn test_invalid_timeout() {
        let err = resolve(&[("STASIS_HOME", "/h"), ("STASIS_STOP_TIMEOUT_SECS", "soon")])
            .unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "STASIS_STOP_TIMEOUT_SECS"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

//! Translation of declared ports and volumes into runtime bindings.
//!
//! Ports are declared as `[hostIp:]hostPort:containerPort[/protocol]` strings,
//! where either port may be a `start-end` range, and become an exposed-port
//! set plus a host binding map. Volumes are
//! declared as `name:containerPath` and become bind mounts of directories
//! under the stasis home:
//!
//! ```text
//! <home>/.stasis/volumes/<project>/<service>/<name>  ->  <containerPath>
//! ```
//!
//! Volume directories are created on demand and never removed here.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, StasisError};

/// Host address used when a port declaration does not name one.
pub const DEFAULT_HOST_IP: &str = "0.0.0.0";

/// Transport protocol of a container port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Sctp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Sctp => "sctp",
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "sctp" => Ok(Protocol::Sctp),
            other => Err(format!("unknown protocol '{}'", other)),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A port inside the container, e.g. `6379/tcp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerPort {
    pub port: u16,
    pub protocol: Protocol,
}

impl fmt::Display for ContainerPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

/// Host side of a port binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBinding {
    pub host_ip: String,
    /// `None` lets the runtime pick a free port.
    pub host_port: Option<u16>,
}

/// One parsed port declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub host_ip: String,
    pub host_port: Option<u16>,
    pub container: ContainerPort,
}

impl PortMapping {
    pub fn host_binding(&self) -> HostBinding {
        HostBinding {
            host_ip: self.host_ip.clone(),
            host_port: self.host_port,
        }
    }
}

impl FromStr for PortMapping {
    type Err = StasisError;

    /// Parses a declaration naming exactly one port. Use [`parse_port_spec`]
    /// for declarations that may contain ranges.
    fn from_str(spec: &str) -> Result<Self> {
        let mut mappings = parse_port_spec(spec)?;
        if mappings.len() != 1 {
            return Err(StasisError::InvalidPortSpec {
                spec: spec.to_string(),
                reason: format!("expands to {} port mappings", mappings.len()),
            });
        }
        Ok(mappings.remove(0))
    }
}

/// Parses one port declaration, expanding `start-end` ranges into one mapping
/// per port.
///
/// A host range must be as long as the container range it maps to, and host
/// ports are paired with container ports in order.
pub fn parse_port_spec(spec: &str) -> Result<Vec<PortMapping>> {
    let invalid = |reason: &str| StasisError::InvalidPortSpec {
        spec: spec.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty port mapping"));
    }

    let (addr, protocol) = match trimmed.rsplit_once('/') {
        Some((addr, proto)) => (addr, proto.parse::<Protocol>().map_err(|e| invalid(&e))?),
        None => (trimmed, Protocol::default()),
    };

    let (host_ip, rest) = split_host_ip(addr).map_err(|e| invalid(&e))?;
    let parts: Vec<&str> = rest.split(':').collect();

    let (host_ip, host_port, container_port) = match (host_ip, parts.as_slice()) {
        (None, [container]) => (None, None, *container),
        (None, [host, container]) => (None, Some(*host), *container),
        (None, [ip, host, container]) => (Some(*ip), Some(*host), *container),
        (Some(ip), [host, container]) => (Some(ip), Some(*host), *container),
        _ => return Err(invalid("expected [hostIp:]hostPort:containerPort[/protocol]")),
    };

    let host_ip = match host_ip {
        Some(ip) => {
            ip.parse::<IpAddr>()
                .map_err(|_| invalid(&format!("invalid host address '{}'", ip)))?;
            ip.to_string()
        }
        None => DEFAULT_HOST_IP.to_string(),
    };

    let host_range = match host_port {
        Some("") | None => None,
        Some(p) => Some(parse_port_range(p).map_err(|e| invalid(&e))?),
    };
    let (start, end) = parse_port_range(container_port).map_err(|e| invalid(&e))?;

    if let Some((host_start, host_end)) = host_range
        && host_end - host_start != end - start
    {
        return Err(invalid("host and container port ranges differ in length"));
    }

    Ok((0..=end - start)
        .map(|offset| PortMapping {
            host_ip: host_ip.clone(),
            host_port: host_range.map(|(host_start, _)| host_start + offset),
            container: ContainerPort {
                port: start + offset,
                protocol,
            },
        })
        .collect())
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host_ip.contains(':') {
            write!(f, "[{}]:", self.host_ip)?;
        } else {
            write!(f, "{}:", self.host_ip)?;
        }
        if let Some(port) = self.host_port {
            write!(f, "{}", port)?;
        }
        write!(f, ":{}", self.container)
    }
}

/// Splits a bracketed IPv6 host address off the front of a port spec.
fn split_host_ip(addr: &str) -> std::result::Result<(Option<&str>, &str), String> {
    let Some(stripped) = addr.strip_prefix('[') else {
        return Ok((None, addr));
    };
    let (ip, rest) = stripped
        .split_once(']')
        .ok_or_else(|| "unterminated '[' in host address".to_string())?;
    let rest = rest
        .strip_prefix(':')
        .ok_or_else(|| "expected ':' after host address".to_string())?;
    Ok((Some(ip), rest))
}

/// Parses `port` or `start-end`, returning an inclusive range.
fn parse_port_range(s: &str) -> std::result::Result<(u16, u16), String> {
    let Some((start, end)) = s.split_once('-') else {
        let port = parse_port(s)?;
        return Ok((port, port));
    };
    let (start, end) = (parse_port(start)?, parse_port(end)?);
    if end < start {
        return Err(format!("port range '{}' ends before it starts", s));
    }
    Ok((start, end))
}

fn parse_port(s: &str) -> std::result::Result<u16, String> {
    match s.parse::<u16>() {
        Ok(0) => Err("port 0 is not allowed".to_string()),
        Ok(port) => Ok(port),
        Err(_) => Err(format!("invalid port '{}'", s)),
    }
}

/// Runtime-level port configuration for one container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortBindings {
    /// Ports the container exposes.
    pub exposed: BTreeSet<ContainerPort>,
    /// Host bindings per container port.
    pub bindings: BTreeMap<ContainerPort, Vec<HostBinding>>,
}

impl PortBindings {
    pub fn is_empty(&self) -> bool {
        self.exposed.is_empty()
    }

    pub fn add(&mut self, mapping: &PortMapping) {
        self.exposed.insert(mapping.container);
        let bindings = self.bindings.entry(mapping.container).or_default();
        let binding = mapping.host_binding();
        if !bindings.contains(&binding) {
            bindings.push(binding);
        }
    }

    /// Flattens the bindings back into one mapping per host binding.
    pub fn mappings(&self) -> Vec<PortMapping> {
        self.bindings
            .iter()
            .flat_map(|(container, hosts)| {
                hosts.iter().map(move |h| PortMapping {
                    host_ip: h.host_ip.clone(),
                    host_port: h.host_port,
                    container: *container,
                })
            })
            .collect()
    }
}

/// Translates a single port declaration. An empty string yields no bindings.
pub fn translate_port(spec: &str) -> Result<PortBindings> {
    let mut out = PortBindings::default();
    if spec.trim().is_empty() {
        return Ok(out);
    }
    for mapping in parse_port_spec(spec)? {
        out.add(&mapping);
    }
    Ok(out)
}

/// Translates every port declared for a service into one binding set.
pub fn translate_ports(specs: &[String]) -> Result<PortBindings> {
    let mut out = PortBindings::default();
    for spec in specs {
        if spec.trim().is_empty() {
            continue;
        }
        for mapping in parse_port_spec(spec)? {
            out.add(&mapping);
        }
    }
    Ok(out)
}

/// Root directory holding persistent service volumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRoot {
    root: PathBuf,
}

impl VolumeRoot {
    /// `root` is the stasis home, normally `~/.stasis`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The default root under the user's home directory.
    pub fn from_home() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new(home.join(".stasis")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all volumes of one service.
    pub fn service_dir(&self, project: &str, service: &str) -> PathBuf {
        self.root.join("volumes").join(project).join(service)
    }

    pub fn host_path(&self, project: &str, service: &str, volume: &str) -> PathBuf {
        self.service_dir(project, service).join(volume)
    }

    /// Materializes host directories for the declared volumes and returns the
    /// bind strings (`hostPath:containerPath`) in declaration order.
    ///
    /// Entries that are not exactly `name:containerPath` are skipped with a
    /// warning.
    pub fn translate(
        &self,
        project: &str,
        service: &str,
        volumes: &[String],
    ) -> Result<Vec<String>> {
        let mut binds = Vec::with_capacity(volumes.len());

        for entry in volumes {
            let Some((name, container_path)) = parse_volume(entry) else {
                tracing::warn!(
                    "Skipping malformed volume '{}' for service {} (expected name:containerPath)",
                    entry,
                    service
                );
                continue;
            };

            let host_path = self.host_path(project, service, name);
            create_private_dir(&host_path).map_err(|source| StasisError::VolumeProvision {
                path: host_path.clone(),
                source,
            })?;

            tracing::debug!("Volume {} -> {}", host_path.display(), container_path);
            binds.push(format!("{}:{}", host_path.display(), container_path));
        }

        Ok(binds)
    }
}

/// Splits `name:containerPath`. The name must be a single path component.
fn parse_volume(entry: &str) -> Option<(&str, &str)> {
    let parts: Vec<&str> = entry.split(':').collect();
    let [name, container_path] = parts.as_slice() else {
        return None;
    };
    if name.is_empty()
        || container_path.is_empty()
        || *name == "."
        || *name == ".."
        || name.contains(['/', '\\'])
    {
        return None;
    }
    Some((*name, *container_path))
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

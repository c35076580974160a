//! Container specification and inspection types.
//!
//! These types describe what the orchestrator asks the runtime to create
//! and what the runtime reports back about created containers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Container identifier assigned by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a container ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the short container ID (first 12 characters).
    pub fn short(&self) -> &str {
        if self.0.len() > 12 {
            &self.0[..12]
        } else {
            &self.0
        }
    }
}

// Display shows the short form; logs never need the full 64-character ID.
impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// Port mapping between host and container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Container port.
    pub container_port: u16,

    /// Host port. When `None`, the runtime assigns one.
    pub host_port: Option<u16>,

    /// Protocol (tcp/udp).
    pub protocol: PortProtocol,
}

impl PortMapping {
    /// Creates a new TCP port mapping with a runtime-assigned host port.
    pub fn tcp(container_port: u16) -> Self {
        Self {
            container_port,
            host_port: None,
            protocol: PortProtocol::Tcp,
        }
    }

    /// Creates a new UDP port mapping with a runtime-assigned host port.
    pub fn udp(container_port: u16) -> Self {
        Self {
            container_port,
            host_port: None,
            protocol: PortProtocol::Udp,
        }
    }

    /// Sets the host port.
    pub fn host_port(mut self, port: u16) -> Self {
        self.host_port = Some(port);
        self
    }

    /// Returns the Docker port specification string.
    pub fn as_docker_port(&self) -> String {
        match self.host_port {
            Some(hp) => format!("{}:{}/{}", hp, self.container_port, self.protocol),
            None => format!("{}/{}", self.container_port, self.protocol),
        }
    }
}

impl FromStr for PortMapping {
    type Err = String;

    /// Parses `"8080:80/tcp"`, `"80/tcp"`, or a bare `"80"`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (ports, proto) = match s.split_once('/') {
            Some((p, proto)) => (p, proto.parse()?),
            None => (s, PortProtocol::Tcp),
        };

        let parse_port = |p: &str| {
            p.parse::<u16>()
                .map_err(|_| format!("invalid port in mapping: {}", s))
        };

        match ports.split_once(':') {
            Some((host, container)) => Ok(Self {
                container_port: parse_port(container)?,
                host_port: Some(parse_port(host)?),
                protocol: proto,
            }),
            None => Ok(Self {
                container_port: parse_port(ports)?,
                host_port: None,
                protocol: proto,
            }),
        }
    }
}

/// Port protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortProtocol {
    /// TCP protocol.
    Tcp,
    /// UDP protocol.
    Udp,
}

impl Default for PortProtocol {
    fn default() -> Self {
        Self::Tcp
    }
}

impl fmt::Display for PortProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

impl FromStr for PortProtocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(format!("unknown port protocol: {}", other)),
        }
    }
}

/// Volume mount configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Source path on the host.
    pub source: String,

    /// Target path in the container.
    pub target: String,

    /// Whether the mount is read-only.
    pub read_only: bool,
}

impl VolumeMount {
    /// Creates a new read-write bind mount.
    pub fn bind(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    /// Sets the mount to read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Returns the Docker bind specification string.
    pub fn as_docker_bind(&self) -> String {
        let mode = if self.read_only { "ro" } else { "rw" };
        format!("{}:{}:{}", self.source, self.target, mode)
    }
}

/// Device mapping configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMapping {
    /// Device path on the host.
    pub host_path: String,

    /// Device path in the container.
    pub container_path: String,

    /// Cgroup permissions (e.g. "rwm").
    pub permissions: String,
}

impl DeviceMapping {
    /// Creates a device mapping with full (rwm) permissions.
    pub fn new(host_path: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            permissions: "rwm".to_string(),
        }
    }
}

/// Network attachment for a container at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkAttachment {
    /// Name of the network to attach to.
    pub network: String,

    /// DNS alias for the container on that network.
    pub alias: String,
}

/// Everything the runtime needs to create one container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Container name.
    pub name: String,

    /// Hostname inside the container.
    pub hostname: Option<String>,

    /// Image reference.
    pub image: String,

    /// Command override (image default when `None`).
    pub command: Option<Vec<String>>,

    /// Environment variables.
    pub env: HashMap<String, String>,

    /// Labels to apply to the container.
    pub labels: HashMap<String, String>,

    /// Port mappings.
    pub ports: Vec<PortMapping>,

    /// Volume mounts.
    pub volumes: Vec<VolumeMount>,

    /// Containers whose volumes should be shared into this one.
    pub volumes_from: Vec<ContainerId>,

    /// Device mappings.
    pub devices: Vec<DeviceMapping>,

    /// Network to attach at creation time.
    pub network: Option<NetworkAttachment>,

    /// Linux capabilities to add.
    pub cap_add: Vec<String>,

    /// Security options.
    pub security_opt: Vec<String>,
}

impl ContainerSpec {
    /// Creates a spec for the given name and image.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }
}

/// What the runtime reports about a container on inspection.
#[derive(Debug, Clone, Default)]
pub struct ContainerReport {
    /// Container ID.
    pub id: String,

    /// Container name.
    pub name: String,

    /// Whether the container is currently running.
    pub running: bool,

    /// IP address per attached network name.
    pub ip_addresses: HashMap<String, IpAddr>,

    /// Realized port mappings (container port -> host port).
    pub host_ports: BTreeMap<u16, u16>,
}

impl ContainerReport {
    /// Returns the IP address on the given network, if assigned.
    pub fn ip_on(&self, network: &str) -> Option<IpAddr> {
        self.ip_addresses.get(network).copied()
    }
}

/// One entry from a container listing.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    /// Container ID.
    pub id: ContainerId,

    /// Container name.
    pub name: String,

    /// Container labels.
    pub labels: HashMap<String, String>,
}

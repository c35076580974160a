//! Single cluster member backed by one container.
//!
//! A [`Node`] is pure specification until [`Node::create`] materializes a
//! container for it. Container identity and IP address are assigned exactly
//! once per materialization: `create` refuses to run twice, and `remove`
//! clears the identity so the node can be materialized again.

use berth_runtime::{
    ContainerId, ContainerSpec, DeviceMapping, ExecRequest, NetworkAttachment, PortMapping,
    RuntimeClient, RuntimeError, VolumeMount,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{OrchestratorError, Result};
use crate::network::NetworkHandle;

/// Seconds the runtime gets to stop a container gracefully.
const STOP_TIMEOUT_SECS: u32 = 10;

/// Interval between inspections while waiting for a started container.
const START_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Declarative description of one node.
///
/// Every field beyond name, group, and image is optional with empty
/// defaults; topologies set only what they need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name, unique within the cluster (e.g. `node-1`).
    pub name: String,

    /// Name of the group this node belongs to.
    pub group: String,

    /// Image reference to run.
    pub image: String,

    /// Port mappings. Entries without a host port get a runtime-assigned one.
    pub ports: Vec<PortMapping>,

    /// Bind mounts from the host.
    pub volumes: Vec<VolumeMount>,

    /// Images whose volumes are shared into this node through throwaway
    /// donor containers.
    pub volumes_from: Vec<String>,

    /// Device mappings.
    pub devices: Vec<DeviceMapping>,

    /// Environment variables.
    pub environment: HashMap<String, String>,

    /// Command override (image default when `None`).
    pub command: Option<Vec<String>>,
}

impl NodeConfig {
    /// Creates a config with the given name, group, and image.
    pub fn new(
        name: impl Into<String>,
        group: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            image: image.into(),
            ports: Vec::new(),
            volumes: Vec::new(),
            volumes_from: Vec::new(),
            devices: Vec::new(),
            environment: HashMap::new(),
            command: None,
        }
    }

    /// Adds a port mapping.
    pub fn port(mut self, mapping: PortMapping) -> Self {
        self.ports.push(mapping);
        self
    }

    /// Adds a volume mount.
    pub fn volume(mut self, mount: VolumeMount) -> Self {
        self.volumes.push(mount);
        self
    }

    /// Adds an image to share volumes from.
    pub fn volumes_from(mut self, image: impl Into<String>) -> Self {
        self.volumes_from.push(image.into());
        self
    }

    /// Adds a device mapping.
    pub fn device(mut self, device: DeviceMapping) -> Self {
        self.devices.push(device);
        self
    }

    /// Adds an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Sets the command override.
    pub fn command(mut self, command: Vec<String>) -> Self {
        self.command = Some(command);
        self
    }
}

/// Options for [`Node::execute`].
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// User to run the command as (container default when `None`).
    pub user: Option<String>,

    /// Capture output without mirroring it to the log stream.
    pub quiet: bool,

    /// Return immediately without waiting for completion.
    pub detach: bool,
}

impl ExecuteOptions {
    /// Sets the user to run as.
    pub fn as_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Suppresses output mirroring.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Runs the command detached.
    pub fn detached(mut self) -> Self {
        self.detach = true;
        self
    }
}

/// Outcome of a command executed on a node.
///
/// The exit code is `None` exactly when the command was invoked detached:
/// the call returned before completion and the status is not yet known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit status, or `None` while a detached command is pending.
    pub exit_code: Option<i64>,

    /// Combined output text. Empty for detached invocations.
    pub output: String,
}

impl CommandResult {
    /// Creates a result.
    pub fn new(exit_code: Option<i64>, output: String) -> Self {
        Self { exit_code, output }
    }

    /// Result of a detached invocation whose status is not yet known.
    pub fn pending() -> Self {
        Self {
            exit_code: None,
            output: String::new(),
        }
    }

    /// Returns true for a detached result with no exit status yet.
    pub fn is_pending(&self) -> bool {
        self.exit_code.is_none()
    }

    /// Returns true if the command completed with exit code zero.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runtime-assigned state, set during create/start and cleared on remove.
#[derive(Debug, Default)]
struct NodeState {
    container_id: Option<ContainerId>,
    ip_address: Option<IpAddr>,
    host_ports: BTreeMap<u16, u16>,
}

/// One cluster member.
pub struct Node {
    config: NodeConfig,
    cluster_name: String,
    network_name: String,
    labels: HashMap<String, String>,
    start_timeout: Duration,
    runtime: Arc<dyn RuntimeClient>,
    state: RwLock<NodeState>,
}

impl Node {
    /// Creates a node specification bound to a cluster and runtime.
    ///
    /// No runtime resource exists until [`Node::create`] is called.
    pub(crate) fn new(
        config: NodeConfig,
        cluster_name: impl Into<String>,
        network_name: impl Into<String>,
        labels: HashMap<String, String>,
        start_timeout: Duration,
        runtime: Arc<dyn RuntimeClient>,
    ) -> Self {
        Self {
            config,
            cluster_name: cluster_name.into(),
            network_name: network_name.into(),
            labels,
            start_timeout,
            runtime,
            state: RwLock::new(NodeState::default()),
        }
    }

    /// Returns the node name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the group this node belongs to.
    pub fn group(&self) -> &str {
        &self.config.group
    }

    /// Returns the image reference.
    pub fn image(&self) -> &str {
        &self.config.image
    }

    /// Returns the fully qualified hostname (`name.network`).
    pub fn hostname(&self) -> String {
        format!("{}.{}", self.config.name, self.network_name)
    }

    /// Returns the container name used on the runtime
    /// (`cluster-name-node-name`).
    pub fn container_name(&self) -> String {
        format!("{}-{}", self.cluster_name, self.config.name)
    }

    /// Returns the container identity, if materialized.
    pub async fn container_id(&self) -> Option<ContainerId> {
        self.state.read().await.container_id.clone()
    }

    /// Returns the IP address on the cluster network, if started.
    pub async fn ip_address(&self) -> Option<IpAddr> {
        self.state.read().await.ip_address
    }

    /// Returns the realized host-port mappings (container port -> host port).
    pub async fn host_ports(&self) -> BTreeMap<u16, u16> {
        self.state.read().await.host_ports.clone()
    }

    /// Materializes the node: creates its container attached to `network`.
    ///
    /// Calling `create` on a node that already has an identity fails with
    /// `AlreadyExists` instead of silently recreating; callers that need a
    /// replacement must `remove` first.
    pub async fn create(&self, network: &NetworkHandle) -> Result<()> {
        if self.container_id().await.is_some() {
            return Err(OrchestratorError::already_exists(format!(
                "node {} already has a container",
                self.config.name
            )));
        }

        let volumes_from = self.create_volume_donors().await?;

        // Containers get the host's clock and host-like privileges so they
        // behave as regular cluster machines rather than single-process
        // containers.
        let mut volumes = vec![VolumeMount::bind("/etc/localtime", "/etc/localtime")];
        volumes.extend(self.config.volumes.iter().cloned());

        let spec = ContainerSpec {
            name: self.container_name(),
            hostname: Some(self.hostname()),
            image: self.config.image.clone(),
            command: self.config.command.clone(),
            env: self.config.environment.clone(),
            labels: self.labels.clone(),
            ports: self.config.ports.clone(),
            volumes,
            volumes_from,
            devices: self.config.devices.clone(),
            network: Some(NetworkAttachment {
                network: network.name.clone(),
                alias: self.config.name.clone(),
            }),
            cap_add: vec!["ALL".to_string()],
            security_opt: vec!["seccomp=unconfined".to_string()],
        };

        let id = self
            .runtime
            .create_container(&spec)
            .await
            .map_err(|e| match e {
                RuntimeError::Conflict(_) => OrchestratorError::already_exists(format!(
                    "container name {} already in use",
                    self.container_name()
                )),
                other => OrchestratorError::Runtime(other),
            })?;

        debug!(node = %self.config.name, container = %id, "created container");
        self.state.write().await.container_id = Some(id);
        Ok(())
    }

    /// Creates (without starting) a donor container for every `volumes_from`
    /// image, pulling the image first when it is missing locally.
    async fn create_volume_donors(&self) -> Result<Vec<ContainerId>> {
        let mut donors = Vec::new();
        for image in &self.config.volumes_from {
            // Empty name: the runtime assigns one, donors are anonymous.
            let spec = ContainerSpec::new("", image.clone());
            let id = match self.runtime.create_container(&spec).await {
                Ok(id) => id,
                Err(e) if e.is_not_found() => {
                    info!(image = %image, "volume donor image missing locally, pulling");
                    self.runtime.pull_image(image).await?;
                    self.runtime.create_container(&spec).await?
                }
                Err(e) => return Err(e.into()),
            };
            donors.push(id);
        }
        Ok(donors)
    }

    /// Starts the container and waits until it is running with an IP
    /// address on the cluster network.
    ///
    /// Dependents may need the IP immediately, so this does not return
    /// until the address is observable through inspection (or the start
    /// timeout elapses).
    pub async fn start(&self) -> Result<()> {
        let id = self.container_id().await.ok_or_else(|| {
            OrchestratorError::invalid_state("start", "no container created")
        })?;

        info!(node = %self.config.name, "starting node");
        self.runtime.start_container(&id).await.map_err(|e| {
            OrchestratorError::start_failed(&self.config.name, e.to_string())
        })?;

        let deadline = Instant::now() + self.start_timeout;
        loop {
            let report = self.runtime.inspect_container(&id).await.map_err(|e| {
                OrchestratorError::start_failed(&self.config.name, e.to_string())
            })?;

            if report.running {
                if let Some(ip) = report.ip_on(&self.network_name) {
                    let mut state = self.state.write().await;
                    state.ip_address = Some(ip);
                    state.host_ports = report.host_ports;
                    info!(
                        node = %self.config.name,
                        hostname = %self.hostname(),
                        ip = %ip,
                        "node running"
                    );
                    return Ok(());
                }
            }

            if Instant::now() >= deadline {
                return Err(OrchestratorError::start_failed(
                    &self.config.name,
                    format!(
                        "timed out after {:?} waiting for running state and IP address",
                        self.start_timeout
                    ),
                ));
            }

            tokio::time::sleep(START_POLL_INTERVAL).await;
        }
    }

    /// Executes a shell command on the node.
    ///
    /// The command string is interpreted by `/bin/sh -c`, so pipes and
    /// redirects work. A non-zero exit code is returned in the result, not
    /// raised; only runtime-level failures produce an error.
    pub async fn execute(&self, command: &str, options: ExecuteOptions) -> Result<CommandResult> {
        let id = self
            .container_id()
            .await
            .ok_or_else(|| OrchestratorError::NotRunning(self.config.name.clone()))?;

        debug!(node = %self.config.name, command = %command, "executing command");

        let mut request = ExecRequest::shell(command);
        request.user = options.user.clone();
        request.detach = options.detach;

        let result = self.runtime.exec(&id, &request).await.map_err(|e| match e {
            RuntimeError::NotRunning(_) => OrchestratorError::NotRunning(self.config.name.clone()),
            other => OrchestratorError::execution(&self.config.name, other.to_string()),
        })?;

        if options.detach {
            return Ok(CommandResult::pending());
        }

        if !options.quiet && !result.output.is_empty() {
            info!(node = %self.config.name, output = %result.output.trim_end(), "command output");
        }

        Ok(CommandResult::new(result.exit_code, result.output))
    }

    /// Copies a local file or directory tree into the node.
    pub async fn put_file(&self, local_path: &Path, container_path: &str) -> Result<()> {
        let id = self
            .container_id()
            .await
            .ok_or_else(|| OrchestratorError::NotRunning(self.config.name.clone()))?;

        if !local_path.exists() {
            return Err(OrchestratorError::file_transfer(
                &self.config.name,
                format!("local path {} does not exist", local_path.display()),
            ));
        }

        self.runtime
            .copy_to_container(&id, local_path, container_path)
            .await
            .map_err(|e| OrchestratorError::file_transfer(&self.config.name, e.to_string()))?;

        debug!(
            node = %self.config.name,
            from = %local_path.display(),
            to = %container_path,
            "copied into node"
        );
        Ok(())
    }

    /// Copies a file or directory tree out of the node.
    pub async fn get_file(&self, container_path: &str, local_path: &Path) -> Result<()> {
        let id = self
            .container_id()
            .await
            .ok_or_else(|| OrchestratorError::NotRunning(self.config.name.clone()))?;

        self.runtime
            .copy_from_container(&id, container_path, local_path)
            .await
            .map_err(|e| OrchestratorError::file_transfer(&self.config.name, e.to_string()))?;

        debug!(
            node = %self.config.name,
            from = %container_path,
            to = %local_path.display(),
            "copied out of node"
        );
        Ok(())
    }

    /// Commits the node's container to a local image.
    pub async fn commit(&self, repository: &str, tag: Option<&str>) -> Result<()> {
        let id = self
            .container_id()
            .await
            .ok_or_else(|| OrchestratorError::NotRunning(self.config.name.clone()))?;

        self.runtime
            .commit_container(&id, repository, tag)
            .await
            .map_err(OrchestratorError::Runtime)
    }

    /// Stops the node. A node that is not materialized or not running is
    /// left alone (no-op).
    pub async fn stop(&self) -> Result<()> {
        let Some(id) = self.container_id().await else {
            debug!(node = %self.config.name, "stop: node has no container");
            return Ok(());
        };

        match self.runtime.stop_container(&id, STOP_TIMEOUT_SECS).await {
            Ok(()) => {
                info!(node = %self.config.name, "stopped node");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(node = %self.config.name, "stop: container already gone");
                Ok(())
            }
            Err(RuntimeError::NotRunning(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes the node's container and clears its identity and IP.
    ///
    /// The node must be stopped first.
    pub async fn remove(&self) -> Result<()> {
        let Some(id) = self.container_id().await else {
            debug!(node = %self.config.name, "remove: node has no container");
            return Ok(());
        };

        match self.runtime.inspect_container(&id).await {
            Ok(report) if report.running => {
                return Err(OrchestratorError::invalid_state("remove", "running"));
            }
            Ok(_) => {}
            // Already gone out of band; fall through and clear our state.
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        match self.runtime.remove_container(&id, true).await {
            Ok(()) | Err(RuntimeError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let mut state = self.state.write().await;
        state.container_id = None;
        state.ip_address = None;
        state.host_ports.clear();
        info!(node = %self.config.name, "removed node");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_config_builder() {
        let config = NodeConfig::new("node-1", "nodes", "centos:7")
            .port(PortMapping::tcp(80).host_port(8080))
            .volume(VolumeMount::bind("/data", "/data"))
            .env("CLUSTER", "test")
            .command(vec!["/sbin/init".to_string()]);

        assert_eq!(config.name, "node-1");
        assert_eq!(config.group, "nodes");
        assert_eq!(config.ports.len(), 1);
        assert_eq!(config.volumes.len(), 1);
        assert_eq!(config.environment.get("CLUSTER"), Some(&"test".to_string()));
        assert_eq!(config.command.as_deref(), Some(&["/sbin/init".to_string()][..]));
    }

    #[test]
    fn test_command_result_pending() {
        let result = CommandResult::pending();
        assert!(result.is_pending());
        assert!(!result.success());

        let result = CommandResult::new(Some(0), "hi\n".to_string());
        assert!(!result.is_pending());
        assert!(result.success());

        let result = CommandResult::new(Some(2), String::new());
        assert!(!result.success());
    }

    #[test]
    fn test_execute_options_builder() {
        let options = ExecuteOptions::default().as_user("root").quiet().detached();
        assert_eq!(options.user.as_deref(), Some("root"));
        assert!(options.quiet);
        assert!(options.detach);
    }
}

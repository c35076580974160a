//! In-memory runtime client for orchestration tests.
//!
//! Mimics the observable behavior of a container runtime: name conflicts,
//! image presence, network attachment bookkeeping, shell-ish exec, and
//! archive-style file transfer. Tests can seed images, script failures, and
//! inspect what the orchestrator did.

#![allow(dead_code)]

use async_trait::async_trait;
use berth_runtime::{
    ContainerId, ContainerReport, ContainerSpec, ContainerSummary, ExecRequest, ExecResult,
    NetworkId, NetworkOptions, NetworkReport, Result, RuntimeClient, RuntimeError,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

struct FakeContainer {
    id: ContainerId,
    spec: ContainerSpec,
    running: bool,
    ip: Option<IpAddr>,
    host_ports: BTreeMap<u16, u16>,
}

struct FakeNetwork {
    id: NetworkId,
    name: String,
    created: String,
    attached: Vec<String>,
}

#[derive(Default)]
struct Inner {
    containers: HashMap<String, FakeContainer>,
    networks: HashMap<String, FakeNetwork>,
    local_images: HashSet<String>,
    registry_images: HashSet<String>,
    files: HashMap<(String, String), Vec<u8>>,
    exec_responses: HashMap<String, (i64, String)>,
    pull_failures: HashMap<String, String>,
    start_failures: HashSet<String>,
    pulls: Vec<String>,
}

/// Scriptable in-memory implementation of [`RuntimeClient`].
#[derive(Default)]
pub struct FakeRuntime {
    inner: Mutex<Inner>,
    counter: AtomicU64,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Makes an image available locally without a pull.
    pub fn add_local_image(&self, reference: &str) {
        self.inner
            .lock()
            .unwrap()
            .local_images
            .insert(reference.to_string());
    }

    /// Makes an image pullable from the fake registry.
    pub fn add_registry_image(&self, reference: &str) {
        self.inner
            .lock()
            .unwrap()
            .registry_images
            .insert(reference.to_string());
    }

    /// Scripts a registry failure for a reference.
    pub fn fail_pull(&self, reference: &str, reason: &str) {
        self.inner
            .lock()
            .unwrap()
            .pull_failures
            .insert(reference.to_string(), reason.to_string());
    }

    /// Scripts a start failure for a container name.
    pub fn fail_start(&self, container_name: &str) {
        self.inner
            .lock()
            .unwrap()
            .start_failures
            .insert(container_name.to_string());
    }

    /// Scripts the outcome of a specific exec command.
    pub fn set_exec_response(&self, command: &str, exit_code: i64, output: &str) {
        self.inner
            .lock()
            .unwrap()
            .exec_responses
            .insert(command.to_string(), (exit_code, output.to_string()));
    }

    /// Seeds a network directly, bypassing duplicate checks.
    pub fn seed_network(&self, name: &str, created: &str, attached: &[&str]) -> NetworkId {
        let id = NetworkId::new(format!("seeded-net-{}", self.next()));
        let network = FakeNetwork {
            id: id.clone(),
            name: name.to_string(),
            created: created.to_string(),
            attached: attached.iter().map(|s| s.to_string()).collect(),
        };
        self.inner
            .lock()
            .unwrap()
            .networks
            .insert(id.as_str().to_string(), network);
        id
    }

    /// Seeds a stopped container with the given name and labels.
    pub fn seed_container(&self, name: &str, labels: HashMap<String, String>) {
        let id = ContainerId::new(format!("seeded-{}", self.next()));
        let mut spec = ContainerSpec::new(name, "seeded:latest");
        spec.labels = labels;
        let container = FakeContainer {
            id: id.clone(),
            spec,
            running: false,
            ip: None,
            host_ports: BTreeMap::new(),
        };
        self.inner
            .lock()
            .unwrap()
            .containers
            .insert(id.as_str().to_string(), container);
    }

    pub fn container_count(&self) -> usize {
        self.inner.lock().unwrap().containers.len()
    }

    pub fn network_count(&self) -> usize {
        self.inner.lock().unwrap().networks.len()
    }

    /// Returns every pull that happened, in order.
    pub fn pulls(&self) -> Vec<String> {
        self.inner.lock().unwrap().pulls.clone()
    }

    pub fn has_container_named(&self, name: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .containers
            .values()
            .any(|c| c.spec.name == name)
    }
}

#[async_trait]
impl RuntimeClient for FakeRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId> {
        let sequence = self.next();
        let mut inner = self.inner.lock().unwrap();

        if !inner.local_images.contains(&spec.image) {
            return Err(RuntimeError::not_found(format!("image {}", spec.image)));
        }

        let mut spec = spec.clone();
        if spec.name.is_empty() {
            spec.name = format!("anonymous-{}", sequence);
        } else if inner.containers.values().any(|c| c.spec.name == spec.name) {
            return Err(RuntimeError::conflict(format!("container {}", spec.name)));
        }

        let id = ContainerId::new(format!("container-{:08}", sequence));

        if let Some(attachment) = &spec.network {
            let network_name = attachment.network.clone();
            let container_name = spec.name.clone();
            if let Some(network) = inner
                .networks
                .values_mut()
                .find(|n| n.name == network_name)
            {
                network.attached.push(container_name);
            }
        }

        inner.containers.insert(
            id.as_str().to_string(),
            FakeContainer {
                id: id.clone(),
                spec,
                running: false,
                ip: None,
                host_ports: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<()> {
        let octet = self.next();
        let mut inner = self.inner.lock().unwrap();

        let failures = inner.start_failures.clone();
        let container = inner
            .containers
            .get_mut(id.as_str())
            .ok_or_else(|| RuntimeError::not_found(format!("container {}", id)))?;

        if failures.contains(&container.spec.name) {
            return Err(RuntimeError::Io(std::io::Error::other(
                "injected start failure",
            )));
        }

        container.running = true;
        if container.spec.network.is_some() {
            container.ip = Some(IpAddr::V4(Ipv4Addr::new(172, 18, 0, (octet % 250) as u8 + 2)));
        }
        for mapping in &container.spec.ports {
            let host_port = mapping
                .host_port
                .unwrap_or_else(|| 49152 + (octet % 16000) as u16);
            container.host_ports.insert(mapping.container_port, host_port);
        }
        Ok(())
    }

    async fn stop_container(&self, id: &ContainerId, _timeout_secs: u32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let container = inner
            .containers
            .get_mut(id.as_str())
            .ok_or_else(|| RuntimeError::not_found(format!("container {}", id)))?;
        container.running = false;
        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId, _remove_volumes: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();

        let container = inner
            .containers
            .get(id.as_str())
            .ok_or_else(|| RuntimeError::not_found(format!("container {}", id)))?;
        if container.running {
            return Err(RuntimeError::conflict(format!(
                "container {} is running",
                container.spec.name
            )));
        }

        let name = container.spec.name.clone();
        inner.containers.remove(id.as_str());
        for network in inner.networks.values_mut() {
            network.attached.retain(|attached| attached != &name);
        }
        Ok(())
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerReport> {
        let inner = self.inner.lock().unwrap();
        let container = inner
            .containers
            .get(id.as_str())
            .ok_or_else(|| RuntimeError::not_found(format!("container {}", id)))?;

        let mut ip_addresses = HashMap::new();
        if let (Some(attachment), Some(ip)) = (&container.spec.network, container.ip) {
            ip_addresses.insert(attachment.network.clone(), ip);
        }

        Ok(ContainerReport {
            id: container.id.as_str().to_string(),
            name: container.spec.name.clone(),
            running: container.running,
            ip_addresses,
            host_ports: container.host_ports.clone(),
        })
    }

    async fn list_containers(&self, label_key: &str) -> Result<Vec<ContainerSummary>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .containers
            .values()
            .filter(|c| c.spec.labels.contains_key(label_key))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.spec.name.clone(),
                labels: c.spec.labels.clone(),
            })
            .collect())
    }

    async fn commit_container(
        &self,
        id: &ContainerId,
        repository: &str,
        tag: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.containers.contains_key(id.as_str()) {
            return Err(RuntimeError::not_found(format!("container {}", id)));
        }
        let reference = match tag {
            Some(tag) => format!("{}:{}", repository, tag),
            None => repository.to_string(),
        };
        inner.local_images.insert(reference);
        Ok(())
    }

    async fn exec(&self, id: &ContainerId, request: &ExecRequest) -> Result<ExecResult> {
        let inner = self.inner.lock().unwrap();
        let container = inner
            .containers
            .get(id.as_str())
            .ok_or_else(|| RuntimeError::not_found(format!("container {}", id)))?;

        if !container.running {
            return Err(RuntimeError::not_running(container.spec.name.clone()));
        }

        if request.detach {
            return Ok(ExecResult::pending());
        }

        if let Some((exit_code, output)) = inner.exec_responses.get(&request.command) {
            return Ok(ExecResult {
                exit_code: Some(*exit_code),
                output: output.clone(),
            });
        }

        // Enough shell to make tests read naturally.
        if let Some(rest) = request.command.strip_prefix("echo ") {
            return Ok(ExecResult {
                exit_code: Some(0),
                output: format!("{}\n", rest),
            });
        }

        Ok(ExecResult {
            exit_code: Some(0),
            output: String::new(),
        })
    }

    async fn copy_to_container(
        &self,
        id: &ContainerId,
        local_path: &Path,
        container_path: &str,
    ) -> Result<()> {
        let contents = std::fs::read(local_path)?;
        let mut inner = self.inner.lock().unwrap();
        if !inner.containers.contains_key(id.as_str()) {
            return Err(RuntimeError::not_found(format!("container {}", id)));
        }
        inner
            .files
            .insert((id.as_str().to_string(), container_path.to_string()), contents);
        Ok(())
    }

    async fn copy_from_container(
        &self,
        id: &ContainerId,
        container_path: &str,
        local_path: &Path,
    ) -> Result<()> {
        let contents = {
            let inner = self.inner.lock().unwrap();
            inner
                .files
                .get(&(id.as_str().to_string(), container_path.to_string()))
                .cloned()
                .ok_or_else(|| RuntimeError::not_found(format!("path {}", container_path)))?
        };
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(local_path, contents)?;
        Ok(())
    }

    async fn create_network(&self, options: &NetworkOptions) -> Result<NetworkId> {
        let sequence = self.next();
        let mut inner = self.inner.lock().unwrap();

        if inner.networks.values().any(|n| n.name == options.name) {
            return Err(RuntimeError::conflict(format!("network {}", options.name)));
        }

        let id = NetworkId::new(format!("network-{:08}", sequence));
        inner.networks.insert(
            id.as_str().to_string(),
            FakeNetwork {
                id: id.clone(),
                name: options.name.clone(),
                created: format!("2024-01-01T00:00:{:02}Z", sequence % 60),
                attached: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn list_networks(&self, name: &str) -> Result<Vec<NetworkReport>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .networks
            .values()
            .filter(|n| n.name == name)
            .map(|n| NetworkReport {
                id: n.id.clone(),
                name: n.name.clone(),
                created: Some(n.created.clone()),
                attached_containers: n.attached.clone(),
            })
            .collect())
    }

    async fn inspect_network(&self, id: &NetworkId) -> Result<NetworkReport> {
        let inner = self.inner.lock().unwrap();
        let network = inner
            .networks
            .get(id.as_str())
            .ok_or_else(|| RuntimeError::not_found(format!("network {}", id)))?;
        Ok(NetworkReport {
            id: network.id.clone(),
            name: network.name.clone(),
            created: Some(network.created.clone()),
            attached_containers: network.attached.clone(),
        })
    }

    async fn remove_network(&self, id: &NetworkId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let network = inner
            .networks
            .get(id.as_str())
            .ok_or_else(|| RuntimeError::not_found(format!("network {}", id)))?;
        if !network.attached.is_empty() {
            return Err(RuntimeError::conflict(format!(
                "network {} has active endpoints",
                network.name
            )));
        }
        inner.networks.remove(id.as_str());
        Ok(())
    }

    async fn pull_image(&self, reference: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.pulls.push(reference.to_string());

        if let Some(reason) = inner.pull_failures.get(reference) {
            return Err(RuntimeError::registry(reference, reason.clone()));
        }
        if !inner.registry_images.contains(reference) {
            return Err(RuntimeError::image_not_found(reference));
        }
        inner.local_images.insert(reference.to_string());
        Ok(())
    }

    async fn image_exists(&self, reference: &str) -> Result<bool> {
        Ok(self.inner.lock().unwrap().local_images.contains(reference))
    }
}

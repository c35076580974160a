//! Docker implementation of the runtime client.
//!
//! Drives a local Docker daemon through bollard. All orchestrator-facing
//! semantics (shell wrapping for exec, archive transfer for copy, exact-name
//! network listing) live here so other implementations stay interchangeable.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, ListContainersOptions,
    LogOutput, NetworkingConfig, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions, UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::{CommitContainerOptions, CreateImageOptions};
use bollard::network::{CreateNetworkOptions, ListNetworksOptions};
use bollard::service::{EndpointSettings, HostConfig, PortBinding};
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::client::RuntimeClient;
use crate::container::{ContainerId, ContainerReport, ContainerSpec, ContainerSummary};
use crate::error::{Result, RuntimeError};
use crate::exec::{ExecRequest, ExecResult};
use crate::network::{NetworkId, NetworkOptions, NetworkReport};

/// Shell used to interpret exec command strings.
const EXEC_SHELL: &str = "/bin/sh";

/// Runtime client backed by a local Docker daemon.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects to the local Docker daemon and verifies the connection.
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        docker.ping().await?;
        info!("connected to Docker daemon");
        Ok(Self { docker })
    }

    /// Wraps an existing bollard client.
    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

/// Maps Docker HTTP status codes onto runtime error variants.
fn map_api_error(err: bollard::errors::Error, what: &str) -> RuntimeError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::not_found(what),
        bollard::errors::Error::DockerResponseServerError {
            status_code: 409, ..
        } => RuntimeError::conflict(what),
        other => RuntimeError::Api(other),
    }
}

/// Splits a container path into the upload root and the entry name used
/// inside the transfer archive.
fn split_container_path(container_path: &str) -> (String, String) {
    let path = Path::new(container_path);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| container_path.to_string());
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy().into_owned(),
        _ => "/".to_string(),
    };
    (parent, name)
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId> {
        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .ports
            .iter()
            .map(|p| {
                (
                    format!("{}/{}", p.container_port, p.protocol),
                    HashMap::new(),
                )
            })
            .collect();

        // A binding with no host port asks the daemon for an ephemeral one.
        let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
            .ports
            .iter()
            .map(|p| {
                let binding = PortBinding {
                    host_ip: None,
                    host_port: p.host_port.map(|port| port.to_string()),
                };
                (
                    format!("{}/{}", p.container_port, p.protocol),
                    Some(vec![binding]),
                )
            })
            .collect();

        let devices: Vec<bollard::service::DeviceMapping> = spec
            .devices
            .iter()
            .map(|d| bollard::service::DeviceMapping {
                path_on_host: Some(d.host_path.clone()),
                path_in_container: Some(d.container_path.clone()),
                cgroup_permissions: Some(d.permissions.clone()),
            })
            .collect();

        let host_config = HostConfig {
            binds: Some(spec.volumes.iter().map(|v| v.as_docker_bind()).collect()),
            port_bindings: Some(port_bindings),
            devices: if devices.is_empty() {
                None
            } else {
                Some(devices)
            },
            volumes_from: if spec.volumes_from.is_empty() {
                None
            } else {
                Some(
                    spec.volumes_from
                        .iter()
                        .map(|id| id.as_str().to_string())
                        .collect(),
                )
            },
            cap_add: if spec.cap_add.is_empty() {
                None
            } else {
                Some(spec.cap_add.clone())
            },
            security_opt: if spec.security_opt.is_empty() {
                None
            } else {
                Some(spec.security_opt.clone())
            },
            network_mode: spec.network.as_ref().map(|n| n.network.clone()),
            ..Default::default()
        };

        // The network attachment goes into the creation request so DNS
        // aliases resolve from the moment the container starts.
        let networking_config = spec.network.as_ref().map(|attachment| {
            let endpoint = EndpointSettings {
                aliases: Some(vec![attachment.alias.clone()]),
                ..Default::default()
            };
            NetworkingConfig {
                endpoints_config: HashMap::from([(attachment.network.clone(), endpoint)]),
            }
        });

        let config = Config {
            hostname: spec.hostname.clone(),
            image: Some(spec.image.clone()),
            cmd: spec.command.clone(),
            env: Some(env),
            labels: Some(spec.labels.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            networking_config,
            ..Default::default()
        };

        // An empty name asks the daemon to generate one.
        let options = if spec.name.is_empty() {
            None
        } else {
            Some(CreateContainerOptions {
                name: spec.name.as_str(),
                platform: None,
            })
        };

        let response = self
            .docker
            .create_container(options, config)
            .await
            .map_err(|e| map_api_error(e, &format!("container {}", spec.name)))?;

        debug!(container = %spec.name, id = %response.id, "created container");
        Ok(ContainerId::new(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<()> {
        self.docker
            .start_container(id.as_str(), None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_api_error(e, &format!("container {}", id)))?;
        debug!(container = %id, "started container");
        Ok(())
    }

    async fn stop_container(&self, id: &ContainerId, timeout_secs: u32) -> Result<()> {
        let options = StopContainerOptions {
            t: i64::from(timeout_secs),
        };
        self.docker
            .stop_container(id.as_str(), Some(options))
            .await
            .map_err(|e| map_api_error(e, &format!("container {}", id)))?;
        debug!(container = %id, "stopped container");
        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId, remove_volumes: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            v: remove_volumes,
            ..Default::default()
        };
        self.docker
            .remove_container(id.as_str(), Some(options))
            .await
            .map_err(|e| map_api_error(e, &format!("container {}", id)))?;
        debug!(container = %id, "removed container");
        Ok(())
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerReport> {
        let inspect = self
            .docker
            .inspect_container(id.as_str(), None)
            .await
            .map_err(|e| map_api_error(e, &format!("container {}", id)))?;

        let mut report = ContainerReport {
            id: inspect.id.unwrap_or_else(|| id.as_str().to_string()),
            name: inspect
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            running: inspect
                .state
                .as_ref()
                .and_then(|s| s.running)
                .unwrap_or(false),
            ..Default::default()
        };

        if let Some(settings) = inspect.network_settings {
            if let Some(networks) = settings.networks {
                for (network, endpoint) in networks {
                    if let Some(ip) = endpoint.ip_address.as_deref().filter(|ip| !ip.is_empty()) {
                        if let Ok(addr) = ip.parse() {
                            report.ip_addresses.insert(network, addr);
                        }
                    }
                }
            }
            if let Some(ports) = settings.ports {
                for (spec, bindings) in ports {
                    let container_port = spec
                        .split('/')
                        .next()
                        .and_then(|p| p.parse::<u16>().ok());
                    let host_port = bindings
                        .and_then(|b| b.into_iter().next())
                        .and_then(|b| b.host_port)
                        .and_then(|p| p.parse::<u16>().ok());
                    if let (Some(cp), Some(hp)) = (container_port, host_port) {
                        report.host_ports.insert(cp, hp);
                    }
                }
            }
        }

        Ok(report)
    }

    async fn list_containers(&self, label_key: &str) -> Result<Vec<ContainerSummary>> {
        let filters: HashMap<String, Vec<String>> =
            HashMap::from([("label".to_string(), vec![label_key.to_string()])]);

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let summaries = self.docker.list_containers(Some(options)).await?;

        Ok(summaries
            .into_iter()
            .map(|c| ContainerSummary {
                id: ContainerId::new(c.id.unwrap_or_default()),
                name: c
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default(),
                labels: c.labels.unwrap_or_default(),
            })
            .collect())
    }

    async fn commit_container(
        &self,
        id: &ContainerId,
        repository: &str,
        tag: Option<&str>,
    ) -> Result<()> {
        let options = CommitContainerOptions {
            container: id.as_str().to_string(),
            repo: repository.to_string(),
            tag: tag.unwrap_or_default().to_string(),
            pause: true,
            ..Default::default()
        };

        self.docker
            .commit_container(options, Config::<String>::default())
            .await
            .map_err(|e| map_api_error(e, &format!("container {}", id)))?;

        info!(container = %id, repository = %repository, "committed container");
        Ok(())
    }

    async fn exec(&self, id: &ContainerId, request: &ExecRequest) -> Result<ExecResult> {
        let exec_options = CreateExecOptions {
            cmd: Some(vec![
                EXEC_SHELL.to_string(),
                "-c".to_string(),
                request.command.clone(),
            ]),
            user: request.user.clone(),
            attach_stdout: Some(!request.detach),
            attach_stderr: Some(!request.detach),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(id.as_str(), exec_options)
            .await
            .map_err(|e| match e {
                // The daemon answers 409 when the container is not running.
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 409, ..
                } => RuntimeError::not_running(id.to_string()),
                other => map_api_error(other, &format!("container {}", id)),
            })?;

        if request.detach {
            let options = StartExecOptions {
                detach: true,
                ..Default::default()
            };
            self.docker.start_exec(&exec.id, Some(options)).await?;
            return Ok(ExecResult::pending());
        }

        let start_result = self.docker.start_exec(&exec.id, None).await?;

        let mut output = String::new();
        if let StartExecResults::Attached {
            output: mut stream, ..
        } = start_result
        {
            while let Some(chunk) = stream.next().await {
                match chunk? {
                    LogOutput::StdOut { message } | LogOutput::StdErr { message } => {
                        output.push_str(&String::from_utf8_lossy(&message));
                    }
                    _ => {}
                }
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;

        Ok(ExecResult {
            exit_code: inspect.exit_code,
            output,
        })
    }

    async fn copy_to_container(
        &self,
        id: &ContainerId,
        local_path: &Path,
        container_path: &str,
    ) -> Result<()> {
        let (upload_root, entry_name) = split_container_path(container_path);

        let metadata = std::fs::metadata(local_path)?;
        let mut builder = tar::Builder::new(Vec::new());
        if metadata.is_dir() {
            builder.append_dir_all(&entry_name, local_path)?;
        } else {
            builder.append_path_with_name(local_path, &entry_name)?;
        }
        let archive = builder.into_inner()?;

        let options = UploadToContainerOptions {
            path: upload_root,
            ..Default::default()
        };

        self.docker
            .upload_to_container(id.as_str(), Some(options), archive.into())
            .await
            .map_err(|e| map_api_error(e, &format!("container {}", id)))?;

        debug!(container = %id, path = %container_path, "uploaded archive");
        Ok(())
    }

    async fn copy_from_container(
        &self,
        id: &ContainerId,
        container_path: &str,
        local_path: &Path,
    ) -> Result<()> {
        let options = DownloadFromContainerOptions {
            path: container_path.to_string(),
        };

        let mut stream = self.docker.download_from_container(id.as_str(), Some(options));
        let mut archive = Vec::new();
        while let Some(chunk) = stream.next().await {
            let bytes =
                chunk.map_err(|e| map_api_error(e, &format!("path {} in {}", container_path, id)))?;
            archive.extend_from_slice(&bytes);
        }

        let parent = local_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        tar::Archive::new(archive.as_slice()).unpack(parent)?;

        // The archive is rooted at the source's basename; move it to the
        // requested destination name when they differ.
        let (_, entry_name) = split_container_path(container_path);
        let unpacked = parent.join(&entry_name);
        if unpacked != local_path && unpacked.exists() {
            std::fs::rename(&unpacked, local_path)?;
        }

        debug!(container = %id, path = %container_path, "downloaded archive");
        Ok(())
    }

    async fn create_network(&self, options: &NetworkOptions) -> Result<NetworkId> {
        let config = CreateNetworkOptions {
            name: options.name.as_str(),
            driver: options.driver.as_str(),
            check_duplicate: true,
            labels: options
                .labels
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_network(config)
            .await
            .map_err(|e| map_api_error(e, &format!("network {}", options.name)))?;

        let id = response.id.unwrap_or_default();
        info!(network = %options.name, id = %id, "created network");
        Ok(NetworkId::new(id))
    }

    async fn list_networks(&self, name: &str) -> Result<Vec<NetworkReport>> {
        let filters: HashMap<String, Vec<String>> =
            HashMap::from([("name".to_string(), vec![name.to_string()])]);

        let networks = self
            .docker
            .list_networks(Some(ListNetworksOptions { filters }))
            .await?;

        // The name filter is a substring match; keep exact matches only, and
        // re-inspect each so attached containers are populated.
        let mut reports = Vec::new();
        for network in networks {
            if network.name.as_deref() != Some(name) {
                continue;
            }
            if let Some(id) = network.id {
                reports.push(self.inspect_network(&NetworkId::new(id)).await?);
            }
        }
        Ok(reports)
    }

    async fn inspect_network(&self, id: &NetworkId) -> Result<NetworkReport> {
        let network = self
            .docker
            .inspect_network::<String>(id.as_str(), None)
            .await
            .map_err(|e| map_api_error(e, &format!("network {}", id)))?;

        Ok(NetworkReport {
            id: NetworkId::new(network.id.unwrap_or_else(|| id.as_str().to_string())),
            name: network.name.unwrap_or_default(),
            created: network.created,
            attached_containers: network
                .containers
                .unwrap_or_default()
                .into_values()
                .filter_map(|c| c.name)
                .collect(),
        })
    }

    async fn remove_network(&self, id: &NetworkId) -> Result<()> {
        self.docker
            .remove_network(id.as_str())
            .await
            .map_err(|e| map_api_error(e, &format!("network {}", id)))?;
        info!(network = %id, "removed network");
        Ok(())
    }

    async fn pull_image(&self, reference: &str) -> Result<()> {
        info!(image = %reference, "pulling image");

        let options = CreateImageOptions {
            from_image: reference,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(progress) = stream.next().await {
            match progress {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(image = %reference, status = %status, "pull progress");
                    }
                }
                Err(bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                }) => {
                    return Err(RuntimeError::image_not_found(reference));
                }
                Err(e) => {
                    return Err(RuntimeError::registry(reference, e.to_string()));
                }
            }
        }

        info!(image = %reference, "pull complete");
        Ok(())
    }

    async fn image_exists(&self, reference: &str) -> Result<bool> {
        match self.docker.inspect_image(reference).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(RuntimeError::Api(e)),
        }
    }
}

//! Runtime client trait definition.
//!
//! This module defines the boundary between the cluster model and the
//! container runtime. Everything the orchestrator does to containers,
//! networks, and images goes through [`RuntimeClient`]; production code uses
//! the Docker-backed implementation, tests substitute an in-memory one.

use async_trait::async_trait;
use std::path::Path;

use crate::container::{ContainerId, ContainerReport, ContainerSpec, ContainerSummary};
use crate::error::Result;
use crate::exec::{ExecRequest, ExecResult};
use crate::network::{NetworkId, NetworkOptions, NetworkReport};

/// Client interface to a container runtime.
///
/// Implementations must be thread-safe (`Send + Sync`); the orchestrator
/// drives many containers concurrently through a single shared client.
///
/// # Contract notes
///
/// - `create_container` only creates; `start_container` is a separate step so
///   callers can record the identity before anything runs.
/// - `exec` wraps the request's command string in a shell. Passing the
///   literal argv is deliberately not supported at this boundary.
/// - Copy operations use the runtime's archive transfer primitives and
///   handle both single files and directory trees.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Creates a container from the given spec without starting it.
    ///
    /// Fails with a conflict error if the container name is already in use.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId>;

    /// Starts a created container.
    async fn start_container(&self, id: &ContainerId) -> Result<()>;

    /// Stops a running container, waiting up to `timeout_secs` before the
    /// runtime kills it.
    async fn stop_container(&self, id: &ContainerId, timeout_secs: u32) -> Result<()>;

    /// Removes a container, optionally discarding its anonymous volumes.
    async fn remove_container(&self, id: &ContainerId, remove_volumes: bool) -> Result<()>;

    /// Inspects a container: running state, per-network IP addresses, and
    /// realized host-port mappings.
    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerReport>;

    /// Lists all containers (running or not) carrying the given label key.
    async fn list_containers(&self, label_key: &str) -> Result<Vec<ContainerSummary>>;

    /// Commits a container's filesystem to a local image.
    async fn commit_container(
        &self,
        id: &ContainerId,
        repository: &str,
        tag: Option<&str>,
    ) -> Result<()>;

    /// Executes a shell command inside a running container.
    ///
    /// Detached requests return a pending result immediately; attached
    /// requests block until the command exits and return its exit code with
    /// the combined output.
    async fn exec(&self, id: &ContainerId, request: &ExecRequest) -> Result<ExecResult>;

    /// Copies a local file or directory tree into the container at
    /// `container_path`.
    async fn copy_to_container(
        &self,
        id: &ContainerId,
        local_path: &Path,
        container_path: &str,
    ) -> Result<()>;

    /// Copies a file or directory tree out of the container to `local_path`.
    async fn copy_from_container(
        &self,
        id: &ContainerId,
        container_path: &str,
        local_path: &Path,
    ) -> Result<()>;

    /// Creates a network.
    async fn create_network(&self, options: &NetworkOptions) -> Result<NetworkId>;

    /// Lists networks whose name matches `name` exactly.
    ///
    /// The runtime can report more than one match for the same name; callers
    /// must be prepared to disambiguate.
    async fn list_networks(&self, name: &str) -> Result<Vec<NetworkReport>>;

    /// Inspects a network, including its currently attached containers.
    async fn inspect_network(&self, id: &NetworkId) -> Result<NetworkReport>;

    /// Removes a network.
    async fn remove_network(&self, id: &NetworkId) -> Result<()>;

    /// Pulls an image from its registry. Blocks until the pull completes.
    async fn pull_image(&self, reference: &str) -> Result<()>;

    /// Returns whether an image reference exists locally.
    async fn image_exists(&self, reference: &str) -> Result<bool>;
}

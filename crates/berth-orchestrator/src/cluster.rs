//! Top-level cluster orchestration.
//!
//! A [`Cluster`] composes node groups with the shared network and drives
//! the whole set through its lifecycle: `Unbuilt -> NetworkReady ->
//! NodesRunning -> TornDown`. Fan-out operations run with bounded
//! parallelism to keep load on the runtime daemon in check, and they always
//! attempt every node before reporting an aggregate failure.

use berth_runtime::RuntimeClient;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{RwLock, Semaphore};
use tracing::{error, info};

use crate::error::{AggregateFailure, NodeFailure, OrchestratorError, Result};
use crate::group::NodeGroup;
use crate::image::ImageResolver;
use crate::naming::{cluster_label, cluster_name_from_label, generate_cluster_name, CLUSTER_LABEL_KEY};
use crate::network::{NetworkHandle, NetworkManager};
use crate::node::{CommandResult, ExecuteOptions, Node, NodeConfig};
use crate::topology::ClusterConfig;

/// Lifecycle state of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    /// Specification only; no runtime resources exist.
    Unbuilt,

    /// The cluster network exists; nodes are not yet running.
    NetworkReady,

    /// Every node is running with a resolved IP address.
    NodesRunning,

    /// Nodes and (if unused) the network have been removed.
    TornDown,
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbuilt => write!(f, "unbuilt"),
            Self::NetworkReady => write!(f, "network ready"),
            Self::NodesRunning => write!(f, "nodes running"),
            Self::TornDown => write!(f, "torn down"),
        }
    }
}

#[derive(Debug)]
struct ClusterInner {
    state: ClusterState,
    network: Option<NetworkHandle>,
}

/// A full set of node groups plus their shared network.
pub struct Cluster {
    name: String,
    config: ClusterConfig,
    groups: Vec<NodeGroup>,
    labels: HashMap<String, String>,
    resolver: ImageResolver,
    networks: NetworkManager,
    inner: RwLock<ClusterInner>,
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("labels", &self.labels)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl Cluster {
    /// Builds a cluster from node configurations.
    ///
    /// Groups are formed from the `group` field of each node config, in
    /// declaration order. Node names must be unique across the whole
    /// cluster. When the config carries an explicit cluster name, the
    /// runtime is checked for an existing cluster of the same name.
    ///
    /// No runtime resource is created here; everything happens in
    /// [`Cluster::start`].
    pub async fn new(
        config: ClusterConfig,
        node_configs: Vec<NodeConfig>,
        runtime: Arc<dyn RuntimeClient>,
    ) -> Result<Self> {
        if config.namespace.is_empty() {
            return Err(OrchestratorError::configuration(
                "image namespace must not be empty",
            ));
        }
        if node_configs.is_empty() {
            return Err(OrchestratorError::configuration(
                "a cluster needs at least one node",
            ));
        }

        let name = match &config.name {
            Some(name) => {
                check_for_existing_cluster(runtime.as_ref(), name).await?;
                name.clone()
            }
            None => generate_cluster_name(),
        };

        let labels = HashMap::from([(CLUSTER_LABEL_KEY.to_string(), cluster_label(&name))]);

        let mut seen = HashSet::new();
        for node in &node_configs {
            if !seen.insert(node.name.clone()) {
                return Err(OrchestratorError::already_exists(format!(
                    "node name {} declared more than once",
                    node.name
                )));
            }
        }

        // Group membership follows declaration order, as does group order.
        let mut group_order: Vec<String> = Vec::new();
        let mut members: HashMap<String, Vec<Arc<Node>>> = HashMap::new();
        for node_config in node_configs {
            let group = node_config.group.clone();
            let node = Arc::new(Node::new(
                node_config,
                name.clone(),
                config.network.clone(),
                labels.clone(),
                config.start_timeout(),
                Arc::clone(&runtime),
            ));
            if !members.contains_key(&group) {
                group_order.push(group.clone());
            }
            members.entry(group).or_default().push(node);
        }

        let groups = group_order
            .into_iter()
            .map(|group_name| {
                let nodes = members.remove(&group_name).unwrap_or_default();
                NodeGroup::new(group_name, nodes)
            })
            .collect();

        Ok(Self {
            name,
            groups,
            labels,
            resolver: ImageResolver::new(Arc::clone(&runtime)),
            networks: NetworkManager::new(runtime),
            config,
            inner: RwLock::new(ClusterInner {
                state: ClusterState::Unbuilt,
                network: None,
            }),
        })
    }

    /// Returns the cluster name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the cluster network name.
    pub fn network_name(&self) -> &str {
        &self.config.network
    }

    /// Returns the current lifecycle state.
    pub async fn state(&self) -> ClusterState {
        self.inner.read().await.state
    }

    /// Returns the node groups in declaration order.
    pub fn groups(&self) -> &[NodeGroup] {
        &self.groups
    }

    /// Returns the group with the given name.
    pub fn group(&self, name: &str) -> Option<&NodeGroup> {
        self.groups.iter().find(|g| g.name() == name)
    }

    /// Returns every node across all groups, in declaration order.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.groups
            .iter()
            .flat_map(|g| g.nodes().iter().cloned())
            .collect()
    }

    /// Returns the node with the given name.
    pub fn node(&self, name: &str) -> Option<Arc<Node>> {
        self.groups.iter().find_map(|g| g.node(name).cloned())
    }

    /// Starts the cluster: network, images, then every node.
    ///
    /// Node startup fans out with bounded parallelism; the call returns
    /// only when every node is running with a resolved IP address, or with
    /// an aggregate error naming each node that failed. Nodes that did
    /// start are left running; teardown stays an explicit operator call.
    pub async fn start(&self) -> Result<()> {
        {
            let inner = self.inner.read().await;
            match inner.state {
                ClusterState::Unbuilt | ClusterState::NetworkReady => {}
                state => return Err(OrchestratorError::invalid_state("start", state)),
            }
        }

        let started_at = Instant::now();
        info!(cluster = %self.name, network = %self.config.network, "starting cluster");

        let member_names: Vec<String> =
            self.nodes().iter().map(|n| n.container_name()).collect();

        let network = self
            .networks
            .ensure_network(&self.config.network, &self.labels, &member_names)
            .await?;

        {
            let mut inner = self.inner.write().await;
            inner.network = Some(network.clone());
            inner.state = ClusterState::NetworkReady;
        }

        // Refuse to start on a network that already hosts containers with
        // our names (usually a leftover of the same cluster).
        let report = self.networks.inspect(&network).await?;
        let collisions: Vec<&String> = member_names
            .iter()
            .filter(|name| report.attached_containers.contains(name))
            .collect();
        if !collisions.is_empty() {
            return Err(OrchestratorError::already_exists(format!(
                "containers already attached to network {}: {}",
                self.config.network,
                collisions
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        // Resolve every image up front so a bad reference aborts the start
        // before any container exists.
        let images: BTreeSet<&str> = self.nodes_images();
        for image in images {
            self.resolver
                .ensure_image(image, self.config.always_pull)
                .await?;
        }

        let failures = self
            .fan_out(|node| {
                let network = network.clone();
                async move {
                    node.create(&network).await?;
                    node.start().await
                }
            })
            .await;

        if !failures.is_empty() {
            return Err(OrchestratorError::Aggregate(AggregateFailure::new(
                format!("start of cluster {}", self.name),
                failures,
            )));
        }

        self.inner.write().await.state = ClusterState::NodesRunning;
        let elapsed_secs = started_at.elapsed().as_secs_f64();
        info!(cluster = %self.name, elapsed_secs, "cluster started");
        Ok(())
    }

    /// Executes a shell command on every node, grouped by node group.
    ///
    /// Delegates to each group in declaration order; runtime-level failures
    /// are collected across all groups and raised as one aggregate error
    /// after every node has been attempted, with the successful results
    /// retained inside it.
    pub async fn execute(
        &self,
        command: &str,
        options: ExecuteOptions,
    ) -> Result<BTreeMap<String, BTreeMap<String, CommandResult>>> {
        let mut by_group = BTreeMap::new();
        let mut failures = Vec::new();
        let mut succeeded = BTreeMap::new();

        for group in &self.groups {
            match group.execute(command, options.clone()).await {
                Ok(results) => {
                    succeeded.extend(results.clone());
                    by_group.insert(group.name().to_string(), results);
                }
                Err(OrchestratorError::Aggregate(aggregate)) => {
                    failures.extend(aggregate.failures);
                    succeeded.extend(aggregate.results.clone());
                    by_group.insert(group.name().to_string(), aggregate.results);
                }
                Err(other) => {
                    failures.push(NodeFailure::new(group.name(), other));
                }
            }
        }

        if failures.is_empty() {
            Ok(by_group)
        } else {
            Err(OrchestratorError::Aggregate(
                AggregateFailure::new(format!("execute on cluster {}", self.name), failures)
                    .with_results(succeeded),
            ))
        }
    }

    /// Tears the whole cluster down: stops and removes every node, then
    /// removes the network if nothing else still references it.
    ///
    /// Individual node failures are logged and collected, never fatal to
    /// the rest of the teardown. Safe to call on a cluster with zero
    /// running nodes.
    pub async fn teardown(&self) -> Result<()> {
        info!(cluster = %self.name, "tearing down cluster");

        let mut failures = self
            .fan_out(|node| async move {
                node.stop().await?;
                node.remove().await
            })
            .await;

        let network = self.inner.read().await.network.clone();
        if let Some(handle) = network {
            match self.networks.remove_if_unused(&handle).await {
                Ok(removed) => {
                    if removed {
                        self.inner.write().await.network = None;
                    }
                }
                Err(e) => failures.push(NodeFailure::new(format!("network {}", handle.name), e)),
            }
        }

        if failures.is_empty() {
            let mut inner = self.inner.write().await;
            inner.state = ClusterState::TornDown;
            inner.network = None;
            info!(cluster = %self.name, "cluster torn down");
            Ok(())
        } else {
            Err(OrchestratorError::Aggregate(AggregateFailure::new(
                format!("teardown of cluster {}", self.name),
                failures,
            )))
        }
    }

    /// Removes every trace of the cluster. Alias for [`Cluster::teardown`].
    pub async fn nuke(&self) -> Result<()> {
        self.teardown().await
    }

    fn nodes_images(&self) -> BTreeSet<&str> {
        self.groups
            .iter()
            .flat_map(|g| g.nodes().iter())
            .map(|n| n.image())
            .collect()
    }

    /// Runs `operation` once per node with bounded parallelism, attempting
    /// every node and returning the failures.
    async fn fan_out<F, Fut>(&self, operation: F) -> Vec<NodeFailure>
    where
        F: Fn(Arc<Node>) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let width = self.config.startup_parallelism.max(1);
        let semaphore = Arc::new(Semaphore::new(width));

        let attempts = self.nodes().into_iter().map(|node| {
            let semaphore = Arc::clone(&semaphore);
            let task = operation(Arc::clone(&node));
            async move {
                let name = node.name().to_string();
                let permit = semaphore.acquire_owned().await;
                if permit.is_err() {
                    return (
                        name.clone(),
                        Err(OrchestratorError::execution(name, "worker pool closed")),
                    );
                }
                (name, task.await)
            }
        });

        let mut failures = Vec::new();
        for (name, outcome) in join_all(attempts).await {
            if let Err(e) = outcome {
                error!(cluster = %self.name, node = %name, error = %e, "node operation failed");
                failures.push(NodeFailure::new(name, e));
            }
        }
        failures
    }
}

/// Fails when any labeled container on the runtime already belongs to a
/// cluster with this name.
async fn check_for_existing_cluster(runtime: &dyn RuntimeClient, name: &str) -> Result<()> {
    let containers = runtime.list_containers(CLUSTER_LABEL_KEY).await?;
    for container in containers {
        let owner = container
            .labels
            .get(CLUSTER_LABEL_KEY)
            .and_then(|payload| cluster_name_from_label(payload));
        if owner.as_deref() == Some(name) {
            return Err(OrchestratorError::already_exists(format!(
                "cluster {} (container {} belongs to it)",
                name, container.name
            )));
        }
    }
    Ok(())
}

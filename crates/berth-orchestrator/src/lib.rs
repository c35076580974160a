//! Cluster and node lifecycle orchestration over a container runtime.
//!
//! berth turns a declarative topology description into a running set of
//! interdependent containers on a shared, isolated network, gives uniform
//! command execution and file transfer against every member, and tears the
//! whole thing down deterministically while tolerating the partial failures
//! that come with driving an external container runtime.
//!
//! # Overview
//!
//! - [`topology`]: the capability interface topology packages implement,
//!   plus cluster-level configuration
//! - [`cluster`]: the aggregate root composing node groups and the network
//! - [`group`]: named sets of nodes with bulk operations
//! - [`node`]: one cluster member; execute/put/get against its container
//! - [`network`]: creation and reuse of the cluster's isolated network
//! - [`image`]: making sure required images exist before anything starts
//! - [`error`]: the error taxonomy, including aggregate fan-out failures
//!
//! # Example
//!
//! ```ignore
//! use berth_orchestrator::{Cluster, ClusterConfig, ExecuteOptions, NodeConfig};
//! use berth_runtime::DockerRuntime;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> berth_orchestrator::Result<()> {
//!     let runtime = Arc::new(DockerRuntime::connect().await?);
//!
//!     let config = ClusterConfig::new("cluster", "berthdock").os_tag("centos7");
//!     let nodes = vec![
//!         NodeConfig::new("node-1", "nodes", config.image_reference("nodebase")),
//!         NodeConfig::new("node-2", "nodes", config.image_reference("nodebase")),
//!     ];
//!
//!     let cluster = Cluster::new(config, nodes, runtime).await?;
//!     cluster.start().await?;
//!
//!     let results = cluster.execute("uptime", ExecuteOptions::default()).await?;
//!     for (group, nodes) in &results {
//!         for (node, result) in nodes {
//!             println!("[{}/{}] {}", group, node, result.output.trim_end());
//!         }
//!     }
//!
//!     cluster.teardown().await
//! }
//! ```

#![warn(missing_docs)]

pub mod cluster;
pub mod error;
pub mod group;
pub mod image;
pub mod naming;
pub mod network;
pub mod node;
pub mod topology;

pub use cluster::{Cluster, ClusterState};
pub use error::{AggregateFailure, NodeFailure, OrchestratorError, Result};
pub use group::NodeGroup;
pub use image::ImageResolver;
pub use network::{NetworkHandle, NetworkManager};
pub use node::{CommandResult, ExecuteOptions, Node, NodeConfig};
pub use topology::{ArgumentSchema, ArgumentSpec, ClusterConfig, Topology, TopologyArgs};

//! Building clusters through the topology capability interface.

mod support;

use async_trait::async_trait;
use berth_orchestrator::{
    ArgumentSchema, ArgumentSpec, Cluster, ClusterConfig, ClusterState, NodeConfig, Result,
    Topology, TopologyArgs,
};
use berth_runtime::RuntimeClient;
use std::sync::Arc;
use support::FakeRuntime;

/// A minimal topology: one group of identically configured nodes.
struct Nodebase;

#[async_trait]
impl Topology for Nodebase {
    fn name(&self) -> &str {
        "nodebase"
    }

    fn argument_schema(&self) -> ArgumentSchema {
        ArgumentSchema::new()
            .argument(ArgumentSpec::with_default(
                "nodes",
                "comma-separated node names",
                "node-1,node-2",
            ))
            .argument(ArgumentSpec::with_default(
                "repository",
                "image repository to run on every node",
                "nodebase",
            ))
    }

    async fn build(
        &self,
        args: &TopologyArgs,
        runtime: Arc<dyn RuntimeClient>,
    ) -> Result<Cluster> {
        let schema = self.argument_schema();
        let config = ClusterConfig::new("cluster", "berthdock").os_tag("centos7");

        let repository = args
            .get_or_default(&schema, "repository")
            .unwrap_or("nodebase");
        let image = config.image_reference(repository);

        let nodes = args
            .get_or_default(&schema, "nodes")
            .unwrap_or_default()
            .split(',')
            .map(|name| NodeConfig::new(name.trim(), "nodes", image.clone()))
            .collect();

        Cluster::new(config, nodes, runtime).await
    }
}

#[tokio::test]
async fn test_topology_builds_and_starts_cluster() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_local_image("berthdock/nodebase:centos7");

    let topology = Nodebase;
    let args = TopologyArgs::new();

    let cluster = topology.build(&args, runtime.clone()).await.unwrap();
    assert_eq!(cluster.groups().len(), 1);
    assert_eq!(cluster.nodes().len(), 2);

    cluster.start().await.unwrap();
    assert_eq!(cluster.state().await, ClusterState::NodesRunning);
    for node in cluster.nodes() {
        assert_eq!(node.image(), "berthdock/nodebase:centos7");
        assert!(node.ip_address().await.is_some());
    }

    cluster.nuke().await.unwrap();
    assert_eq!(runtime.container_count(), 0);
    assert_eq!(runtime.network_count(), 0);
}

#[tokio::test]
async fn test_topology_honors_operator_arguments() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_local_image("berthdock/nodebase:centos7");

    let topology = Nodebase;
    let args = TopologyArgs::new().set("nodes", "primary,secondary-1,secondary-2");

    let cluster = topology.build(&args, runtime).await.unwrap();
    let nodes = cluster.nodes();
    let names: Vec<String> = nodes.iter().map(|n| n.name().to_string()).collect();
    assert_eq!(names, vec!["primary", "secondary-1", "secondary-2"]);

    // Hostnames follow the name.network convention.
    assert_eq!(
        cluster.node("primary").unwrap().hostname(),
        "primary.cluster"
    );
}

//! Topology capability interface and cluster-level configuration.
//!
//! A topology package describes one kind of cluster: which node groups it
//! has, which images they run, and which arguments an operator can tune.
//! Topologies plug in through the [`Topology`] trait. It is a capability
//! interface, not a base class: any type that can declare its argument
//! schema and build a [`Cluster`](crate::cluster::Cluster) qualifies.

use async_trait::async_trait;
use berth_runtime::RuntimeClient;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cluster::Cluster;
use crate::error::Result;

/// Cluster-level configuration supplied by a topology descriptor.
///
/// There is no process-wide default for any of these values; in particular
/// the image namespace must be provided explicitly at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Cluster name. Generated randomly when `None`.
    pub name: Option<String>,

    /// Name of the cluster network.
    pub network: String,

    /// Image namespace (e.g. a Docker Hub organization). Required.
    pub namespace: String,

    /// Registry URL prefixed to image references. Docker Hub when `None`.
    pub registry: Option<String>,

    /// Operating-system tag appended to image references built through
    /// [`ClusterConfig::image_reference`].
    pub os_tag: Option<String>,

    /// Pull every image even when it exists locally.
    pub always_pull: bool,

    /// Seconds to wait for each node to reach the running state.
    pub start_timeout_secs: u64,

    /// Upper bound on concurrently starting/stopping nodes.
    pub startup_parallelism: usize,
}

impl ClusterConfig {
    /// Creates a config for the given network and namespace with defaults
    /// for everything else.
    pub fn new(network: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: None,
            network: network.into(),
            namespace: namespace.into(),
            registry: None,
            os_tag: None,
            always_pull: false,
            start_timeout_secs: 30,
            startup_parallelism: 8,
        }
    }

    /// Sets an explicit cluster name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the registry URL.
    pub fn registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    /// Sets the operating-system tag.
    pub fn os_tag(mut self, tag: impl Into<String>) -> Self {
        self.os_tag = Some(tag.into());
        self
    }

    /// Requests unconditional image pulls.
    pub fn always_pull(mut self, always: bool) -> Self {
        self.always_pull = always;
        self
    }

    /// Returns the start timeout as a duration.
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    /// Builds a full image reference for a repository:
    /// `[registry/]namespace/repository[:os-tag]`.
    pub fn image_reference(&self, repository: &str) -> String {
        let mut reference = String::new();
        if let Some(registry) = &self.registry {
            reference.push_str(registry.trim_end_matches('/'));
            reference.push('/');
        }
        reference.push_str(&self.namespace);
        reference.push('/');
        reference.push_str(repository);
        if let Some(tag) = &self.os_tag {
            reference.push(':');
            reference.push_str(tag);
        }
        reference
    }
}

/// One argument a topology accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentSpec {
    /// Argument name (e.g. `nodes`).
    pub name: String,

    /// Help text for the operator.
    pub help: String,

    /// Default value when the operator supplies none.
    pub default: Option<String>,
}

impl ArgumentSpec {
    /// Creates an argument with no default.
    pub fn required(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            default: None,
        }
    }

    /// Creates an argument with a default value.
    pub fn with_default(
        name: impl Into<String>,
        help: impl Into<String>,
        default: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            default: Some(default.into()),
        }
    }
}

/// The declared argument schema of a topology.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgumentSchema {
    arguments: Vec<ArgumentSpec>,
}

impl ArgumentSchema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an argument.
    pub fn argument(mut self, spec: ArgumentSpec) -> Self {
        self.arguments.push(spec);
        self
    }

    /// Returns all declared arguments.
    pub fn arguments(&self) -> &[ArgumentSpec] {
        &self.arguments
    }

    /// Returns the spec for a named argument.
    pub fn get(&self, name: &str) -> Option<&ArgumentSpec> {
        self.arguments.iter().find(|a| a.name == name)
    }
}

/// Parsed argument values handed to a topology's build function.
#[derive(Debug, Clone, Default)]
pub struct TopologyArgs {
    values: HashMap<String, String>,
}

impl TopologyArgs {
    /// Creates an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an argument value.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Returns an argument value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Returns an argument value, falling back to the schema default.
    pub fn get_or_default<'a>(&'a self, schema: &'a ArgumentSchema, name: &str) -> Option<&'a str> {
        self.get(name)
            .or_else(|| schema.get(name).and_then(|a| a.default.as_deref()))
    }
}

/// Capability interface a topology package implements.
#[async_trait]
pub trait Topology: Send + Sync {
    /// Returns the topology name.
    fn name(&self) -> &str;

    /// Declares the arguments this topology accepts, for the CLI
    /// collaborator to render.
    fn argument_schema(&self) -> ArgumentSchema;

    /// Builds a cluster from parsed arguments. The returned cluster is pure
    /// specification; nothing runs until it is started.
    async fn build(
        &self,
        args: &TopologyArgs,
        runtime: Arc<dyn RuntimeClient>,
    ) -> Result<Cluster>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_reference_composition() {
        let config = ClusterConfig::new("cluster", "berthdock");
        assert_eq!(config.image_reference("nodebase"), "berthdock/nodebase");

        let config = ClusterConfig::new("cluster", "berthdock")
            .registry("registry.example.com")
            .os_tag("centos7");
        assert_eq!(
            config.image_reference("nodebase"),
            "registry.example.com/berthdock/nodebase:centos7"
        );
    }

    #[test]
    fn test_args_fall_back_to_schema_defaults() {
        let schema = ArgumentSchema::new()
            .argument(ArgumentSpec::with_default(
                "nodes",
                "comma-separated node names",
                "node-1,node-2",
            ))
            .argument(ArgumentSpec::required("image", "image repository"));

        let args = TopologyArgs::new().set("image", "nodebase");

        assert_eq!(args.get_or_default(&schema, "image"), Some("nodebase"));
        assert_eq!(
            args.get_or_default(&schema, "nodes"),
            Some("node-1,node-2")
        );
        assert_eq!(args.get_or_default(&schema, "missing"), None);
    }

    #[test]
    fn test_schema_lookup() {
        let schema =
            ArgumentSchema::new().argument(ArgumentSpec::required("nodes", "node names"));
        assert!(schema.get("nodes").is_some());
        assert!(schema.get("other").is_none());
        assert_eq!(schema.arguments().len(), 1);
    }
}

//! Named groups of homogeneously configured nodes.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AggregateFailure, NodeFailure, OrchestratorError, Result};
use crate::node::{CommandResult, ExecuteOptions, Node};

/// A named, ordered set of nodes sharing a role.
///
/// Groups own no runtime resources themselves; bulk operations delegate to
/// the member nodes.
pub struct NodeGroup {
    name: String,
    nodes: Vec<Arc<Node>>,
}

impl NodeGroup {
    /// Creates a group with the given members.
    pub(crate) fn new(name: impl Into<String>, nodes: Vec<Arc<Node>>) -> Self {
        Self {
            name: name.into(),
            nodes,
        }
    }

    /// Returns the group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the member nodes in declaration order.
    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the group has no members.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the member with the given name.
    pub fn node(&self, name: &str) -> Option<&Arc<Node>> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    /// Executes a shell command on every member concurrently.
    ///
    /// Per-member results are independent: one member's runtime-level
    /// failure never prevents the attempt on the others. If any member
    /// failed, the call returns an aggregate error naming each failing
    /// node, with the successful members' results retained inside it.
    pub async fn execute(
        &self,
        command: &str,
        options: ExecuteOptions,
    ) -> Result<BTreeMap<String, CommandResult>> {
        debug!(group = %self.name, command = %command, "executing on group");

        let attempts = self.nodes.iter().map(|node| {
            let options = options.clone();
            async move { (node.name().to_string(), node.execute(command, options).await) }
        });

        let mut results = BTreeMap::new();
        let mut failures = Vec::new();
        for (name, outcome) in join_all(attempts).await {
            match outcome {
                Ok(result) => {
                    results.insert(name, result);
                }
                Err(e) => failures.push(NodeFailure::new(name, e)),
            }
        }

        if failures.is_empty() {
            Ok(results)
        } else {
            Err(OrchestratorError::Aggregate(
                AggregateFailure::new(format!("execute on group {}", self.name), failures)
                    .with_results(results),
            ))
        }
    }
}

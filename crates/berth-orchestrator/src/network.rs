//! Cluster network management.
//!
//! The runtime is the source of truth for network state: it can change out
//! of band (duplicate same-named networks, manual removal), so the manager
//! re-queries on every use instead of caching process-wide state.

use berth_runtime::{NetworkId, NetworkOptions, NetworkReport, RuntimeClient};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{OrchestratorError, Result};

/// Handle to a cluster network, obtained through scoped acquisition.
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    /// Network ID.
    pub id: NetworkId,

    /// Network name.
    pub name: String,
}

/// Creates or reuses the isolated network a cluster runs on.
pub struct NetworkManager {
    runtime: Arc<dyn RuntimeClient>,
}

impl NetworkManager {
    /// Creates a new manager on top of the given runtime client.
    pub fn new(runtime: Arc<dyn RuntimeClient>) -> Self {
        Self { runtime }
    }

    /// Returns a handle to the network called `name`, creating it if absent.
    ///
    /// Idempotent: repeated calls (from this process or a concurrent one)
    /// resolve to the same underlying network. When the runtime reports more
    /// than one network with the same name, one candidate is selected
    /// deterministically rather than failing: the one already attached to
    /// containers in `expected_members` wins, else the most recently
    /// created.
    pub async fn ensure_network(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
        expected_members: &[String],
    ) -> Result<NetworkHandle> {
        let candidates = self
            .runtime
            .list_networks(name)
            .await
            .map_err(|e| OrchestratorError::network(name, e.to_string()))?;

        if candidates.is_empty() {
            return self.create(name, labels, expected_members).await;
        }

        if candidates.len() > 1 {
            warn!(
                network = %name,
                count = candidates.len(),
                "runtime reports duplicate networks with the same name"
            );
        }

        let chosen = select_network(candidates, expected_members)
            .ok_or_else(|| OrchestratorError::network(name, "no usable network candidate"))?;
        debug!(network = %name, id = %chosen.id, "reusing existing network");
        Ok(NetworkHandle {
            id: chosen.id,
            name: name.to_string(),
        })
    }

    async fn create(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
        expected_members: &[String],
    ) -> Result<NetworkHandle> {
        let mut options = NetworkOptions::bridge(name);
        options.labels = labels.clone();

        match self.runtime.create_network(&options).await {
            Ok(id) => {
                info!(network = %name, id = %id, "created cluster network");
                Ok(NetworkHandle {
                    id,
                    name: name.to_string(),
                })
            }
            // Lost a race with a concurrent creator: the network exists now,
            // which is exactly what we wanted.
            Err(e) if e.is_conflict() => {
                debug!(network = %name, "network appeared concurrently, re-querying");
                let candidates = self
                    .runtime
                    .list_networks(name)
                    .await
                    .map_err(|e| OrchestratorError::network(name, e.to_string()))?;
                let chosen = select_network(candidates, expected_members).ok_or_else(|| {
                    OrchestratorError::network(
                        name,
                        "creation reported a conflict but no such network is listed",
                    )
                })?;
                Ok(NetworkHandle {
                    id: chosen.id,
                    name: name.to_string(),
                })
            }
            Err(e) => Err(OrchestratorError::network(name, e.to_string())),
        }
    }

    /// Inspects the network fresh from the runtime.
    pub async fn inspect(&self, handle: &NetworkHandle) -> Result<NetworkReport> {
        self.runtime
            .inspect_network(&handle.id)
            .await
            .map_err(|e| OrchestratorError::network(&handle.name, e.to_string()))
    }

    /// Removes the network if no container still references it.
    ///
    /// The attachment count is re-queried from the runtime at call time; the
    /// orchestrator keeps no counter of its own. Returns whether the network
    /// was removed.
    pub async fn remove_if_unused(&self, handle: &NetworkHandle) -> Result<bool> {
        let report = match self.runtime.inspect_network(&handle.id).await {
            Ok(report) => report,
            Err(e) if e.is_not_found() => {
                debug!(network = %handle.name, "network already gone");
                return Ok(false);
            }
            Err(e) => return Err(OrchestratorError::network(&handle.name, e.to_string())),
        };

        if report.endpoint_count() > 0 {
            info!(
                network = %handle.name,
                endpoints = report.endpoint_count(),
                "leaving network in place, containers still attached"
            );
            return Ok(false);
        }

        self.runtime
            .remove_network(&handle.id)
            .await
            .map_err(|e| OrchestratorError::network(&handle.name, e.to_string()))?;
        info!(network = %handle.name, "removed cluster network");
        Ok(true)
    }
}

/// Picks one network out of a candidate list.
///
/// Preference order: a candidate already attached to one of the expected
/// member containers, then the most recently created (RFC 3339 creation
/// timestamps order lexicographically).
fn select_network(
    mut candidates: Vec<NetworkReport>,
    expected_members: &[String],
) -> Option<NetworkReport> {
    if candidates.len() > 1 {
        if let Some(position) = candidates.iter().position(|candidate| {
            candidate
                .attached_containers
                .iter()
                .any(|name| expected_members.contains(name))
        }) {
            return Some(candidates.swap_remove(position));
        }
        candidates.sort_by(|a, b| a.created.cmp(&b.created));
    }
    candidates.pop()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(id: &str, created: Option<&str>, attached: &[&str]) -> NetworkReport {
        NetworkReport {
            id: NetworkId::new(id),
            name: "cluster".to_string(),
            created: created.map(str::to_string),
            attached_containers: attached.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_single_candidate_wins() {
        let chosen = select_network(vec![report("n1", None, &[])], &[]).unwrap();
        assert_eq!(chosen.id.as_str(), "n1");
    }

    #[test]
    fn test_no_candidates_selects_nothing() {
        assert!(select_network(Vec::new(), &[]).is_none());
    }

    #[test]
    fn test_prefers_candidate_with_expected_members() {
        let candidates = vec![
            report("n1", Some("2024-03-01T00:00:00Z"), &[]),
            report("n2", Some("2024-01-01T00:00:00Z"), &["mycluster-node-1"]),
        ];
        let chosen = select_network(candidates, &["mycluster-node-1".to_string()]).unwrap();
        assert_eq!(chosen.id.as_str(), "n2");
    }

    #[test]
    fn test_falls_back_to_newest() {
        let candidates = vec![
            report("old", Some("2024-01-01T00:00:00Z"), &[]),
            report("new", Some("2024-06-01T00:00:00Z"), &[]),
            report("mid", Some("2024-03-01T00:00:00Z"), &[]),
        ];
        let chosen = select_network(candidates, &["unrelated".to_string()]).unwrap();
        assert_eq!(chosen.id.as_str(), "new");
    }
}

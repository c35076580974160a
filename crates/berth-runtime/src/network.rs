//! Network option and inspection types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Network identifier assigned by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId(String);

impl NetworkId {
    /// Creates a network ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Options for creating a network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkOptions {
    /// Network name.
    pub name: String,

    /// Network driver.
    pub driver: String,

    /// Labels to apply to the network.
    pub labels: HashMap<String, String>,
}

impl NetworkOptions {
    /// Creates bridge-network options with the given name.
    pub fn bridge(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: "bridge".to_string(),
            labels: HashMap::new(),
        }
    }

    /// Adds a label.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// What the runtime reports about a network.
#[derive(Debug, Clone)]
pub struct NetworkReport {
    /// Network ID.
    pub id: NetworkId,

    /// Network name.
    pub name: String,

    /// Creation timestamp as reported by the runtime (RFC 3339).
    pub created: Option<String>,

    /// Names of containers currently attached to the network.
    pub attached_containers: Vec<String>,
}

impl NetworkReport {
    /// Returns the number of attached endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.attached_containers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_options() {
        let opts = NetworkOptions::bridge("cluster").label("io.berth.cluster", "{}");
        assert_eq!(opts.name, "cluster");
        assert_eq!(opts.driver, "bridge");
        assert_eq!(opts.labels.len(), 1);
    }

    #[test]
    fn test_endpoint_count() {
        let report = NetworkReport {
            id: NetworkId::new("n1"),
            name: "cluster".to_string(),
            created: None,
            attached_containers: vec!["node-1.cluster".to_string()],
        };
        assert_eq!(report.endpoint_count(), 1);
    }
}

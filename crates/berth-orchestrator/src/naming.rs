//! Cluster naming and resource labeling.
//!
//! Every container and network the orchestrator creates carries a label
//! whose payload identifies the owning cluster, so foreign clusters can be
//! discovered and name collisions detected before anything is created.

use rand::seq::SliceRandom;

/// Label key applied to every container and network owned by a cluster.
pub const CLUSTER_LABEL_KEY: &str = "io.berth.cluster";

const ADJECTIVES: &[&str] = &[
    "angular", "bright", "celestial", "cosmic", "distant", "dynamical", "elliptic", "galactic",
    "gaseous", "gravitational", "intergalactic", "interstellar", "kinetic", "luminous", "magnetic",
    "molecular", "nebular", "optical", "orbital", "photometric", "planetary", "radiant", "solar",
    "spectral", "spherical", "spiral", "stellar", "tidal",
];

const NAMES: &[&str] = &[
    "antlia", "bullet", "centaurus", "coathanger", "coma", "fornax", "hyades", "hydra",
    "laniakea", "norma", "pandora", "phoenix", "pleiades", "praesepe", "ptolemy", "pyxis",
    "reticulum", "virgo",
];

/// Generates a random `adjective_name` cluster name.
pub fn generate_cluster_name() -> String {
    let mut rng = rand::thread_rng();
    // Both slices are non-empty constants, so choose never returns None.
    let adjective = ADJECTIVES.choose(&mut rng).unwrap_or(&"stellar");
    let name = NAMES.choose(&mut rng).unwrap_or(&"virgo");
    format!("{}_{}", adjective, name)
}

/// Builds the JSON label payload identifying a cluster.
pub fn cluster_label(cluster_name: &str) -> String {
    serde_json::json!({
        "cluster": cluster_name,
        "version": env!("CARGO_PKG_VERSION"),
    })
    .to_string()
}

/// Extracts the cluster name from a label payload, if it parses.
pub fn cluster_name_from_label(payload: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    value.get("cluster")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_name_shape() {
        for _ in 0..20 {
            let name = generate_cluster_name();
            let parts: Vec<&str> = name.splitn(2, '_').collect();
            assert_eq!(parts.len(), 2);
            assert!(ADJECTIVES.contains(&parts[0]));
            assert!(NAMES.contains(&parts[1]));
        }
    }

    #[test]
    fn test_label_round_trip() {
        let payload = cluster_label("spectral_virgo");
        assert_eq!(
            cluster_name_from_label(&payload).as_deref(),
            Some("spectral_virgo")
        );
    }

    #[test]
    fn test_label_rejects_garbage() {
        assert_eq!(cluster_name_from_label("not json"), None);
        assert_eq!(cluster_name_from_label("{}"), None);
    }
}

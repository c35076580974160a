//! Image resolution.
//!
//! Ensures the images a cluster needs exist locally before any container is
//! created. Pulls are synchronous from the caller's perspective; progress is
//! visible only through the runtime client's log events.

use berth_runtime::{RuntimeClient, RuntimeError};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{OrchestratorError, Result};

/// Resolves image references against the local image store and the registry.
pub struct ImageResolver {
    runtime: Arc<dyn RuntimeClient>,
}

impl ImageResolver {
    /// Creates a new resolver on top of the given runtime client.
    pub fn new(runtime: Arc<dyn RuntimeClient>) -> Self {
        Self { runtime }
    }

    /// Ensures that `reference` is available locally.
    ///
    /// With `always_pull` the image is pulled unconditionally; otherwise it
    /// is pulled only when absent. Registry failures are not retried; the
    /// caller decides whether the corresponding node startup is abandoned.
    pub async fn ensure_image(&self, reference: &str, always_pull: bool) -> Result<()> {
        if !always_pull && self.runtime.image_exists(reference).await? {
            debug!(image = %reference, "image present locally");
            return Ok(());
        }

        info!(image = %reference, "pulling image");
        self.runtime
            .pull_image(reference)
            .await
            .map_err(|e| match e {
                RuntimeError::ImageNotFound(reference) => {
                    OrchestratorError::ImageNotFound(reference)
                }
                RuntimeError::Registry { reference, reason } => {
                    OrchestratorError::Registry { reference, reason }
                }
                other => OrchestratorError::Runtime(other),
            })
    }
}

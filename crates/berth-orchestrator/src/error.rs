//! Error types for cluster orchestration.
//!
//! Two rules shape this taxonomy. A non-zero command exit code is never an
//! error: it travels inside [`CommandResult`](crate::node::CommandResult).
//! And fan-out operations never fail fast: every member is attempted, then a
//! single [`AggregateFailure`] reports which members failed and why.

use berth_runtime::RuntimeError;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::node::CommandResult;

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors that can occur during cluster orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Network create/inspect/remove failure.
    #[error("network error for {name}: {reason}")]
    Network {
        /// The network name.
        name: String,
        /// The reason for the failure.
        reason: String,
    },

    /// The registry reports that the image reference does not exist.
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// The registry could not be reached or refused the pull.
    #[error("registry error for {reference}: {reason}")]
    Registry {
        /// The image reference being pulled.
        reference: String,
        /// The reason for the failure.
        reason: String,
    },

    /// A resource with this identity already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Runtime-level failure while executing a command. Distinct from a
    /// non-zero exit code, which is a normal result.
    #[error("execution failed on {node}: {reason}")]
    Execution {
        /// The node the command was sent to.
        node: String,
        /// The reason for the failure.
        reason: String,
    },

    /// File transfer across the node boundary failed.
    #[error("file transfer failed on {node}: {reason}")]
    FileTransfer {
        /// The node involved in the transfer.
        node: String,
        /// The reason for the failure.
        reason: String,
    },

    /// The operation requires a running container that isn't.
    #[error("node not running: {0}")]
    NotRunning(String),

    /// A node failed to reach the running state.
    #[error("failed to start {node}: {reason}")]
    StartFailed {
        /// The node being started.
        node: String,
        /// The reason for the failure.
        reason: String,
    },

    /// The operation is not valid in the current lifecycle state.
    #[error("cannot {operation} in state {state}")]
    InvalidState {
        /// The attempted operation.
        operation: String,
        /// The current state.
        state: String,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Several members of a fan-out operation failed.
    #[error("{0}")]
    Aggregate(AggregateFailure),

    /// Runtime client error that maps onto no more specific variant.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl OrchestratorError {
    /// Creates a network error.
    pub fn network(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Network {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an already exists error.
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    /// Creates an execution error.
    pub fn execution(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Execution {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Creates a file transfer error.
    pub fn file_transfer(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FileTransfer {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Creates a start failed error.
    pub fn start_failed(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StartFailed {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(operation: impl Into<String>, state: impl fmt::Display) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            state: state.to_string(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }
}

/// One failed member of a fan-out operation.
#[derive(Debug, Clone)]
pub struct NodeFailure {
    /// Name of the failing node (or resource).
    pub node: String,

    /// Description of what went wrong.
    pub error: String,
}

impl NodeFailure {
    /// Creates a new failure record.
    pub fn new(node: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            node: node.into(),
            error: error.to_string(),
        }
    }
}

/// Summary of a fan-out operation in which some members failed.
///
/// Every failing member is listed by name. Results from members that
/// succeeded before the aggregate was raised are retained so a partial
/// failure never discards partial progress.
#[derive(Debug, Clone)]
pub struct AggregateFailure {
    /// The operation that was fanned out.
    pub operation: String,

    /// All failing members, in the order they were attempted.
    pub failures: Vec<NodeFailure>,

    /// Results from members that succeeded, keyed by node name.
    pub results: BTreeMap<String, CommandResult>,
}

impl AggregateFailure {
    /// Creates a new aggregate failure.
    pub fn new(operation: impl Into<String>, failures: Vec<NodeFailure>) -> Self {
        Self {
            operation: operation.into(),
            failures,
            results: BTreeMap::new(),
        }
    }

    /// Attaches the successful members' results.
    pub fn with_results(mut self, results: BTreeMap<String, CommandResult>) -> Self {
        self.results = results;
        self
    }

    /// Returns the names of all failing members.
    pub fn failed_nodes(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.node.as_str()).collect()
    }
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed on {} member(s): ", self.operation, self.failures.len())?;
        let mut first = true;
        for failure in &self.failures {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{} ({})", failure.node, failure.error)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateFailure {}

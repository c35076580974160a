//! Container runtime client boundary for berth clusters.
//!
//! This crate defines [`RuntimeClient`], the interface through which the
//! cluster model drives a container runtime, together with the data types
//! that cross that boundary and a production implementation backed by the
//! local Docker daemon.
//!
//! The orchestration layer never talks to Docker directly: it holds an
//! `Arc<dyn RuntimeClient>` and stays agnostic about what answers on the
//! other side. That keeps the model testable against an in-memory runtime
//! and leaves room for other backends.
//!
//! # Example
//!
//! ```ignore
//! use berth_runtime::{ContainerSpec, DockerRuntime, ExecRequest, RuntimeClient};
//!
//! #[tokio::main]
//! async fn main() -> berth_runtime::Result<()> {
//!     let runtime = DockerRuntime::connect().await?;
//!
//!     let spec = ContainerSpec::new("node-1", "alpine:latest");
//!     let id = runtime.create_container(&spec).await?;
//!     runtime.start_container(&id).await?;
//!
//!     let result = runtime.exec(&id, &ExecRequest::shell("uname -a")).await?;
//!     println!("{}", result.output);
//!
//!     runtime.stop_container(&id, 10).await?;
//!     runtime.remove_container(&id, true).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod container;
pub mod docker;
pub mod error;
pub mod exec;
pub mod network;

pub use client::RuntimeClient;
pub use container::{
    ContainerId, ContainerReport, ContainerSpec, ContainerSummary, DeviceMapping,
    NetworkAttachment, PortMapping, PortProtocol, VolumeMount,
};
pub use docker::DockerRuntime;
pub use error::{Result, RuntimeError};
pub use exec::{ExecRequest, ExecResult};
pub use network::{NetworkId, NetworkOptions, NetworkReport};

//! Inspekt Flow
//!
//! The node contract of an inspection flow. A node has a stable id, typed
//! ports, a configuration payload and an async execution behavior that reads
//! from and writes to a shared [`ExecutionContext`].
//!
//! Ports describe how nodes may be wired in an editor. Execution order is
//! decided purely by node-id adjacency (`NodeCore::inputs`); the engine never
//! consults ports.
//!
//! Node variants are created through a [`NodeRegistry`] keyed by
//! [`NodeKind`](inspekt_config::NodeKind). The id is passed to the
//! constructor so identity is fixed at creation.

mod context;
mod error;
mod node;
pub mod nodes;
mod port;
mod registry;
mod result;

pub use context::ExecutionContext;
pub use error::FlowError;
pub use node::{FlowNode, NodeCore};
pub use port::{NodePort, PortDirection, PortType};
pub use registry::{NodeConstructor, NodeRegistry};
pub use result::{FlowNodeResult, ValidationResult};

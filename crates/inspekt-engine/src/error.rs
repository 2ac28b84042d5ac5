//! Error types for loading and inspecting flows.

use inspekt_flow::FlowError;
use thiserror::Error;

/// Errors raised by the engine.
///
/// Structural problems found at run time never escape `execute`; they are
/// turned into an `Error` inspection result carrying this message.
#[derive(Debug, Error)]
pub enum EngineError {
  /// Two node records share an id.
  #[error("duplicate node id '{node_id}'")]
  DuplicateNode { node_id: String },

  /// A node could not be built.
  #[error(transparent)]
  Node(#[from] FlowError),

  /// No node with the given id is loaded.
  #[error("node '{node_id}' not found")]
  UnknownNode { node_id: String },

  #[error("Flow has no nodes")]
  NoNodes,

  #[error("Flow has no entry nodes (nodes with no inputs)")]
  NoEntryNodes,

  /// A node lists an input id that is not part of the flow.
  #[error("Node '{node_id}' references unknown input '{input_id}'")]
  UnresolvedInput { node_id: String, input_id: String },

  /// The runner's frame channel has no receiver.
  #[error("inspection runner channel closed")]
  ChannelClosed,

  /// Some nodes can never become ready.
  #[error("Flow contains a cycle through nodes: {}", nodes.join(", "))]
  Cycle { nodes: Vec<String> },
}

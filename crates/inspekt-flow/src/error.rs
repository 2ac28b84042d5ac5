use inspekt_config::NodeKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
  #[error("no constructor registered for node type '{kind}'")]
  UnregisteredKind { kind: NodeKind },

  #[error("result for node '{node_id}' already recorded in this run")]
  DuplicateResult { node_id: String },

  #[error("execution cancelled")]
  Cancelled,

  #[error("tool task failed: {message}")]
  ToolTask { message: String },
}

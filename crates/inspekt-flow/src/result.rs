use std::sync::Arc;

use inspekt_vision::{BgrImage, InspectionStatus, ToolResult};
use serde::Serialize;

use crate::error::FlowError;

/// Outcome of one node in one run. Immutable once recorded in the context.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNodeResult {
  pub node_id: String,
  pub success: bool,
  pub status: InspectionStatus,
  #[serde(skip)]
  pub output_image: Option<Arc<BgrImage>>,
  pub execution_time_ms: u64,
  pub data: serde_json::Map<String, serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub next_node_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error_message: Option<String>,
  /// The node stopped because the run's token was cancelled.
  #[serde(skip)]
  pub cancelled: bool,
}

impl FlowNodeResult {
  pub fn success(node_id: &str, status: InspectionStatus) -> Self {
    Self {
      node_id: node_id.to_string(),
      success: true,
      status,
      output_image: None,
      execution_time_ms: 0,
      data: serde_json::Map::new(),
      next_node_id: None,
      error_message: None,
      cancelled: false,
    }
  }

  pub fn failure(node_id: &str, message: impl Into<String>) -> Self {
    Self {
      success: false,
      error_message: Some(message.into()),
      ..Self::success(node_id, InspectionStatus::Error)
    }
  }

  pub fn from_error(node_id: &str, error: &FlowError) -> Self {
    Self {
      cancelled: matches!(error, FlowError::Cancelled),
      ..Self::failure(node_id, error.to_string())
    }
  }

  /// Recorded for nodes on a branch that was not taken.
  pub fn skipped(node_id: &str) -> Self {
    Self::success(node_id, InspectionStatus::Skipped)
  }

  /// Adopt a tool's outcome. `input` is forwarded when the tool drew no overlay.
  pub fn from_tool(node_id: &str, tool: ToolResult, input: Arc<BgrImage>) -> Self {
    Self {
      node_id: node_id.to_string(),
      success: tool.success,
      status: tool.status,
      output_image: Some(tool.output_image.map(Arc::new).unwrap_or(input)),
      execution_time_ms: tool.elapsed_ms,
      data: tool.data,
      next_node_id: None,
      error_message: tool.error_message,
      cancelled: false,
    }
  }

  pub fn with_image(mut self, image: Arc<BgrImage>) -> Self {
    self.output_image = Some(image);
    self
  }

  pub fn with_data(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
    self.data.insert(key.to_string(), value.into());
    self
  }
}

/// Errors block execution; warnings are informational.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
  pub is_valid: bool,
  pub errors: Vec<String>,
  pub warnings: Vec<String>,
}

impl ValidationResult {
  pub fn valid() -> Self {
    Self {
      is_valid: true,
      errors: Vec::new(),
      warnings: Vec::new(),
    }
  }

  pub fn invalid(error: impl Into<String>) -> Self {
    let mut result = Self::valid();
    result.add_error(error);
    result
  }

  pub fn add_error(&mut self, error: impl Into<String>) {
    self.errors.push(error.into());
    self.is_valid = false;
  }

  pub fn add_warning(&mut self, warning: impl Into<String>) {
    self.warnings.push(warning.into());
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cancelled_error_marks_the_result() {
    let result = FlowNodeResult::from_error("n1", &FlowError::Cancelled);
    assert!(!result.success);
    assert!(result.cancelled);
    assert_eq!(result.status, InspectionStatus::Error);
    assert_eq!(result.error_message.as_deref(), Some("execution cancelled"));

    let failed = FlowNodeResult::from_error("n1", &FlowError::ToolTask { message: "boom".to_string() });
    assert!(!failed.cancelled);
    assert!(serde_json::to_value(&failed).unwrap().get("cancelled").is_none());
  }
}

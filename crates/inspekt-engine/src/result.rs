use std::sync::Arc;

use chrono::{DateTime, Utc};
use inspekt_flow::FlowNodeResult;
use inspekt_vision::{BgrImage, Defect, InspectionStatus, Measurement, ProductPosition};
use serde::Serialize;

/// Outcome of one inspection run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionResult {
  pub result_id: String,
  pub product_id: String,
  pub status: InspectionStatus,
  pub timestamp: DateTime<Utc>,
  pub duration_ms: u64,
  pub measurements: Vec<Measurement>,
  pub defects: Vec<Defect>,
  pub product_position: Option<ProductPosition>,
  /// In execution order.
  pub node_results: Vec<FlowNodeResult>,
  pub metadata: serde_json::Map<String, serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error_message: Option<String>,
  pub cancelled: bool,
  /// Output image of the last node that produced one.
  #[serde(skip)]
  pub overlay: Option<Arc<BgrImage>>,
}

impl InspectionResult {
  pub(crate) fn new(product_id: &str) -> Self {
    Self {
      result_id: uuid::Uuid::new_v4().to_string(),
      product_id: product_id.to_string(),
      status: InspectionStatus::NotInspected,
      timestamp: Utc::now(),
      duration_ms: 0,
      measurements: Vec::new(),
      defects: Vec::new(),
      product_position: None,
      node_results: Vec::new(),
      metadata: serde_json::Map::new(),
      error_message: None,
      cancelled: false,
      overlay: None,
    }
  }

  /// A run that could not start or complete.
  pub fn failed(product_id: &str, message: impl Into<String>) -> Self {
    Self {
      status: InspectionStatus::Error,
      error_message: Some(message.into()),
      ..Self::new(product_id)
    }
  }

  pub fn is_ok(&self) -> bool {
    self.status == InspectionStatus::Ok
  }

  pub fn result(&self, node_id: &str) -> Option<&FlowNodeResult> {
    self.node_results.iter().find(|r| r.node_id == node_id)
  }
}

/// What `FlowEngine::load` found worth reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
  pub node_count: usize,
  pub connection_count: usize,
  pub warnings: Vec<String>,
}

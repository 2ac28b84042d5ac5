use std::time::Instant;

use image::GrayImage;
use serde::Serialize;

use crate::buffer::BgrImage;
use crate::model::{Defect, InspectionStatus, Measurement, ProductPosition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ToolKind {
  TeachMatch,
  DistanceMeasure,
  DefectDetection,
}

/// A configured vision algorithm.
///
/// `run` must not panic on any input image; failures are reported through
/// [`ToolResult::failure`].
pub trait VisionTool: Send + Sync {
  fn kind(&self) -> ToolKind;

  /// Process `image`. `mask`, when given, has the image's dimensions and
  /// marks pixels to consider with non-zero values.
  fn run(&self, image: &BgrImage, mask: Option<&GrayImage>) -> ToolResult;
}

/// Output of a single tool invocation.
#[derive(Debug, Clone)]
pub struct ToolResult {
  pub success: bool,
  pub status: InspectionStatus,
  pub measurements: Vec<Measurement>,
  pub defects: Vec<Defect>,
  pub position: Option<ProductPosition>,
  pub elapsed_ms: u64,
  pub output_image: Option<BgrImage>,
  pub error_message: Option<String>,
  pub data: serde_json::Map<String, serde_json::Value>,
}

impl ToolResult {
  pub fn success(status: InspectionStatus) -> Self {
    Self {
      success: true,
      status,
      measurements: Vec::new(),
      defects: Vec::new(),
      position: None,
      elapsed_ms: 0,
      output_image: None,
      error_message: None,
      data: serde_json::Map::new(),
    }
  }

  pub fn failure(message: impl Into<String>) -> Self {
    Self {
      success: false,
      status: InspectionStatus::Error,
      error_message: Some(message.into()),
      ..Self::success(InspectionStatus::Error)
    }
  }

  pub fn with_data(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
    self.data.insert(key.to_string(), value.into());
    self
  }

  pub(crate) fn timed(mut self, started: Instant) -> Self {
    self.elapsed_ms = started.elapsed().as_millis() as u64;
    self
  }
}

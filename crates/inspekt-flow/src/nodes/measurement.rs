use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use inspekt_config::{ConfigMap, NodeKind};
use inspekt_vision::{DistanceConfig, DistanceMeasureTool, Point2, ProductPosition};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::node::{FlowNode, NO_INPUT_IMAGE, NodeCore, run_tool};
use crate::port::PortType;
use crate::result::FlowNodeResult;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Settings {
  #[serde(flatten)]
  tool: DistanceConfig,
  spec_id: Option<String>,
  follow_position: bool,
}

/// Measures a point-to-point distance and records it against a tolerance spec.
///
/// The spec comes inline (`spec`) or by reference into the product's
/// thresholds (`specId`); an inline spec wins. With `followPosition` the
/// points are read in the frame of the located pattern: rotated, scaled and
/// offset by the context's product position.
pub struct MeasurementNode {
  core: NodeCore,
  tool: DistanceConfig,
  spec_id: Option<String>,
  follow_position: bool,
}

impl MeasurementNode {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      core: NodeCore::new(id, NodeKind::Measurement, "Measurement")
        .with_input("Image In", PortType::Image)
        .with_output("Image Out", PortType::Image)
        .with_output("Result", PortType::Data),
      tool: DistanceConfig::default(),
      spec_id: None,
      follow_position: false,
    }
  }
}

#[async_trait]
impl FlowNode for MeasurementNode {
  fn core(&self) -> &NodeCore {
    &self.core
  }

  fn core_mut(&mut self) -> &mut NodeCore {
    &mut self.core
  }

  fn configure(&mut self, config: &ConfigMap) {
    let settings: Settings = self.core.parse_config(config);
    self.tool = settings.tool;
    self.spec_id = settings.spec_id.filter(|id| !id.is_empty());
    self.follow_position = settings.follow_position;
  }

  async fn execute(&mut self, ctx: &mut ExecutionContext, cancel: &CancellationToken) -> FlowNodeResult {
    let started = Instant::now();
    let id = self.core.id().to_string();
    let Some(image) = ctx.input_image(&self.core.inputs) else {
      return self.core.complete(FlowNodeResult::failure(&id, NO_INPUT_IMAGE), started);
    };
    self.core.input_image = Some(image.clone());

    let mut tool = DistanceMeasureTool::new(self.tool.clone());
    if self.follow_position {
      match ctx.product_position() {
        Some(position) => {
          let (p1, p2) = (self.tool.point1, self.tool.point2);
          tool.set_points(follow(p1, &position), follow(p2, &position));
        }
        None => {
          let result = FlowNodeResult::failure(&id, "No product position available");
          return self.core.complete(result, started);
        }
      }
    }
    if tool.config().spec.is_none()
      && let Some(spec_id) = &self.spec_id
    {
      match ctx.product().thresholds.measurement_spec(spec_id) {
        Some(spec) => tool.set_spec(spec.clone()),
        None => {
          let result = FlowNodeResult::failure(&id, format!("Measurement spec '{spec_id}' not found"));
          return self.core.complete(result, started);
        }
      }
    }

    let outcome = match run_tool(Arc::new(tool), image.clone(), None, cancel).await {
      Ok(outcome) => outcome,
      Err(e) => return self.core.complete(FlowNodeResult::from_error(&id, &e), started),
    };

    let measurements = outcome.measurements.clone();
    let mut result = FlowNodeResult::from_tool(&id, outcome, image);
    if let Some(first) = measurements.first() {
      result = result.with_data("value", first.value);
    }
    ctx.add_measurements(measurements);
    self.core.complete(result, started)
  }
}

/// Map a point given relative to the pattern center into image coordinates.
fn follow(point: Point2, position: &ProductPosition) -> Point2 {
  let (sin, cos) = position.rotation.to_radians().sin_cos();
  let (x, y) = (point.x * position.scale, point.y * position.scale);
  Point2::new(position.x + x * cos - y * sin, position.y + x * sin + y * cos)
}

#[cfg(test)]
mod tests {
  use super::*;
  use inspekt_config::{MeasurementSpec, ProductConfig};
  use inspekt_vision::{BgrImage, InspectionStatus};

  fn configured(config: serde_json::Value) -> MeasurementNode {
    let mut node = MeasurementNode::new("m");
    if let serde_json::Value::Object(map) = config {
      node.configure(&map);
    }
    node
  }

  fn product_with_spec() -> Arc<ProductConfig> {
    let mut product = ProductConfig::default();
    product.thresholds.measurement_specs.push(MeasurementSpec {
      id: "gap".to_string(),
      nominal: 5.0,
      tolerance_plus: 0.5,
      tolerance_minus: 0.5,
      pixels_per_unit: 10.0,
      ..MeasurementSpec::default()
    });
    Arc::new(product)
  }

  #[tokio::test]
  async fn test_spec_by_reference() {
    let mut node = configured(serde_json::json!({
      "point1": {"x": 10.0, "y": 30.0},
      "point2": {"x": 60.0, "y": 30.0},
      "useEdgeDetection": false,
      "specId": "gap"
    }));
    let mut ctx = ExecutionContext::new(Some(Arc::new(BgrImage::new(80, 60))), product_with_spec());
    let result = node.execute(&mut ctx, &CancellationToken::new()).await;

    assert_eq!(result.status, InspectionStatus::Ok);
    assert_eq!(ctx.measurements().len(), 1);
    assert!((ctx.measurements()[0].value - 5.0).abs() < 1e-9);
    assert_eq!(ctx.measurements()[0].unit, "mm");
    assert_eq!(result.data["value"], 5.0);
  }

  #[tokio::test]
  async fn test_unknown_spec_reference_fails() {
    let mut node = configured(serde_json::json!({"useEdgeDetection": false, "specId": "nope"}));
    let mut ctx = ExecutionContext::new(Some(Arc::new(BgrImage::new(80, 60))), Arc::default());
    let result = node.execute(&mut ctx, &CancellationToken::new()).await;
    assert!(!result.success);
    assert_eq!(result.error_message.as_deref(), Some("Measurement spec 'nope' not found"));
    assert!(ctx.measurements().is_empty());
  }

  #[tokio::test]
  async fn test_no_image() {
    let mut node = configured(serde_json::json!({}));
    let mut ctx = ExecutionContext::new(None, Arc::default());
    let result = node.execute(&mut ctx, &CancellationToken::new()).await;
    assert_eq!(result.error_message.as_deref(), Some(NO_INPUT_IMAGE));
  }

  #[test]
  fn test_follow_rotates_about_pattern_center() {
    let position = ProductPosition {
      x: 100.0,
      y: 50.0,
      rotation: 90.0,
      ..ProductPosition::default()
    };
    let mapped = follow(Point2::new(10.0, 0.0), &position);
    assert!((mapped.x - 100.0).abs() < 1e-9);
    assert!((mapped.y - 60.0).abs() < 1e-9);
  }

  #[tokio::test]
  async fn test_follow_position_measures_in_pattern_frame() {
    let mut node = configured(serde_json::json!({
      "point1": {"x": -20.0, "y": 0.0},
      "point2": {"x": 20.0, "y": 0.0},
      "useEdgeDetection": false,
      "followPosition": true
    }));
    let mut ctx = ExecutionContext::new(Some(Arc::new(BgrImage::new(80, 60))), Arc::default());
    let missing = node.execute(&mut ctx, &CancellationToken::new()).await;
    assert_eq!(missing.error_message.as_deref(), Some("No product position available"));

    node.reset();
    ctx.set_product_position(ProductPosition {
      x: 40.0,
      y: 30.0,
      scale: 0.5,
      ..ProductPosition::default()
    });
    let result = node.execute(&mut ctx, &CancellationToken::new()).await;
    assert!(result.success);
    assert!((ctx.measurements()[0].value - 20.0).abs() < 1e-9);
  }
}

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use inspekt_config::{ConfigMap, NodeKind};
use inspekt_vision::{InspectionStatus, build_mask};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::context::ExecutionContext;
use crate::node::{FlowNode, NO_INPUT_IMAGE, NodeCore};
use crate::port::PortType;
use crate::result::FlowNodeResult;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Settings {
  roi_id: Option<String>,
}

/// Publishes a processing mask for downstream tools and passes the image through.
///
/// With a `roiId` only that region is composed; otherwise every product ROI is.
pub struct RoiApplyNode {
  core: NodeCore,
  roi_id: Option<String>,
}

impl RoiApplyNode {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      core: NodeCore::new(id, NodeKind::RoiApply, "ROI Apply")
        .with_input("Image In", PortType::Image)
        .with_output("Image Out", PortType::Image),
      roi_id: None,
    }
  }
}

#[async_trait]
impl FlowNode for RoiApplyNode {
  fn core(&self) -> &NodeCore {
    &self.core
  }

  fn core_mut(&mut self) -> &mut NodeCore {
    &mut self.core
  }

  fn configure(&mut self, config: &ConfigMap) {
    let settings: Settings = self.core.parse_config(config);
    self.roi_id = settings.roi_id.filter(|id| !id.is_empty());
  }

  async fn execute(&mut self, ctx: &mut ExecutionContext, _cancel: &CancellationToken) -> FlowNodeResult {
    let started = Instant::now();
    let id = self.core.id().to_string();
    let Some(image) = ctx.input_image(&self.core.inputs) else {
      return self.core.complete(FlowNodeResult::failure(&id, NO_INPUT_IMAGE), started);
    };
    self.core.input_image = Some(image.clone());

    let rois = match &self.roi_id {
      Some(roi_id) => match ctx.product().rois.find(roi_id) {
        Some(roi) => vec![roi.clone()],
        None => {
          let result = FlowNodeResult::failure(&id, format!("ROI '{roi_id}' not found"));
          return self.core.complete(result, started);
        }
      },
      None => ctx.product().rois.rois.clone(),
    };

    let mask = build_mask(&rois, image.width(), image.height());
    let included = mask.pixels().filter(|p| p.0[0] > 0).count();
    let coverage = included as f64 / (mask.width() as f64 * mask.height() as f64).max(1.0);
    debug!(node_id = %id, roi_count = rois.len(), coverage, "mask published");
    ctx.set_mask(Arc::new(mask));

    let mut result = FlowNodeResult::success(&id, InspectionStatus::Ok)
      .with_image(image)
      .with_data("roiCount", rois.len())
      .with_data("coverage", coverage);
    if let Some(roi_id) = &self.roi_id {
      result = result.with_data("roiId", roi_id.as_str());
    }
    self.core.complete(result, started)
  }
}

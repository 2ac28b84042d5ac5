use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use inspekt_config::{ConfigMap, DefectThreshold, NodeKind};
use inspekt_vision::{DefectDetectionTool, build_mask};
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
  threshold: DefectThreshold,
  threshold_id: Option<String>,
}

/// Finds bright and dark spots inside the active mask.
///
/// Uses the mask published by an upstream ROI-Apply node when present,
/// otherwise composes one from the product's ROIs.
pub struct DefectDetectionNode {
  core: NodeCore,
  threshold: DefectThreshold,
  threshold_id: Option<String>,
}

impl DefectDetectionNode {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      core: NodeCore::new(id, NodeKind::DefectDetection, "Defect Detection")
        .with_input("Image In", PortType::Image)
        .with_output("Image Out", PortType::Image)
        .with_output("Defects", PortType::Data),
      threshold: DefectThreshold::default(),
      threshold_id: None,
    }
  }
}

#[async_trait]
impl FlowNode for DefectDetectionNode {
  fn core(&self) -> &NodeCore {
    &self.core
  }

  fn core_mut(&mut self) -> &mut NodeCore {
    &mut self.core
  }

  fn configure(&mut self, config: &ConfigMap) {
    let settings: Settings = self.core.parse_config(config);
    self.threshold = settings.threshold;
    self.threshold_id = settings.threshold_id.filter(|id| !id.is_empty());
  }

  async fn execute(&mut self, ctx: &mut ExecutionContext, cancel: &CancellationToken) -> FlowNodeResult {
    let started = Instant::now();
    let id = self.core.id().to_string();
    let Some(image) = ctx.input_image(&self.core.inputs) else {
      return self.core.complete(FlowNodeResult::failure(&id, NO_INPUT_IMAGE), started);
    };
    self.core.input_image = Some(image.clone());

    let threshold = match &self.threshold_id {
      Some(threshold_id) => match ctx.product().thresholds.defect_threshold(threshold_id) {
        Some(threshold) => threshold.clone(),
        None => {
          let result = FlowNodeResult::failure(&id, format!("Defect threshold '{threshold_id}' not found"));
          return self.core.complete(result, started);
        }
      },
      None => self.threshold.clone(),
    };

    let mask = ctx.mask().or_else(|| {
      let rois = &ctx.product().rois.rois;
      (!rois.is_empty()).then(|| Arc::new(build_mask(rois, image.width(), image.height())))
    });

    let tool = Arc::new(DefectDetectionTool::new(threshold));
    let outcome = match run_tool(tool, image.clone(), mask, cancel).await {
      Ok(outcome) => outcome,
      Err(e) => return self.core.complete(FlowNodeResult::from_error(&id, &e), started),
    };

    ctx.add_defects(outcome.defects.clone());
    let result = FlowNodeResult::from_tool(&id, outcome, image);
    self.core.complete(result, started)
  }
}

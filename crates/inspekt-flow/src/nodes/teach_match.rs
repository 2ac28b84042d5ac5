use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use inspekt_config::{ConfigMap, NodeKind, Roi};
use inspekt_vision::{BgrImage, TeachMatchConfig, TeachMatchTool, Template};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::ExecutionContext;
use crate::node::{FlowNode, NO_INPUT_IMAGE, NodeCore, run_tool};
use crate::port::PortType;
use crate::result::{FlowNodeResult, ValidationResult};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Settings {
  #[serde(flatten)]
  tool: TeachMatchConfig,
  roi_id: Option<String>,
  template: Option<Template>,
}

/// Locates a taught pattern and publishes its pose.
pub struct TeachMatchNode {
  core: NodeCore,
  tool: Arc<TeachMatchTool>,
  roi_id: Option<String>,
}

impl TeachMatchNode {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      core: NodeCore::new(id, NodeKind::TeachMatch, "Teach Match")
        .with_input("Image In", PortType::Image)
        .with_output("Image Out", PortType::Image)
        .with_output("Position", PortType::Coordinates),
      tool: Arc::new(TeachMatchTool::default()),
      roi_id: None,
    }
  }

  pub fn is_taught(&self) -> bool {
    self.tool.is_taught()
  }
}

#[async_trait]
impl FlowNode for TeachMatchNode {
  fn core(&self) -> &NodeCore {
    &self.core
  }

  fn core_mut(&mut self) -> &mut NodeCore {
    &mut self.core
  }

  fn configure(&mut self, config: &ConfigMap) {
    let settings: Settings = self.core.parse_config(config);
    let mut tool = TeachMatchTool::new(settings.tool);
    if let Some(template) = settings.template {
      tool.set_template(template);
    }
    self.tool = Arc::new(tool);
    self.roi_id = settings.roi_id;
  }

  async fn execute(&mut self, ctx: &mut ExecutionContext, cancel: &CancellationToken) -> FlowNodeResult {
    let started = Instant::now();
    let id = self.core.id().to_string();
    let Some(image) = ctx.input_image(&self.core.inputs) else {
      return self.core.complete(FlowNodeResult::failure(&id, NO_INPUT_IMAGE), started);
    };
    self.core.input_image = Some(image.clone());

    let tool = match run_tool(self.tool.clone(), image.clone(), None, cancel).await {
      Ok(tool) => tool,
      Err(e) => return self.core.complete(FlowNodeResult::from_error(&id, &e), started),
    };

    let position = tool.position;
    let mut result = FlowNodeResult::from_tool(&id, tool, image);
    if let Some(position) = position {
      ctx.set_product_position(position);
      if let Ok(value) = serde_json::to_value(position) {
        result = result.with_data("position", value);
      }
    }
    self.core.complete(result, started)
  }

  fn validate(&self) -> ValidationResult {
    let mut result = self.core.base_validation();
    if !self.tool.is_taught() {
      result.add_error("Pattern has not been taught");
    }
    result
  }

  fn teach(&mut self, image: &BgrImage, rois: &[Roi], roi_id: Option<&str>) -> FlowNodeResult {
    let id = self.core.id().to_string();
    let roi = match roi_id.or(self.roi_id.as_deref()) {
      Some(roi_id) => match rois.iter().find(|r| r.id == roi_id) {
        Some(roi) => Some(roi),
        None => return FlowNodeResult::failure(&id, format!("ROI '{roi_id}' not found")),
      },
      None => None,
    };

    let tool = Arc::make_mut(&mut self.tool);
    let outcome = tool.teach(image, roi);
    if outcome.success
      && let Some(template) = tool.template()
    {
      match serde_json::to_value(template) {
        Ok(value) => {
          self.core.config_mut().insert("template".to_string(), value);
          info!(node_id = %id, "template stored in node configuration");
        }
        Err(e) => warn!(node_id = %id, error = %e, "could not serialize template"),
      }
    }

    FlowNodeResult::from_tool(&id, outcome, Arc::new(image.clone()))
  }
}

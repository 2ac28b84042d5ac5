use std::time::Instant;

use async_trait::async_trait;
use inspekt_config::{ConfigMap, NodeKind};
use inspekt_vision::InspectionStatus;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::node::{FlowNode, NO_INPUT_IMAGE, NodeCore};
use crate::port::PortType;
use crate::result::FlowNodeResult;

/// Publishes the run's frame to the flow.
pub struct InputImageNode {
  core: NodeCore,
}

impl InputImageNode {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      core: NodeCore::new(id, NodeKind::InputImage, "Input Image").with_output("Image Out", PortType::Image),
    }
  }
}

#[async_trait]
impl FlowNode for InputImageNode {
  fn core(&self) -> &NodeCore {
    &self.core
  }

  fn core_mut(&mut self) -> &mut NodeCore {
    &mut self.core
  }

  fn configure(&mut self, config: &ConfigMap) {
    self.core.set_config(config);
  }

  async fn execute(&mut self, ctx: &mut ExecutionContext, _cancel: &CancellationToken) -> FlowNodeResult {
    let started = Instant::now();
    let Some(image) = ctx.image() else {
      return self
        .core
        .complete(FlowNodeResult::failure(self.core.id(), NO_INPUT_IMAGE), started);
    };

    self.core.input_image = Some(image.clone());
    let result = FlowNodeResult::success(self.core.id(), InspectionStatus::Ok)
      .with_data("width", image.width())
      .with_data("height", image.height())
      .with_image(image);
    self.core.complete(result, started)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use inspekt_vision::BgrImage;
  use std::sync::Arc;

  #[tokio::test]
  async fn test_forwards_frame() {
    let mut node = InputImageNode::new("in");
    let mut ctx = ExecutionContext::new(Some(Arc::new(BgrImage::new(6, 3))), Arc::default());

    let result = node.execute(&mut ctx, &CancellationToken::new()).await;

    assert!(result.success);
    assert_eq!(result.data["width"], 6);
    assert!(node.core().executed);
    assert!(result.output_image.is_some());
  }

  #[tokio::test]
  async fn test_fails_without_frame() {
    let mut node = InputImageNode::new("in");
    let mut ctx = ExecutionContext::new(None, Arc::default());

    let result = node.execute(&mut ctx, &CancellationToken::new()).await;

    assert!(!result.success);
    assert_eq!(result.status, InspectionStatus::Error);
    assert_eq!(result.error_message.as_deref(), Some("No input image available"));
  }
}

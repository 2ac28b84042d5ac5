use std::time::Instant;

use async_trait::async_trait;
use inspekt_config::{ConfigMap, NodeKind};
use inspekt_vision::InspectionStatus;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::node::{FlowNode, NodeCore};
use crate::port::PortType;
use crate::result::{FlowNodeResult, ValidationResult};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Settings {
  true_target: Option<String>,
  false_target: Option<String>,
  variable: Option<String>,
}

/// Routes the run to one of two downstream nodes.
///
/// The condition holds when every non-skipped input finished `OK`, or, with
/// `variable` set, when that context variable is truthy. The chosen target is
/// reported through `next_node_id`; the engine skips the other dependents.
pub struct ConditionalBranchNode {
  core: NodeCore,
  settings: Settings,
}

impl ConditionalBranchNode {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      core: NodeCore::new(id, NodeKind::ConditionalBranch, "Conditional Branch")
        .with_input("Condition", PortType::Boolean)
        .with_output("True", PortType::Boolean)
        .with_output("False", PortType::Boolean),
      settings: Settings::default(),
    }
  }

  fn condition(&self, ctx: &ExecutionContext) -> bool {
    if let Some(name) = &self.settings.variable {
      return match ctx.variables.get(name) {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
      };
    }
    let statuses: Vec<_> = self
      .core
      .inputs
      .iter()
      .filter_map(|id| ctx.result(id))
      .map(|r| r.status)
      .filter(|s| *s != InspectionStatus::Skipped)
      .collect();
    !statuses.is_empty() && statuses.iter().all(|s| *s == InspectionStatus::Ok)
  }
}

#[async_trait]
impl FlowNode for ConditionalBranchNode {
  fn core(&self) -> &NodeCore {
    &self.core
  }

  fn core_mut(&mut self) -> &mut NodeCore {
    &mut self.core
  }

  fn configure(&mut self, config: &ConfigMap) {
    self.settings = self.core.parse_config(config);
  }

  async fn execute(&mut self, ctx: &mut ExecutionContext, _cancel: &CancellationToken) -> FlowNodeResult {
    let started = Instant::now();
    let condition = self.condition(ctx);
    let target = if condition {
      self.settings.true_target.clone()
    } else {
      self.settings.false_target.clone()
    };

    let mut result = FlowNodeResult::success(self.core.id(), InspectionStatus::Ok).with_data("condition", condition);
    if let Some(image) = ctx.input_image(&self.core.inputs) {
      result = result.with_image(image);
    }
    result.next_node_id = target;
    self.core.complete(result, started)
  }

  fn validate(&self) -> ValidationResult {
    let mut result = self.core.base_validation();
    if self.settings.true_target.is_none() && self.settings.false_target.is_none() {
      result.add_warning("No branch target configured");
    }
    result
  }
}

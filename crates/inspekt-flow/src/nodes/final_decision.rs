use std::time::Instant;

use async_trait::async_trait;
use inspekt_config::{ConfigMap, NodeKind};
use inspekt_vision::InspectionStatus;
use serde::{Deserialize, Deserializer};
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::node::{FlowNode, NodeCore};
use crate::port::PortType;
use crate::result::FlowNodeResult;

/// How input statuses combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecisionLogic {
  /// Every input must be OK.
  #[default]
  And,
  /// At least one input must be OK.
  Or,
}

impl DecisionLogic {
  pub fn as_str(&self) -> &'static str {
    match self {
      DecisionLogic::And => "AND",
      DecisionLogic::Or => "OR",
    }
  }

  /// Combine statuses. `Error` dominates; no statuses means nothing was inspected.
  pub fn combine(&self, statuses: &[InspectionStatus]) -> InspectionStatus {
    if statuses.is_empty() {
      return InspectionStatus::NotInspected;
    }
    if statuses.contains(&InspectionStatus::Error) {
      return InspectionStatus::Error;
    }
    let ok = |s: &InspectionStatus| *s == InspectionStatus::Ok;
    let pass = match self {
      DecisionLogic::And => statuses.iter().all(ok),
      DecisionLogic::Or => statuses.iter().any(ok),
    };
    if pass { InspectionStatus::Ok } else { InspectionStatus::Ng }
  }
}

impl<'de> Deserialize<'de> for DecisionLogic {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(if raw.eq_ignore_ascii_case("or") {
      DecisionLogic::Or
    } else {
      DecisionLogic::And
    })
  }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Settings {
  logic: DecisionLogic,
  conditions: Vec<serde_json::Value>,
}

/// Aggregates upstream statuses into the verdict of the run.
pub struct FinalDecisionNode {
  core: NodeCore,
  settings: Settings,
}

impl FinalDecisionNode {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      core: NodeCore::new(id, NodeKind::FinalDecision, "Final Decision").with_input("Decision In", PortType::Data),
      settings: Settings::default(),
    }
  }

  pub fn logic(&self) -> DecisionLogic {
    self.settings.logic
  }
}

#[async_trait]
impl FlowNode for FinalDecisionNode {
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
    let statuses: Vec<InspectionStatus> = self
      .core
      .inputs
      .iter()
      .filter_map(|id| ctx.result(id))
      .map(|r| r.status)
      .filter(|s| *s != InspectionStatus::Skipped)
      .collect();

    let status = self.settings.logic.combine(&statuses);
    let count = |wanted: InspectionStatus| statuses.iter().filter(|s| **s == wanted).count();
    let mut result = FlowNodeResult::success(self.core.id(), status)
      .with_data("logic", self.settings.logic.as_str())
      .with_data("inputCount", statuses.len())
      .with_data("okCount", count(InspectionStatus::Ok))
      .with_data("ngCount", count(InspectionStatus::Ng));
    if !self.settings.conditions.is_empty() {
      result = result.with_data("conditions", self.settings.conditions.clone());
    }
    if let Some(image) = ctx.input_image(&self.core.inputs) {
      result = result.with_image(image);
    }
    self.core.complete(result, started)
  }
}

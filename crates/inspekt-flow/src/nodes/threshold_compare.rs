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

/// Where a compared value is read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareSource {
  /// A measurement recorded in the context, by id or name.
  Measurement,
  /// A user variable in the context.
  Variable,
  /// A data field of an upstream node's result. `key` defaults to the first input.
  #[default]
  Node,
}

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Settings {
  source: CompareSource,
  key: Option<String>,
  field: String,
  min: Option<f64>,
  max: Option<f64>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      source: CompareSource::default(),
      key: None,
      field: "value".to_string(),
      min: None,
      max: None,
    }
  }
}

/// Checks a numeric value against an inclusive band.
pub struct ThresholdCompareNode {
  core: NodeCore,
  settings: Settings,
}

impl ThresholdCompareNode {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      core: NodeCore::new(id, NodeKind::ThresholdCompare, "Threshold Compare")
        .with_input("Value In", PortType::Data)
        .with_output("Pass", PortType::Boolean),
      settings: Settings::default(),
    }
  }

  fn lookup(&self, ctx: &ExecutionContext) -> Option<(String, f64)> {
    let s = &self.settings;
    match s.source {
      CompareSource::Measurement => {
        let key = s.key.as_deref()?;
        let m = ctx.measurements().iter().find(|m| m.id == key || m.name == key)?;
        Some((key.to_string(), m.value))
      }
      CompareSource::Variable => {
        let key = s.key.as_deref()?;
        Some((key.to_string(), ctx.variables.get(key)?.as_f64()?))
      }
      CompareSource::Node => {
        let key = s.key.as_deref().or(self.core.inputs.first().map(String::as_str))?;
        let value = ctx.result(key)?.data.get(&s.field)?.as_f64()?;
        Some((format!("{key}.{}", s.field), value))
      }
    }
  }
}

#[async_trait]
impl FlowNode for ThresholdCompareNode {
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
    let id = self.core.id().to_string();

    let Some((label, value)) = self.lookup(ctx) else {
      let key = self.settings.key.as_deref().unwrap_or(&self.settings.field);
      let result = FlowNodeResult::failure(&id, format!("Value '{key}' not available"));
      return self.core.complete(result, started);
    };

    let pass = self.settings.min.is_none_or(|min| value >= min) && self.settings.max.is_none_or(|max| value <= max);
    let status = if pass { InspectionStatus::Ok } else { InspectionStatus::Ng };
    let result = FlowNodeResult::success(&id, status)
      .with_data("source", label)
      .with_data("value", value)
      .with_data("pass", pass);
    self.core.complete(result, started)
  }

  fn validate(&self) -> ValidationResult {
    let mut result = self.core.base_validation();
    if let (Some(min), Some(max)) = (self.settings.min, self.settings.max)
      && min > max
    {
      result.add_error(format!("min ({min}) is greater than max ({max})"));
    }
    if self.settings.source != CompareSource::Node && self.settings.key.is_none() {
      result.add_error("A key is required for this source");
    }
    result
  }
}

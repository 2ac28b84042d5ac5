use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use inspekt_config::{ConfigMap, NodeKind, Roi};
use inspekt_vision::{BgrImage, GrayImage, ToolResult, VisionTool};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::context::ExecutionContext;
use crate::error::FlowError;
use crate::port::{NodePort, PortDirection, PortType};
use crate::result::{FlowNodeResult, ValidationResult};

/// State shared by every node variant.
#[derive(Debug, Clone)]
pub struct NodeCore {
  id: String,
  kind: NodeKind,
  pub name: String,
  pub position: (f64, f64),
  /// Ids of upstream nodes. Drives scheduling.
  pub inputs: Vec<String>,
  /// Ids of downstream nodes. Advisory.
  pub outputs: Vec<String>,
  input_ports: Vec<NodePort>,
  output_ports: Vec<NodePort>,
  pub input_image: Option<Arc<BgrImage>>,
  pub output_image: Option<Arc<BgrImage>>,
  pub result: Option<FlowNodeResult>,
  /// The node's own logic ran this run. Skipped nodes get a result but stay
  /// unexecuted.
  pub executed: bool,
  config: ConfigMap,
  config_errors: Vec<String>,
}

impl NodeCore {
  pub fn new(id: impl Into<String>, kind: NodeKind, name: &str) -> Self {
    Self {
      id: id.into(),
      kind,
      name: name.to_string(),
      position: (0.0, 0.0),
      inputs: Vec::new(),
      outputs: Vec::new(),
      input_ports: Vec::new(),
      output_ports: Vec::new(),
      input_image: None,
      output_image: None,
      result: None,
      executed: false,
      config: ConfigMap::new(),
      config_errors: Vec::new(),
    }
  }

  pub fn with_input(mut self, name: &str, port_type: PortType) -> Self {
    let port = NodePort::new(name, port_type, PortDirection::Input, &self.id);
    self.input_ports.push(port);
    self
  }

  pub fn with_output(mut self, name: &str, port_type: PortType) -> Self {
    let port = NodePort::new(name, port_type, PortDirection::Output, &self.id);
    self.output_ports.push(port);
    self
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn kind(&self) -> NodeKind {
    self.kind
  }

  pub fn input_ports(&self) -> &[NodePort] {
    &self.input_ports
  }

  pub fn output_ports(&self) -> &[NodePort] {
    &self.output_ports
  }

  /// Flag the named port as connected. Returns false if no such port exists.
  pub fn mark_connected(&mut self, direction: PortDirection, name: &str) -> bool {
    let ports = match direction {
      PortDirection::Input => &mut self.input_ports,
      PortDirection::Output => &mut self.output_ports,
    };
    match ports.iter_mut().find(|p| p.name.eq_ignore_ascii_case(name)) {
      Some(port) => {
        port.connected = true;
        true
      }
      None => false,
    }
  }

  /// The payload as it should be persisted.
  pub fn config(&self) -> &ConfigMap {
    &self.config
  }

  pub fn config_mut(&mut self) -> &mut ConfigMap {
    &mut self.config
  }

  /// Store a payload that carries no settings.
  pub fn set_config(&mut self, config: &ConfigMap) {
    self.config = config.clone();
    self.config_errors.clear();
  }

  pub fn config_errors(&self) -> &[String] {
    &self.config_errors
  }

  /// Store `config` and parse it into a node's settings.
  ///
  /// Keys nested under a `"config"` object are lifted to the top level.
  /// Unparsable payloads yield the defaults and are reported by `validate`.
  pub fn parse_config<T: DeserializeOwned + Default>(&mut self, config: &ConfigMap) -> T {
    self.set_config(config);

    let mut merged = config.clone();
    if let Some(serde_json::Value::Object(nested)) = config.get("config") {
      merged.remove("config");
      merged.extend(nested.clone());
    }

    match serde_json::from_value(serde_json::Value::Object(merged)) {
      Ok(settings) => settings,
      Err(e) => {
        warn!(node_id = %self.id, error = %e, "invalid node configuration, using defaults");
        self.config_errors.push(format!("Invalid configuration: {e}"));
        T::default()
      }
    }
  }

  /// Validation result seeded with configuration errors.
  pub fn base_validation(&self) -> ValidationResult {
    let mut result = ValidationResult::valid();
    for error in &self.config_errors {
      result.add_error(error.clone());
    }
    result
  }

  pub fn reset(&mut self) {
    self.input_image = None;
    self.output_image = None;
    self.result = None;
    self.executed = false;
  }

  /// Stamp timing, remember the result and mark the node executed.
  pub fn complete(&mut self, mut result: FlowNodeResult, started: Instant) -> FlowNodeResult {
    if result.execution_time_ms == 0 {
      result.execution_time_ms = started.elapsed().as_millis() as u64;
    }
    self.output_image = result.output_image.clone();
    self.result = Some(result.clone());
    self.executed = true;
    result
  }
}

/// A unit of work in an inspection flow.
#[async_trait]
pub trait FlowNode: Send + Sync {
  fn core(&self) -> &NodeCore;

  fn core_mut(&mut self) -> &mut NodeCore;

  /// Absorb a configuration payload.
  fn configure(&mut self, config: &ConfigMap);

  /// Run against the shared context. Never panics; failures become failed results.
  async fn execute(&mut self, ctx: &mut ExecutionContext, cancel: &CancellationToken) -> FlowNodeResult;

  fn validate(&self) -> ValidationResult {
    self.core().base_validation()
  }

  fn reset(&mut self) {
    self.core_mut().reset();
  }

  /// Learn a reference pattern. Only pattern nodes support this.
  fn teach(&mut self, _image: &BgrImage, _rois: &[Roi], _roi_id: Option<&str>) -> FlowNodeResult {
    FlowNodeResult::failure(
      self.core().id(),
      format!("{} nodes cannot be taught", self.core().kind()),
    )
  }

  fn id(&self) -> &str {
    self.core().id()
  }

  fn kind(&self) -> NodeKind {
    self.core().kind()
  }
}

/// Run a tool on a blocking thread, giving up early if the run is cancelled.
pub(crate) async fn run_tool<T: VisionTool + 'static>(
  tool: Arc<T>,
  image: Arc<BgrImage>,
  mask: Option<Arc<GrayImage>>,
  cancel: &CancellationToken,
) -> Result<ToolResult, FlowError> {
  if cancel.is_cancelled() {
    return Err(FlowError::Cancelled);
  }
  let task = tokio::task::spawn_blocking(move || tool.run(&image, mask.as_deref()));
  tokio::select! {
    joined = task => joined.map_err(|e| FlowError::ToolTask { message: e.to_string() }),
    _ = cancel.cancelled() => Err(FlowError::Cancelled),
  }
}

/// Common failure for nodes that need an image.
pub(crate) const NO_INPUT_IMAGE: &str = "No input image available";

//! Flow engine.
//!
//! `FlowEngine` owns the live node graph of one flow. Nodes run one at a
//! time against a single `ExecutionContext`, in the order a dependency-counted
//! ready queue releases them.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use inspekt_config::{ConnectionDef, FlowDef, NodeDef, NodeKind, ProductConfig, Roi};
use inspekt_flow::{ExecutionContext, FlowNode, FlowNodeResult, NodeRegistry, PortDirection, ValidationResult};
use inspekt_vision::{BgrImage, InspectionStatus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::EngineError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::graph::Graph;
use crate::result::{InspectionResult, LoadReport};

/// Message of a run stopped by its cancellation token.
pub const CANCELLED_MESSAGE: &str = "execution cancelled";

/// Runs inspection flows.
///
/// Generic over `N: ExecutionNotifier` so callers choose how events are
/// observed. `FlowEngine::default()` builds every built-in node kind and
/// discards events.
pub struct FlowEngine<N: ExecutionNotifier = NoopNotifier> {
  registry: NodeRegistry,
  notifier: N,
  flow_id: String,
  name: String,
  version: String,
  nodes: Vec<Box<dyn FlowNode>>,
  index: HashMap<String, usize>,
  connections: Vec<ConnectionDef>,
  graph: Graph,
  load_warnings: Vec<String>,
}

impl Default for FlowEngine<NoopNotifier> {
  fn default() -> Self {
    Self::new(NodeRegistry::builtin(), NoopNotifier)
  }
}

impl<N: ExecutionNotifier> FlowEngine<N> {
  pub fn new(registry: NodeRegistry, notifier: N) -> Self {
    Self {
      registry,
      notifier,
      flow_id: String::new(),
      name: String::new(),
      version: String::new(),
      nodes: Vec::new(),
      index: HashMap::new(),
      connections: Vec::new(),
      graph: Graph::default(),
      load_warnings: Vec::new(),
    }
  }

  pub fn flow_id(&self) -> &str {
    &self.flow_id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn node(&self, node_id: &str) -> Option<&dyn FlowNode> {
    self.index.get(node_id).map(|&i| self.nodes[i].as_ref())
  }

  /// Nodes in load order.
  pub fn nodes(&self) -> impl Iterator<Item = &dyn FlowNode> {
    self.nodes.iter().map(|n| n.as_ref())
  }

  pub fn notifier(&self) -> &N {
    &self.notifier
  }

  /// Replace the live graph with one built from `flow`.
  ///
  /// Node records keep their ids. Connection records are merged into the
  /// records' adjacency lists, skipping ids already present, so loading a
  /// saved definition again yields the same graph. Connections naming
  /// unknown nodes are reported as warnings and ignored. On error the
  /// previous graph is left untouched.
  pub fn load(&mut self, flow: &FlowDef) -> Result<LoadReport, EngineError> {
    let mut nodes: Vec<Box<dyn FlowNode>> = Vec::with_capacity(flow.nodes.len());
    let mut index = HashMap::with_capacity(flow.nodes.len());

    for def in &flow.nodes {
      if index.contains_key(&def.node_id) {
        return Err(EngineError::DuplicateNode {
          node_id: def.node_id.clone(),
        });
      }
      let mut node = self.registry.create(def.node_type, def.node_id.clone())?;
      let core = node.core_mut();
      if !def.name.is_empty() {
        core.name = def.name.clone();
      }
      core.position = (def.position_x, def.position_y);
      core.inputs = def.inputs.clone();
      core.outputs = def.outputs.clone();
      node.configure(&def.config);

      index.insert(def.node_id.clone(), nodes.len());
      nodes.push(node);
    }

    let mut warnings = Vec::new();
    for conn in &flow.connections {
      let (Some(&source), Some(&target)) = (index.get(&conn.source_node_id), index.get(&conn.target_node_id)) else {
        warn!(connection_id = %conn.id, "connection references an unknown node");
        warnings.push(format!(
          "Connection '{}' references unknown node ({} -> {})",
          conn.id, conn.source_node_id, conn.target_node_id
        ));
        continue;
      };

      let source_core = nodes[source].core_mut();
      push_unique(&mut source_core.outputs, &conn.target_node_id);
      if !source_core.mark_connected(PortDirection::Output, &conn.source_port) {
        debug!(node_id = %conn.source_node_id, port = %conn.source_port, "no output port with this name");
      }
      let target_core = nodes[target].core_mut();
      push_unique(&mut target_core.inputs, &conn.source_node_id);
      if !target_core.mark_connected(PortDirection::Input, &conn.target_port) {
        debug!(node_id = %conn.target_node_id, port = %conn.target_port, "no input port with this name");
      }
    }

    let graph = Graph::new(nodes.iter().map(|n| (n.id(), n.core().inputs.as_slice())));

    self.flow_id = flow.flow_id.clone();
    self.name = flow.name.clone();
    self.version = flow.version.clone();
    self.nodes = nodes;
    self.index = index;
    self.connections = flow.connections.clone();
    self.graph = graph;
    self.load_warnings = warnings.clone();

    info!(
      flow_id = %self.flow_id,
      node_count = self.nodes.len(),
      connection_count = self.connections.len(),
      warning_count = warnings.len(),
      "flow_loaded"
    );

    Ok(LoadReport {
      node_count: self.nodes.len(),
      connection_count: self.connections.len(),
      warnings,
    })
  }

  /// Snapshot of the live graph as a flow document.
  pub fn definition(&self) -> FlowDef {
    let nodes = self
      .nodes
      .iter()
      .map(|node| {
        let core = node.core();
        NodeDef {
          node_id: core.id().to_string(),
          node_type: core.kind(),
          name: core.name.clone(),
          position_x: core.position.0,
          position_y: core.position.1,
          inputs: core.inputs.clone(),
          outputs: core.outputs.clone(),
          config: core.config().clone(),
        }
      })
      .collect();

    FlowDef {
      flow_id: self.flow_id.clone(),
      name: self.name.clone(),
      version: self.version.clone(),
      nodes,
      connections: self.connections.clone(),
    }
  }

  /// Check the graph and every node without running anything.
  pub fn validate(&self) -> ValidationResult {
    let mut result = ValidationResult::valid();
    if self.nodes.is_empty() {
      result.add_error(EngineError::NoNodes.to_string());
      return result;
    }
    if self.graph.entry_points().is_empty() {
      result.add_error(EngineError::NoEntryNodes.to_string());
    }
    for (node_id, input_id) in self.graph.unresolved() {
      let error = EngineError::UnresolvedInput {
        node_id: node_id.clone(),
        input_id: input_id.clone(),
      };
      result.add_error(error.to_string());
    }
    if !self.graph.entry_points().is_empty() {
      let blocked = self.graph.blocked();
      if !blocked.is_empty() {
        result.add_error(EngineError::Cycle { nodes: blocked }.to_string());
      }
    }

    match self.final_decisions().count() {
      0 => result.add_warning("Flow has no FinalDecision node"),
      1 => {}
      n => result.add_warning(format!("Flow has {n} FinalDecision nodes; the first one decides")),
    }
    for warning in &self.load_warnings {
      result.add_warning(warning.clone());
    }

    for node in &self.nodes {
      let name = &node.core().name;
      let node_result = node.validate();
      for error in node_result.errors {
        result.add_error(format!("Node '{name}': {error}"));
      }
      for warning in node_result.warnings {
        result.add_warning(format!("Node '{name}': {warning}"));
      }
    }
    result
  }

  /// Teach a node a reference pattern from `image`.
  pub fn teach(
    &mut self,
    node_id: &str,
    image: &BgrImage,
    rois: &[Roi],
    roi_id: Option<&str>,
  ) -> Result<FlowNodeResult, EngineError> {
    let &i = self.index.get(node_id).ok_or_else(|| EngineError::UnknownNode {
      node_id: node_id.to_string(),
    })?;
    let result = self.nodes[i].teach(image, rois, roi_id);
    if result.success {
      info!(node_id = %node_id, "node_taught");
    } else {
      warn!(node_id = %node_id, error = ?result.error_message, "teach failed");
    }
    Ok(result)
  }

  /// Run the flow from a raw BGR buffer.
  pub async fn execute_raw(
    &mut self,
    bytes: Vec<u8>,
    width: u32,
    height: u32,
    product: Arc<ProductConfig>,
    cancel: CancellationToken,
  ) -> InspectionResult {
    match BgrImage::from_raw(width, height, bytes) {
      Ok(image) => self.execute(image, product, cancel).await,
      Err(e) => InspectionResult::failed(&product.product.product_id, e.to_string()),
    }
  }

  /// Run the flow once against `image`.
  ///
  /// Never fails: structural problems, node failures and cancellation all
  /// come back as an inspection result.
  #[instrument(
    name = "inspection_execute",
    skip(self, image, product, cancel),
    fields(flow_id = %self.flow_id, product_id = %product.product.product_id)
  )]
  pub async fn execute(
    &mut self,
    image: BgrImage,
    product: Arc<ProductConfig>,
    cancel: CancellationToken,
  ) -> InspectionResult {
    let started = Instant::now();
    let product_id = product.product.product_id.clone();
    let mut ctx = ExecutionContext::new(Some(Arc::new(image)), product);
    let execution_id = ctx.execution_id().to_string();

    for node in &mut self.nodes {
      node.reset();
    }

    info!(execution_id = %execution_id, node_count = self.nodes.len(), "inspection_started");
    self.notifier.notify(ExecutionEvent::InspectionStarted {
      execution_id: execution_id.clone(),
      flow_id: self.flow_id.clone(),
      product_id: product_id.clone(),
    });

    if let Err(e) = self.graph.check() {
      error!(execution_id = %execution_id, error = %e, "inspection_failed");
      self.notifier.notify(ExecutionEvent::InspectionFailed {
        execution_id: execution_id.clone(),
        error: e.to_string(),
      });
      let mut result = InspectionResult::failed(&product_id, e.to_string());
      result.duration_ms = started.elapsed().as_millis() as u64;
      result.metadata = self.metadata(&execution_id);
      return result;
    }

    let mut remaining = self.graph.in_degrees();
    let mut ready: VecDeque<String> = self.graph.entry_points().iter().cloned().collect();
    let mut skip: HashSet<String> = HashSet::new();
    let mut order: Vec<String> = Vec::with_capacity(self.nodes.len());
    let mut overlay = None;
    let mut cancelled = false;

    while let Some(node_id) = ready.pop_front() {
      if cancel.is_cancelled() {
        cancelled = true;
        break;
      }
      let i = self.index[&node_id];

      let upstream = self.graph.upstream(&node_id);
      let all_skipped = !upstream.is_empty()
        && upstream
          .iter()
          .all(|id| ctx.result(id).is_some_and(|r| r.status == InspectionStatus::Skipped));

      let result = if skip.contains(&node_id) || all_skipped {
        debug!(execution_id = %execution_id, node_id = %node_id, "node_skipped");
        self.notifier.notify(ExecutionEvent::NodeSkipped {
          execution_id: execution_id.clone(),
          node_id: node_id.clone(),
        });
        let result = FlowNodeResult::skipped(&node_id);
        self.nodes[i].core_mut().result = Some(result.clone());
        result
      } else {
        let result = self.nodes[i].execute(&mut ctx, &cancel).await;
        self.report(&execution_id, &result);
        cancelled |= result.cancelled;
        if result.output_image.is_some() {
          overlay = result.output_image.clone();
        }
        if self.nodes[i].kind() == NodeKind::ConditionalBranch && result.success {
          let chosen = result.next_node_id.as_deref();
          for next in self.graph.downstream(&node_id) {
            if Some(next.as_str()) != chosen {
              skip.insert(next.clone());
            }
          }
        }
        result
      };

      if let Err(e) = ctx.record(result) {
        warn!(execution_id = %execution_id, error = %e, "result not recorded");
      }
      order.push(node_id.clone());

      for next in self.graph.downstream(&node_id) {
        if let Some(count) = remaining.get_mut(next) {
          *count -= 1;
          if *count == 0 {
            ready.push_back(next.clone());
          }
        }
      }
    }
    cancelled |= cancel.is_cancelled() && order.len() < self.nodes.len();

    let status = self
      .final_decisions()
      .next()
      .and_then(|node| ctx.result(node.id()))
      .map(|r| r.status)
      .filter(|s| *s != InspectionStatus::Skipped)
      .unwrap_or(InspectionStatus::NotInspected);

    let mut result = InspectionResult::new(&product_id);
    result.metadata = self.metadata(&execution_id);
    let (measurements, defects, position, mut results) = ctx.into_parts();
    result.measurements = measurements;
    result.defects = defects;
    result.product_position = position;
    result.node_results = order.iter().filter_map(|id| results.remove(id)).collect();
    result.overlay = overlay;
    result.duration_ms = started.elapsed().as_millis() as u64;

    if cancelled {
      result.status = InspectionStatus::Error;
      result.cancelled = true;
      result.error_message = Some(CANCELLED_MESSAGE.to_string());
      warn!(execution_id = %execution_id, executed = order.len(), "inspection_cancelled");
      self.notifier.notify(ExecutionEvent::InspectionFailed {
        execution_id,
        error: CANCELLED_MESSAGE.to_string(),
      });
    } else {
      result.status = status;
      info!(
        execution_id = %execution_id,
        status = %status.as_str(),
        duration_ms = result.duration_ms,
        defect_count = result.defects.len(),
        measurement_count = result.measurements.len(),
        "inspection_completed"
      );
      self.notifier.notify(ExecutionEvent::InspectionCompleted { execution_id, status });
    }
    result
  }

  fn report(&self, execution_id: &str, result: &FlowNodeResult) {
    if result.success {
      debug!(
        execution_id = %execution_id,
        node_id = %result.node_id,
        status = %result.status.as_str(),
        elapsed_ms = result.execution_time_ms,
        "node_completed"
      );
      self.notifier.notify(ExecutionEvent::NodeCompleted {
        execution_id: execution_id.to_string(),
        node_id: result.node_id.clone(),
        status: result.status,
        elapsed_ms: result.execution_time_ms,
      });
    } else {
      let error = result.error_message.clone().unwrap_or_default();
      warn!(execution_id = %execution_id, node_id = %result.node_id, error = %error, "node_failed");
      self.notifier.notify(ExecutionEvent::NodeFailed {
        execution_id: execution_id.to_string(),
        node_id: result.node_id.clone(),
        error,
      });
    }
  }

  fn final_decisions(&self) -> impl Iterator<Item = &Box<dyn FlowNode>> {
    self.nodes.iter().filter(|n| n.kind() == NodeKind::FinalDecision)
  }

  fn metadata(&self, execution_id: &str) -> serde_json::Map<String, serde_json::Value> {
    let mut metadata = serde_json::Map::new();
    metadata.insert("executionId".to_string(), execution_id.into());
    metadata.insert("flowId".to_string(), self.flow_id.clone().into());
    metadata.insert("flowName".to_string(), self.name.clone().into());
    metadata.insert("nodeCount".to_string(), self.nodes.len().into());
    metadata
  }
}

fn push_unique(ids: &mut Vec<String>, id: &str) {
  if !ids.iter().any(|existing| existing == id) {
    ids.push(id.to_string());
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn flow() -> FlowDef {
    let mut flow = FlowDef::new("Plate check");
    flow.nodes = vec![
      NodeDef::new("input", NodeKind::InputImage, "Camera"),
      NodeDef::new("defects", NodeKind::DefectDetection, "Spots"),
      NodeDef::new("final", NodeKind::FinalDecision, "Verdict"),
    ];
    flow.connections = vec![
      ConnectionDef::new("input", "defects"),
      ConnectionDef::new("defects", "final"),
      ConnectionDef::new("defects", "ghost"),
    ];
    flow
  }

  #[test]
  fn test_load_merges_connections_and_warns() {
    let mut engine = FlowEngine::default();
    let report = engine.load(&flow()).unwrap();

    assert_eq!(report.node_count, 3);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("ghost"));
    let defects = engine.node("defects").unwrap();
    assert_eq!(defects.core().inputs, vec!["input"]);
    assert_eq!(defects.core().outputs, vec!["final"]);
    assert_eq!(defects.core().name, "Spots");
  }

  #[test]
  fn test_duplicate_node_ids_are_rejected() {
    let mut flow = flow();
    flow.nodes.push(NodeDef::new("input", NodeKind::InputImage, "Again"));
    let mut engine = FlowEngine::default();
    assert!(matches!(engine.load(&flow), Err(EngineError::DuplicateNode { .. })));
    assert_eq!(engine.nodes().count(), 0);
  }

  #[test]
  fn test_definition_is_stable_across_reload() {
    let mut engine = FlowEngine::default();
    engine.load(&flow()).unwrap();
    let saved = engine.definition();

    let mut reloaded = FlowEngine::default();
    reloaded.load(&saved).unwrap();
    assert_eq!(reloaded.definition(), saved);
  }

  #[test]
  fn test_validate_reports_missing_final_decision() {
    let mut flow = flow();
    flow.nodes.pop();
    let mut engine = FlowEngine::default();
    engine.load(&flow).unwrap();
    let result = engine.validate();
    assert!(result.is_valid);
    assert!(result.warnings.contains(&"Flow has no FinalDecision node".to_string()));
  }

  #[test]
  fn test_validate_empty_flow() {
    let engine = FlowEngine::default();
    let result = engine.validate();
    assert_eq!(result.errors, vec!["Flow has no nodes".to_string()]);
  }

  #[test]
  fn test_teach_unknown_node() {
    let mut engine = FlowEngine::default();
    engine.load(&flow()).unwrap();
    let err = engine.teach("nope", &BgrImage::new(4, 4), &[], None).unwrap_err();
    assert!(matches!(err, EngineError::UnknownNode { .. }));

    let result = engine.teach("final", &BgrImage::new(4, 4), &[], None).unwrap();
    assert!(!result.success);
  }
}

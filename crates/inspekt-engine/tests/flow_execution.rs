use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use inspekt_config::{ConfigMap, ConnectionDef, FlowDef, NodeDef, NodeKind, ProductConfig};
use inspekt_engine::{CANCELLED_MESSAGE, ChannelNotifier, ExecutionEvent, FlowEngine, NoopNotifier};
use inspekt_flow::{ExecutionContext, FlowError, FlowNode, FlowNodeResult, NodeCore, NodeRegistry};
use inspekt_vision::{BgrImage, InspectionStatus, Measurement};
use tokio_util::sync::CancellationToken;

/// Dark plate, optionally with a bright 20x20 spot at (60, 60).
fn plate(with_spot: bool) -> BgrImage {
  let mut image = BgrImage::from_pixel(160, 160, [30, 30, 30]);
  if with_spot {
    for y in 60..80 {
      for x in 60..80 {
        image.put_pixel(x, y, [235, 235, 235]);
      }
    }
  }
  image
}

fn node(id: &str, kind: NodeKind, inputs: &[&str]) -> NodeDef {
  let mut def = NodeDef::new(id, kind, id);
  def.inputs = inputs.iter().map(|s| s.to_string()).collect();
  def
}

/// InputImage -> DefectDetection -> FinalDecision, wired through connections.
fn spot_flow() -> FlowDef {
  let mut flow = FlowDef::new("spot check");
  flow.nodes = vec![
    node("input", NodeKind::InputImage, &[]),
    node("spots", NodeKind::DefectDetection, &[]).with_config(serde_json::json!({"detectBlack": false})),
    node("final", NodeKind::FinalDecision, &[]),
  ];
  flow.connections = vec![
    ConnectionDef::new("input", "spots").with_ports("Image Out", "Image In"),
    ConnectionDef::new("spots", "final").with_ports("Defects", "Decision In"),
  ];
  flow
}

fn loaded(flow: &FlowDef) -> FlowEngine {
  let mut engine = FlowEngine::default();
  engine.load(flow).unwrap();
  engine
}

#[tokio::test]
async fn test_spot_makes_the_part_ng() {
  let mut engine = loaded(&spot_flow());
  let result = engine
    .execute(plate(true), Arc::default(), CancellationToken::new())
    .await;

  assert_eq!(result.status, InspectionStatus::Ng);
  assert_eq!(result.defects.len(), 1);
  assert_eq!(result.defects[0].area, 400.0);
  assert!(!result.cancelled);
  assert!(result.overlay.is_some());
  let order: Vec<&str> = result.node_results.iter().map(|r| r.node_id.as_str()).collect();
  assert_eq!(order, ["input", "spots", "final"]);
}

#[tokio::test]
async fn test_clean_part_is_ok_and_engine_is_reusable() {
  let mut engine = loaded(&spot_flow());
  let first = engine.execute(plate(true), Arc::default(), CancellationToken::new()).await;
  let second = engine.execute(plate(false), Arc::default(), CancellationToken::new()).await;

  assert_eq!(first.status, InspectionStatus::Ng);
  assert_eq!(second.status, InspectionStatus::Ok);
  assert!(second.defects.is_empty());
  assert_ne!(first.result_id, second.result_id);
}

#[tokio::test]
async fn test_result_document_field_names() {
  let mut engine = loaded(&spot_flow());
  let mut product = ProductConfig::default();
  product.product.product_id = "P-7".to_string();
  let result = engine.execute(plate(true), Arc::new(product), CancellationToken::new()).await;

  let json = serde_json::to_value(&result).unwrap();
  assert_eq!(json["productId"], "P-7");
  assert_eq!(json["status"], "NG");
  assert_eq!(json["defects"][0]["type"], "WhiteSpot");
  assert_eq!(json["nodeResults"][1]["nodeId"], "spots");
  assert!(json.get("overlay").is_none());
  assert!(json["durationMs"].is_u64());
}

#[tokio::test]
async fn test_no_entry_nodes_is_an_error_result() {
  let mut flow = FlowDef::new("loop");
  flow.nodes = vec![node("a", NodeKind::RoiApply, &["b"]), node("b", NodeKind::RoiApply, &["a"])];
  let mut engine = loaded(&flow);

  let result = engine.execute(plate(false), Arc::default(), CancellationToken::new()).await;
  assert_eq!(result.status, InspectionStatus::Error);
  assert!(result.error_message.unwrap().contains("no entry nodes"));
  assert!(result.node_results.is_empty());
}

#[tokio::test]
async fn test_empty_flow_is_an_error_result() {
  let mut engine = loaded(&FlowDef::new("empty"));

  assert!(engine.validate().errors.iter().any(|e| e == "Flow has no nodes"));

  let result = engine.execute(plate(false), Arc::default(), CancellationToken::new()).await;
  assert_eq!(result.status, InspectionStatus::Error);
  assert!(result.error_message.unwrap().contains("no entry nodes"));
  assert!(result.node_results.is_empty());
}

#[tokio::test]
async fn test_cycle_fails_fast() {
  let mut flow = FlowDef::new("cycle");
  flow.nodes = vec![
    node("input", NodeKind::InputImage, &[]),
    node("a", NodeKind::RoiApply, &["input", "b"]),
    node("b", NodeKind::RoiApply, &["a"]),
    node("final", NodeKind::FinalDecision, &["b"]),
  ];
  let mut engine = loaded(&flow);

  let validation = engine.validate();
  assert!(validation.errors.iter().any(|e| e.contains("cycle")));

  let result = engine.execute(plate(false), Arc::default(), CancellationToken::new()).await;
  assert_eq!(result.status, InspectionStatus::Error);
  assert!(result.error_message.unwrap().contains("cycle"));
}

#[tokio::test]
async fn test_unresolved_input_is_reported() {
  let mut flow = spot_flow();
  flow.nodes[2].inputs.push("ghost".to_string());
  let mut engine = loaded(&flow);

  let validation = engine.validate();
  assert!(!validation.is_valid);
  assert!(validation.errors.iter().any(|e| e.contains("ghost")));

  let result = engine.execute(plate(false), Arc::default(), CancellationToken::new()).await;
  assert_eq!(result.status, InspectionStatus::Error);
}

#[tokio::test]
async fn test_every_node_records_exactly_one_result() {
  let mut flow = FlowDef::new("diamond");
  flow.nodes = vec![
    node("input", NodeKind::InputImage, &[]),
    node("left", NodeKind::RoiApply, &["input"]),
    node("right", NodeKind::DefectDetection, &["input"]),
    node("join", NodeKind::RoiApply, &["left", "right", "left"]),
    node("final", NodeKind::FinalDecision, &["join", "right"]),
    node("second_entry", NodeKind::InputImage, &[]),
  ];
  let mut engine = loaded(&flow);
  let result = engine.execute(plate(false), Arc::default(), CancellationToken::new()).await;

  assert_eq!(result.node_results.len(), 6);
  let unique: HashSet<&str> = result.node_results.iter().map(|r| r.node_id.as_str()).collect();
  assert_eq!(unique.len(), 6);
  let position = |id: &str| result.node_results.iter().position(|r| r.node_id == id).unwrap();
  assert!(position("join") > position("left"));
  assert!(position("join") > position("right"));
  assert!(position("final") > position("join"));
  assert_eq!(position("second_entry"), 1);
  assert!(engine.nodes().all(|n| n.core().executed));
}

#[tokio::test]
async fn test_branch_skips_the_other_path() {
  let mut flow = FlowDef::new("branch");
  flow.nodes = vec![
    node("input", NodeKind::InputImage, &[]),
    node("spots", NodeKind::DefectDetection, &["input"]).with_config(serde_json::json!({"detectBlack": false})),
    node("branch", NodeKind::ConditionalBranch, &["spots"])
      .with_config(serde_json::json!({"trueTarget": "accept", "falseTarget": "reject"})),
    node("accept", NodeKind::RoiApply, &["branch"]),
    node("reject", NodeKind::RoiApply, &["branch"]),
    node("reject_log", NodeKind::RoiApply, &["reject"]),
    node("final", NodeKind::FinalDecision, &["accept", "reject_log"]),
  ];
  let mut engine = loaded(&flow);

  let clean = engine.execute(plate(false), Arc::default(), CancellationToken::new()).await;
  assert_eq!(clean.result("accept").unwrap().status, InspectionStatus::Ok);
  assert_eq!(clean.result("reject").unwrap().status, InspectionStatus::Skipped);
  assert_eq!(clean.result("reject_log").unwrap().status, InspectionStatus::Skipped);
  assert_eq!(clean.status, InspectionStatus::Ok);
  let reject = engine.node("reject").unwrap().core();
  assert!(!reject.executed);
  assert_eq!(reject.result.as_ref().unwrap().status, InspectionStatus::Skipped);
  assert!(engine.node("accept").unwrap().core().executed);

  let spotted = engine.execute(plate(true), Arc::default(), CancellationToken::new()).await;
  assert_eq!(spotted.result("branch").unwrap().next_node_id.as_deref(), Some("reject"));
  assert_eq!(spotted.result("accept").unwrap().status, InspectionStatus::Skipped);
  assert_eq!(spotted.result("reject_log").unwrap().status, InspectionStatus::Ok);
  assert_eq!(spotted.result("final").unwrap().data["inputCount"], 1);
}

#[tokio::test]
async fn test_no_final_decision_is_not_inspected() {
  let mut flow = spot_flow();
  flow.nodes.pop();
  let mut engine = loaded(&flow);
  let result = engine.execute(plate(true), Arc::default(), CancellationToken::new()).await;
  assert_eq!(result.status, InspectionStatus::NotInspected);
  assert_eq!(result.defects.len(), 1);
}

#[tokio::test]
async fn test_bad_raw_buffer_is_an_error_result() {
  let mut engine = loaded(&spot_flow());
  let result = engine
    .execute_raw(vec![0; 10], 4, 4, Arc::default(), CancellationToken::new())
    .await;
  assert_eq!(result.status, InspectionStatus::Error);
  assert!(result.error_message.is_some());

  let result = engine
    .execute_raw(vec![30; 16 * 16 * 3], 16, 16, Arc::default(), CancellationToken::new())
    .await;
  assert_eq!(result.status, InspectionStatus::Ok);
}

#[tokio::test]
async fn test_events_follow_the_run() {
  let (notifier, mut rx) = ChannelNotifier::channel();
  let mut engine = FlowEngine::new(NodeRegistry::builtin(), notifier);
  engine.load(&spot_flow()).unwrap();
  engine.execute(plate(true), Arc::default(), CancellationToken::new()).await;
  drop(engine);

  let mut events = Vec::new();
  while let Some(event) = rx.recv().await {
    events.push(event);
  }
  assert_eq!(events.len(), 5);
  assert!(matches!(events[0], ExecutionEvent::InspectionStarted { .. }));
  assert!(matches!(
    &events[2],
    ExecutionEvent::NodeCompleted { node_id, status: InspectionStatus::Ng, .. } if node_id == "spots"
  ));
  assert!(matches!(
    events[4],
    ExecutionEvent::InspectionCompleted {
      status: InspectionStatus::Ng,
      ..
    }
  ));
}

/// Records a measurement and then trips the run's cancellation token.
struct CancellingNode {
  core: NodeCore,
}

#[async_trait]
impl FlowNode for CancellingNode {
  fn core(&self) -> &NodeCore {
    &self.core
  }

  fn core_mut(&mut self) -> &mut NodeCore {
    &mut self.core
  }

  fn configure(&mut self, config: &ConfigMap) {
    self.core.set_config(config);
  }

  async fn execute(&mut self, ctx: &mut ExecutionContext, cancel: &CancellationToken) -> FlowNodeResult {
    let started = Instant::now();
    ctx.add_measurements([Measurement::from_pixels(None, 42.0)]);
    cancel.cancel();
    let result = FlowNodeResult::success(self.core.id(), InspectionStatus::Ok);
    self.core.complete(result, started)
  }
}

#[tokio::test]
async fn test_cancellation_keeps_partial_results() {
  let mut registry = NodeRegistry::builtin();
  registry.register(NodeKind::Measurement, |id| {
    Box::new(CancellingNode {
      core: NodeCore::new(id, NodeKind::Measurement, "Cancelling"),
    })
  });
  let mut engine = FlowEngine::new(registry, NoopNotifier);

  let mut flow = FlowDef::new("cancel");
  flow.nodes = vec![
    node("input", NodeKind::InputImage, &[]),
    node("measure", NodeKind::Measurement, &["input"]),
    node("final", NodeKind::FinalDecision, &["measure"]),
  ];
  engine.load(&flow).unwrap();

  let result = engine.execute(plate(false), Arc::default(), CancellationToken::new()).await;
  assert_eq!(result.status, InspectionStatus::Error);
  assert!(result.cancelled);
  assert_eq!(result.error_message.as_deref(), Some(CANCELLED_MESSAGE));
  assert_eq!(result.node_results.len(), 2);
  assert_eq!(result.measurements.len(), 1);
  assert!(result.result("final").is_none());
}

/// Cancels the run and reports the interruption the way tool nodes do.
struct InterruptedNode {
  core: NodeCore,
}

#[async_trait]
impl FlowNode for InterruptedNode {
  fn core(&self) -> &NodeCore {
    &self.core
  }

  fn core_mut(&mut self) -> &mut NodeCore {
    &mut self.core
  }

  fn configure(&mut self, config: &ConfigMap) {
    self.core.set_config(config);
  }

  async fn execute(&mut self, _ctx: &mut ExecutionContext, cancel: &CancellationToken) -> FlowNodeResult {
    let started = Instant::now();
    cancel.cancel();
    let result = FlowNodeResult::from_error(self.core.id(), &FlowError::Cancelled);
    self.core.complete(result, started)
  }
}

#[tokio::test]
async fn test_cancelled_last_node_cancels_the_run() {
  let mut registry = NodeRegistry::builtin();
  registry.register(NodeKind::DefectDetection, |id| {
    Box::new(InterruptedNode {
      core: NodeCore::new(id, NodeKind::DefectDetection, "Interrupted"),
    })
  });
  let mut engine = FlowEngine::new(registry, NoopNotifier);

  let mut flow = FlowDef::new("interrupted");
  flow.nodes = vec![
    node("input", NodeKind::InputImage, &[]),
    node("spots", NodeKind::DefectDetection, &["input"]),
  ];
  engine.load(&flow).unwrap();

  let result = engine.execute(plate(true), Arc::default(), CancellationToken::new()).await;
  assert_eq!(result.node_results.len(), 2);
  assert!(result.cancelled);
  assert_eq!(result.status, InspectionStatus::Error);
  assert_eq!(result.error_message.as_deref(), Some(CANCELLED_MESSAGE));
}

#[tokio::test]
async fn test_pre_cancelled_run_executes_nothing() {
  let mut engine = loaded(&spot_flow());
  let cancel = CancellationToken::new();
  cancel.cancel();
  let result = engine.execute(plate(true), Arc::default(), cancel).await;
  assert!(result.cancelled);
  assert!(result.node_results.is_empty());
}

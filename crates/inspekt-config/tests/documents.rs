//! Flow and product documents read and written through the filesystem.

use inspekt_config::{ConnectionDef, FlowDef, NodeDef, NodeKind, ProductConfig, RoiShape};
use serde_json::json;

/// Three-node flow with one configured node and one explicit connection.
fn sample_flow() -> FlowDef {
  let mut flow = FlowDef::new("sample");

  let mut input = NodeDef::new("in", NodeKind::InputImage, "Camera");
  input.outputs = vec!["defects".to_string()];
  input.position_x = 40.0;
  input.position_y = 80.0;

  let mut defects = NodeDef::new("defects", NodeKind::DefectDetection, "Spots")
    .with_config(json!({"binaryThreshold": 200, "detectBlack": false}));
  defects.inputs = vec!["in".to_string()];

  let final_node = NodeDef::new("final", NodeKind::FinalDecision, "Decision")
    .with_config(json!({"logic": "OR"}));

  flow.nodes = vec![input, defects, final_node];
  flow.connections = vec![ConnectionDef::new("defects", "final")];
  flow
}

#[tokio::test]
async fn test_flow_save_then_load() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("flow.json");

  let flow = sample_flow();
  flow.save(&path).await.unwrap();
  let loaded = FlowDef::load(&path).await.unwrap();

  assert_eq!(loaded, flow);
  assert_eq!(loaded.node("defects").unwrap().config["binaryThreshold"], 200);
}

#[tokio::test]
async fn test_flow_uses_wire_field_names() {
  let value = serde_json::to_value(sample_flow()).unwrap();

  assert!(value["flowId"].is_string());
  assert_eq!(value["nodes"][0]["nodeId"], "in");
  assert_eq!(value["nodes"][0]["nodeType"], "InputImage");
  assert_eq!(value["nodes"][0]["positionX"], 40.0);
  assert_eq!(value["connections"][0]["sourceNodeId"], "defects");
  assert_eq!(value["connections"][0]["targetPort"], "input");
}

#[tokio::test]
async fn test_load_missing_file_reports_path() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("missing.json");

  let err = FlowDef::load(&path).await.unwrap_err();
  assert!(err.to_string().contains("missing.json"));
}

#[tokio::test]
async fn test_product_load() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("product.json");
  tokio::fs::write(
    &path,
    r#"{
      "product": {"productId": "BRK-7", "productName": "Bracket"},
      "camera": {"sourceType": 3},
      "rois": {"rois": [{"id": "body", "type": "Rectangle", "usage": "Include", "points": [50, 50, 80, 60]}]}
    }"#,
  )
  .await
  .unwrap();

  let product = ProductConfig::load(&path).await.unwrap();
  assert_eq!(product.product.product_id, "BRK-7");
  assert_eq!(product.rois.find("body").unwrap().shape, RoiShape::Rectangle);
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::tag::{TagRepr, resolve};

/// Opaque per-node configuration payload.
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// Type tag of a node. Selects the constructor in the node registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TagRepr")]
pub enum NodeKind {
  InputImage,
  TeachMatch,
  #[serde(rename = "ROIApply")]
  RoiApply,
  Measurement,
  ThresholdCompare,
  ConditionalBranch,
  FinalDecision,
  DefectDetection,
}

impl NodeKind {
  /// Every kind, ordered by its numeric tag.
  pub const ALL: [NodeKind; 8] = [
    NodeKind::InputImage,
    NodeKind::TeachMatch,
    NodeKind::RoiApply,
    NodeKind::Measurement,
    NodeKind::ThresholdCompare,
    NodeKind::ConditionalBranch,
    NodeKind::FinalDecision,
    NodeKind::DefectDetection,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      NodeKind::InputImage => "InputImage",
      NodeKind::TeachMatch => "TeachMatch",
      NodeKind::RoiApply => "ROIApply",
      NodeKind::Measurement => "Measurement",
      NodeKind::ThresholdCompare => "ThresholdCompare",
      NodeKind::ConditionalBranch => "ConditionalBranch",
      NodeKind::FinalDecision => "FinalDecision",
      NodeKind::DefectDetection => "DefectDetection",
    }
  }

  fn table() -> [(&'static str, NodeKind); 8] {
    Self::ALL.map(|k| (k.as_str(), k))
  }
}

impl fmt::Display for NodeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for NodeKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    resolve(TagRepr::Name(s.to_string()), &Self::table(), "node type")
  }
}

impl TryFrom<TagRepr> for NodeKind {
  type Error = String;

  fn try_from(repr: TagRepr) -> Result<Self, Self::Error> {
    resolve(repr, &Self::table(), "node type")
  }
}

/// A node record in a flow document.
///
/// `inputs`/`outputs` hold node ids. Position is layout only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDef {
  pub node_id: String,
  pub node_type: NodeKind,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub position_x: f64,
  #[serde(default)]
  pub position_y: f64,
  #[serde(default)]
  pub inputs: Vec<String>,
  #[serde(default)]
  pub outputs: Vec<String>,
  #[serde(default)]
  pub config: ConfigMap,
}

impl NodeDef {
  /// Create a record with no adjacency and an empty payload.
  pub fn new(node_id: impl Into<String>, node_type: NodeKind, name: impl Into<String>) -> Self {
    Self {
      node_id: node_id.into(),
      node_type,
      name: name.into(),
      position_x: 0.0,
      position_y: 0.0,
      inputs: Vec::new(),
      outputs: Vec::new(),
      config: ConfigMap::new(),
    }
  }

  pub fn with_config(mut self, config: serde_json::Value) -> Self {
    if let serde_json::Value::Object(map) = config {
      self.config = map;
    }
    self
  }
}

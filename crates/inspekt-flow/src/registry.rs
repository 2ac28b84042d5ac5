use std::collections::HashMap;
use std::sync::Arc;

use inspekt_config::NodeKind;

use crate::error::FlowError;
use crate::node::FlowNode;
use crate::nodes::{
  ConditionalBranchNode, DefectDetectionNode, FinalDecisionNode, InputImageNode, MeasurementNode, RoiApplyNode,
  TeachMatchNode, ThresholdCompareNode,
};

/// Builds a node with the given id.
pub type NodeConstructor = Arc<dyn Fn(String) -> Box<dyn FlowNode> + Send + Sync>;

/// Maps node kinds to constructors.
#[derive(Clone)]
pub struct NodeRegistry {
  constructors: HashMap<NodeKind, NodeConstructor>,
}

impl NodeRegistry {
  /// A registry with no kinds registered.
  pub fn new() -> Self {
    Self {
      constructors: HashMap::new(),
    }
  }

  /// A registry holding every built-in node variant.
  pub fn builtin() -> Self {
    let mut registry = Self::new();
    registry.register(NodeKind::InputImage, |id| Box::new(InputImageNode::new(id)));
    registry.register(NodeKind::TeachMatch, |id| Box::new(TeachMatchNode::new(id)));
    registry.register(NodeKind::RoiApply, |id| Box::new(RoiApplyNode::new(id)));
    registry.register(NodeKind::Measurement, |id| Box::new(MeasurementNode::new(id)));
    registry.register(NodeKind::DefectDetection, |id| Box::new(DefectDetectionNode::new(id)));
    registry.register(NodeKind::ThresholdCompare, |id| Box::new(ThresholdCompareNode::new(id)));
    registry.register(NodeKind::ConditionalBranch, |id| Box::new(ConditionalBranchNode::new(id)));
    registry.register(NodeKind::FinalDecision, |id| Box::new(FinalDecisionNode::new(id)));
    registry
  }

  /// Register or replace the constructor for `kind`.
  pub fn register<F>(&mut self, kind: NodeKind, constructor: F)
  where
    F: Fn(String) -> Box<dyn FlowNode> + Send + Sync + 'static,
  {
    self.constructors.insert(kind, Arc::new(constructor));
  }

  pub fn create(&self, kind: NodeKind, id: impl Into<String>) -> Result<Box<dyn FlowNode>, FlowError> {
    let constructor = self.constructors.get(&kind).ok_or(FlowError::UnregisteredKind { kind })?;
    Ok(constructor(id.into()))
  }

  pub fn contains(&self, kind: NodeKind) -> bool {
    self.constructors.contains_key(&kind)
  }

  pub fn kinds(&self) -> Vec<NodeKind> {
    NodeKind::ALL.iter().copied().filter(|k| self.contains(*k)).collect()
  }
}

impl Default for NodeRegistry {
  fn default() -> Self {
    Self::builtin()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_builtin_covers_every_kind() {
    let registry = NodeRegistry::builtin();
    assert_eq!(registry.kinds(), NodeKind::ALL.to_vec());
    for kind in NodeKind::ALL {
      let node = registry.create(kind, format!("{kind}-1")).unwrap();
      assert_eq!(node.kind(), kind);
      assert_eq!(node.id(), format!("{kind}-1"));
    }
  }

  #[test]
  fn test_unregistered_kind() {
    let registry = NodeRegistry::new();
    let err = registry.create(NodeKind::Measurement, "m").err().unwrap();
    assert!(matches!(err, FlowError::UnregisteredKind { kind: NodeKind::Measurement }));
  }
}

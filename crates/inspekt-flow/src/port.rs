use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PortType {
  Image,
  Coordinates,
  Data,
  Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PortDirection {
  Input,
  Output,
}

/// A typed attachment point on a node.
///
/// `connected` is advisory and only reflects connection records seen on load.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePort {
  pub id: String,
  pub name: String,
  pub port_type: PortType,
  pub direction: PortDirection,
  pub node_id: String,
  pub connected: bool,
}

impl NodePort {
  pub fn new(name: &str, port_type: PortType, direction: PortDirection, node_id: &str) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      name: name.to_string(),
      port_type,
      direction,
      node_id: node_id.to_string(),
      connected: false,
    }
  }
}

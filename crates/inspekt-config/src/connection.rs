use serde::{Deserialize, Serialize};

fn default_source_port() -> String {
  "output".to_string()
}

fn default_target_port() -> String {
  "input".to_string()
}

fn new_id() -> String {
  uuid::Uuid::new_v4().to_string()
}

/// A named-port connection between two node records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDef {
  #[serde(default = "new_id")]
  pub id: String,
  pub source_node_id: String,
  #[serde(default = "default_source_port")]
  pub source_port: String,
  pub target_node_id: String,
  #[serde(default = "default_target_port")]
  pub target_port: String,
}

impl ConnectionDef {
  pub fn new(source_node_id: impl Into<String>, target_node_id: impl Into<String>) -> Self {
    Self {
      id: new_id(),
      source_node_id: source_node_id.into(),
      source_port: default_source_port(),
      target_node_id: target_node_id.into(),
      target_port: default_target_port(),
    }
  }

  pub fn with_ports(mut self, source_port: impl Into<String>, target_port: impl Into<String>) -> Self {
    self.source_port = source_port.into();
    self.target_port = target_port.into();
    self
  }
}

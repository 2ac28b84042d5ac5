use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionDef;
use crate::error::ConfigError;
use crate::node::NodeDef;

fn new_id() -> String {
  uuid::Uuid::new_v4().to_string()
}

fn default_version() -> String {
  "1.0".to_string()
}

/// A serializable inspection flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDef {
  #[serde(default = "new_id")]
  pub flow_id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default = "default_version")]
  pub version: String,
  #[serde(default)]
  pub nodes: Vec<NodeDef>,
  #[serde(default)]
  pub connections: Vec<ConnectionDef>,
}

impl FlowDef {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      flow_id: new_id(),
      name: name.into(),
      version: default_version(),
      nodes: Vec::new(),
      connections: Vec::new(),
    }
  }

  pub fn node(&self, node_id: &str) -> Option<&NodeDef> {
    self.nodes.iter().find(|n| n.node_id == node_id)
  }

  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn to_json(&self) -> Result<String, ConfigError> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  /// Read a flow document from disk.
  pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
      .await
      .map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
      })?;
    Self::from_json(&content)
  }

  /// Write the flow as pretty-printed JSON, replacing any existing file.
  pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let json = self.to_json()?;
    tokio::fs::write(path, json)
      .await
      .map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
      })
  }
}

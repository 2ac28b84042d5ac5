use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or writing configuration documents.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to write {}: {source}", .path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid document: {0}")]
  Json(#[from] serde_json::Error),
}

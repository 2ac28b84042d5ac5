use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
  #[error("folder not found: {}", path.display())]
  FolderNotFound { path: PathBuf },

  #[error("no images found in {}", path.display())]
  NoImages { path: PathBuf },

  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to decode {}: {source}", path.display())]
  Decode {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },

  #[error("failed to write {}: {source}", path.display())]
  Encode {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },

  #[error("image task failed: {message}")]
  Task { message: String },
}

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::CaptureError;
use crate::io::load_image;
use crate::{Frame, FrameSource};

/// File extensions `FolderSource` picks up, compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

/// Replays the image files of a folder in path order.
#[derive(Debug)]
pub struct FolderSource {
  folder: PathBuf,
  files: Vec<PathBuf>,
  cursor: usize,
  sequence: u64,
  looping: bool,
}

impl FolderSource {
  /// Scan `folder` (not recursively) for image files.
  pub async fn open(folder: impl AsRef<Path>) -> Result<Self, CaptureError> {
    let folder = folder.as_ref().to_path_buf();
    if !tokio::fs::try_exists(&folder).await.unwrap_or(false) {
      return Err(CaptureError::FolderNotFound { path: folder });
    }

    let read_err = |source| CaptureError::Read {
      path: folder.clone(),
      source,
    };
    let mut entries = tokio::fs::read_dir(&folder).await.map_err(read_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
      let path = entry.path();
      if is_image(&path) && entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
        files.push(path);
      }
    }
    files.sort();

    if files.is_empty() {
      return Err(CaptureError::NoImages { path: folder });
    }
    info!(folder = %folder.display(), image_count = files.len(), "folder source opened");

    Ok(Self {
      folder,
      files,
      cursor: 0,
      sequence: 0,
      looping: false,
    })
  }

  /// Start over from the first file after the last one.
  pub fn looping(mut self, looping: bool) -> Self {
    self.looping = looping;
    self
  }

  pub fn files(&self) -> &[PathBuf] {
    &self.files
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }
}

#[async_trait]
impl FrameSource for FolderSource {
  fn name(&self) -> String {
    self.folder.display().to_string()
  }

  async fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
    if self.cursor >= self.files.len() {
      if !self.looping {
        return Ok(None);
      }
      self.cursor = 0;
    }
    let path = self.files[self.cursor].clone();
    self.cursor += 1;

    debug!(path = %path.display(), sequence = self.sequence, "loading frame");
    let image = load_image(&path).await?;
    let frame = Frame {
      image,
      source: path.display().to_string(),
      sequence: self.sequence,
    };
    self.sequence += 1;
    Ok(Some(frame))
  }
}

fn is_image(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

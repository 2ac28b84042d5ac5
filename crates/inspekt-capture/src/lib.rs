//! Inspekt Capture
//!
//! Where inspection frames come from. A [`FrameSource`] yields decoded BGR
//! frames one at a time; [`FolderSource`] replays image files from disk and
//! [`MemorySource`] serves frames already in memory. Camera drivers plug in
//! by implementing the same trait.
//!
//! Also home to image file I/O (`load_image`, `save_image`).

mod error;
mod folder;
mod io;

pub use error::CaptureError;
pub use folder::{FolderSource, IMAGE_EXTENSIONS};
pub use io::{load_image, save_image};

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use inspekt_vision::BgrImage;

/// A boxed stream of frames.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, CaptureError>> + Send>>;

/// One captured image.
#[derive(Debug, Clone)]
pub struct Frame {
  pub image: BgrImage,
  /// Where the frame came from, e.g. a file path.
  pub source: String,
  /// Position in the source's sequence, starting at 0.
  pub sequence: u64,
}

/// Source of inspection frames.
#[async_trait]
pub trait FrameSource: Send {
  fn name(&self) -> String;

  /// The next frame, or `None` when the source is exhausted.
  async fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;
}

/// Turn a source into a stream that ends when the source does.
pub fn frames<S: FrameSource + 'static>(source: S) -> FrameStream {
  Box::pin(futures::stream::unfold(source, |mut source| async move {
    match source.next_frame().await {
      Ok(Some(frame)) => Some((Ok(frame), source)),
      Ok(None) => None,
      Err(e) => Some((Err(e), source)),
    }
  }))
}

/// Serves a fixed list of images.
#[derive(Debug, Default)]
pub struct MemorySource {
  name: String,
  images: VecDeque<BgrImage>,
  sequence: u64,
}

impl MemorySource {
  pub fn new(name: impl Into<String>, images: impl IntoIterator<Item = BgrImage>) -> Self {
    Self {
      name: name.into(),
      images: images.into_iter().collect(),
      sequence: 0,
    }
  }
}

#[async_trait]
impl FrameSource for MemorySource {
  fn name(&self) -> String {
    self.name.clone()
  }

  async fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
    let Some(image) = self.images.pop_front() else {
      return Ok(None);
    };
    let frame = Frame {
      image,
      source: format!("{}#{}", self.name, self.sequence),
      sequence: self.sequence,
    };
    self.sequence += 1;
    Ok(Some(frame))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures::StreamExt;

  #[tokio::test]
  async fn test_memory_source_streams_in_order() {
    let source = MemorySource::new("mem", [BgrImage::new(2, 2), BgrImage::new(3, 3)]);
    let collected: Vec<Frame> = frames(source).map(|f| f.unwrap()).collect().await;

    assert_eq!(collected.len(), 2);
    assert_eq!(collected[1].sequence, 1);
    assert_eq!(collected[1].image.width(), 3);
    assert_eq!(collected[0].source, "mem#0");
  }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisionError {
  #[error("buffer of {actual} bytes does not match a {width}x{height} BGR image ({expected} bytes)")]
  BufferSize {
    width: u32,
    height: u32,
    expected: usize,
    actual: usize,
  },

  #[error("image has zero width or height")]
  EmptyImage,
}

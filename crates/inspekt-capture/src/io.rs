use std::path::{Path, PathBuf};

use inspekt_vision::BgrImage;

use crate::error::CaptureError;

/// Decode an image file into a BGR buffer on a blocking thread.
pub async fn load_image(path: impl AsRef<Path>) -> Result<BgrImage, CaptureError> {
  let path: PathBuf = path.as_ref().to_path_buf();
  tokio::task::spawn_blocking(move || {
    let decoded = image::open(&path).map_err(|source| match source {
      image::ImageError::IoError(source) => CaptureError::Read {
        path: path.clone(),
        source,
      },
      source => CaptureError::Decode {
        path: path.clone(),
        source,
      },
    })?;
    Ok(BgrImage::from_rgb(&decoded.to_rgb8()))
  })
  .await
  .map_err(|e| CaptureError::Task { message: e.to_string() })?
}

/// Encode a BGR buffer to `path`; the format follows the extension.
pub async fn save_image(path: impl AsRef<Path>, image: &BgrImage) -> Result<(), CaptureError> {
  let path: PathBuf = path.as_ref().to_path_buf();
  let rgb = image.to_rgb();
  tokio::task::spawn_blocking(move || {
    rgb
      .save(&path)
      .map_err(|source| CaptureError::Encode { path: path.clone(), source })
  })
  .await
  .map_err(|e| CaptureError::Task { message: e.to_string() })?
}

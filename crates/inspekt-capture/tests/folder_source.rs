use image::{Rgb, RgbImage};
use inspekt_capture::{CaptureError, FolderSource, FrameSource, load_image, save_image};
use inspekt_vision::BgrImage;

/// Write a solid RGB PNG.
fn write_png(dir: &std::path::Path, name: &str, width: u32, height: u32, rgb: [u8; 3]) {
  RgbImage::from_pixel(width, height, Rgb(rgb)).save(dir.join(name)).unwrap();
}

#[tokio::test]
async fn test_frames_are_sorted_and_decoded_as_bgr() {
  let dir = tempfile::tempdir().unwrap();
  write_png(dir.path(), "b.png", 4, 3, [255, 0, 0]);
  write_png(dir.path(), "a.png", 2, 2, [0, 0, 255]);
  std::fs::write(dir.path().join("readme.txt"), "not an image").unwrap();

  let mut source = FolderSource::open(dir.path()).await.unwrap();
  assert_eq!(source.len(), 2);

  let first = source.next_frame().await.unwrap().unwrap();
  assert!(first.source.ends_with("a.png"));
  assert_eq!(first.sequence, 0);
  assert_eq!(first.image.pixel(0, 0), Some([255, 0, 0]));

  let second = source.next_frame().await.unwrap().unwrap();
  assert_eq!(second.image.dimensions(), (4, 3));
  assert_eq!(second.image.pixel(0, 0), Some([0, 0, 255]));

  assert!(source.next_frame().await.unwrap().is_none());
}

#[tokio::test]
async fn test_looping_restarts() {
  let dir = tempfile::tempdir().unwrap();
  write_png(dir.path(), "only.png", 2, 2, [10, 20, 30]);

  let mut source = FolderSource::open(dir.path()).await.unwrap().looping(true);
  for expected in 0..3 {
    let frame = source.next_frame().await.unwrap().unwrap();
    assert_eq!(frame.sequence, expected);
  }
}

#[tokio::test]
async fn test_missing_and_empty_folders() {
  let dir = tempfile::tempdir().unwrap();
  let err = FolderSource::open(dir.path()).await.unwrap_err();
  assert!(matches!(err, CaptureError::NoImages { .. }));

  let err = FolderSource::open(dir.path().join("nope")).await.unwrap_err();
  assert!(matches!(err, CaptureError::FolderNotFound { .. }));
}

#[tokio::test]
async fn test_corrupt_file_is_a_decode_error() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(dir.path().join("broken.png"), b"definitely not a png").unwrap();

  let mut source = FolderSource::open(dir.path()).await.unwrap();
  let err = source.next_frame().await.unwrap_err();
  assert!(matches!(err, CaptureError::Decode { .. }));
}

#[tokio::test]
async fn test_save_then_load_keeps_channel_order() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("overlay.png");
  let image = BgrImage::from_pixel(5, 4, [1, 2, 3]);

  save_image(&path, &image).await.unwrap();
  let loaded = load_image(&path).await.unwrap();
  assert_eq!(loaded.pixel(4, 3), Some([1, 2, 3]));
}

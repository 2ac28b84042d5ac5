use std::fmt;

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::error::VisionError;

/// Pixels beyond the image edge that overlay primitives may still reach.
const OVERLAY_MARGIN: u32 = 16;

/// Overlay colors in BGR byte order.
pub mod colors {
  pub const GREEN: [u8; 3] = [0, 255, 0];
  pub const RED: [u8; 3] = [0, 0, 255];
  pub const BLUE: [u8; 3] = [255, 0, 0];
  pub const YELLOW: [u8; 3] = [0, 255, 255];
}

/// An 8-bit, 3-channel image in blue-green-red byte order.
///
/// The pixels live in an [`RgbImage`] container so the `imageproc` drawing
/// routines can be used directly; the channel meaning stays B, G, R.
#[derive(Clone, PartialEq)]
pub struct BgrImage {
  buffer: RgbImage,
}

impl BgrImage {
  /// A black image.
  pub fn new(width: u32, height: u32) -> Self {
    Self {
      buffer: RgbImage::new(width, height),
    }
  }

  pub fn from_pixel(width: u32, height: u32, bgr: [u8; 3]) -> Self {
    Self {
      buffer: RgbImage::from_pixel(width, height, Rgb(bgr)),
    }
  }

  /// Wrap a raw BGR buffer with stride `width * 3`.
  pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, VisionError> {
    if width == 0 || height == 0 {
      return Err(VisionError::EmptyImage);
    }
    let expected = width as usize * height as usize * 3;
    let actual = data.len();
    let buffer = RgbImage::from_raw(width, height, data).filter(|_| actual == expected);
    buffer.map(|buffer| Self { buffer }).ok_or(VisionError::BufferSize {
      width,
      height,
      expected,
      actual,
    })
  }

  /// Convert from a decoded RGB image.
  pub fn from_rgb(rgb: &RgbImage) -> Self {
    let mut buffer = rgb.clone();
    for pixel in buffer.pixels_mut() {
      pixel.0.swap(0, 2);
    }
    Self { buffer }
  }

  pub fn from_gray(gray: &GrayImage) -> Self {
    let buffer = RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
      let v = gray.get_pixel(x, y)[0];
      Rgb([v, v, v])
    });
    Self { buffer }
  }

  /// Convert to an RGB image, e.g. for encoding to a file.
  pub fn to_rgb(&self) -> RgbImage {
    let mut rgb = self.buffer.clone();
    for pixel in rgb.pixels_mut() {
      pixel.0.swap(0, 2);
    }
    rgb
  }

  /// Luma conversion with weights 0.114 B, 0.587 G, 0.299 R.
  pub fn to_gray(&self) -> GrayImage {
    GrayImage::from_fn(self.width(), self.height(), |x, y| {
      let [b, g, r] = self.buffer.get_pixel(x, y).0;
      let luma = 0.114 * b as f32 + 0.587 * g as f32 + 0.299 * r as f32;
      Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
  }

  pub fn width(&self) -> u32 {
    self.buffer.width()
  }

  pub fn height(&self) -> u32 {
    self.buffer.height()
  }

  pub fn dimensions(&self) -> (u32, u32) {
    self.buffer.dimensions()
  }

  pub fn as_bytes(&self) -> &[u8] {
    self.buffer.as_raw()
  }

  pub fn into_raw(self) -> Vec<u8> {
    self.buffer.into_raw()
  }

  pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
    self.buffer.get_pixel_checked(x, y).map(|p| p.0)
  }

  pub fn put_pixel(&mut self, x: u32, y: u32, bgr: [u8; 3]) {
    if x < self.width() && y < self.height() {
      self.buffer.put_pixel(x, y, Rgb(bgr));
    }
  }

  /// Draw the part of the segment that falls near the canvas. Segments
  /// entirely off-canvas, or with non-finite ends, draw nothing.
  pub fn draw_line(&mut self, from: (f64, f64), to: (f64, f64), bgr: [u8; 3]) {
    let Some((from, to)) = clip_segment(from, to, self.canvas()) else {
      return;
    };
    draw_line_segment_mut(
      &mut self.buffer,
      (from.0 as f32, from.1 as f32),
      (to.0 as f32, to.1 as f32),
      Rgb(bgr),
    );
  }

  /// Closed outline through `points`.
  pub fn draw_outline(&mut self, points: &[(f64, f64)], bgr: [u8; 3]) {
    for (i, from) in points.iter().enumerate() {
      let to = points[(i + 1) % points.len()];
      self.draw_line(*from, to, bgr);
    }
  }

  pub fn draw_rect(&mut self, x: i32, y: i32, width: u32, height: u32, bgr: [u8; 3]) {
    let (min_x, min_y, max_x, max_y) = self.canvas();
    let left = (x as f64).max(min_x);
    let top = (y as f64).max(min_y);
    let right = (x as f64 + width as f64).min(max_x);
    let bottom = (y as f64 + height as f64).min(max_y);
    if right <= left || bottom <= top {
      return;
    }
    let rect = Rect::at(left as i32, top as i32).of_size((right - left) as u32, (bottom - top) as u32);
    draw_hollow_rect_mut(&mut self.buffer, rect, Rgb(bgr));
  }

  /// Circles whose center lies off the canvas are not drawn.
  pub fn fill_circle(&mut self, center: (f64, f64), radius: i32, bgr: [u8; 3]) {
    let (min_x, min_y, max_x, max_y) = self.canvas();
    let inside = (min_x..=max_x).contains(&center.0) && (min_y..=max_y).contains(&center.1);
    if !inside || radius <= 0 {
      return;
    }
    let radius = radius.min(self.width().max(self.height()) as i32);
    let center = (center.0.round() as i32, center.1.round() as i32);
    draw_filled_circle_mut(&mut self.buffer, center, radius, Rgb(bgr));
  }

  /// Drawable area: the image plus a small margin on every side.
  fn canvas(&self) -> (f64, f64, f64, f64) {
    let margin = OVERLAY_MARGIN as f64;
    (
      -margin,
      -margin,
      self.width() as f64 + margin,
      self.height() as f64 + margin,
    )
  }
}

/// Liang-Barsky clip of a segment to `(min_x, min_y, max_x, max_y)`.
fn clip_segment(
  from: (f64, f64),
  to: (f64, f64),
  (min_x, min_y, max_x, max_y): (f64, f64, f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
  if ![from.0, from.1, to.0, to.1].iter().all(|v| v.is_finite()) {
    return None;
  }
  let (dx, dy) = (to.0 - from.0, to.1 - from.1);
  let (mut t0, mut t1) = (0.0f64, 1.0f64);
  let edges = [
    (-dx, from.0 - min_x),
    (dx, max_x - from.0),
    (-dy, from.1 - min_y),
    (dy, max_y - from.1),
  ];
  for (p, q) in edges {
    if p == 0.0 {
      if q < 0.0 {
        return None;
      }
      continue;
    }
    let t = q / p;
    if p < 0.0 {
      t0 = t0.max(t);
    } else {
      t1 = t1.min(t);
    }
    if t0 > t1 {
      return None;
    }
  }
  Some((
    (from.0 + t0 * dx, from.1 + t0 * dy),
    (from.0 + t1 * dx, from.1 + t1 * dy),
  ))
}

impl fmt::Debug for BgrImage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BgrImage")
      .field("width", &self.width())
      .field("height", &self.height())
      .finish()
  }
}

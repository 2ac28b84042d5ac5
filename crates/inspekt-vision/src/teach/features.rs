//! Oriented FAST keypoints with rotated binary descriptors.

use image::GrayImage;
use imageproc::corners::corners_fast9;
use imageproc::filter::gaussian_blur_f32;
use serde::{Deserialize, Serialize};

/// 256-bit binary descriptor.
pub type Descriptor = [u8; 32];

/// Keypoints closer than this to the border have no complete patch.
const BORDER: u32 = 20;
/// Radius of the disc used for the orientation moment.
const ORIENTATION_RADIUS: i32 = 15;
/// Sampling pairs lie in `[-PATCH_EXTENT, PATCH_EXTENT]`.
const PATCH_EXTENT: f64 = 13.0;
const SUPPRESSION_RADIUS: u32 = 3;
const SMOOTHING_SIGMA: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
  pub x: f32,
  pub y: f32,
  /// Radians.
  pub angle: f32,
  pub response: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct DetectorParams {
  pub max_features: usize,
  pub fast_threshold: u8,
}

/// Detect up to `max_features` keypoints and describe them.
pub fn detect_and_describe(gray: &GrayImage, params: DetectorParams) -> (Vec<Keypoint>, Vec<Descriptor>) {
  let (width, height) = gray.dimensions();
  if width <= 2 * BORDER || height <= 2 * BORDER {
    return (Vec::new(), Vec::new());
  }

  let mut corners: Vec<_> = corners_fast9(gray, params.fast_threshold)
    .into_iter()
    .filter(|c| c.x >= BORDER && c.y >= BORDER && c.x < width - BORDER && c.y < height - BORDER)
    .collect();
  corners.sort_by(|a, b| {
    b.score
      .total_cmp(&a.score)
      .then(a.y.cmp(&b.y))
      .then(a.x.cmp(&b.x))
  });

  let mut taken = vec![false; (width * height) as usize];
  let mut keypoints = Vec::new();
  for corner in corners {
    if keypoints.len() >= params.max_features {
      break;
    }
    if is_suppressed(&taken, width, height, corner.x, corner.y) {
      continue;
    }
    taken[(corner.y * width + corner.x) as usize] = true;
    keypoints.push(Keypoint {
      x: corner.x as f32,
      y: corner.y as f32,
      angle: orientation(gray, corner.x as i32, corner.y as i32),
      response: corner.score,
    });
  }

  let smoothed = gaussian_blur_f32(gray, SMOOTHING_SIGMA);
  let pattern = sampling_pattern();
  let descriptors = keypoints.iter().map(|kp| describe(&smoothed, kp, &pattern)).collect();
  (keypoints, descriptors)
}

fn is_suppressed(taken: &[bool], width: u32, height: u32, x: u32, y: u32) -> bool {
  let r = SUPPRESSION_RADIUS;
  let (x0, x1) = (x.saturating_sub(r), (x + r).min(width - 1));
  let (y0, y1) = (y.saturating_sub(r), (y + r).min(height - 1));
  (y0..=y1).any(|yy| (x0..=x1).any(|xx| taken[(yy * width + xx) as usize]))
}

/// Intensity-centroid angle over a disc around `(cx, cy)`.
fn orientation(gray: &GrayImage, cx: i32, cy: i32) -> f32 {
  let r = ORIENTATION_RADIUS;
  let (mut m01, mut m10) = (0.0f64, 0.0f64);
  for dy in -r..=r {
    for dx in -r..=r {
      if dx * dx + dy * dy > r * r {
        continue;
      }
      let v = sample(gray, cx + dx, cy + dy) as f64;
      m10 += dx as f64 * v;
      m01 += dy as f64 * v;
    }
  }
  m01.atan2(m10) as f32
}

fn sample(gray: &GrayImage, x: i32, y: i32) -> u8 {
  let x = x.clamp(0, gray.width() as i32 - 1) as u32;
  let y = y.clamp(0, gray.height() as i32 - 1) as u32;
  gray.get_pixel(x, y)[0]
}

fn describe(smoothed: &GrayImage, kp: &Keypoint, pattern: &[[f64; 4]]) -> Descriptor {
  let (sin, cos) = (kp.angle as f64).sin_cos();
  let rotate = |x: f64, y: f64| {
    (
      kp.x as i32 + (cos * x - sin * y).round() as i32,
      kp.y as i32 + (sin * x + cos * y).round() as i32,
    )
  };

  let mut descriptor = [0u8; 32];
  for (bit, pair) in pattern.iter().enumerate() {
    let (ax, ay) = rotate(pair[0], pair[1]);
    let (bx, by) = rotate(pair[2], pair[3]);
    if sample(smoothed, ax, ay) < sample(smoothed, bx, by) {
      descriptor[bit / 8] |= 1 << (bit % 8);
    }
  }
  descriptor
}

/// Hamming distance between two descriptors.
pub fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
  a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// The 256 point pairs compared by a descriptor.
///
/// Persisted templates store descriptors built from this pattern, so the
/// generator and its seed must never change.
fn sampling_pattern() -> Vec<[f64; 4]> {
  let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
  let mut next = move || {
    state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z >> 11) as f64 / (1u64 << 53) as f64
  };
  // Sum of three uniforms approximates a Gaussian centered on the keypoint.
  let mut coord = move || {
    let v = (next() + next() + next() - 1.5) / 1.5;
    (v * PATCH_EXTENT).round().clamp(-PATCH_EXTENT, PATCH_EXTENT)
  };
  (0..256).map(|_| [coord(), coord(), coord(), coord()]).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Luma;

  #[test]
  fn test_flat_image_has_no_keypoints() {
    let gray = GrayImage::from_pixel(120, 120, Luma([128]));
    let params = DetectorParams {
      max_features: 500,
      fast_threshold: 20,
    };
    let (keypoints, descriptors) = detect_and_describe(&gray, params);
    assert!(keypoints.is_empty());
    assert!(descriptors.is_empty());
  }

  #[test]
  fn test_pattern_is_stable() {
    assert_eq!(sampling_pattern(), sampling_pattern());
    assert!(sampling_pattern().iter().flatten().all(|v| v.abs() <= PATCH_EXTENT));
  }

  #[test]
  fn test_hamming() {
    let a = [0u8; 32];
    let mut b = [0u8; 32];
    b[0] = 0b1011;
    b[31] = 0xFF;
    assert_eq!(hamming(&a, &b), 11);
    assert_eq!(hamming(&b, &b), 0);
  }
}

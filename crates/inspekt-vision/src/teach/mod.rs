//! Pattern teaching and localization.
//!
//! Teaching stores keypoints, descriptors and the outline of the taught
//! region. Matching finds the same features in a new image, estimates a
//! homography from template to image and derives the pattern's pose from the
//! projected outline.

mod features;
mod homography;

use std::time::Instant;

use image::GrayImage;
use image::imageops;
use inspekt_config::Roi;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

pub use features::Keypoint;
use features::{Descriptor, DetectorParams, detect_and_describe, hamming};
use homography::{find_homography, project};

use crate::buffer::{BgrImage, colors};
use crate::model::{InspectionStatus, ProductPosition};
use crate::tool::{ToolKind, ToolResult, VisionTool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TeachMatchConfig {
  /// Recorded for compatibility; oriented FAST with binary descriptors is always used.
  pub feature_type: String,
  /// Ratio-test factor against the second-best candidate.
  pub match_threshold: f64,
  pub min_matches: usize,
  pub max_features: usize,
  pub fast_threshold: u8,
}

impl Default for TeachMatchConfig {
  fn default() -> Self {
    Self {
      feature_type: "ORB".to_string(),
      match_threshold: 0.7,
      min_matches: 10,
      max_features: 1000,
      fast_threshold: 20,
    }
  }
}

/// A taught pattern. Coordinates are relative to the taught region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
  pub width: u32,
  pub height: u32,
  pub corners: Vec<[f64; 2]>,
  pub keypoints: Vec<Keypoint>,
  #[serde(rename = "descriptorsBase64", with = "descriptor_codec")]
  pub descriptors: Vec<Descriptor>,
}

mod descriptor_codec {
  use base64::Engine;
  use base64::engine::general_purpose::STANDARD as BASE64;
  use serde::de::Error;
  use serde::{Deserialize, Deserializer, Serializer};

  use super::Descriptor;

  pub fn serialize<S: Serializer>(descriptors: &[Descriptor], serializer: S) -> Result<S::Ok, S::Error> {
    let bytes: Vec<u8> = descriptors.iter().flatten().copied().collect();
    serializer.serialize_str(&BASE64.encode(bytes))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Descriptor>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    let bytes = BASE64.decode(encoded).map_err(D::Error::custom)?;
    if bytes.len() % 32 != 0 {
      return Err(D::Error::custom("descriptor data is not a multiple of 32 bytes"));
    }
    Ok(
      bytes
        .chunks_exact(32)
        .map(|chunk| {
          let mut d = [0u8; 32];
          d.copy_from_slice(chunk);
          d
        })
        .collect(),
    )
  }
}

/// Feature-based pattern localization.
#[derive(Debug, Clone, Default)]
pub struct TeachMatchTool {
  config: TeachMatchConfig,
  template: Option<Template>,
}

impl TeachMatchTool {
  pub fn new(config: TeachMatchConfig) -> Self {
    Self {
      config,
      template: None,
    }
  }

  pub fn config(&self) -> &TeachMatchConfig {
    &self.config
  }

  pub fn is_taught(&self) -> bool {
    self.template.as_ref().is_some_and(|t| !t.descriptors.is_empty())
  }

  pub fn template(&self) -> Option<&Template> {
    self.template.as_ref()
  }

  /// Restore a previously taught pattern.
  pub fn set_template(&mut self, template: Template) {
    self.template = Some(template);
  }

  fn params(&self) -> DetectorParams {
    DetectorParams {
      max_features: self.config.max_features.max(1),
      fast_threshold: self.config.fast_threshold,
    }
  }

  /// Learn the pattern inside `roi` (its bounding box), or the whole image.
  ///
  /// On failure the previously taught pattern is kept.
  pub fn teach(&mut self, image: &BgrImage, roi: Option<&Roi>) -> ToolResult {
    let started = Instant::now();
    let gray = image.to_gray();

    let region: GrayImage = match roi.and_then(|r| r.bounds()) {
      Some((x0, y0, x1, y1)) => {
        let x0 = x0.round().clamp(0.0, gray.width() as f64) as u32;
        let y0 = y0.round().clamp(0.0, gray.height() as f64) as u32;
        let x1 = x1.round().clamp(0.0, gray.width() as f64) as u32;
        let y1 = y1.round().clamp(0.0, gray.height() as f64) as u32;
        if x1 <= x0 || y1 <= y0 {
          return ToolResult::failure("Teach region lies outside the image").timed(started);
        }
        imageops::crop_imm(&gray, x0, y0, x1 - x0, y1 - y0).to_image()
      }
      None => gray,
    };

    let (keypoints, descriptors) = detect_and_describe(&region, self.params());
    if keypoints.len() < self.config.min_matches || keypoints.is_empty() {
      debug!(keypoints = keypoints.len(), required = self.config.min_matches, "teach rejected");
      return ToolResult::failure("Not enough features detected for teaching").timed(started);
    }

    let (w, h) = (region.width() as f64, region.height() as f64);
    let template = Template {
      width: region.width(),
      height: region.height(),
      corners: vec![[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]],
      keypoints,
      descriptors,
    };
    info!(keypoints = template.keypoints.len(), width = template.width, height = template.height, "pattern taught");

    let result = ToolResult::success(InspectionStatus::Ok)
      .with_data("keypointCount", template.keypoints.len())
      .with_data("teachWidth", template.width)
      .with_data("teachHeight", template.height);
    self.template = Some(template);
    result.timed(started)
  }

  /// Ratio-tested matches as (template index, image index).
  fn match_descriptors(&self, template: &[Descriptor], image: &[Descriptor]) -> Vec<(usize, usize)> {
    if image.len() < 2 {
      return Vec::new();
    }
    template
      .iter()
      .enumerate()
      .filter_map(|(ti, query)| {
        let mut best = (u32::MAX, 0usize);
        let mut second = u32::MAX;
        for (ii, candidate) in image.iter().enumerate() {
          let d = hamming(query, candidate);
          if d < best.0 {
            second = best.0;
            best = (d, ii);
          } else if d < second {
            second = d;
          }
        }
        ((best.0 as f64) < self.config.match_threshold * second as f64).then_some((ti, best.1))
      })
      .collect()
  }
}

impl VisionTool for TeachMatchTool {
  fn kind(&self) -> ToolKind {
    ToolKind::TeachMatch
  }

  fn run(&self, image: &BgrImage, _mask: Option<&GrayImage>) -> ToolResult {
    let started = Instant::now();
    let Some(template) = self.template.as_ref().filter(|_| self.is_taught()) else {
      return ToolResult::failure("No pattern has been taught").timed(started);
    };

    let gray = image.to_gray();
    let (keypoints, descriptors) = detect_and_describe(&gray, self.params());
    let matches = self.match_descriptors(&template.descriptors, &descriptors);

    if matches.len() < self.config.min_matches {
      return ToolResult::failure(format!(
        "Not enough good matches: {} < {}",
        matches.len(),
        self.config.min_matches
      ))
      .with_data("matchCount", matches.len())
      .timed(started);
    }

    let point = |kp: &Keypoint| (kp.x as f64, kp.y as f64);
    let src: Vec<_> = matches.iter().filter_map(|(t, _)| template.keypoints.get(*t).map(point)).collect();
    let dst: Vec<_> = matches.iter().filter_map(|(_, i)| keypoints.get(*i).map(point)).collect();

    let Some((h, inliers)) = find_homography(&src, &dst) else {
      return ToolResult::failure("Pattern match failed: could not compute homography")
        .with_data("matchCount", matches.len())
        .timed(started);
    };

    let Some(corners) = template
      .corners
      .iter()
      .map(|c| project(&h, (c[0], c[1])))
      .collect::<Option<Vec<_>>>()
      .filter(|c| c.len() == 4)
    else {
      return ToolResult::failure("Pattern match failed: degenerate transform").timed(started);
    };

    let center = (
      corners.iter().map(|c| c.0).sum::<f64>() / 4.0,
      corners.iter().map(|c| c.1).sum::<f64>() / 4.0,
    );
    let top = (corners[1].0 - corners[0].0, corners[1].1 - corners[0].1);
    let taught_top = (
      template.corners[1][0] - template.corners[0][0],
      template.corners[1][1] - template.corners[0][1],
    );
    let taught_len = taught_top.0.hypot(taught_top.1);
    let position = ProductPosition {
      x: center.0,
      y: center.1,
      rotation: top.1.atan2(top.0).to_degrees(),
      scale: if taught_len > 0.0 { top.0.hypot(top.1) / taught_len } else { 1.0 },
      confidence: (matches.len() as f64 / (self.config.min_matches.max(1) * 3) as f64).min(1.0),
    };

    let mut overlay = image.clone();
    overlay.draw_outline(&corners, colors::GREEN);
    overlay.fill_circle(center, 5, colors::RED);

    debug!(matches = matches.len(), inliers, x = position.x, y = position.y, "pattern located");

    let mut result = ToolResult::success(InspectionStatus::Ok)
      .with_data("matchCount", matches.len())
      .with_data("inlierCount", inliers)
      .with_data("corners", json!(corners.iter().map(|c| [c.0, c.1]).collect::<Vec<_>>()));
    result.position = Some(position);
    result.output_image = Some(overlay);
    result.timed(started)
  }
}

use std::collections::HashMap;
use std::f64::consts::PI;
use std::time::Instant;

use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use imageproc::point::Point;
use imageproc::region_labelling::{Connectivity, connected_components};
use inspekt_config::DefectThreshold;
use tracing::debug;

use crate::buffer::{BgrImage, colors};
use crate::model::{Defect, DefectKind, InspectionStatus, Severity};
use crate::tool::{ToolKind, ToolResult, VisionTool};

/// Finds bright and dark spots by thresholding, morphology and contour analysis.
#[derive(Debug, Clone, Default)]
pub struct DefectDetectionTool {
  config: DefectThreshold,
}

#[derive(Debug, Clone, Copy)]
struct Blob {
  area: u32,
  min_x: u32,
  min_y: u32,
  max_x: u32,
  max_y: u32,
}

impl DefectDetectionTool {
  pub fn new(config: DefectThreshold) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &DefectThreshold {
    &self.config
  }

  fn binarize(&self, gray: &GrayImage, mask: Option<&GrayImage>, kind: DefectKind) -> GrayImage {
    let threshold = self.config.binary_threshold;
    let mut binary = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
      let v = gray.get_pixel(x, y)[0];
      let hit = match kind {
        DefectKind::WhiteSpot => v > threshold,
        DefectKind::BlackSpot => v <= threshold,
      };
      Luma([if hit { 255 } else { 0 }])
    });

    if let Some(mask) = mask {
      for (pixel, allowed) in binary.pixels_mut().zip(mask.pixels()) {
        if allowed[0] == 0 {
          pixel[0] = 0;
        }
      }
    }

    let radius = (self.config.morphology_kernel / 2).min(u8::MAX as u32) as u8;
    if radius > 0 {
      let opened = morphology::open(&binary, Norm::LInf, radius);
      binary = morphology::close(&opened, Norm::LInf, radius);
    }
    binary
  }

  fn detect_spots(&self, gray: &GrayImage, mask: Option<&GrayImage>, kind: DefectKind) -> Vec<Defect> {
    let binary = self.binarize(gray, mask, kind);

    let labels = connected_components(&binary, Connectivity::Eight, Luma([0u8]));
    let mut blobs: HashMap<u32, Blob> = HashMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
      if label[0] == 0 {
        continue;
      }
      blobs
        .entry(label[0])
        .and_modify(|b| {
          b.area += 1;
          b.min_x = b.min_x.min(x);
          b.min_y = b.min_y.min(y);
          b.max_x = b.max_x.max(x);
          b.max_y = b.max_y.max(y);
        })
        .or_insert(Blob {
          area: 1,
          min_x: x,
          min_y: y,
          max_x: x,
          max_y: y,
        });
    }

    let mut defects = Vec::new();
    for contour in find_contours::<u32>(&binary) {
      // External borders only; spots nested inside holes of other spots are skipped.
      if contour.border_type != BorderType::Outer || contour.parent.is_some() {
        continue;
      }
      let Some(first) = contour.points.first() else {
        continue;
      };
      let Some(blob) = blobs.get(&labels.get_pixel(first.x, first.y)[0]) else {
        continue;
      };

      let area = blob.area as f64;
      let perimeter = closed_length(&contour.points);
      let circularity = if perimeter > 0.0 {
        (4.0 * PI * area / (perimeter * perimeter)).min(1.0)
      } else {
        1.0
      };

      let cfg = &self.config;
      if area < cfg.min_area || area > cfg.max_area {
        continue;
      }
      if circularity < cfg.circularity_min || circularity > cfg.circularity_max {
        continue;
      }

      defects.push(Defect {
        id: uuid::Uuid::new_v4().to_string(),
        kind,
        x: blob.min_x as f64,
        y: blob.min_y as f64,
        width: (blob.max_x - blob.min_x + 1) as f64,
        height: (blob.max_y - blob.min_y + 1) as f64,
        area,
        circularity,
        severity: Severity::from_area(area, cfg.max_area),
      });
    }

    debug!(kind = ?kind, count = defects.len(), "spot detection finished");
    defects
  }
}

fn closed_length(points: &[Point<u32>]) -> f64 {
  if points.len() < 2 {
    return 0.0;
  }
  points
    .iter()
    .zip(points.iter().cycle().skip(1))
    .map(|(a, b)| {
      let dx = a.x as f64 - b.x as f64;
      let dy = a.y as f64 - b.y as f64;
      (dx * dx + dy * dy).sqrt()
    })
    .sum()
}

impl VisionTool for DefectDetectionTool {
  fn kind(&self) -> ToolKind {
    ToolKind::DefectDetection
  }

  fn run(&self, image: &BgrImage, mask: Option<&GrayImage>) -> ToolResult {
    let started = Instant::now();
    let gray = image.to_gray();

    if let Some(mask) = mask
      && mask.dimensions() != gray.dimensions()
    {
      return ToolResult::failure(format!(
        "Defect detection failed: mask is {}x{} but image is {}x{}",
        mask.width(),
        mask.height(),
        gray.width(),
        gray.height()
      ));
    }

    let mut defects = Vec::new();
    if self.config.detect_white {
      defects.extend(self.detect_spots(&gray, mask, DefectKind::WhiteSpot));
    }
    if self.config.detect_black {
      defects.extend(self.detect_spots(&gray, mask, DefectKind::BlackSpot));
    }

    let mut overlay = image.clone();
    for defect in &defects {
      let color = match defect.kind {
        DefectKind::WhiteSpot => colors::YELLOW,
        DefectKind::BlackSpot => colors::RED,
      };
      overlay.draw_rect(
        defect.x as i32,
        defect.y as i32,
        defect.width as u32,
        defect.height as u32,
        color,
      );
    }

    let white = defects.iter().filter(|d| d.kind == DefectKind::WhiteSpot).count();
    let black = defects.len() - white;
    let status = if defects.is_empty() {
      InspectionStatus::Ok
    } else {
      InspectionStatus::Ng
    };

    let mut result = ToolResult::success(status)
      .with_data("defectCount", defects.len())
      .with_data("whiteSpotCount", white)
      .with_data("blackSpotCount", black);
    result.defects = defects;
    result.output_image = Some(overlay);
    result.timed(started)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// Dark frame with one bright square of side `side` at (x, y).
  fn frame_with_square(width: u32, height: u32, x: u32, y: u32, side: u32) -> BgrImage {
    let mut image = BgrImage::from_pixel(width, height, [30, 30, 30]);
    for yy in y..y + side {
      for xx in x..x + side {
        image.put_pixel(xx, yy, [230, 230, 230]);
      }
    }
    image
  }

  #[test]
  fn test_single_bright_square() {
    let image = frame_with_square(120, 120, 40, 50, 20);
    let tool = DefectDetectionTool::new(DefectThreshold::default());

    let result = tool.run(&image, None);

    assert!(result.success);
    assert_eq!(result.status, InspectionStatus::Ng);
    assert_eq!(result.defects.len(), 1);
    let defect = &result.defects[0];
    assert_eq!(defect.kind, DefectKind::WhiteSpot);
    assert_eq!(defect.area, 400.0);
    assert_eq!((defect.x, defect.y, defect.width, defect.height), (40.0, 50.0, 20.0, 20.0));
    assert_eq!(defect.severity, Severity::Low);
    assert!(defect.circularity > 0.7 && defect.circularity <= 1.0);
  }

  #[test]
  fn test_severity_follows_max_area() {
    let image = frame_with_square(120, 120, 40, 50, 20);

    let medium = DefectDetectionTool::new(DefectThreshold {
      max_area: 1000.0,
      detect_black: false,
      ..Default::default()
    });
    assert_eq!(medium.run(&image, None).defects[0].severity, Severity::Medium);

    let high = DefectDetectionTool::new(DefectThreshold {
      max_area: 700.0,
      detect_black: false,
      ..Default::default()
    });
    assert_eq!(high.run(&image, None).defects[0].severity, Severity::High);
  }

  #[test]
  fn test_clean_frame_is_ok() {
    let image = BgrImage::from_pixel(64, 64, [200, 200, 200]);
    let tool = DefectDetectionTool::new(DefectThreshold {
      detect_black: false,
      ..Default::default()
    });
    let result = tool.run(&image, None);
    assert_eq!(result.status, InspectionStatus::Ok);
    assert!(result.defects.is_empty());
  }

  #[test]
  fn test_area_band_filters_small_spots() {
    let image = frame_with_square(120, 120, 10, 10, 3);
    let tool = DefectDetectionTool::new(DefectThreshold {
      detect_black: false,
      morphology_kernel: 1,
      ..Default::default()
    });
    assert!(tool.run(&image, None).defects.is_empty());
  }

  #[test]
  fn test_mask_hides_spot() {
    let image = frame_with_square(120, 120, 40, 50, 20);
    let mask = GrayImage::new(120, 120);
    let tool = DefectDetectionTool::default();

    let result = tool.run(&image, Some(&mask));
    assert_eq!(result.status, InspectionStatus::Ok);
  }

  #[test]
  fn test_mask_size_mismatch_fails() {
    let image = BgrImage::new(32, 32);
    let mask = GrayImage::new(16, 16);
    let result = DefectDetectionTool::default().run(&image, Some(&mask));
    assert!(!result.success);
    assert_eq!(result.status, InspectionStatus::Error);
  }

  #[test]
  fn test_dark_spot_on_bright_background() {
    let mut image = BgrImage::from_pixel(100, 100, [220, 220, 220]);
    for y in 30..45 {
      for x in 60..75 {
        image.put_pixel(x, y, [10, 10, 10]);
      }
    }
    let tool = DefectDetectionTool::new(DefectThreshold {
      detect_white: false,
      ..Default::default()
    });
    let result = tool.run(&image, None);
    assert_eq!(result.defects.len(), 1);
    assert_eq!(result.defects[0].kind, DefectKind::BlackSpot);
    assert_eq!(result.defects[0].area, 225.0);
  }
}

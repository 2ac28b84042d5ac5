use std::time::Instant;

use image::GrayImage;
use imageproc::edges::canny;
use inspekt_config::MeasurementSpec;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::buffer::{BgrImage, colors};
use crate::model::{InspectionStatus, Measurement};
use crate::tool::{ToolKind, ToolResult, VisionTool};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
  pub x: f64,
  pub y: f64,
}

impl Point2 {
  pub fn new(x: f64, y: f64) -> Self {
    Self { x, y }
  }

  pub fn distance(&self, other: &Point2) -> f64 {
    (self.x - other.x).hypot(self.y - other.y)
  }

  pub fn offset(&self, dx: f64, dy: f64) -> Self {
    Self::new(self.x + dx, self.y + dy)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DistanceConfig {
  pub point1: Point2,
  pub point2: Point2,
  pub use_edge_detection: bool,
  /// Low Canny threshold; the high one is twice this.
  pub edge_threshold: f64,
  pub search_radius: u32,
  pub spec: Option<MeasurementSpec>,
}

impl Default for DistanceConfig {
  fn default() -> Self {
    Self {
      point1: Point2::default(),
      point2: Point2::default(),
      use_edge_detection: true,
      edge_threshold: 50.0,
      search_radius: 20,
      spec: None,
    }
  }
}

/// Measures the distance between two nominal points, optionally snapped to edges.
#[derive(Debug, Clone, Default)]
pub struct DistanceMeasureTool {
  config: DistanceConfig,
}

impl DistanceMeasureTool {
  pub fn new(config: DistanceConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &DistanceConfig {
    &self.config
  }

  pub fn set_points(&mut self, point1: Point2, point2: Point2) {
    self.config.point1 = point1;
    self.config.point2 = point2;
  }

  pub fn set_spec(&mut self, spec: MeasurementSpec) {
    self.config.spec = Some(spec);
  }
}

/// Closest non-zero pixel of `edges` inside the search square, or `point` itself.
fn nearest_edge(edges: &GrayImage, point: Point2, radius: u32) -> Point2 {
  let (width, height) = edges.dimensions();
  let (px, py) = (point.x.round() as i64, point.y.round() as i64);
  let r = radius as i64;

  let x0 = (px - r).max(0);
  let y0 = (py - r).max(0);
  let x1 = (px + r).min(width as i64 - 1);
  let y1 = (py + r).min(height as i64 - 1);
  if x0 > x1 || y0 > y1 {
    return point;
  }

  let mut best: Option<(f64, Point2)> = None;
  for y in y0..=y1 {
    for x in x0..=x1 {
      if edges.get_pixel(x as u32, y as u32)[0] == 0 {
        continue;
      }
      let candidate = Point2::new(x as f64, y as f64);
      let d = candidate.distance(&point);
      if best.is_none_or(|(bd, _)| d < bd) {
        best = Some((d, candidate));
      }
    }
  }
  best.map(|(_, p)| p).unwrap_or(point)
}

impl VisionTool for DistanceMeasureTool {
  fn kind(&self) -> ToolKind {
    ToolKind::DistanceMeasure
  }

  fn run(&self, image: &BgrImage, _mask: Option<&GrayImage>) -> ToolResult {
    let started = Instant::now();
    let cfg = &self.config;

    let (p1, p2) = if cfg.use_edge_detection {
      let low = cfg.edge_threshold.max(0.0) as f32;
      let edges = canny(&image.to_gray(), low, low * 2.0);
      (
        nearest_edge(&edges, cfg.point1, cfg.search_radius),
        nearest_edge(&edges, cfg.point2, cfg.search_radius),
      )
    } else {
      (cfg.point1, cfg.point2)
    };

    let pixels = p1.distance(&p2);
    let measurement = Measurement::from_pixels(cfg.spec.as_ref(), pixels);

    let mut overlay = image.clone();
    let line_color = if measurement.status == InspectionStatus::Ok {
      colors::GREEN
    } else {
      colors::RED
    };
    overlay.draw_line((p1.x, p1.y), (p2.x, p2.y), line_color);
    overlay.fill_circle((p1.x, p1.y), 5, colors::BLUE);
    overlay.fill_circle((p2.x, p2.y), 5, colors::BLUE);

    let mut result = ToolResult::success(measurement.status)
      .with_data("distancePixels", pixels)
      .with_data("point1", json!({"x": p1.x, "y": p1.y}))
      .with_data("point2", json!({"x": p2.x, "y": p2.y}));
    result.measurements.push(measurement);
    result.output_image = Some(overlay);
    result.timed(started)
  }
}

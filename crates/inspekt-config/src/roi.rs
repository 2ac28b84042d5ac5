use serde::{Deserialize, Serialize};

use crate::tag::{TagRepr, resolve};

/// Shape of a region of interest. Decides how `points` is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TagRepr")]
pub enum RoiShape {
  Rectangle,
  Circle,
  Triangle,
  Polygon,
}

impl TryFrom<TagRepr> for RoiShape {
  type Error = String;

  fn try_from(repr: TagRepr) -> Result<Self, Self::Error> {
    let table = [
      ("Rectangle", RoiShape::Rectangle),
      ("Circle", RoiShape::Circle),
      ("Triangle", RoiShape::Triangle),
      ("Polygon", RoiShape::Polygon),
    ];
    resolve(repr, &table, "ROI shape")
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TagRepr")]
pub enum RoiUsage {
  Include,
  Exclude,
}

impl TryFrom<TagRepr> for RoiUsage {
  type Error = String;

  fn try_from(repr: TagRepr) -> Result<Self, Self::Error> {
    let table = [("Include", RoiUsage::Include), ("Exclude", RoiUsage::Exclude)];
    resolve(repr, &table, "ROI usage")
  }
}

fn new_id() -> String {
  uuid::Uuid::new_v4().to_string()
}

fn enabled() -> bool {
  true
}

fn default_color() -> String {
  "#00FF00".to_string()
}

/// A named region of interest.
///
/// Point encoding by shape:
/// - `Rectangle`: `[centerX, centerY, width, height]`, rotated by `rotation` degrees
/// - `Circle`: `[centerX, centerY, radius]`
/// - `Triangle` / `Polygon`: `[x1, y1, x2, y2, ...]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roi {
  #[serde(default = "new_id")]
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(rename = "type")]
  pub shape: RoiShape,
  pub usage: RoiUsage,
  #[serde(default)]
  pub points: Vec<f64>,
  #[serde(default)]
  pub rotation: f64,
  #[serde(default = "enabled")]
  pub enabled: bool,
  #[serde(default = "default_color")]
  pub color: String,
}

impl Roi {
  pub fn new(shape: RoiShape, usage: RoiUsage, points: Vec<f64>) -> Self {
    Self {
      id: new_id(),
      name: String::new(),
      shape,
      usage,
      points,
      rotation: 0.0,
      enabled: true,
      color: default_color(),
    }
  }

  pub fn rectangle(center_x: f64, center_y: f64, width: f64, height: f64, usage: RoiUsage) -> Self {
    Self::new(RoiShape::Rectangle, usage, vec![center_x, center_y, width, height])
  }

  pub fn circle(center_x: f64, center_y: f64, radius: f64, usage: RoiUsage) -> Self {
    Self::new(RoiShape::Circle, usage, vec![center_x, center_y, radius])
  }

  pub fn with_id(mut self, id: impl Into<String>) -> Self {
    self.id = id.into();
    self
  }

  /// Outline vertices in image coordinates. Circles have no vertex outline.
  pub fn vertices(&self) -> Vec<(f64, f64)> {
    match self.shape {
      RoiShape::Rectangle => {
        let [cx, cy, w, h] = match self.points.as_slice() {
          [cx, cy, w, h, ..] => [*cx, *cy, *w, *h],
          _ => return Vec::new(),
        };
        let (sin, cos) = self.rotation.to_radians().sin_cos();
        [(-w / 2.0, -h / 2.0), (w / 2.0, -h / 2.0), (w / 2.0, h / 2.0), (-w / 2.0, h / 2.0)]
          .into_iter()
          .map(|(dx, dy)| (cx + dx * cos - dy * sin, cy + dx * sin + dy * cos))
          .collect()
      }
      RoiShape::Triangle | RoiShape::Polygon => self
        .points
        .chunks_exact(2)
        .map(|pair| (pair[0], pair[1]))
        .collect(),
      RoiShape::Circle => Vec::new(),
    }
  }

  /// Axis-aligned bounds as `(min_x, min_y, max_x, max_y)`.
  pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
    if self.shape == RoiShape::Circle {
      return match self.points.as_slice() {
        [cx, cy, r, ..] => Some((cx - r, cy - r, cx + r, cy + r)),
        _ => None,
      };
    }
    let vertices = self.vertices();
    let first = vertices.first()?;
    Some(vertices.iter().fold(
      (first.0, first.1, first.0, first.1),
      |(x0, y0, x1, y1), (x, y)| (x0.min(*x), y0.min(*y), x1.max(*x), y1.max(*y)),
    ))
  }
}

/// ROI list as stored in a product document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoiCollection {
  #[serde(default)]
  pub rois: Vec<Roi>,
}

impl RoiCollection {
  pub fn find(&self, id: &str) -> Option<&Roi> {
    self.rois.iter().find(|r| r.id == id)
  }
}

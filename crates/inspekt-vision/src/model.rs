use std::fmt;

use inspekt_config::MeasurementSpec;
use serde::{Deserialize, Serialize};

/// Outcome of an inspection, a node or a single measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InspectionStatus {
  #[default]
  NotInspected,
  #[serde(rename = "OK")]
  Ok,
  #[serde(rename = "NG")]
  Ng,
  Error,
  Skipped,
}

impl InspectionStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      InspectionStatus::NotInspected => "NotInspected",
      InspectionStatus::Ok => "OK",
      InspectionStatus::Ng => "NG",
      InspectionStatus::Error => "Error",
      InspectionStatus::Skipped => "Skipped",
    }
  }
}

impl fmt::Display for InspectionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A single measured value with its tolerance band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
  pub id: String,
  pub name: String,
  pub value: f64,
  pub unit: String,
  pub nominal: f64,
  pub tolerance_plus: f64,
  pub tolerance_minus: f64,
  pub status: InspectionStatus,
}

impl Measurement {
  /// Convert a pixel length through `spec` and classify it.
  ///
  /// Without a spec the value stays in pixels and any value passes.
  pub fn from_pixels(spec: Option<&MeasurementSpec>, pixels: f64) -> Self {
    let mut measurement = match spec {
      Some(spec) => {
        let pixels_per_unit = if spec.pixels_per_unit > 0.0 {
          spec.pixels_per_unit
        } else {
          1.0
        };
        Self {
          id: non_empty(&spec.id).unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
          name: non_empty(&spec.name).unwrap_or_else(|| "Distance".to_string()),
          value: pixels / pixels_per_unit,
          unit: spec.unit.clone(),
          nominal: spec.nominal,
          tolerance_plus: spec.tolerance_plus,
          tolerance_minus: spec.tolerance_minus,
          status: InspectionStatus::NotInspected,
        }
      }
      None => Self {
        id: uuid::Uuid::new_v4().to_string(),
        name: "Distance".to_string(),
        value: pixels,
        unit: "px".to_string(),
        nominal: 0.0,
        tolerance_plus: f64::MAX,
        tolerance_minus: f64::MAX,
        status: InspectionStatus::NotInspected,
      },
    };
    measurement.status = if measurement.is_within_tolerance() {
      InspectionStatus::Ok
    } else {
      InspectionStatus::Ng
    };
    measurement
  }

  /// Inclusive on both ends.
  pub fn is_within_tolerance(&self) -> bool {
    self.value >= self.nominal - self.tolerance_minus && self.value <= self.nominal + self.tolerance_plus
  }
}

fn non_empty(s: &str) -> Option<String> {
  (!s.is_empty()).then(|| s.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefectKind {
  WhiteSpot,
  BlackSpot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
  Low,
  Medium,
  High,
}

impl Severity {
  /// High above half of `max_area`, Medium above a quarter, Low otherwise.
  pub fn from_area(area: f64, max_area: f64) -> Self {
    if area > max_area / 2.0 {
      Severity::High
    } else if area > max_area / 4.0 {
      Severity::Medium
    } else {
      Severity::Low
    }
  }
}

/// A detected spot. The box is in full-image pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Defect {
  pub id: String,
  #[serde(rename = "type")]
  pub kind: DefectKind,
  pub x: f64,
  pub y: f64,
  pub width: f64,
  pub height: f64,
  pub area: f64,
  pub circularity: f64,
  pub severity: Severity,
}

/// Pose of a taught pattern in an inspected image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductPosition {
  pub x: f64,
  pub y: f64,
  /// Degrees.
  pub rotation: f64,
  pub scale: f64,
  pub confidence: f64,
}

impl Default for ProductPosition {
  fn default() -> Self {
    Self {
      x: 0.0,
      y: 0.0,
      rotation: 0.0,
      scale: 1.0,
      confidence: 0.0,
    }
  }
}

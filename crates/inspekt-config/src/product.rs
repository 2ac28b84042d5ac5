use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::flow::FlowDef;
use crate::roi::RoiCollection;

/// Product-level configuration: identity, ROIs and inspection thresholds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductConfig {
  #[serde(default)]
  pub product: ProductDefinition,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub flow: Option<FlowDef>,
  #[serde(default)]
  pub rois: RoiCollection,
  #[serde(default)]
  pub thresholds: ThresholdConfig,
}

impl ProductConfig {
  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(json)?)
  }

  /// Read a product document from disk.
  pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
      .await
      .map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
      })?;
    Self::from_json(&content)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProductDefinition {
  pub product_id: String,
  pub product_name: String,
  pub version: String,
  pub description: String,
  pub author: String,
}

impl Default for ProductDefinition {
  fn default() -> Self {
    Self {
      product_id: String::new(),
      product_name: String::new(),
      version: "1.0".to_string(),
      description: String::new(),
      author: String::new(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThresholdConfig {
  pub defect_thresholds: Vec<DefectThreshold>,
  pub measurement_specs: Vec<MeasurementSpec>,
}

impl ThresholdConfig {
  pub fn defect_threshold(&self, id: &str) -> Option<&DefectThreshold> {
    self.defect_thresholds.iter().find(|t| t.id == id)
  }

  pub fn measurement_spec(&self, id: &str) -> Option<&MeasurementSpec> {
    self.measurement_specs.iter().find(|s| s.id == id)
  }
}

/// Spot detection settings.
///
/// Areas are pixel counts. Circularity bands are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DefectThreshold {
  pub id: String,
  pub name: String,
  pub binary_threshold: u8,
  pub min_area: f64,
  pub max_area: f64,
  pub morphology_kernel: u32,
  pub detect_white: bool,
  pub detect_black: bool,
  pub circularity_min: f64,
  pub circularity_max: f64,
}

impl Default for DefectThreshold {
  fn default() -> Self {
    Self {
      id: String::new(),
      name: String::new(),
      binary_threshold: 128,
      min_area: 10.0,
      max_area: 10000.0,
      morphology_kernel: 3,
      detect_white: true,
      detect_black: true,
      circularity_min: 0.0,
      circularity_max: 1.0,
    }
  }
}

/// Nominal value and tolerance band of one measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeasurementSpec {
  pub id: String,
  pub name: String,
  #[serde(rename = "type")]
  pub kind: String,
  pub nominal: f64,
  pub tolerance_plus: f64,
  pub tolerance_minus: f64,
  pub unit: String,
  pub pixels_per_unit: f64,
}

impl Default for MeasurementSpec {
  fn default() -> Self {
    Self {
      id: String::new(),
      name: String::new(),
      kind: "distance".to_string(),
      nominal: 0.0,
      tolerance_plus: 0.0,
      tolerance_minus: 0.0,
      unit: "mm".to_string(),
      pixels_per_unit: 1.0,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_product_defaults_fill_missing_sections() {
    let product = ProductConfig::from_json(r#"{"product": {"productId": "P-100"}}"#).unwrap();
    assert_eq!(product.product.product_id, "P-100");
    assert_eq!(product.product.version, "1.0");
    assert!(product.rois.rois.is_empty());
    assert!(product.flow.is_none());
  }

  #[test]
  fn test_threshold_lookup() {
    let product = ProductConfig::from_json(
      r#"{
        "thresholds": {
          "defectThresholds": [{"id": "d1", "binaryThreshold": 90}],
          "measurementSpecs": [{"id": "m1", "nominal": 12.5, "unit": "mm"}]
        }
      }"#,
    )
    .unwrap();

    let defect = product.thresholds.defect_threshold("d1").unwrap();
    assert_eq!(defect.binary_threshold, 90);
    assert_eq!(defect.max_area, 10000.0);
    assert!(defect.detect_white);

    let spec = product.thresholds.measurement_spec("m1").unwrap();
    assert_eq!(spec.nominal, 12.5);
    assert_eq!(spec.pixels_per_unit, 1.0);
    assert!(product.thresholds.measurement_spec("missing").is_none());
  }
}

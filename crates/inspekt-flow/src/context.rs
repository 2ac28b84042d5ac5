use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use inspekt_config::ProductConfig;
use inspekt_vision::{BgrImage, Defect, GrayImage, Measurement, ProductPosition};

use crate::error::FlowError;
use crate::result::FlowNodeResult;

/// Shared state of a single run.
///
/// Owned by exactly one run and handed to nodes one at a time. Node results
/// are write-once; measurements and defects only grow.
pub struct ExecutionContext {
  execution_id: String,
  image: Option<Arc<BgrImage>>,
  product: Arc<ProductConfig>,
  mask: Option<Arc<GrayImage>>,
  measurements: Vec<Measurement>,
  defects: Vec<Defect>,
  product_position: Option<ProductPosition>,
  node_results: HashMap<String, FlowNodeResult>,
  pub variables: serde_json::Map<String, serde_json::Value>,
  started: Instant,
}

impl ExecutionContext {
  pub fn new(image: Option<Arc<BgrImage>>, product: Arc<ProductConfig>) -> Self {
    Self {
      execution_id: uuid::Uuid::new_v4().to_string(),
      image,
      product,
      mask: None,
      measurements: Vec::new(),
      defects: Vec::new(),
      product_position: None,
      node_results: HashMap::new(),
      variables: serde_json::Map::new(),
      started: Instant::now(),
    }
  }

  pub fn execution_id(&self) -> &str {
    &self.execution_id
  }

  pub fn image(&self) -> Option<Arc<BgrImage>> {
    self.image.clone()
  }

  pub fn product(&self) -> &ProductConfig {
    &self.product
  }

  pub fn mask(&self) -> Option<Arc<GrayImage>> {
    self.mask.clone()
  }

  pub fn set_mask(&mut self, mask: Arc<GrayImage>) {
    self.mask = Some(mask);
  }

  pub fn measurements(&self) -> &[Measurement] {
    &self.measurements
  }

  pub fn add_measurements(&mut self, measurements: impl IntoIterator<Item = Measurement>) {
    self.measurements.extend(measurements);
  }

  pub fn defects(&self) -> &[Defect] {
    &self.defects
  }

  pub fn add_defects(&mut self, defects: impl IntoIterator<Item = Defect>) {
    self.defects.extend(defects);
  }

  pub fn product_position(&self) -> Option<ProductPosition> {
    self.product_position
  }

  pub fn set_product_position(&mut self, position: ProductPosition) {
    self.product_position = Some(position);
  }

  pub fn result(&self, node_id: &str) -> Option<&FlowNodeResult> {
    self.node_results.get(node_id)
  }

  pub fn results(&self) -> &HashMap<String, FlowNodeResult> {
    &self.node_results
  }

  /// Store a node's result. A node may record only once per run.
  pub fn record(&mut self, result: FlowNodeResult) -> Result<(), FlowError> {
    if self.node_results.contains_key(&result.node_id) {
      return Err(FlowError::DuplicateResult {
        node_id: result.node_id,
      });
    }
    self.node_results.insert(result.node_id.clone(), result);
    Ok(())
  }

  /// Image produced by the first input that has one, else the run's image.
  pub fn input_image(&self, inputs: &[String]) -> Option<Arc<BgrImage>> {
    inputs
      .iter()
      .filter_map(|id| self.node_results.get(id))
      .find_map(|r| r.output_image.clone())
      .or_else(|| self.image.clone())
  }

  pub fn elapsed_ms(&self) -> u64 {
    self.started.elapsed().as_millis() as u64
  }

  /// Consume the context, yielding accumulated measurements, defects, pose and results.
  pub fn into_parts(
    self,
  ) -> (
    Vec<Measurement>,
    Vec<Defect>,
    Option<ProductPosition>,
    HashMap<String, FlowNodeResult>,
  ) {
    (self.measurements, self.defects, self.product_position, self.node_results)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use inspekt_vision::InspectionStatus;

  #[test]
  fn test_results_are_write_once() {
    let mut ctx = ExecutionContext::new(None, Arc::default());
    ctx.record(FlowNodeResult::success("a", InspectionStatus::Ok)).unwrap();

    let err = ctx.record(FlowNodeResult::success("a", InspectionStatus::Ng)).unwrap_err();
    assert!(matches!(err, FlowError::DuplicateResult { .. }));
    assert_eq!(ctx.result("a").unwrap().status, InspectionStatus::Ok);
  }

  #[test]
  fn test_input_image_prefers_upstream_output() {
    let frame = Arc::new(BgrImage::new(4, 4));
    let upstream = Arc::new(BgrImage::new(8, 8));
    let mut ctx = ExecutionContext::new(Some(frame), Arc::default());

    assert_eq!(ctx.input_image(&["a".to_string()]).unwrap().width(), 4);

    ctx
      .record(FlowNodeResult::success("a", InspectionStatus::Ok).with_image(upstream))
      .unwrap();
    assert_eq!(ctx.input_image(&["a".to_string()]).unwrap().width(), 8);
  }
}

//! Built-in node variants.

mod conditional_branch;
mod defect_detection;
mod final_decision;
mod input_image;
mod measurement;
mod roi_apply;
mod teach_match;
mod threshold_compare;

pub use conditional_branch::ConditionalBranchNode;
pub use defect_detection::DefectDetectionNode;
pub use final_decision::{DecisionLogic, FinalDecisionNode};
pub use input_image::InputImageNode;
pub use measurement::MeasurementNode;
pub use roi_apply::RoiApplyNode;
pub use teach_match::TeachMatchNode;
pub use threshold_compare::{CompareSource, ThresholdCompareNode};

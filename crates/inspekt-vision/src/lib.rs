//! Inspekt Vision
//!
//! Image processing for inspection flows. Everything here is synchronous and
//! CPU bound; callers on an async runtime should move tool invocations onto a
//! blocking thread.
//!
//! # Image contract
//!
//! [`BgrImage`] is the only color buffer used by the pipeline: 3 bytes per
//! pixel in blue-green-red order, row-major, stride `width * 3`, no padding.
//! Grayscale work happens on [`image::GrayImage`].
//!
//! # Tools
//!
//! - [`TeachMatchTool`] learns a pattern and recovers its pose in new images
//! - [`DefectDetectionTool`] finds bright and dark spots
//! - [`DistanceMeasureTool`] measures calibrated point-to-point distances
//!
//! All tools implement [`VisionTool`] and report through [`ToolResult`].
//! [`build_mask`] turns product ROIs into the binary mask the tools consume.

mod defect;
mod distance;
mod error;
mod buffer;
mod mask;
mod model;
mod teach;
mod tool;

pub use defect::DefectDetectionTool;
pub use distance::{DistanceConfig, DistanceMeasureTool, Point2};
pub use error::VisionError;
pub use buffer::{BgrImage, colors};
pub use mask::build_mask;
pub use model::{Defect, DefectKind, InspectionStatus, Measurement, ProductPosition, Severity};
pub use teach::{Keypoint, TeachMatchConfig, TeachMatchTool, Template};
pub use tool::{ToolKind, ToolResult, VisionTool};

pub use ::image::GrayImage;

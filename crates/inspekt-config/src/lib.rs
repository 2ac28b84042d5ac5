//! Inspekt Config
//!
//! This crate contains the serializable configuration types for inspekt.
//! These types describe inspection flows and products before they are loaded
//! into live nodes by the engine.
//!
//! Documents are JSON with camelCase field names and can be loaded from:
//! - flow files (`FlowDef::load`)
//! - product files carrying ROIs and thresholds (`ProductConfig::load`)
//!
//! The engine takes a `FlowDef`, builds one node per record and wires them
//! up from the adjacency lists and connection records.

mod connection;
mod error;
mod flow;
mod node;
mod product;
mod roi;
mod tag;

pub use connection::ConnectionDef;
pub use error::ConfigError;
pub use flow::FlowDef;
pub use node::{ConfigMap, NodeDef, NodeKind};
pub use product::{DefectThreshold, MeasurementSpec, ProductConfig, ProductDefinition, ThresholdConfig};
pub use roi::{Roi, RoiCollection, RoiShape, RoiUsage};

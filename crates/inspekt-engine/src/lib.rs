//! Inspekt Engine
//!
//! Loads inspection flows, walks them and turns the outcome into an
//! [`InspectionResult`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    InspectionRunner                         │
//! │  - owns mpsc channel of frames                              │
//! │  - start(cancel) inspects each frame, forwards results      │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       FlowEngine                            │
//! │  - load(flow) / definition() / validate()                   │
//! │  - execute(image, product, cancel) → InspectionResult       │
//! │  - dependency-counted ready queue, branch skipping          │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  FlowNode (inspekt-flow)                    │
//! │  - one node at a time against a shared ExecutionContext     │
//! │  - vision tools run on blocking threads                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let flow = FlowDef::load("flow.json").await?;
//! let mut engine = FlowEngine::default();
//! let report = engine.load(&flow)?;
//!
//! let result = engine.execute(image, Arc::new(product), CancellationToken::new()).await;
//! println!("{}", result.status.as_str());
//! ```

mod engine;
mod error;
pub mod events;
mod graph;
mod result;
mod runner;

pub use engine::{CANCELLED_MESSAGE, FlowEngine};
pub use error::EngineError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use graph::Graph;
pub use result::{InspectionResult, LoadReport};
pub use runner::InspectionRunner;

//! Inspection events and the notifiers that deliver them.
//!
//! The engine reports the start of a run, each node outcome and the final
//! verdict. Notifiers decide where those reports go.

use inspekt_vision::InspectionStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

/// Events emitted during an inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// An inspection has started.
  InspectionStarted {
    execution_id: String,
    flow_id: String,
    product_id: String,
  },

  /// A node finished and produced a status.
  NodeCompleted {
    execution_id: String,
    node_id: String,
    status: InspectionStatus,
    elapsed_ms: u64,
  },

  /// A node reported a failure.
  NodeFailed {
    execution_id: String,
    node_id: String,
    error: String,
  },

  /// A node sat on a branch that was not taken.
  NodeSkipped { execution_id: String, node_id: String },

  /// The inspection ran to completion.
  InspectionCompleted {
    execution_id: String,
    status: InspectionStatus,
  },

  /// The inspection could not complete.
  InspectionFailed { execution_id: String, error: String },
}

/// Receives execution events.
///
/// The engine calls `notify` for each event; implementations decide what to
/// do with them.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Used when nobody is watching.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Streams events to a receiver, e.g. a UI or a result logger.
///
/// A run of `n` nodes emits `n + 2` events: one start, one per node
/// (completed, failed or skipped) and one terminal event. At camera frame
/// rates that stays in the hundreds per second, so the channel is unbounded
/// and `notify` never waits on the consumer.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }

  /// A notifier together with the receiving end of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    if self.sender.send(event).is_err() {
      trace!("event receiver dropped");
    }
  }
}

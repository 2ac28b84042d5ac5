//! Inspection runner with channel-based frame delivery.
//!
//! The `InspectionRunner` owns an mpsc channel of frames and runs its
//! engine once per frame, forwarding each result to an optional channel.

use std::sync::Arc;

use inspekt_capture::Frame;
use inspekt_config::ProductConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::FlowEngine;
use crate::error::EngineError;
use crate::events::{ExecutionNotifier, NoopNotifier};
use crate::result::InspectionResult;

/// Runs a loaded flow for every frame it receives.
///
/// # Usage
///
/// ```ignore
/// let (results_tx, mut results_rx) = mpsc::channel(16);
/// let runner = InspectionRunner::new(engine, product).with_results(results_tx);
///
/// // Hand the sender to a camera or folder pump.
/// let frames = runner.sender();
///
/// let cancel = CancellationToken::new();
/// tokio::spawn(runner.start(cancel.clone()));
/// ```
pub struct InspectionRunner<N: ExecutionNotifier = NoopNotifier> {
  sender: mpsc::Sender<Frame>,
  receiver: mpsc::Receiver<Frame>,
  engine: FlowEngine<N>,
  product: Arc<ProductConfig>,
  results: Option<mpsc::Sender<InspectionResult>>,
}

impl<N: ExecutionNotifier> InspectionRunner<N> {
  pub fn new(engine: FlowEngine<N>, product: Arc<ProductConfig>) -> Self {
    Self::with_buffer_size(engine, product, 16)
  }

  /// Frames beyond `buffer_size` make `submit` wait.
  pub fn with_buffer_size(engine: FlowEngine<N>, product: Arc<ProductConfig>, buffer_size: usize) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    Self {
      sender,
      receiver,
      engine,
      product,
      results: None,
    }
  }

  /// Forward every inspection result to `results`.
  pub fn with_results(mut self, results: mpsc::Sender<InspectionResult>) -> Self {
    self.results = Some(results);
    self
  }

  /// A sender for frame producers.
  pub fn sender(&self) -> mpsc::Sender<Frame> {
    self.sender.clone()
  }

  /// Queue a frame for inspection.
  pub async fn submit(&self, frame: Frame) -> Result<(), EngineError> {
    self.sender.send(frame).await.map_err(|_| EngineError::ChannelClosed)
  }

  pub fn engine(&self) -> &FlowEngine<N> {
    &self.engine
  }

  /// Inspect one frame directly, bypassing the channel.
  pub async fn execute_once(&mut self, frame: Frame, cancel: CancellationToken) -> InspectionResult {
    inspect(&mut self.engine, &self.product, frame, cancel).await
  }

  /// Run until cancelled or until every external sender is dropped.
  ///
  /// Each frame runs under a child of `cancel`. Returns the number of frames
  /// inspected.
  pub async fn start(self, cancel: CancellationToken) -> Result<u64, EngineError> {
    let Self {
      sender,
      mut receiver,
      mut engine,
      product,
      mut results,
    } = self;
    // Only external senders keep the channel open from here on.
    drop(sender);

    info!(flow_id = %engine.flow_id(), flow_name = %engine.name(), "starting inspection runner");
    let mut inspected = 0u64;

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!(flow_id = %engine.flow_id(), inspected, "inspection runner cancelled");
          break;
        }
        frame = receiver.recv() => {
          let Some(frame) = frame else {
            info!(flow_id = %engine.flow_id(), inspected, "inspection runner channel closed");
            break;
          };

          let result = inspect(&mut engine, &product, frame, cancel.child_token()).await;
          inspected += 1;

          if let Some(tx) = &results
            && tx.send(result).await.is_err()
          {
            warn!(flow_id = %engine.flow_id(), "result receiver dropped, results are no longer forwarded");
            results = None;
          }
        }
      }
    }

    Ok(inspected)
  }
}

async fn inspect<N: ExecutionNotifier>(
  engine: &mut FlowEngine<N>,
  product: &Arc<ProductConfig>,
  frame: Frame,
  cancel: CancellationToken,
) -> InspectionResult {
  let mut result = engine.execute(frame.image, product.clone(), cancel).await;
  result.metadata.insert("source".to_string(), frame.source.into());
  result.metadata.insert("sequence".to_string(), frame.sequence.into());
  result
}

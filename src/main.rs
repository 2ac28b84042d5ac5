use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use inspekt_capture::{FolderSource, FrameSource, frames, load_image, save_image};
use inspekt_config::{FlowDef, ProductConfig};
use inspekt_engine::{FlowEngine, InspectionRunner};
use inspekt_vision::InspectionStatus;

/// Inspekt - a vision inspection flow runner
#[derive(Parser)]
#[command(name = "inspekt")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.inspekt)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Check a flow for structural and configuration problems
  Validate {
    /// Path to the flow file (JSON)
    flow_file: PathBuf,
  },

  /// Inspect a single image
  Run {
    /// Path to the flow file (JSON)
    flow_file: PathBuf,

    /// Image to inspect
    image: PathBuf,

    /// Product configuration (ROIs and thresholds)
    #[arg(long)]
    product: Option<PathBuf>,

    /// Write the final overlay image here
    #[arg(long)]
    overlay: Option<PathBuf>,
  },

  /// Teach a pattern node from a reference image and save the flow
  Teach {
    /// Path to the flow file (JSON)
    flow_file: PathBuf,

    /// Reference image
    image: PathBuf,

    /// The node ID to teach
    #[arg(long)]
    node: String,

    /// ROI to teach from (default: the node's configured ROI)
    #[arg(long)]
    roi: Option<String>,

    /// Product configuration (ROIs and thresholds)
    #[arg(long)]
    product: Option<PathBuf>,

    /// Where to save the taught flow (default: overwrite the flow file)
    #[arg(long)]
    out: Option<PathBuf>,
  },

  /// Inspect every image in a folder
  Batch {
    /// Path to the flow file (JSON)
    flow_file: PathBuf,

    /// Folder of images
    folder: PathBuf,

    /// Product configuration (ROIs and thresholds)
    #[arg(long)]
    product: Option<PathBuf>,

    /// Directory for result documents (default: <data-dir>/results)
    #[arg(long)]
    output: Option<PathBuf>,
  },
}

fn main() -> Result<()> {
  init_tracing();
  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".inspekt"),
  };

  let rt = tokio::runtime::Runtime::new()?;
  match cli.command {
    Some(Commands::Validate { flow_file }) => rt.block_on(validate(flow_file)),
    Some(Commands::Run {
      flow_file,
      image,
      product,
      overlay,
    }) => rt.block_on(run(flow_file, image, product, overlay)),
    Some(Commands::Teach {
      flow_file,
      image,
      node,
      roi,
      product,
      out,
    }) => rt.block_on(teach(flow_file, image, node, roi, product, out)),
    Some(Commands::Batch {
      flow_file,
      folder,
      product,
      output,
    }) => {
      let output = output.unwrap_or_else(|| data_dir.join("results"));
      rt.block_on(batch(flow_file, folder, product, output))
    }
    None => {
      println!("inspekt - use --help to see available commands");
      Ok(())
    }
  }
}

/// Log to stderr, filtered by `RUST_LOG`.
fn init_tracing() {
  use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

  let _ = tracing_subscriber::registry()
    .with(tracing_subscriber::EnvFilter::from_default_env())
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .try_init();
}

async fn load_engine(flow_file: &Path) -> Result<FlowEngine> {
  let flow = FlowDef::load(flow_file)
    .await
    .with_context(|| format!("failed to load flow file: {}", flow_file.display()))?;
  eprintln!("Loaded flow: {} ({} nodes)", flow.name, flow.nodes.len());

  let mut engine = FlowEngine::default();
  let report = engine.load(&flow).context("failed to build flow")?;
  for warning in &report.warnings {
    eprintln!("warning: {warning}");
  }
  Ok(engine)
}

async fn load_product(product: Option<&Path>) -> Result<ProductConfig> {
  match product {
    Some(path) => ProductConfig::load(path)
      .await
      .with_context(|| format!("failed to load product file: {}", path.display())),
    None => Ok(ProductConfig::default()),
  }
}

async fn validate(flow_file: PathBuf) -> Result<()> {
  let engine = load_engine(&flow_file).await?;
  let validation = engine.validate();

  for warning in &validation.warnings {
    eprintln!("warning: {warning}");
  }
  for error in &validation.errors {
    eprintln!("error: {error}");
  }
  println!("{}", serde_json::to_string_pretty(&validation)?);

  if !validation.is_valid {
    bail!("flow is invalid ({} errors)", validation.errors.len());
  }
  Ok(())
}

async fn run(flow_file: PathBuf, image: PathBuf, product: Option<PathBuf>, overlay: Option<PathBuf>) -> Result<()> {
  let mut engine = load_engine(&flow_file).await?;
  let product = load_product(product.as_deref()).await?;
  let frame = load_image(&image)
    .await
    .with_context(|| format!("failed to load image: {}", image.display()))?;

  let cancel = CancellationToken::new();
  let result = engine.execute(frame, Arc::new(product), cancel).await;
  eprintln!("Inspection {}: {} in {} ms", result.result_id, result.status.as_str(), result.duration_ms);

  if let Some(path) = overlay {
    match &result.overlay {
      Some(image) => {
        save_image(&path, image).await.context("failed to write overlay")?;
        eprintln!("Overlay written to {}", path.display());
      }
      None => eprintln!("warning: no overlay image was produced"),
    }
  }

  println!("{}", serde_json::to_string_pretty(&result)?);
  Ok(())
}

async fn teach(
  flow_file: PathBuf,
  image: PathBuf,
  node_id: String,
  roi: Option<String>,
  product: Option<PathBuf>,
  out: Option<PathBuf>,
) -> Result<()> {
  let mut engine = load_engine(&flow_file).await?;
  let product = load_product(product.as_deref()).await?;
  let reference = load_image(&image)
    .await
    .with_context(|| format!("failed to load image: {}", image.display()))?;

  let result = engine
    .teach(&node_id, &reference, &product.rois.rois, roi.as_deref())
    .context("teach failed")?;
  println!("{}", serde_json::to_string_pretty(&result)?);
  if !result.success {
    bail!(
      "node '{}' could not be taught: {}",
      node_id,
      result.error_message.unwrap_or_default()
    );
  }

  let out = out.unwrap_or(flow_file);
  engine
    .definition()
    .save(&out)
    .await
    .with_context(|| format!("failed to save flow: {}", out.display()))?;
  eprintln!("Taught flow saved to {}", out.display());
  Ok(())
}

async fn batch(flow_file: PathBuf, folder: PathBuf, product: Option<PathBuf>, output: PathBuf) -> Result<()> {
  let engine = load_engine(&flow_file).await?;
  let product = load_product(product.as_deref()).await?;
  let source = FolderSource::open(&folder)
    .await
    .with_context(|| format!("failed to open image folder: {}", folder.display()))?;
  eprintln!("Inspecting {} images from {}", source.len(), source.name());

  tokio::fs::create_dir_all(&output)
    .await
    .with_context(|| format!("failed to create output directory: {}", output.display()))?;

  let cancel = CancellationToken::new();
  let ctrl_c = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      eprintln!("Cancelling...");
      ctrl_c.cancel();
    }
  });

  let (results_tx, mut results_rx) = mpsc::channel(16);
  let runner = InspectionRunner::new(engine, Arc::new(product)).with_results(results_tx);
  let sender = runner.sender();
  let runner_handle = tokio::spawn(runner.start(cancel.clone()));

  let pump_cancel = cancel.clone();
  let pump = tokio::spawn(async move {
    let mut stream = frames(source);
    while let Some(frame) = stream.next().await {
      if pump_cancel.is_cancelled() {
        break;
      }
      match frame {
        Ok(frame) => {
          if sender.send(frame).await.is_err() {
            break;
          }
        }
        Err(e) => eprintln!("warning: skipping frame: {e}"),
      }
    }
  });

  let (mut ok, mut ng, mut other) = (0usize, 0usize, 0usize);
  while let Some(result) = results_rx.recv().await {
    match result.status {
      InspectionStatus::Ok => ok += 1,
      InspectionStatus::Ng => ng += 1,
      _ => other += 1,
    }
    let source = result.metadata.get("source").and_then(|s| s.as_str()).unwrap_or_default();
    eprintln!("{} {}", result.status.as_str(), source);

    let path = output.join(format!("{}.json", result.result_id));
    let json = serde_json::to_string_pretty(&result)?;
    tokio::fs::write(&path, json)
      .await
      .with_context(|| format!("failed to write result: {}", path.display()))?;
  }

  pump.await.context("frame pump panicked")?;
  let inspected = runner_handle
    .await
    .context("inspection runner panicked")?
    .context("inspection runner failed")?;

  eprintln!("Inspected {inspected} images: {ok} OK, {ng} NG, {other} other");
  eprintln!("Results written to {}", output.display());
  Ok(())
}

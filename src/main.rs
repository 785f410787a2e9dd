use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::Mutex;
use tracing::info;

use noisetiles::capture::CaptureController;
use noisetiles::config::{CaptureConfig, MAX_TILE, NoiseParams};
use noisetiles::material::NoiseMaterial;
use noisetiles::render::{Renderer, Surface};
use noisetiles::sink::DirSink;

#[derive(Debug, Parser)]
#[command(name = "noisetiles")]
#[command(about = "Preview a noise plane and export it as a 5x5 grid of PNG tiles")]
struct Cli {
    /// JSON file with noise uniforms; missing fields take defaults.
    #[arg(long, global = true)]
    params: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render the live view to a single PNG.
    Preview {
        #[arg(short = 'o', long = "output", default_value = "preview.png")]
        output: PathBuf,
        #[arg(long, default_value_t = 512, value_parser = clap::value_parser!(u32).range(1..=MAX_TILE as i64))]
        width: u32,
        #[arg(long, default_value_t = 512, value_parser = clap::value_parser!(u32).range(1..=MAX_TILE as i64))]
        height: u32,
        /// Show the circular indicator mask.
        #[arg(long)]
        mask: bool,
    },
    /// Export every tile as `{row}_{col}.png`.
    Export {
        #[arg(short = 'o', long = "output", default_value = "artifacts")]
        output: PathBuf,
        /// Tile edge in pixels.
        #[arg(long, default_value_t = 64, value_parser = clap::value_parser!(u32).range(1..=MAX_TILE as i64))]
        tile: u32,
        #[arg(long, default_value_t = 0)]
        row_delay_ms: u64,
        #[arg(long, default_value_t = 0)]
        settle_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    noisetiles::init_tracing();
    let cli = Cli::parse();
    let params = load_params(cli.params.as_deref())?;

    match cli.command {
        Commands::Preview { output, width, height, mask } => {
            run_preview(params, &output, width, height, mask)
        }
        Commands::Export { output, tile, row_delay_ms, settle_ms } => {
            let config = CaptureConfig {
                tile_width: tile,
                tile_height: tile,
                row_delay: Duration::from_millis(row_delay_ms),
                settle: Duration::from_millis(settle_ms),
            };
            run_export(params, &output, config).await
        }
    }
}

fn load_params(path: Option<&Path>) -> Result<NoiseParams> {
    let params = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => NoiseParams::default(),
    };
    params.validate().context("invalid noise parameters")?;
    Ok(params)
}

fn run_preview(params: NoiseParams, output: &Path, width: u32, height: u32, mask: bool) -> Result<()> {
    let params = NoiseParams { preview: mask || params.preview, ..params };
    let mut renderer = Renderer::new(Surface::default(), NoiseMaterial::new(params));
    renderer.set_size(width, height);

    let (_, png, timings) = noisetiles::preview(&renderer)?;
    for t in &timings {
        info!("  {:10} {:8.1} ms", t.name, t.ms);
    }
    std::fs::write(output, png).with_context(|| format!("failed to write {}", output.display()))?;
    println!("Wrote {}", output.display());
    Ok(())
}

async fn run_export(params: NoiseParams, output: &Path, config: CaptureConfig) -> Result<()> {
    let sink = Arc::new(DirSink::create(output)?);
    let renderer = Arc::new(Mutex::new(Renderer::new(
        Surface::default(),
        NoiseMaterial::new(params),
    )));
    let controller = CaptureController::new(renderer, Arc::clone(&sink), config);

    let report = controller.save().await?;
    for cell in report.failed() {
        if let Err(e) = &cell.outcome {
            eprintln!("missing {}: {}", cell.name, e);
        }
    }
    let delivered = report.delivered().count();
    println!("Wrote {} tiles to {}", delivered, sink.dir().display());
    if delivered != report.cells.len() {
        bail!("{} of {} tiles failed", report.cells.len() - delivered, report.cells.len());
    }
    Ok(())
}

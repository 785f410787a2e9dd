pub mod capture;
pub mod config;
pub mod material;
pub mod noise;
pub mod render;
pub mod sink;

use std::time::Instant;

use render::{Frame, RenderError, Renderer};
use tracing_subscriber::EnvFilter;

pub struct Timing {
    pub name: &'static str,
    pub ms: f64,
}

/// Render the live view and encode it, timing each stage.
pub fn preview(renderer: &Renderer) -> Result<(Frame, Vec<u8>, Vec<Timing>), RenderError> {
    let mut timings = Vec::new();
    let total_start = Instant::now();

    let t = Instant::now();
    let frame = renderer.render()?;
    timings.push(Timing {
        name: "render",
        ms: t.elapsed().as_secs_f64() * 1000.0,
    });

    let t = Instant::now();
    let png = frame.encode_png()?;
    timings.push(Timing {
        name: "encode",
        ms: t.elapsed().as_secs_f64() * 1000.0,
    });

    timings.push(Timing {
        name: "TOTAL",
        ms: total_start.elapsed().as_secs_f64() * 1000.0,
    });

    Ok((frame, png, timings))
}

/// Installs the fmt subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

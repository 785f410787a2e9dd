use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use noisetiles::capture::{CaptureController, CaptureError};
use noisetiles::config::{CaptureConfig, MAX_TILE, NoiseParams, ParamError};
use noisetiles::material::NoiseMaterial;
use noisetiles::render::{RenderError, Renderer, Surface};
use noisetiles::sink::MemorySink;

#[derive(Debug, Parser)]
#[command(name = "noisetiles-server")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: SocketAddr,
    /// Static files served for any other path.
    #[arg(long, default_value = "frontend")]
    frontend: PathBuf,
    #[arg(long, default_value_t = 64, value_parser = clap::value_parser!(u32).range(1..=MAX_TILE as i64))]
    tile: u32,
}

type Controller = CaptureController<MemorySink>;

/// Partial update from the panel. Absent fields keep their live value.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParamsPatch {
    size: Option<f32>,
    start: Option<f32>,
    stop: Option<f32>,
    force: Option<f32>,
    power: Option<f32>,
    x: Option<f32>,
    y: Option<f32>,
    preview: Option<bool>,
    preview_x: Option<i32>,
    preview_y: Option<i32>,
}

impl ParamsPatch {
    fn apply(self, live: &NoiseParams) -> NoiseParams {
        NoiseParams {
            size: self.size.unwrap_or(live.size),
            start: self.start.unwrap_or(live.start),
            stop: self.stop.unwrap_or(live.stop),
            force: self.force.unwrap_or(live.force),
            power: self.power.unwrap_or(live.power),
            x: self.x.unwrap_or(live.x),
            y: self.y.unwrap_or(live.y),
            preview: self.preview.unwrap_or(live.preview),
            preview_x: self.preview_x.unwrap_or(live.preview_x),
            preview_y: self.preview_y.unwrap_or(live.preview_y),
        }
    }
}

#[derive(Serialize)]
struct RenderResponse {
    data_url: String,
    timings: Vec<TimingEntry>,
    width: u32,
    height: u32,
}

#[derive(Serialize)]
struct TimingEntry {
    name: String,
    ms: f64,
}

#[derive(Serialize)]
struct ExportResponse {
    tiles: Vec<Tile>,
    missing: Vec<Missing>,
}

#[derive(Serialize)]
struct Tile {
    name: String,
    data_url: String,
}

#[derive(Serialize)]
struct Missing {
    name: String,
    error: String,
}

enum ApiError {
    Params(ParamError),
    Render(RenderError),
    Capture(CaptureError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Params(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            ApiError::Render(e @ RenderError::MissingMaterial) => {
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
            ApiError::Render(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            ApiError::Capture(e @ CaptureError::SessionActive) => (StatusCode::CONFLICT, e.to_string()),
            ApiError::Capture(e @ CaptureError::Config(_)) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            ApiError::Capture(e @ CaptureError::MissingMaterial) => {
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
            ApiError::Capture(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

fn data_url(png: &[u8]) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(png);
    format!("data:image/png;base64,{}", b64)
}

async fn get_params(State(ctl): State<Arc<Controller>>) -> Result<Json<NoiseParams>, ApiError> {
    let renderer = ctl.renderer().lock().await;
    let material = renderer
        .material()
        .ok_or(ApiError::Render(RenderError::MissingMaterial))?;
    Ok(Json(material.params.clone()))
}

async fn set_params(
    State(ctl): State<Arc<Controller>>,
    Json(patch): Json<ParamsPatch>,
) -> Result<Json<NoiseParams>, ApiError> {
    let mut renderer = ctl.renderer().lock().await;
    let material = renderer
        .material_mut()
        .ok_or(ApiError::Render(RenderError::MissingMaterial))?;
    let next = patch.apply(&material.params);
    next.validate().map_err(ApiError::Params)?;
    material.params = next.clone();
    Ok(Json(next))
}

async fn render_handler(
    State(ctl): State<Arc<Controller>>,
    Json(patch): Json<ParamsPatch>,
) -> Result<Json<RenderResponse>, ApiError> {
    // Overrides apply to this render only; the live uniforms stay as they are.
    let mut renderer = ctl.renderer().lock().await.clone();
    let material = renderer
        .material_mut()
        .ok_or(ApiError::Render(RenderError::MissingMaterial))?;
    material.params = patch.apply(&material.params);
    material.params.validate().map_err(ApiError::Params)?;

    let (frame, png, timings) = tokio::task::spawn_blocking(move || noisetiles::preview(&renderer))
        .await
        .map_err(|e| ApiError::Capture(CaptureError::RenderTask(e)))?
        .map_err(ApiError::Render)?;

    Ok(Json(RenderResponse {
        data_url: data_url(&png),
        timings: timings
            .iter()
            .map(|t| TimingEntry { name: t.name.to_string(), ms: t.ms })
            .collect(),
        width: frame.width,
        height: frame.height,
    }))
}

async fn export_handler(State(ctl): State<Arc<Controller>>) -> Result<Json<ExportResponse>, ApiError> {
    let sink = Arc::new(MemorySink::new());
    let report = ctl.save_to(&sink).await.map_err(ApiError::Capture)?;
    let tiles = sink
        .take()
        .into_iter()
        .map(|(name, png)| Tile { data_url: data_url(&png), name })
        .collect();
    let missing: Vec<Missing> = report
        .failed()
        .filter_map(|c| c.outcome.as_ref().err().map(|e| Missing { name: c.name.clone(), error: e.to_string() }))
        .collect();
    if !missing.is_empty() {
        warn!(missing = missing.len(), "export incomplete");
    }
    Ok(Json(ExportResponse { tiles, missing }))
}

#[tokio::main]
async fn main() -> Result<()> {
    noisetiles::init_tracing();
    let args = Args::parse();

    let renderer = Arc::new(Mutex::new(Renderer::new(
        Surface::default(),
        NoiseMaterial::default(),
    )));
    let config = CaptureConfig {
        tile_width: args.tile,
        tile_height: args.tile,
        ..CaptureConfig::default()
    };
    config.validate()?;
    // Exports go to a fresh sink per request; the controller's own sink stays empty.
    let controller = Arc::new(CaptureController::new(renderer, Arc::new(MemorySink::new()), config));

    let app = Router::new()
        .route("/api/params", get(get_params).post(set_params))
        .route("/api/render", post(render_handler))
        .route("/api/export", post(export_handler))
        .fallback_service(ServeDir::new(&args.frontend))
        .with_state(controller);

    info!("noisetiles server at http://{}", args.addr);
    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("failed to bind {}", args.addr))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{CaptureConfig, ConfigError, GRID_SIZE, NoiseParams};
use crate::render::{OrthoCamera, RenderError, Renderer, Surface, Viewport, render_frame};
use crate::sink::{ArtifactSink, SinkError};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("a capture session is already running")]
    SessionActive,
    #[error("no material attached to the plane")]
    MissingMaterial,
    #[error("render task failed: {0}")]
    RenderTask(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Why a single tile is missing from the export.
#[derive(Debug, Error)]
pub enum CellError {
    #[error(transparent)]
    Encode(#[from] RenderError),
    #[error(transparent)]
    Deliver(#[from] SinkError),
}

/// One grid position, 1-based. Row 1 is the bottom of the field; column 1 is
/// the rightmost tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileCell {
    pub row: u32,
    pub col: u32,
}

impl TileCell {
    pub fn file_name(&self) -> String {
        format!("{}_{}.png", self.row, self.col)
    }

    /// Cell index the indicator mask selects (`previewX`, `previewY`).
    pub fn mask_cell(&self) -> (i32, i32) {
        ((GRID_SIZE - self.col) as i32, (self.row - 1) as i32)
    }

    /// Sampling offset relative to the session's base pan. Tracks the mask
    /// cell so both always describe the same tile.
    pub fn sample_offset(&self) -> (f32, f32) {
        let (mx, my) = self.mask_cell();
        ((mx - (GRID_SIZE as i32 - 1)) as f32, my as f32)
    }

    /// Full uniform set for rendering this tile.
    pub fn params(&self, base: &NoiseParams) -> NoiseParams {
        let (preview_x, preview_y) = self.mask_cell();
        let (dx, dy) = self.sample_offset();
        NoiseParams {
            x: base.x + dx,
            y: base.y + dy,
            preview: true,
            preview_x,
            preview_y,
            ..base.clone()
        }
    }
}

/// Capture order: rows bottom to top, columns 1..=5 within each row.
pub fn sweep() -> impl Iterator<Item = TileCell> {
    (1..=GRID_SIZE).flat_map(|row| (1..=GRID_SIZE).map(move |col| TileCell { row, col }))
}

#[derive(Debug)]
pub struct CellReport {
    pub cell: TileCell,
    pub name: String,
    /// PNG size in bytes on success.
    pub outcome: Result<usize, CellError>,
}

#[derive(Debug)]
pub struct CaptureReport {
    pub cells: Vec<CellReport>,
    /// When each row began, relative to the `save` call.
    pub row_starts: Vec<Duration>,
    pub restored_at: Duration,
}

impl CaptureReport {
    pub fn delivered(&self) -> impl Iterator<Item = &CellReport> {
        self.cells.iter().filter(|c| c.outcome.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &CellReport> {
        self.cells.iter().filter(|c| c.outcome.is_err())
    }
}

/// Clears the active flag when the session ends, however it ends.
struct ActiveFlag<'a>(&'a AtomicBool);

impl<'a> ActiveFlag<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ActiveFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Exclusive hold on the renderer plus the state to put back.
struct CaptureSession {
    renderer: OwnedMutexGuard<Renderer>,
    saved_surface: Surface,
    saved_params: NoiseParams,
}

impl CaptureSession {
    fn begin(mut renderer: OwnedMutexGuard<Renderer>, config: &CaptureConfig) -> Result<Self, CaptureError> {
        let saved_params = renderer
            .material()
            .ok_or(CaptureError::MissingMaterial)?
            .params
            .clone();
        let saved_surface = renderer.surface.clone();

        renderer.surface = Surface {
            viewport: Viewport { width: config.tile_width, height: config.tile_height },
            camera: OrthoCamera::unit(),
            capturing: true,
        };

        Ok(Self { renderer, saved_surface, saved_params })
    }

    async fn capture<S: ArtifactSink>(
        &mut self,
        cell: TileCell,
        sink: &Arc<S>,
    ) -> Result<CellReport, CaptureError> {
        let params = cell.params(&self.saved_params);
        let material = self.renderer.material_mut().ok_or(CaptureError::MissingMaterial)?;
        material.params = params.clone();

        let surface = self.renderer.surface.clone();
        let sink = Arc::clone(sink);
        let name = cell.file_name();
        let task_name = name.clone();
        let outcome = tokio::task::spawn_blocking(move || -> Result<usize, CellError> {
            let png = render_frame(&surface, &params).encode_png()?;
            sink.deliver(&task_name, &png)?;
            Ok(png.len())
        })
        .await?;

        match &outcome {
            Ok(bytes) => debug!(tile = %name, bytes, "tile captured"),
            Err(e) => warn!(tile = %name, error = %e, "tile dropped"),
        }
        Ok(CellReport { cell, name, outcome })
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.renderer.surface = self.saved_surface.clone();
        if let Some(material) = self.renderer.material_mut() {
            material.params = self.saved_params.clone();
        }
        debug!("renderer restored");
    }
}

/// Runs tiled exports of the noise plane against a shared renderer, one at a
/// time. A session takes the renderer for its whole run, shrinks the surface
/// to one tile, sweeps the 5×5 grid row by row (right to left within a row),
/// hands each PNG to the sink and finally puts the surface and uniforms back
/// exactly as it found them.
pub struct CaptureController<S> {
    renderer: Arc<Mutex<Renderer>>,
    sink: Arc<S>,
    config: CaptureConfig,
    active: AtomicBool,
}

impl<S: ArtifactSink> CaptureController<S> {
    pub fn new(renderer: Arc<Mutex<Renderer>>, sink: Arc<S>, config: CaptureConfig) -> Self {
        Self {
            renderer,
            sink,
            config,
            active: AtomicBool::new(false),
        }
    }

    pub fn renderer(&self) -> &Arc<Mutex<Renderer>> {
        &self.renderer
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Exports all 25 tiles to the controller's sink. Fails fast, without
    /// touching the renderer, if the tile size is out of range, a session is
    /// already running or the plane has no material.
    pub async fn save(&self) -> Result<CaptureReport, CaptureError> {
        self.save_to(&self.sink).await
    }

    /// Same as [`save`](Self::save) but delivers to `sink`.
    pub async fn save_to<T: ArtifactSink>(&self, sink: &Arc<T>) -> Result<CaptureReport, CaptureError> {
        let started = Instant::now();
        self.config.validate()?;
        let _active = ActiveFlag::acquire(&self.active).ok_or(CaptureError::SessionActive)?;

        let guard = Arc::clone(&self.renderer).lock_owned().await;
        let mut session = CaptureSession::begin(guard, &self.config)?;
        info!(
            tile_width = self.config.tile_width,
            tile_height = self.config.tile_height,
            "capture started"
        );

        let mut cells = Vec::with_capacity((GRID_SIZE * GRID_SIZE) as usize);
        let mut row_starts = Vec::with_capacity(GRID_SIZE as usize);
        for cell in sweep() {
            if cell.col == 1 {
                tokio::time::sleep_until(started + self.config.row_delay * cell.row).await;
                row_starts.push(started.elapsed());
            }
            cells.push(session.capture(cell, sink).await?);
        }

        tokio::time::sleep(self.config.settle).await;
        drop(session);
        let restored_at = started.elapsed();

        let report = CaptureReport { cells, row_starts, restored_at };
        let failed = report.failed().count();
        if failed > 0 {
            warn!(failed, "capture finished with missing tiles");
        } else {
            info!(elapsed_ms = restored_at.as_millis() as u64, "capture done");
        }
        Ok(report)
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tiles per side of the export grid.
pub const GRID_SIZE: u32 = 5;
/// Largest tile edge, in pixels.
pub const MAX_TILE: u32 = 4096;

/// Noise uniforms — exposed as panel sliders in the frontend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NoiseParams {
    // Shape
    pub size: f32,
    pub start: f32,
    pub stop: f32,
    pub force: f32,
    pub power: f32,

    // Pan
    pub x: f32,
    pub y: f32,

    // Cell indicator
    pub preview: bool,
    pub preview_x: i32,
    pub preview_y: i32,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            size: 4.4,
            start: 1.0,
            stop: 0.04,
            force: 1.0,
            power: 0.2,
            x: 0.0,
            y: 0.0,
            preview: false,
            preview_x: -1,
            preview_y: -1,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("{name} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("{name} must be finite")]
    NotFinite { name: &'static str },
    #[error("size must be positive, got {0}")]
    NonPositiveSize(f32),
}

impl NoiseParams {
    /// Checks every field against the ranges the panel allows.
    pub fn validate(&self) -> Result<(), ParamError> {
        if !self.size.is_finite() {
            return Err(ParamError::NotFinite { name: "size" });
        }
        if self.size <= 0.0 {
            return Err(ParamError::NonPositiveSize(self.size));
        }
        check_range("size", self.size, 0.0, 50.0)?;
        check_range("start", self.start, 0.0, 1.0)?;
        check_range("stop", self.stop, 0.0, 1.0)?;
        check_range("force", self.force, 0.0, 1.0)?;
        check_range("power", self.power, 0.0, 10.0)?;
        if !self.x.is_finite() {
            return Err(ParamError::NotFinite { name: "x" });
        }
        if !self.y.is_finite() {
            return Err(ParamError::NotFinite { name: "y" });
        }
        let max_cell = (GRID_SIZE - 1) as f32;
        check_range("previewX", self.preview_x as f32, -1.0, max_cell)?;
        check_range("previewY", self.preview_y as f32, -1.0, max_cell)?;
        Ok(())
    }

    /// True when the mask targets one grid cell rather than the whole circle.
    pub fn has_preview_cell(&self) -> bool {
        self.preview_x >= 0 && self.preview_y >= 0
    }
}

fn check_range(name: &'static str, value: f32, min: f32, max: f32) -> Result<(), ParamError> {
    if !value.is_finite() {
        return Err(ParamError::NotFinite { name });
    }
    if value < min || value > max {
        return Err(ParamError::OutOfRange { name, value, min, max });
    }
    Ok(())
}

/// Live preview framing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub width: u32,
    pub height: u32,
    /// Frustum extent in plane units. 1.0 frames the plane edge to edge.
    pub view_span: f32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            view_span: 1.0,
        }
    }
}

/// Export session settings.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureConfig {
    pub tile_width: u32,
    pub tile_height: u32,
    /// Pause before each row; row `i` starts no earlier than `i * row_delay`.
    pub row_delay: Duration,
    /// Pause between the last row and restoring the renderer.
    pub settle: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            tile_width: 64,
            tile_height: 64,
            row_delay: Duration::ZERO,
            settle: Duration::ZERO,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("tile size must be within 1..={max}, got {width}x{height}")]
    TileSize { width: u32, height: u32, max: u32 },
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ok = |v: u32| (1..=MAX_TILE).contains(&v);
        if !ok(self.tile_width) || !ok(self.tile_height) {
            return Err(ConfigError::TileSize {
                width: self.tile_width,
                height: self.tile_height,
                max: MAX_TILE,
            });
        }
        Ok(())
    }

    /// One-second rows and a two-second settle, matching the browser exporter.
    pub fn paced() -> Self {
        Self {
            row_delay: Duration::from_secs(1),
            settle: Duration::from_secs(2),
            ..Self::default()
        }
    }
}

use crate::config::NoiseParams;
use crate::noise::{cnoise, smoothstep, step};

/// Radius of the full-frame indicator ring, in uv units.
const FRAME_RING: f32 = 0.495;
/// Radius of the grid-relative ring, in tile units.
const GRID_RING: f32 = 2.495;
const GRID_CENTER: f32 = 2.5;

/// The noise material applied to the plane. Holds the live uniforms.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NoiseMaterial {
    pub params: NoiseParams,
}

impl NoiseMaterial {
    pub fn new(params: NoiseParams) -> Self {
        Self { params }
    }
}

/// Thresholded noise intensity at `(u, v)`, before masking.
pub fn intensity(u: f32, v: f32, p: &NoiseParams) -> f32 {
    let raw = cnoise((u + p.x) * p.size, (v + p.y) * p.size);
    let noise = p.power.powf(raw);
    if !noise.is_finite() {
        return 0.0;
    }
    let rnoise = cnoise(noise, noise);
    let smooth = smoothstep(p.start, p.stop, rnoise);
    smooth * step(p.force, smooth)
}

/// Indicator mask: 1 where the pixel falls outside the preview circle.
pub fn preview_mask(u: f32, v: f32, p: &NoiseParams) -> f32 {
    if !p.preview {
        return 0.0;
    }
    if p.has_preview_cell() {
        let dx = u + p.preview_x as f32 - GRID_CENTER;
        let dy = v + p.preview_y as f32 - GRID_CENTER;
        step(GRID_RING, dx.hypot(dy))
    } else {
        step(FRAME_RING, (u - 0.5).hypot(v - 0.5))
    }
}

/// Evaluates the material at `(u, v)`. Returns straight RGBA; alpha may go
/// negative under the mask and is clamped at quantisation.
pub fn shade(u: f32, v: f32, p: &NoiseParams) -> [f32; 4] {
    let color = intensity(u, v, p);
    let mask = preview_mask(u, v, p);
    let rgb = color * (1.0 - mask);
    [rgb, rgb, rgb, color - mask]
}

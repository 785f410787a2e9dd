use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use rayon::prelude::*;
use thiserror::Error;

use crate::config::{NoiseParams, ViewConfig};
use crate::material::{NoiseMaterial, shade};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("PNG encode failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("no material attached to the plane")]
    MissingMaterial,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Orthographic frustum bounds in plane units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrthoCamera {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl OrthoCamera {
    /// Frustum centred on the origin, `span` units across.
    pub fn centered(span: f32) -> Self {
        let h = 0.5 * span;
        Self { left: -h, right: h, top: h, bottom: -h }
    }

    /// Exactly one plane tile.
    pub fn unit() -> Self {
        Self::centered(1.0)
    }
}

/// Render target state. `capturing` marks an export in progress for anyone
/// styling the output.
#[derive(Clone, Debug, PartialEq)]
pub struct Surface {
    pub viewport: Viewport,
    pub camera: OrthoCamera,
    pub capturing: bool,
}

impl Surface {
    pub fn from_view(view: &ViewConfig) -> Self {
        Self {
            viewport: Viewport { width: view.width, height: view.height },
            camera: OrthoCamera::centered(view.view_span),
            capturing: false,
        }
    }
}

impl Default for Surface {
    fn default() -> Self {
        Self::from_view(&ViewConfig::default())
    }
}

/// One rendered frame, RGBA8 row-major, top row first.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Frame {
    pub fn encode_png(&self) -> Result<Vec<u8>, RenderError> {
        encode_png(&self.rgba, self.width, self.height)
    }
}

/// A unit plane centred at the origin, viewed through one orthographic camera.
#[derive(Clone, Debug, Default)]
pub struct Renderer {
    pub surface: Surface,
    material: Option<NoiseMaterial>,
}

impl Renderer {
    pub fn new(surface: Surface, material: NoiseMaterial) -> Self {
        Self { surface, material: Some(material) }
    }

    pub fn material(&self) -> Option<&NoiseMaterial> {
        self.material.as_ref()
    }

    pub fn material_mut(&mut self) -> Option<&mut NoiseMaterial> {
        self.material.as_mut()
    }

    pub fn detach_material(&mut self) -> Option<NoiseMaterial> {
        self.material.take()
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.surface.viewport = Viewport { width, height };
    }

    pub fn render(&self) -> Result<Frame, RenderError> {
        let material = self.material.as_ref().ok_or(RenderError::MissingMaterial)?;
        Ok(render_frame(&self.surface, &material.params))
    }
}

#[inline]
fn quantize(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Rasterise the plane as seen through `surface`.
pub fn render_frame(surface: &Surface, params: &NoiseParams) -> Frame {
    let Viewport { width, height } = surface.viewport;
    let cam = surface.camera;
    let w = width as usize;
    let h = height as usize;
    let mut rgba = vec![0u8; w * h * 4];
    if w == 0 || h == 0 {
        return Frame { width, height, rgba };
    }

    let sx = (cam.right - cam.left) / w as f32;
    let sy = (cam.top - cam.bottom) / h as f32;

    rgba.par_chunks_mut(w * 4)
        .enumerate()
        .for_each(|(py, row)| {
            // uv.y grows upward; image rows grow downward.
            let v = cam.top - (py as f32 + 0.5) * sy + 0.5;
            for px in 0..w {
                let u = cam.left + (px as f32 + 0.5) * sx + 0.5;
                let out = &mut row[px * 4..px * 4 + 4];
                if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
                    out.copy_from_slice(&[0, 0, 0, 0]);
                    continue;
                }
                let c = shade(u, v, params);
                out.copy_from_slice(&[quantize(c[0]), quantize(c[1]), quantize(c[2]), quantize(c[3])]);
            }
        });

    Frame { width, height, rgba }
}

pub fn encode_png(rgba: &[u8], w: u32, h: u32) -> Result<Vec<u8>, RenderError> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(rgba, w, h, image::ExtendedColorType::Rgba8)?;
    Ok(buf)
}

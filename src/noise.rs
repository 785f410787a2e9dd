/// Quintic fade curve, zero first and second derivative at 0 and 1.
#[inline]
fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline]
pub fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline]
fn fract(v: f32) -> f32 {
    v - v.floor()
}

#[inline]
fn mod289(v: f32) -> f32 {
    v - (v * (1.0 / 289.0)).floor() * 289.0
}

/// Permutation polynomial over Z/289.
#[inline]
fn permute(v: f32) -> f32 {
    mod289((v * 34.0 + 1.0) * v)
}

#[inline]
fn taylor_inv_sqrt(r: f32) -> f32 {
    1.792_842_9 - 0.853_734_7 * r
}

/// Hard threshold: 0 below `edge`, 1 at or above.
#[inline]
pub fn step(edge: f32, v: f32) -> f32 {
    if v < edge { 0.0 } else { 1.0 }
}

/// Hermite interpolation between `edge0` and `edge1`. Inverted edges give a
/// falling ramp. Equal edges collapse to `step`.
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, v: f32) -> f32 {
    if edge0 == edge1 {
        return step(edge0, v);
    }
    let t = ((v - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// 2D classic Perlin noise. Lattice coordinates are folded mod 289 so large
/// inputs don't lose precision in the permutation. Output is roughly [-1, 1].
pub fn cnoise(x: f32, y: f32) -> f32 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx0 = x - x0;
    let fy0 = y - y0;
    let fx1 = fx0 - 1.0;
    let fy1 = fy0 - 1.0;

    let ix0 = mod289(x0);
    let iy0 = mod289(y0);
    let ix1 = mod289(x0 + 1.0);
    let iy1 = mod289(y0 + 1.0);

    let corner = |ix: f32, iy: f32, dx: f32, dy: f32| -> f32 {
        let i = permute(permute(ix) + iy);
        let gx = fract(i * (1.0 / 41.0)) * 2.0 - 1.0;
        let gy = gx.abs() - 0.5;
        let gx = gx - (gx + 0.5).floor();
        let norm = taylor_inv_sqrt(gx * gx + gy * gy);
        (gx * dx + gy * dy) * norm
    };

    let n00 = corner(ix0, iy0, fx0, fy0);
    let n10 = corner(ix1, iy0, fx1, fy0);
    let n01 = corner(ix0, iy1, fx0, fy1);
    let n11 = corner(ix1, iy1, fx1, fy1);

    let sx = fade(fx0);
    let sy = fade(fy0);
    let a = mix(n00, n10, sx);
    let b = mix(n01, n11, sx);
    2.3 * mix(a, b, sy)
}

//! Host reference implementations of the pass programs.
//!
//! Each pass reads one to three fields and writes every cell of one output
//! field. They mirror the WGSL kernels in `gpu/shaders` cell for cell and are
//! what the numerical tests run against. Rows are processed in parallel.

use rayon::prelude::*;

use super::field::Field;
use crate::util::Color;

/// Keeps the confinement direction finite where the curl gradient vanishes.
const CONFINEMENT_EPSILON: f32 = 1e-4;

/// Evaluate `cell` for every grid point of `out`.
fn write_cells<F>(out: &mut Field, cell: F)
where
    F: Fn(usize, usize) -> [f32; 4] + Sync,
{
    let width = out.width();
    let channels = out.channels();
    let row_len = out.row_len();
    out.data_mut()
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width {
                let value = cell(x, y);
                row[x * channels..(x + 1) * channels].copy_from_slice(&value[..channels]);
            }
        });
}

#[inline(always)]
fn neighbors(field: &Field, x: usize, y: usize) -> [[f32; 4]; 4] {
    let (x, y) = (x as isize, y as isize);
    [
        field.fetch(x - 1, y),
        field.fetch(x + 1, y),
        field.fetch(x, y + 1),
        field.fetch(x, y - 1),
    ]
}

/// Scalar vorticity of the velocity field.
pub fn curl(velocity: &Field, out: &mut Field) {
    write_cells(out, |x, y| {
        let [l, r, t, b] = neighbors(velocity, x, y);
        let vorticity = (r[1] - l[1]) - (t[0] - b[0]);
        [0.5 * vorticity, 0.0, 0.0, 0.0]
    });
}

/// Push velocity along the normalized gradient of |curl| to restore small
/// eddies that advection smears out.
pub fn vorticity(velocity: &Field, curl: &Field, out: &mut Field, curl_strength: f32, dt: f32) {
    write_cells(out, |x, y| {
        let [l, r, t, b] = neighbors(curl, x, y);
        let c = curl.fetch(x as isize, y as isize)[0];
        let mut fx = 0.5 * (t[0].abs() - b[0].abs());
        let mut fy = 0.5 * (r[0].abs() - l[0].abs());
        let len = (fx * fx + fy * fy).sqrt() + CONFINEMENT_EPSILON;
        fx = fx / len * curl_strength * c;
        fy = -(fy / len * curl_strength * c);
        let v = velocity.fetch(x as isize, y as isize);
        [v[0] + fx * dt, v[1] + fy * dt, 0.0, 0.0]
    });
}

pub fn divergence(velocity: &Field, out: &mut Field) {
    write_cells(out, |x, y| {
        let [l, r, t, b] = neighbors(velocity, x, y);
        [0.5 * ((r[0] - l[0]) + (t[1] - b[1])), 0.0, 0.0, 0.0]
    });
}

/// Scale every channel by `factor`.
pub fn clear(source: &Field, out: &mut Field, factor: f32) {
    write_cells(out, |x, y| {
        let v = source.fetch(x as isize, y as isize);
        [v[0] * factor, v[1] * factor, v[2] * factor, v[3] * factor]
    });
}

/// One Jacobi iteration of the pressure Poisson equation.
pub fn jacobi(pressure: &Field, divergence: &Field, out: &mut Field) {
    write_cells(out, |x, y| {
        let [l, r, t, b] = neighbors(pressure, x, y);
        let div = divergence.fetch(x as isize, y as isize)[0];
        [(l[0] + r[0] + t[0] + b[0] - div) * 0.25, 0.0, 0.0, 0.0]
    });
}

/// Project velocity onto its divergence-free part.
pub fn subtract_gradient(pressure: &Field, velocity: &Field, out: &mut Field) {
    write_cells(out, |x, y| {
        let [l, r, t, b] = neighbors(pressure, x, y);
        let v = velocity.fetch(x as isize, y as isize);
        [
            v[0] - 0.5 * (r[0] - l[0]),
            v[1] - 0.5 * (t[0] - b[0]),
            0.0,
            0.0,
        ]
    });
}

/// Semi-Lagrangian transport of `source` along `velocity`.
///
/// Velocity is expressed in velocity-grid cells per second, so the backtrace
/// is scaled by the velocity grid's texel size even when `source` is finer.
pub fn advect(velocity: &Field, source: &Field, out: &mut Field, dt: f32, dissipation: f32) {
    let [tx, ty] = velocity.texel_size();
    let (w, h) = (out.width() as f32, out.height() as f32);
    write_cells(out, |x, y| {
        let uv = [(x as f32 + 0.5) / w, (y as f32 + 0.5) / h];
        let v = velocity.sample(uv);
        let back = [uv[0] - dt * v[0] * tx, uv[1] - dt * v[1] * ty];
        let s = source.sample(back);
        [
            s[0] * dissipation,
            s[1] * dissipation,
            s[2] * dissipation,
            s[3] * dissipation,
        ]
    });
}

/// Add a Gaussian impulse centered on `point` (texture coordinates).
///
/// `aspect_ratio` is the surface's width over height; the horizontal offset is
/// stretched by it so splats stay round on wide surfaces.
pub fn splat(
    base: &Field,
    out: &mut Field,
    point: [f32; 2],
    payload: [f32; 3],
    radius: f32,
    aspect_ratio: f32,
) {
    let (w, h) = (out.width() as f32, out.height() as f32);
    write_cells(out, |x, y| {
        let px = ((x as f32 + 0.5) / w - point[0]) * aspect_ratio;
        let py = (y as f32 + 0.5) / h - point[1];
        let falloff = (-(px * px + py * py) / radius).exp();
        let v = base.fetch(x as isize, y as isize);
        [
            v[0] + falloff * payload[0],
            v[1] + falloff * payload[1],
            v[2] + falloff * payload[2],
            v[3],
        ]
    });
}

/// Tone-map one dye value for display.
pub fn shade(dye: [f32; 4], bloom_intensity: f32, gamma: f32) -> Color {
    let glow = 1.0 + bloom_intensity;
    let map = |c: f32| (c * glow).max(0.0).powf(gamma).min(1.0);
    Color::new(map(dye[0]), map(dye[1]), map(dye[2]))
}

/// Resolve the dye field into a `0x00RRGGBB` framebuffer of the same size.
pub fn display(dye: &Field, buf: &mut [u32], bloom_intensity: f32, gamma: f32) {
    let width = dye.width();
    buf.par_chunks_mut(width)
        .take(dye.height())
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.iter_mut().enumerate() {
                let value = dye.fetch(x as isize, y as isize);
                *px = shade(value, bloom_intensity, gamma).as_u32();
            }
        });
}

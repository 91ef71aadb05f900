//! Host-memory field store running the reference pass programs.
//!
//! Used headless and by the test suite. It is not a fallback for missing GPU
//! capabilities; a session that cannot get its GPU backend does not start.

use super::{
    backend::{DisplayParams, GridSize, PassBackend, SplatTarget},
    double_buffer::DoubleBuffer,
    field::{Channels, Field, Filter},
    passes,
};
use crate::error::Result;

struct CpuFields {
    velocity: DoubleBuffer<Field>,
    dye: DoubleBuffer<Field>,
    pressure: DoubleBuffer<Field>,
    divergence: Field,
    curl: Field,
    /// Display output at dye resolution, `0x00RRGGBB`
    frame: Vec<u32>,
}

impl CpuFields {
    fn new(grid: GridSize) -> Self {
        let (sw, sh) = grid.sim;
        let (dw, dh) = grid.dye;
        let dye = DoubleBuffer::from_fn(|| Field::new(dw, dh, Channels::Color, Filter::Linear));
        let frame = vec![0; dye.read().width() * dye.read().height()];
        Self {
            velocity: DoubleBuffer::from_fn(|| {
                Field::new(sw, sh, Channels::Vector2, Filter::Linear)
            }),
            dye,
            pressure: DoubleBuffer::from_fn(|| {
                Field::new(sw, sh, Channels::Scalar, Filter::Nearest)
            }),
            divergence: Field::new(sw, sh, Channels::Scalar, Filter::Nearest),
            curl: Field::new(sw, sh, Channels::Scalar, Filter::Nearest),
            frame,
        }
    }
}

pub struct CpuBackend {
    fields: Option<CpuFields>,
    grid: GridSize,
    surface: (u32, u32),
}

impl CpuBackend {
    pub fn new(grid: GridSize) -> Self {
        log::debug!(
            "allocating host fields: sim {}x{}, dye {}x{}",
            grid.sim.0,
            grid.sim.1,
            grid.dye.0,
            grid.dye.1
        );
        Self {
            fields: Some(CpuFields::new(grid)),
            grid,
            surface: grid.dye,
        }
    }

    pub fn is_released(&self) -> bool {
        self.fields.is_none()
    }

    pub fn velocity(&self) -> Option<&Field> {
        self.fields.as_ref().map(|f| f.velocity.read())
    }
    pub fn dye(&self) -> Option<&Field> {
        self.fields.as_ref().map(|f| f.dye.read())
    }
    pub fn pressure(&self) -> Option<&Field> {
        self.fields.as_ref().map(|f| f.pressure.read())
    }
    pub fn divergence_field(&self) -> Option<&Field> {
        self.fields.as_ref().map(|f| &f.divergence)
    }
    pub fn curl_field(&self) -> Option<&Field> {
        self.fields.as_ref().map(|f| &f.curl)
    }
    /// Last displayed frame, row 0 at the bottom.
    pub fn frame(&self) -> Option<&[u32]> {
        self.fields.as_ref().map(|f| f.frame.as_slice())
    }
    pub fn surface_size(&self) -> (u32, u32) {
        self.surface
    }
}

impl PassBackend for CpuBackend {
    fn grid(&self) -> GridSize {
        self.grid
    }

    fn curl(&mut self) {
        let Some(f) = self.fields.as_mut() else { return };
        passes::curl(f.velocity.read(), &mut f.curl);
    }

    fn vorticity(&mut self, curl_strength: f32, dt: f32) {
        let Some(f) = self.fields.as_mut() else { return };
        let (read, write) = f.velocity.split();
        passes::vorticity(read, &f.curl, write, curl_strength, dt);
        f.velocity.swap();
    }

    fn divergence(&mut self) {
        let Some(f) = self.fields.as_mut() else { return };
        passes::divergence(f.velocity.read(), &mut f.divergence);
    }

    fn clear_pressure(&mut self, factor: f32) {
        let Some(f) = self.fields.as_mut() else { return };
        let (read, write) = f.pressure.split();
        passes::clear(read, write, factor);
        f.pressure.swap();
    }

    fn jacobi(&mut self) {
        let Some(f) = self.fields.as_mut() else { return };
        let (read, write) = f.pressure.split();
        passes::jacobi(read, &f.divergence, write);
        f.pressure.swap();
    }

    fn subtract_gradient(&mut self) {
        let Some(f) = self.fields.as_mut() else { return };
        let (read, write) = f.velocity.split();
        passes::subtract_gradient(f.pressure.read(), read, write);
        f.velocity.swap();
    }

    fn advect_velocity(&mut self, dt: f32, dissipation: f32) {
        let Some(f) = self.fields.as_mut() else { return };
        let (read, write) = f.velocity.split();
        passes::advect(read, read, write, dt, dissipation);
        f.velocity.swap();
    }

    fn advect_dye(&mut self, dt: f32, dissipation: f32) {
        let Some(f) = self.fields.as_mut() else { return };
        let (read, write) = f.dye.split();
        passes::advect(f.velocity.read(), read, write, dt, dissipation);
        f.dye.swap();
    }

    fn splat(
        &mut self,
        target: SplatTarget,
        point: [f32; 2],
        payload: [f32; 3],
        radius: f32,
        aspect_ratio: f32,
    ) {
        let Some(f) = self.fields.as_mut() else { return };
        let buffer = match target {
            SplatTarget::Velocity => &mut f.velocity,
            SplatTarget::Dye => &mut f.dye,
        };
        let (read, write) = buffer.split();
        passes::splat(read, write, point, payload, radius, aspect_ratio);
        buffer.swap();
    }

    fn display(&mut self, params: &DisplayParams) -> Result<()> {
        let Some(f) = self.fields.as_mut() else {
            return Ok(());
        };
        passes::display(
            f.dye.read(),
            &mut f.frame,
            params.bloom_intensity,
            params.gamma,
        );
        Ok(())
    }

    fn reallocate(&mut self, grid: GridSize) {
        if self.fields.is_none() {
            return;
        }
        self.grid = grid;
        self.fields = Some(CpuFields::new(grid));
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.surface = (width, height);
    }

    fn release(&mut self) {
        self.fields = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: u32) -> GridSize {
        GridSize {
            sim: (n, n),
            dye: (n, n),
        }
    }

    /// Sum of squared divergence and largest |divergence| over interior cells.
    fn interior_divergence(velocity: &Field) -> (f64, f64) {
        let mut div = Field::new(
            velocity.width() as u32,
            velocity.height() as u32,
            Channels::Scalar,
            Filter::Nearest,
        );
        passes::divergence(velocity, &mut div);
        let (w, h) = (div.width() as isize, div.height() as isize);
        let (mut energy, mut peak) = (0.0, 0.0f64);
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let d = div.fetch(x, y)[0] as f64;
                energy += d * d;
                peak = peak.max(d.abs());
            }
        }
        (energy, peak)
    }

    #[test]
    fn projection_reduces_divergence() {
        let mut backend = CpuBackend::new(grid(64));
        backend.splat(SplatTarget::Velocity, [0.5, 0.5], [60.0, 0.0, 0.0], 0.0025, 1.0);
        let (before, peak_before) = interior_divergence(backend.velocity().unwrap());
        assert!(before > 0.0);

        backend.divergence();
        backend.clear_pressure(0.8);
        for _ in 0..20 {
            backend.jacobi();
        }
        backend.subtract_gradient();

        // Aggregate and peak shrink; individual cells far from the splat may
        // pick up small residuals.
        let (after, peak_after) = interior_divergence(backend.velocity().unwrap());
        assert!(after < before * 0.5, "before {before}, after {after}");
        assert!(
            peak_after < peak_before * 0.5,
            "peak before {peak_before}, after {peak_after}"
        );
    }

    #[test]
    fn zero_divergence_relaxes_to_zero_pressure() {
        let mut backend = CpuBackend::new(grid(32));
        backend.divergence();
        for iterations in 1..=4 {
            for _ in 0..iterations {
                backend.jacobi();
            }
            assert!(backend.pressure().unwrap().data().iter().all(|p| *p == 0.0));
        }
    }

    #[test]
    fn dye_splat_is_red_at_center() {
        let mut backend = CpuBackend::new(grid(64));
        backend.splat(SplatTarget::Dye, [0.5, 0.5], [1.0, 0.0, 0.0], 0.0025, 1.0);
        let dye = backend.dye().unwrap();
        assert!(dye.sample([0.5, 0.5])[0] > dye.sample([0.0, 0.0])[0]);
    }

    #[test]
    fn display_writes_dye_resolution_frame() {
        let mut backend = CpuBackend::new(GridSize {
            sim: (8, 8),
            dye: (16, 12),
        });
        backend.splat(SplatTarget::Dye, [0.5, 0.5], [1.0, 1.0, 1.0], 0.01, 1.0);
        backend
            .display(&DisplayParams {
                bloom_intensity: 0.0,
                gamma: 1.0,
            })
            .unwrap();
        let frame = backend.frame().unwrap();
        assert_eq!(frame.len(), 16 * 12);
        assert_ne!(frame[6 * 16 + 8], 0);
    }

    #[test]
    fn release_is_idempotent_and_disables_passes() {
        let mut backend = CpuBackend::new(grid(8));
        backend.release();
        backend.release();
        assert!(backend.is_released());
        backend.curl();
        backend.splat(SplatTarget::Dye, [0.5, 0.5], [1.0, 0.0, 0.0], 0.01, 1.0);
        backend.reallocate(grid(16));
        assert!(backend.dye().is_none());
    }

    #[test]
    fn reallocate_resets_fields() {
        let mut backend = CpuBackend::new(grid(8));
        backend.splat(SplatTarget::Dye, [0.5, 0.5], [1.0, 0.0, 0.0], 0.01, 1.0);
        backend.reallocate(GridSize {
            sim: (12, 8),
            dye: (24, 16),
        });
        let dye = backend.dye().unwrap();
        assert_eq!((dye.width(), dye.height()), (24, 16));
        assert_eq!(dye.total_magnitude(), 0.0);
        assert_eq!(backend.velocity().unwrap().width(), 12);
    }
}

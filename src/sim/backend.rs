//! The seam between the stepper and whatever owns the fields.

use crate::error::Result;

/// Which double-buffered field a splat lands in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplatTarget {
    /// `payload.xy` is a force, in velocity cells per second.
    Velocity,
    /// `payload` is an RGB color.
    Dye,
}

/// Uniforms for the display pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayParams {
    pub bloom_intensity: f32,
    pub gamma: f32,
}

/// Grid dimensions of a backend's field store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridSize {
    pub sim: (u32, u32),
    pub dye: (u32, u32),
}

/// A field store plus the pass programs that run over it.
///
/// Every method that writes a double-buffered field renders into its `write`
/// half and swaps before returning, so the next call sees the result in
/// `read`. Implementations never block on previous work.
pub trait PassBackend {
    fn grid(&self) -> GridSize;

    /// curl ← curl(velocity.read)
    fn curl(&mut self);
    /// velocity ← velocity + confinement force · dt
    fn vorticity(&mut self, curl_strength: f32, dt: f32);
    /// divergence ← div(velocity.read)
    fn divergence(&mut self);
    /// pressure ← pressure · factor
    fn clear_pressure(&mut self, factor: f32);
    /// One Jacobi relaxation of pressure against the current divergence.
    fn jacobi(&mut self);
    /// velocity ← velocity − ∇pressure
    fn subtract_gradient(&mut self);
    /// velocity ← advect(velocity, velocity) · dissipation
    fn advect_velocity(&mut self, dt: f32, dissipation: f32);
    /// dye ← advect(velocity, dye) · dissipation
    fn advect_dye(&mut self, dt: f32, dissipation: f32);
    /// target ← target + gaussian(point, radius) · payload
    fn splat(
        &mut self,
        target: SplatTarget,
        point: [f32; 2],
        payload: [f32; 3],
        radius: f32,
        aspect_ratio: f32,
    );
    /// Tone-map dye.read onto the visible surface.
    fn display(&mut self, params: &DisplayParams) -> Result<()>;

    /// Recreate every field at new dimensions. Contents start at zero.
    fn reallocate(&mut self, grid: GridSize);
    /// Present surface size changed; only the output target is reconfigured.
    fn resize_surface(&mut self, width: u32, height: u32);
    /// Free fields, framebuffers and programs. Safe to call more than once.
    fn release(&mut self);
}

use std::time::Duration;

/// Tunable solver and display constants.
///
/// These are defaults that look right at the profiled resolutions, not
/// physically derived values. They can be changed on a running session.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FluidConfig {
    /// Multiplier applied to velocity after each self-advection (< 1)
    pub velocity_dissipation: f32,
    /// Multiplier applied to dye after each advection (< 1)
    pub density_dissipation: f32,
    /// Factor the previous frame's pressure is scaled by before relaxation.
    /// Warm-starts the solver without letting pressure drift.
    pub pressure_dissipation: f32,
    /// Jacobi iterations per frame
    pub pressure_iterations: u32,
    /// Vorticity confinement strength
    pub curl: f32,
    /// Extra glow added on top of the dye color at display time
    pub bloom_intensity: f32,
    pub gamma: f32,
    /// Largest timestep the solver will integrate in one tick, in seconds
    pub max_dt: f32,
    /// How long the idle color cycle takes to blend between two palette entries
    pub color_cycle_interval: Duration,
    /// Brightness of injected dye relative to the palette color
    pub color_intensity: f32,
}

impl Default for FluidConfig {
    fn default() -> Self {
        Self {
            velocity_dissipation: 0.98,
            density_dissipation: 0.97,
            pressure_dissipation: 0.8,
            pressure_iterations: 20,
            curl: 30.0,
            bloom_intensity: 0.8,
            gamma: 0.45,
            max_dt: 1.0 / 60.0,
            color_cycle_interval: Duration::from_millis(300),
            color_intensity: 0.15,
        }
    }
}

impl FluidConfig {
    /// Clamp a wall-clock delta to the stable range. Negative or non-finite
    /// deltas (clock skew, first frame) integrate nothing.
    pub fn clamp_dt(&self, elapsed: f64) -> f32 {
        if !elapsed.is_finite() || elapsed <= 0.0 {
            return 0.0;
        }
        (elapsed as f32).min(self.max_dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dt_is_clamped_to_one_sixtieth() {
        let config = FluidConfig::default();
        let exact = f64::from(1.0f32 / 60.0);
        for elapsed in [exact, 0.05, 1.0, 30.0, 3600.0] {
            assert_eq!(config.clamp_dt(elapsed), 1.0 / 60.0);
        }
    }

    #[test]
    fn short_frames_pass_through() {
        let config = FluidConfig::default();
        assert_eq!(config.clamp_dt(0.004), 0.004);
        assert_eq!(config.clamp_dt(-1.0), 0.0);
        assert_eq!(config.clamp_dt(f64::NAN), 0.0);
    }

    #[test]
    fn dissipation_is_contracting() {
        let config = FluidConfig::default();
        assert!(config.velocity_dissipation < 1.0);
        assert!(config.density_dissipation < 1.0);
        assert!(config.pressure_dissipation < 1.0);
    }
}

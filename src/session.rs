//! A mounted fluid background: one object owning every piece of mutable state.

use crate::{
    error::{FluidError, Result},
    rendering::SurfaceSize,
    sim::{
        backend::{GridSize, PassBackend},
        config::FluidConfig,
        cpu::CpuBackend,
        input::{InputHandle, InteractionController},
        profile::{DeviceHint, DeviceProfile},
        scheduler::{FrameScheduler, FrameStats, SchedulerState, TickOutcome},
        stepper::Stepper,
    },
    util::Palette,
};

/// Field dimensions for a profile at a surface aspect ratio.
pub fn grid_for(profile: &DeviceProfile, aspect_ratio: f32) -> GridSize {
    GridSize {
        sim: profile.sim_size(aspect_ratio),
        dye: profile.dye_size(aspect_ratio),
    }
}

pub struct Session<B: PassBackend> {
    backend: B,
    profile: DeviceProfile,
    stepper: Stepper,
    controller: InteractionController,
    scheduler: FrameScheduler,
    surface: SurfaceSize,
    torn_down: bool,
}

impl<B: PassBackend> Session<B> {
    /// Wrap a backend whose fields were allocated for `grid_for(profile, surface)`.
    pub fn new(
        backend: B,
        profile: DeviceProfile,
        surface: SurfaceSize,
        config: FluidConfig,
        rng: fastrand::Rng,
    ) -> Self {
        log::info!(
            "mounting fluid session: {:?} tier, sim {:?}, dye {:?}",
            profile.tier,
            backend.grid().sim,
            backend.grid().dye
        );
        let controller =
            InteractionController::new(&profile, surface.logical_px(), Palette::default(), rng);
        Self {
            backend,
            profile,
            stepper: Stepper::new(config),
            controller,
            scheduler: FrameScheduler::new(profile.auto_splat_interval),
            surface,
            torn_down: false,
        }
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn surface(&self) -> SurfaceSize {
        self.surface
    }

    /// The event sink for the host's pointer and touch listeners.
    pub fn input(&self) -> InputHandle {
        self.controller.handle()
    }

    pub fn config(&self) -> &FluidConfig {
        self.stepper.config()
    }

    pub fn set_config(&mut self, config: FluidConfig) {
        if *self.stepper.config() != config {
            log::debug!("config updated: {config:?}");
            self.stepper.set_config(config);
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn stats(&self) -> FrameStats {
        self.scheduler.stats()
    }

    pub fn pause(&mut self) {
        self.scheduler.pause();
    }

    pub fn resume(&mut self) {
        self.scheduler.resume();
    }

    pub fn toggle_pause(&mut self) {
        self.scheduler.toggle_pause();
    }

    /// Note that the host requested a refresh callback. `false` means the
    /// session is torn down and no callback should be requested.
    pub fn schedule(&mut self) -> bool {
        self.scheduler.schedule()
    }

    /// Run one frame. Call from the display refresh callback with the current
    /// time in seconds.
    pub fn tick(&mut self, now: f64) -> Result<TickOutcome> {
        self.scheduler
            .tick(now, &mut self.backend, &self.stepper, &self.controller)
    }

    /// Apply a new surface size. Fields are recreated before the next tick if
    /// the aspect-derived grid changed; a splat pending against the old grid
    /// is dropped. Empty sizes (a minimized window) leave everything as is.
    pub fn resize(&mut self, surface: SurfaceSize) -> Result<()> {
        if self.torn_down {
            return Err(FluidError::TornDown);
        }
        if surface.is_empty() {
            log::debug!("ignoring resize to an empty surface");
            return Ok(());
        }
        self.surface = surface;
        let (w, h) = surface.extent();
        self.backend.resize_surface(w, h);
        let (lw, lh) = surface.logical_px();
        self.controller.set_surface(lw, lh);

        let grid = grid_for(&self.profile, surface.aspect_ratio());
        if grid != self.backend.grid() {
            log::info!(
                "reallocating fields for {}x{}: sim {:?}, dye {:?}",
                w,
                h,
                grid.sim,
                grid.dye
            );
            self.backend.reallocate(grid);
            if self.controller.drop_pending() {
                log::warn!("dropped a splat aimed at the previous field size");
                self.scheduler.record_dropped_splat();
            }
        }
        Ok(())
    }

    /// Stop scheduling and release every GPU resource. Safe to call at any
    /// point, any number of times.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.scheduler.cancel();
        self.controller.dispose();
        self.backend.release();
        log::info!("fluid session torn down");
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl<B: PassBackend> Drop for Session<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl Session<CpuBackend> {
    /// A session whose fields live in host memory.
    pub fn headless(
        hint: DeviceHint,
        surface: SurfaceSize,
        config: FluidConfig,
        rng: fastrand::Rng,
    ) -> Self {
        let profile = DeviceProfile::select(hint);
        let backend = CpuBackend::new(grid_for(&profile, surface.aspect_ratio()));
        Session::new(backend, profile, surface, config, rng)
    }
}

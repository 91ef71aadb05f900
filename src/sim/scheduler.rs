//! Drives the step + display loop on the display refresh cadence.
//!
//! The scheduler does not own a timer. The host calls [`FrameScheduler::tick`]
//! from its refresh callback (winit `RedrawRequested`, `requestAnimationFrame`)
//! and asks for another callback only while the outcome is
//! [`TickOutcome::Continue`].

use std::time::Duration;

use super::{
    backend::PassBackend, input::InteractionController, stepper::Stepper,
};
use crate::error::Result;

/// Seconds between statistics log lines
const STATS_LOG_INTERVAL: f64 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    /// Display keeps refreshing but the solver does not advance.
    Paused,
    /// Torn down; no further ticks run.
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Schedule the next refresh callback.
    Continue,
    Stopped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Ticks that advanced the solver
    pub frames: u64,
    pub splats: u64,
    /// Pointer splats discarded because the fields were reallocated under them
    pub dropped_splats: u64,
}

pub struct FrameScheduler {
    state: SchedulerState,
    last_tick: Option<f64>,
    pending: bool,
    auto_splat_interval: Option<Duration>,
    auto_splat_elapsed: f32,
    stats: FrameStats,
    last_stats_log: Option<f64>,
    frames_since_log: u64,
}

impl FrameScheduler {
    pub fn new(auto_splat_interval: Option<Duration>) -> Self {
        Self {
            state: SchedulerState::Running,
            last_tick: None,
            pending: false,
            auto_splat_interval,
            auto_splat_elapsed: 0.0,
            stats: FrameStats::default(),
            last_stats_log: None,
            frames_since_log: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Whether a refresh callback is outstanding.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Record that the host requested a refresh callback. Returns `false`
    /// once cancelled, in which case the host must not request one.
    pub fn schedule(&mut self) -> bool {
        if self.state == SchedulerState::Cancelled {
            return false;
        }
        self.pending = true;
        true
    }

    pub fn pause(&mut self) {
        if self.state == SchedulerState::Running {
            self.state = SchedulerState::Paused;
            log::info!("simulation paused");
        }
    }

    pub fn resume(&mut self) {
        if self.state == SchedulerState::Paused {
            self.state = SchedulerState::Running;
            // Do not integrate the time spent paused.
            self.last_tick = None;
            log::info!("simulation resumed");
        }
    }

    pub fn toggle_pause(&mut self) {
        match self.state {
            SchedulerState::Running => self.pause(),
            SchedulerState::Paused => self.resume(),
            SchedulerState::Cancelled => {}
        }
    }

    /// Cancel the outstanding callback and refuse further ticks. Idempotent.
    pub fn cancel(&mut self) {
        if self.state != SchedulerState::Cancelled {
            log::info!(
                "frame scheduler cancelled after {} frames",
                self.stats.frames
            );
        }
        self.state = SchedulerState::Cancelled;
        self.pending = false;
    }

    pub(crate) fn record_dropped_splat(&mut self) {
        self.stats.dropped_splats += 1;
    }

    /// Run one frame at wall-clock time `now` (seconds).
    pub fn tick<B: PassBackend + ?Sized>(
        &mut self,
        now: f64,
        backend: &mut B,
        stepper: &Stepper,
        controller: &InteractionController,
    ) -> Result<TickOutcome> {
        self.pending = false;
        if self.state == SchedulerState::Cancelled {
            return Ok(TickOutcome::Stopped);
        }

        let elapsed = self.last_tick.map_or(0.0, |last| now - last);
        self.last_tick = Some(now);

        if self.state == SchedulerState::Paused {
            stepper.render(backend)?;
            return Ok(TickOutcome::Continue);
        }

        let config = stepper.config();
        let dt = config.clamp_dt(elapsed);
        controller.advance_idle(dt, config.color_cycle_interval.as_secs_f32());

        let aspect_ratio = controller.aspect_ratio();
        if let Some(splat) = controller.take_splat(config.color_intensity) {
            stepper.apply_splat(backend, &splat, aspect_ratio);
            self.stats.splats += 1;
        }
        if let Some(interval) = self.auto_splat_interval {
            self.auto_splat_elapsed += dt;
            if self.auto_splat_elapsed >= interval.as_secs_f32() {
                self.auto_splat_elapsed = 0.0;
                let splat = controller.random_splat(config.color_intensity);
                stepper.apply_splat(backend, &splat, aspect_ratio);
                self.stats.splats += 1;
            }
        }

        stepper.step(backend, elapsed);
        stepper.render(backend)?;

        self.stats.frames += 1;
        self.log_stats(now);
        Ok(TickOutcome::Continue)
    }

    fn log_stats(&mut self, now: f64) {
        self.frames_since_log += 1;
        let Some(since) = self.last_stats_log else {
            self.last_stats_log = Some(now);
            return;
        };
        let window = now - since;
        if window >= STATS_LOG_INTERVAL {
            log::info!(
                "{:.1} frames/sec over {:.1}s, {} splats total",
                self.frames_since_log as f64 / window,
                window,
                self.stats.splats
            );
            self.last_stats_log = Some(now);
            self.frames_since_log = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sim::{
            backend::GridSize,
            config::FluidConfig,
            cpu::CpuBackend,
            input::InputController,
            profile::{DeviceHint, DeviceProfile},
        },
        util::Palette,
    };

    struct Harness {
        scheduler: FrameScheduler,
        backend: CpuBackend,
        stepper: Stepper,
        controller: InteractionController,
    }

    fn harness(auto: Option<Duration>) -> Harness {
        let profile = DeviceProfile::select(DeviceHint {
            is_mobile: true,
            is_touch: true,
        });
        Harness {
            scheduler: FrameScheduler::new(auto),
            backend: CpuBackend::new(GridSize {
                sim: (32, 32),
                dye: (64, 64),
            }),
            stepper: Stepper::new(FluidConfig::default()),
            controller: InteractionController::new(
                &profile,
                (320, 320),
                Palette::default(),
                fastrand::Rng::with_seed(9),
            ),
        }
    }

    impl Harness {
        fn tick(&mut self, now: f64) -> TickOutcome {
            self.scheduler
                .tick(now, &mut self.backend, &self.stepper, &self.controller)
                .unwrap()
        }
        fn dye_total(&self) -> f64 {
            self.backend.dye().unwrap().total_magnitude()
        }
    }

    #[test]
    fn no_input_means_no_motion() {
        let mut h = harness(None);
        for i in 0..120 {
            assert_eq!(h.tick(i as f64 / 60.0), TickOutcome::Continue);
        }
        assert_eq!(h.dye_total(), 0.0);
        assert_eq!(h.scheduler.stats().splats, 0);
        assert_eq!(h.scheduler.stats().frames, 120);
    }

    #[test]
    fn drag_injects_dye() {
        let mut h = harness(None);
        let input = h.controller.handle();
        h.tick(0.0);
        input.on_down(160.0, 160.0);
        input.on_move(180.0, 150.0);
        h.tick(1.0 / 60.0);
        assert!(h.dye_total() > 0.0);
        assert_eq!(h.scheduler.stats().splats, 1);
        h.tick(2.0 / 60.0);
        assert_eq!(h.scheduler.stats().splats, 1);
    }

    #[test]
    fn paused_ticks_do_not_advance() {
        let mut h = harness(None);
        h.tick(0.0);
        h.scheduler.pause();
        let input = h.controller.handle();
        input.on_down(10.0, 10.0);
        input.on_move(50.0, 50.0);
        assert_eq!(h.tick(1.0), TickOutcome::Continue);
        assert_eq!(h.scheduler.stats().frames, 1);
        assert_eq!(h.dye_total(), 0.0);
        h.scheduler.toggle_pause();
        h.tick(500.0);
        assert_eq!(h.scheduler.stats().splats, 1);
    }

    #[test]
    fn cancel_is_idempotent_and_stops_ticks() {
        let mut h = harness(None);
        assert!(h.scheduler.schedule());
        assert!(h.scheduler.is_pending());
        h.scheduler.cancel();
        h.scheduler.cancel();
        assert!(!h.scheduler.is_pending());
        assert!(!h.scheduler.schedule());
        assert_eq!(h.tick(1.0), TickOutcome::Stopped);
        assert_eq!(h.scheduler.stats().frames, 0);
        h.scheduler.resume();
        assert_eq!(h.scheduler.state(), SchedulerState::Cancelled);
    }

    #[test]
    fn auto_splats_follow_profile_interval() {
        let mut h = harness(Some(Duration::from_millis(100)));
        for i in 0..60 {
            h.tick(i as f64 / 60.0);
        }
        // 59 integrated frames of 1/60s, one splat per six frames.
        assert!(h.scheduler.stats().splats >= 8);
        assert!(h.dye_total() > 0.0);
    }
}

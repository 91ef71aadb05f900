//! Pointer and touch handling.
//!
//! Input events may arrive on a different thread from the frame tick, so the
//! pointer record lives behind a mutex shared between the [`InputHandle`]
//! given to the host and the [`InteractionController`] owned by the session.

use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};

use super::{profile::DeviceProfile, stepper::Splat};
use crate::util::{Color, Palette};

/// Event sink the host forwards raw pointer/touch input into.
///
/// Coordinates are surface-local pixels with the origin at the top left.
pub trait InputController {
    fn on_down(&self, x: f32, y: f32);
    fn on_move(&self, x: f32, y: f32);
    fn on_up(&self);
    /// Touch cancelled or pointer left the surface.
    fn on_cancel(&self) {
        self.on_up();
    }
    /// Stop accepting events. Later calls are ignored.
    fn dispose(&self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerPhase {
    Idle,
    Pressed,
    Dragging,
}

/// The mutable pointer record read once per frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerState {
    /// Texture coordinates, origin bottom-left.
    pub x: f32,
    pub y: f32,
    /// Aspect-corrected movement since the previous sample.
    pub dx: f32,
    pub dy: f32,
    pub down: bool,
    pub moved: bool,
    pub color: Color,
}

impl Default for PointerState {
    fn default() -> Self {
        Self {
            x: 0.5,
            y: 0.5,
            dx: 0.0,
            dy: 0.0,
            down: false,
            moved: false,
            color: Color::BLACK,
        }
    }
}

impl PointerState {
    pub fn phase(&self) -> PointerPhase {
        match (self.down, self.moved) {
            (false, _) => PointerPhase::Idle,
            (true, false) => PointerPhase::Pressed,
            (true, true) => PointerPhase::Dragging,
        }
    }
}

/// Blends between two palette picks while no pointer is down.
#[derive(Clone, Copy, Debug)]
struct ColorCycle {
    from: Color,
    to: Color,
    elapsed: f32,
}

struct Shared {
    pointer: PointerState,
    surface: (f32, f32),
    rng: fastrand::Rng,
    palette: Palette,
    cycle: ColorCycle,
}

impl Shared {
    fn aspect_ratio(&self) -> f32 {
        self.surface.0 / self.surface.1
    }

    /// Pixel coordinates to texture coordinates, y flipped.
    fn normalize(&self, x: f32, y: f32) -> (f32, f32) {
        let (w, h) = self.surface;
        ((x / w).clamp(0.0, 1.0), (1.0 - y / h).clamp(0.0, 1.0))
    }

    /// Keep deltas proportional to on-screen distance on non-square surfaces.
    fn correct_delta(&self, dx: f32, dy: f32) -> (f32, f32) {
        let aspect = self.aspect_ratio();
        let dx = if aspect < 1.0 { dx * aspect } else { dx };
        let dy = if aspect > 1.0 { dy / aspect } else { dy };
        (dx, dy)
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    // Plain data; a poisoned lock is still consistent.
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Host-facing handle. Cheap to clone and `Send + Sync`.
#[derive(Clone)]
pub struct InputHandle {
    shared: Arc<Mutex<Shared>>,
    disposed: Arc<AtomicBool>,
}

impl InputHandle {
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Copy of the pointer record as last written.
    pub fn pointer(&self) -> PointerState {
        lock(&self.shared).pointer
    }

    fn accepting(&self) -> Option<MutexGuard<'_, Shared>> {
        (!self.is_disposed()).then(|| lock(&self.shared))
    }
}

impl InputController for InputHandle {
    fn on_down(&self, x: f32, y: f32) {
        let Some(mut guard) = self.accepting() else { return };
        let s = &mut *guard;
        let (x, y) = s.normalize(x, y);
        // Snap to the color the idle cycle was heading for and restart it there.
        let color = s.cycle.to;
        s.cycle = ColorCycle {
            from: color,
            to: s.palette.pick(&mut s.rng),
            elapsed: 0.0,
        };
        s.pointer = PointerState {
            x,
            y,
            dx: 0.0,
            dy: 0.0,
            down: true,
            moved: false,
            color,
        };
    }

    fn on_move(&self, x: f32, y: f32) {
        let Some(mut s) = self.accepting() else { return };
        if !s.pointer.down {
            return;
        }
        let (x, y) = s.normalize(x, y);
        let (dx, dy) = s.correct_delta(x - s.pointer.x, y - s.pointer.y);
        s.pointer.x = x;
        s.pointer.y = y;
        if dx != 0.0 || dy != 0.0 {
            s.pointer.dx = dx;
            s.pointer.dy = dy;
            s.pointer.moved = true;
        }
    }

    fn on_up(&self) {
        let Some(mut s) = self.accepting() else { return };
        s.pointer.down = false;
        s.pointer.moved = false;
        s.pointer.dx = 0.0;
        s.pointer.dy = 0.0;
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("input handle disposed");
        let mut s = lock(&self.shared);
        s.pointer.down = false;
        s.pointer.moved = false;
    }
}

/// Session-side half: turns pointer state into splats once per frame.
pub struct InteractionController {
    handle: InputHandle,
    splat_force: f32,
    splat_radius: f32,
}

impl InteractionController {
    /// `surface` is the present size in pixels, used to normalize input.
    pub fn new(
        profile: &DeviceProfile,
        surface: (u32, u32),
        palette: Palette,
        mut rng: fastrand::Rng,
    ) -> Self {
        let from = palette.pick(&mut rng);
        let to = palette.pick(&mut rng);
        let shared = Shared {
            pointer: PointerState {
                color: from,
                ..PointerState::default()
            },
            surface: surface_dims(surface),
            rng,
            palette,
            cycle: ColorCycle {
                from,
                to,
                elapsed: 0.0,
            },
        };
        Self {
            handle: InputHandle {
                shared: Arc::new(Mutex::new(shared)),
                disposed: Arc::new(AtomicBool::new(false)),
            },
            splat_force: profile.splat_force,
            splat_radius: profile.splat_radius,
        }
    }

    pub fn handle(&self) -> InputHandle {
        self.handle.clone()
    }

    pub fn set_surface(&self, width: u32, height: u32) {
        lock(&self.handle.shared).surface = surface_dims((width, height));
    }

    pub fn aspect_ratio(&self) -> f32 {
        lock(&self.handle.shared).aspect_ratio()
    }

    /// Splat radius in texture units, widened on landscape surfaces.
    pub fn radius(&self) -> f32 {
        let aspect = self.aspect_ratio();
        let radius = self.splat_radius / 100.0;
        if aspect > 1.0 { radius * aspect } else { radius }
    }

    /// Advance the idle color cycle. Never produces a splat; the next press
    /// starts from the color the cycle is heading for.
    pub fn advance_idle(&self, dt: f32, interval: f32) {
        let mut guard = lock(&self.handle.shared);
        let s = &mut *guard;
        if s.pointer.down || interval <= 0.0 {
            return;
        }
        s.cycle.elapsed += dt;
        while s.cycle.elapsed >= interval {
            s.cycle.elapsed -= interval;
            s.cycle.from = s.cycle.to;
            s.cycle.to = s.palette.pick(&mut s.rng);
        }
        let t = s.cycle.elapsed / interval;
        s.pointer.color = s.cycle.from.lerp(&s.cycle.to, t);
    }

    /// At most one splat per frame, only after a press followed by movement.
    pub fn take_splat(&self, color_intensity: f32) -> Option<Splat> {
        let mut s = lock(&self.handle.shared);
        if !s.pointer.moved {
            return None;
        }
        s.pointer.moved = false;
        let p = s.pointer;
        drop(s);
        Some(Splat {
            point: [p.x, p.y],
            force: [p.dx * self.splat_force, p.dy * self.splat_force],
            color: p.color.scale(color_intensity).to_array(),
            radius: self.radius(),
        })
    }

    /// A splat at a random point with a random direction, for profiles that
    /// opt into unattended motion.
    pub fn random_splat(&self, color_intensity: f32) -> Splat {
        let mut guard = lock(&self.handle.shared);
        let s = &mut *guard;
        let point = [s.rng.f32(), s.rng.f32()];
        let angle = s.rng.f32() * std::f32::consts::TAU;
        let strength = 0.02 * self.splat_force;
        let color = s.palette.pick(&mut s.rng);
        drop(guard);
        Splat {
            point,
            force: [angle.cos() * strength, angle.sin() * strength],
            color: color.scale(color_intensity).to_array(),
            radius: self.radius(),
        }
    }

    /// Forget a pending movement, e.g. when fields were just reallocated.
    pub fn drop_pending(&self) -> bool {
        let mut s = lock(&self.handle.shared);
        std::mem::replace(&mut s.pointer.moved, false)
    }

    pub fn dispose(&self) {
        self.handle.dispose();
    }
}

fn surface_dims((w, h): (u32, u32)) -> (f32, f32) {
    (w.max(1) as f32, h.max(1) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::profile::{DeviceHint, DeviceProfile};

    fn controller(w: u32, h: u32) -> InteractionController {
        InteractionController::new(
            &DeviceProfile::select(DeviceHint::default()),
            (w, h),
            Palette::default(),
            fastrand::Rng::with_seed(1),
        )
    }

    #[test]
    fn normalizes_with_flipped_y() {
        let c = controller(200, 100);
        let input = c.handle();
        input.on_down(50.0, 25.0);
        let p = input.pointer();
        assert_eq!((p.x, p.y), (0.25, 0.75));
        assert_eq!(p.phase(), PointerPhase::Pressed);
    }

    #[test]
    fn press_alone_does_not_splat() {
        let c = controller(100, 100);
        c.handle().on_down(10.0, 10.0);
        assert!(c.take_splat(0.15).is_none());
    }

    #[test]
    fn drag_yields_exactly_one_splat_per_frame() {
        let c = controller(100, 100);
        let input = c.handle();
        input.on_down(50.0, 50.0);
        input.on_move(60.0, 50.0);
        input.on_move(70.0, 50.0);
        assert_eq!(input.pointer().phase(), PointerPhase::Dragging);
        let splat = c.take_splat(1.0).expect("moved pointer splats");
        assert!((splat.point[0] - 0.7).abs() < 1e-6);
        assert!((splat.force[0] - 0.1 * 6000.0).abs() < 1e-2);
        assert_eq!(splat.force[1], 0.0);
        assert!(c.take_splat(1.0).is_none());
    }

    #[test]
    fn move_without_press_is_ignored() {
        let c = controller(100, 100);
        let input = c.handle();
        input.on_move(10.0, 10.0);
        input.on_move(20.0, 20.0);
        assert!(c.take_splat(1.0).is_none());
    }

    #[test]
    fn zero_delta_move_does_not_mark_moved() {
        let c = controller(100, 100);
        let input = c.handle();
        input.on_down(30.0, 30.0);
        input.on_move(30.0, 30.0);
        assert!(!input.pointer().moved);
    }

    #[test]
    fn release_stops_splats() {
        let c = controller(100, 100);
        let input = c.handle();
        input.on_down(50.0, 50.0);
        input.on_move(60.0, 40.0);
        input.on_up();
        assert!(c.take_splat(1.0).is_none());
        input.on_move(70.0, 40.0);
        assert!(c.take_splat(1.0).is_none());
        assert_eq!(input.pointer().phase(), PointerPhase::Idle);
    }

    #[test]
    fn cancel_behaves_like_release() {
        let c = controller(100, 100);
        let input = c.handle();
        input.on_down(50.0, 50.0);
        input.on_cancel();
        assert!(!input.pointer().down);
    }

    #[test]
    fn disposed_handle_ignores_events() {
        let c = controller(100, 100);
        let input = c.handle();
        input.dispose();
        input.dispose();
        input.on_down(50.0, 50.0);
        input.on_move(90.0, 90.0);
        assert!(input.is_disposed());
        assert!(c.take_splat(1.0).is_none());
    }

    #[test]
    fn landscape_deltas_and_radius_are_aspect_corrected() {
        let c = controller(200, 100);
        let input = c.handle();
        input.on_down(100.0, 50.0);
        input.on_move(100.0, 40.0);
        let p = input.pointer();
        assert!((p.dy - 0.1 / 2.0).abs() < 1e-6);
        assert!((c.radius() - 0.25 / 100.0 * 2.0).abs() < 1e-7);
    }

    #[test]
    fn idle_cycle_changes_color_but_never_splats() {
        let c = controller(100, 100);
        let input = c.handle();
        let start = input.pointer().color;
        let mut changed = false;
        for _ in 0..120 {
            c.advance_idle(1.0 / 60.0, 0.3);
            assert!(c.take_splat(0.15).is_none());
            changed |= input.pointer().color != start;
        }
        assert!(changed);
    }

    #[test]
    fn press_takes_the_color_the_idle_cycle_reached() {
        let c = controller(100, 100);
        let input = c.handle();
        for _ in 0..27 {
            c.advance_idle(1.0 / 60.0, 0.3);
        }
        let target = lock(&c.handle.shared).cycle.to;
        input.on_down(50.0, 50.0);
        input.on_move(60.0, 50.0);
        assert_eq!(input.pointer().color, target);
        let splat = c.take_splat(0.15).expect("moved pointer splats");
        assert_eq!(splat.color, target.scale(0.15).to_array());

        // The cycle restarts from the pressed color once released.
        input.on_up();
        c.advance_idle(0.0, 0.3);
        assert_eq!(input.pointer().color, target);
    }

    #[test]
    fn seeded_controllers_pick_identical_colors() {
        let a = controller(100, 100);
        let b = controller(100, 100);
        a.handle().on_down(1.0, 1.0);
        b.handle().on_down(1.0, 1.0);
        assert_eq!(a.handle().pointer().color, b.handle().pointer().color);
    }

    #[test]
    fn pending_movement_can_be_dropped() {
        let c = controller(100, 100);
        let input = c.handle();
        input.on_down(10.0, 10.0);
        input.on_move(20.0, 10.0);
        assert!(c.drop_pending());
        assert!(c.take_splat(1.0).is_none());
    }

    #[test]
    fn handle_is_shareable_across_threads() {
        let c = controller(100, 100);
        let input = c.handle();
        std::thread::spawn(move || {
            input.on_down(10.0, 10.0);
            input.on_move(30.0, 10.0);
        })
        .join()
        .unwrap();
        assert!(c.take_splat(1.0).is_some());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }
    /// Build a color from 8-bit sRGB components.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
        }
    }
    /// Pack into `0x00RRGGBB`, clamping each channel to `[0, 1]`.
    pub fn as_u32(&self) -> u32 {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u32;
        q(self.r) << 16 | q(self.g) << 8 | q(self.b)
    }
    pub fn lerp(&self, other: &Color, factor: f32) -> Color {
        let t = factor.clamp(0.0, 1.0);
        Color {
            r: self.r + (other.r - self.r) * t,
            g: self.g + (other.g - self.g) * t,
            b: self.b + (other.b - self.b) * t,
        }
    }
    pub fn scale(&self, factor: f32) -> Color {
        Color::new(self.r * factor, self.g * factor, self.b * factor)
    }
    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

/// A weighted set of colors splats are tinted from.
#[derive(Clone, Debug)]
pub struct Palette {
    entries: Vec<(Color, f32)>,
    total_weight: f32,
}

impl Palette {
    /// Entries with a non-positive weight are never picked.
    pub fn new(entries: impl IntoIterator<Item = (Color, f32)>) -> Self {
        let entries: Vec<_> = entries
            .into_iter()
            .filter(|(_, w)| *w > 0.0 && w.is_finite())
            .collect();
        let total_weight = entries.iter().map(|(_, w)| w).sum();
        Self {
            entries,
            total_weight,
        }
    }

    /// Weighted random selection. An empty palette yields white.
    pub fn pick(&self, rng: &mut fastrand::Rng) -> Color {
        let Some(&(last, _)) = self.entries.last() else {
            return Color::new(1.0, 1.0, 1.0);
        };
        let mut roll = rng.f32() * self.total_weight;
        for &(color, weight) in &self.entries {
            if roll < weight {
                return color;
            }
            roll -= weight;
        }
        last
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Palette {
    fn default() -> Self {
        Palette::new([
            (Color::rgb(0, 194, 255), 3.0),
            (Color::rgb(124, 58, 237), 3.0),
            (Color::rgb(236, 72, 153), 2.0),
            (Color::rgb(16, 185, 129), 1.0),
            (Color::rgb(245, 158, 11), 1.0),
        ])
    }
}

/// Monotonic wall clock in seconds, used to timestamp frame ticks.
#[cfg(target_arch = "wasm32")]
pub fn now_seconds() -> f64 {
    js_sys::Date::now() / 1000.0
}

/// Monotonic wall clock in seconds, used to timestamp frame ticks.
#[cfg(not(target_arch = "wasm32"))]
pub fn now_seconds() -> f64 {
    use std::{sync::OnceLock, time::Instant};
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_and_clamps() {
        assert_eq!(Color::rgb(255, 0, 0).as_u32(), 0xFF0000);
        assert_eq!(Color::new(2.0, -1.0, 1.0).as_u32(), 0xFF00FF);
    }

    #[test]
    fn zero_weight_entries_are_never_picked() {
        let red = Color::rgb(255, 0, 0);
        let blue = Color::rgb(0, 0, 255);
        let palette = Palette::new([(red, 0.0), (blue, 1.0)]);
        assert_eq!(palette.len(), 1);
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..100 {
            assert_eq!(palette.pick(&mut rng), blue);
        }
    }

    #[test]
    fn heavier_entries_win_more_often() {
        let a = Color::rgb(255, 0, 0);
        let b = Color::rgb(0, 255, 0);
        let palette = Palette::new([(a, 9.0), (b, 1.0)]);
        let mut rng = fastrand::Rng::with_seed(42);
        let hits = (0..2000).filter(|_| palette.pick(&mut rng) == a).count();
        assert!(hits > 1600, "{hits}");
    }

    #[test]
    fn same_seed_same_picks() {
        let palette = Palette::default();
        let mut r1 = fastrand::Rng::with_seed(3);
        let mut r2 = fastrand::Rng::with_seed(3);
        for _ in 0..20 {
            assert_eq!(palette.pick(&mut r1), palette.pick(&mut r2));
        }
    }
}

//! Device quality tiers.
//!
//! A session picks one tier at mount from a coarse capability hint and keeps it
//! until teardown. Resizes reallocate fields at the same tier's resolution.

use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceTier {
    /// Phones: smallest grids, largest relative splat radius.
    Mobile,
    /// Tablet-class touch devices that are not phones.
    Touch,
    Desktop,
}

/// The capability hint supplied by the caller at mount.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceHint {
    pub is_mobile: bool,
    pub is_touch: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceProfile {
    pub tier: DeviceTier,
    /// Short side of the velocity/pressure grids, in cells.
    pub sim_resolution: u32,
    /// Short side of the dye grid, in cells.
    pub dye_resolution: u32,
    /// Splat radius as a percentage of the surface; divided by 100 before use.
    pub splat_radius: f32,
    /// Multiplier turning a normalized pointer delta into a velocity impulse.
    pub splat_force: f32,
    /// Cadence of unattended splats. `None` keeps the surface still until the
    /// user interacts. Every built-in tier uses `None`; the scheduler honors
    /// `Some` for hand-built profiles, such as an attract-mode background.
    pub auto_splat_interval: Option<Duration>,
}

const PROFILES: [DeviceProfile; 3] = [
    DeviceProfile {
        tier: DeviceTier::Mobile,
        sim_resolution: 64,
        dye_resolution: 512,
        splat_radius: 0.35,
        splat_force: 3000.0,
        auto_splat_interval: None,
    },
    DeviceProfile {
        tier: DeviceTier::Touch,
        sim_resolution: 96,
        dye_resolution: 768,
        splat_radius: 0.30,
        splat_force: 4500.0,
        auto_splat_interval: None,
    },
    DeviceProfile {
        tier: DeviceTier::Desktop,
        sim_resolution: 128,
        dye_resolution: 1024,
        splat_radius: 0.25,
        splat_force: 6000.0,
        auto_splat_interval: None,
    },
];

impl DeviceTier {
    /// Phones take priority over the touch flag.
    pub fn classify(hint: DeviceHint) -> DeviceTier {
        match (hint.is_mobile, hint.is_touch) {
            (true, _) => DeviceTier::Mobile,
            (false, true) => DeviceTier::Touch,
            (false, false) => DeviceTier::Desktop,
        }
    }

    pub fn profile(self) -> DeviceProfile {
        PROFILES[self as usize]
    }
}

impl DeviceProfile {
    pub fn select(hint: DeviceHint) -> DeviceProfile {
        DeviceTier::classify(hint).profile()
    }

    /// Velocity/pressure grid dimensions for a surface of the given aspect ratio.
    pub fn sim_size(&self, aspect_ratio: f32) -> (u32, u32) {
        resolution_for_aspect(self.sim_resolution, aspect_ratio)
    }

    pub fn dye_size(&self, aspect_ratio: f32) -> (u32, u32) {
        resolution_for_aspect(self.dye_resolution, aspect_ratio)
    }
}

/// The short side gets `base` cells; the long side is stretched by the aspect ratio.
pub fn resolution_for_aspect(base: u32, aspect_ratio: f32) -> (u32, u32) {
    let aspect = if aspect_ratio.is_finite() && aspect_ratio > 0.0 {
        aspect_ratio
    } else {
        1.0
    };
    let stretch = if aspect < 1.0 { aspect.recip() } else { aspect };
    let short = base.max(1);
    let long = ((short as f32 * stretch).round() as u32).max(short);
    if aspect >= 1.0 {
        (long, short)
    } else {
        (short, long)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint(is_mobile: bool, is_touch: bool) -> DeviceHint {
        DeviceHint {
            is_mobile,
            is_touch,
        }
    }

    #[test]
    fn tier_table_matches_hints() {
        let mobile = DeviceProfile::select(hint(true, false));
        assert_eq!((mobile.sim_resolution, mobile.dye_resolution), (64, 512));
        let mobile_touch = DeviceProfile::select(hint(true, true));
        assert_eq!(mobile_touch.tier, DeviceTier::Mobile);
        let tablet = DeviceProfile::select(hint(false, true));
        assert_eq!((tablet.sim_resolution, tablet.dye_resolution), (96, 768));
        let desktop = DeviceProfile::select(hint(false, false));
        assert_eq!((desktop.sim_resolution, desktop.dye_resolution), (128, 1024));
    }

    #[test]
    fn table_is_indexed_by_tier() {
        for tier in [DeviceTier::Mobile, DeviceTier::Touch, DeviceTier::Desktop] {
            assert_eq!(tier.profile().tier, tier);
        }
    }

    #[test]
    fn smaller_tiers_get_larger_radius() {
        let [m, t, d] = PROFILES;
        assert!(m.splat_radius > t.splat_radius);
        assert!(t.splat_radius > d.splat_radius);
        assert!(PROFILES.iter().all(|p| p.auto_splat_interval.is_none()));
    }

    #[test]
    fn aspect_stretches_long_side() {
        assert_eq!(resolution_for_aspect(128, 16.0 / 9.0), (228, 128));
        assert_eq!(resolution_for_aspect(128, 9.0 / 16.0), (128, 228));
        assert_eq!(resolution_for_aspect(64, 1.0), (64, 64));
        assert_eq!(resolution_for_aspect(64, f32::NAN), (64, 64));
    }
}

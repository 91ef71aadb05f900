/// Device pixel ratios above this are rendered at this density.
pub const MAX_PIXEL_RATIO: f64 = 2.0;

/// Size of the drawable surface.
///
/// `logical` is the space pointer events arrive in (CSS pixels on the web,
/// winit logical pixels natively); `extent` is what the swapchain is
/// configured with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceSize {
    pub logical: (f64, f64),
    pub pixel_ratio: f64,
}

impl SurfaceSize {
    pub fn new(logical_width: f64, logical_height: f64, pixel_ratio: f64) -> Self {
        let ratio = if pixel_ratio.is_finite() && pixel_ratio > 0.0 {
            pixel_ratio
        } else {
            1.0
        };
        let side = |v: f64| if v.is_finite() { v.max(0.0) } else { 0.0 };
        Self {
            logical: (side(logical_width), side(logical_height)),
            pixel_ratio: ratio,
        }
    }

    /// Less than one pixel on either side, as reported for minimized windows
    /// and hidden canvases. Accessors still return a drawable 1x1 size.
    pub fn is_empty(&self) -> bool {
        self.logical.0 < 1.0 || self.logical.1 < 1.0
    }

    /// Backing-store size in physical pixels with the pixel ratio capped.
    pub fn extent(&self) -> (u32, u32) {
        let ratio = self.pixel_ratio.min(MAX_PIXEL_RATIO);
        let scale = |v: f64| ((v * ratio).round() as u32).max(1);
        (scale(self.logical.0), scale(self.logical.1))
    }

    /// Logical size rounded to whole pixels.
    pub fn logical_px(&self) -> (u32, u32) {
        (
            (self.logical.0.round() as u32).max(1),
            (self.logical.1.round() as u32).max(1),
        )
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.is_empty() {
            return 1.0;
        }
        (self.logical.0 / self.logical.1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_ratio_is_capped() {
        let size = SurfaceSize::new(800.0, 600.0, 3.0);
        assert_eq!(size.extent(), (1600, 1200));
        let size = SurfaceSize::new(800.0, 600.0, 1.5);
        assert_eq!(size.extent(), (1200, 900));
    }

    #[test]
    fn degenerate_sizes_stay_drawable() {
        let size = SurfaceSize::new(0.0, -5.0, f64::NAN);
        assert!(size.is_empty());
        assert_eq!(size.extent(), (1, 1));
        assert_eq!(size.logical_px(), (1, 1));
        assert_eq!(size.aspect_ratio(), 1.0);
        assert!(!SurfaceSize::new(1.0, 1.0, 1.0).is_empty());
    }
}

//! Host-side simulation fields.
//!
//! A [`Field`] mirrors a GPU texture: a row-major grid with a fixed channel
//! count, a texel size and a filter mode. Row 0 is the bottom of the surface,
//! matching texture coordinates.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filter {
    /// Bilinear, for fields sampled between grid points (velocity, dye).
    Linear,
    /// Exact grid-point reads (pressure, divergence, curl).
    Nearest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channels {
    Scalar = 1,
    Vector2 = 2,
    Color = 3,
}

#[derive(Clone, Debug)]
pub struct Field {
    width: usize,
    height: usize,
    channels: usize,
    filter: Filter,
    data: Vec<f32>,
}

impl Field {
    pub fn new(width: u32, height: u32, channels: Channels, filter: Filter) -> Field {
        let width = width.max(1) as usize;
        let height = height.max(1) as usize;
        let channels = channels as usize;
        Field {
            width,
            height,
            channels,
            filter,
            data: vec![0.0; width * height * channels],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }
    pub fn height(&self) -> usize {
        self.height
    }
    pub fn channels(&self) -> usize {
        self.channels
    }
    pub fn filter(&self) -> Filter {
        self.filter
    }
    pub fn texel_size(&self) -> [f32; 2] {
        [1.0 / self.width as f32, 1.0 / self.height as f32]
    }
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Raw channel-interleaved storage.
    pub fn data(&self) -> &[f32] {
        &self.data
    }
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Number of floats in one row.
    pub fn row_len(&self) -> usize {
        self.width * self.channels
    }

    /// Texture coordinate of the center of cell `(x, y)`.
    pub fn uv(&self, x: usize, y: usize) -> [f32; 2] {
        [
            (x as f32 + 0.5) / self.width as f32,
            (y as f32 + 0.5) / self.height as f32,
        ]
    }

    /// Read a cell, clamping coordinates to the edge. Unused channels are zero.
    pub fn fetch(&self, x: isize, y: isize) -> [f32; 4] {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        let start = (y * self.width + x) * self.channels;
        let mut out = [0.0; 4];
        out[..self.channels].copy_from_slice(&self.data[start..start + self.channels]);
        out
    }

    pub fn set(&mut self, x: usize, y: usize, value: [f32; 4]) {
        let start = (y * self.width + x) * self.channels;
        self.data[start..start + self.channels].copy_from_slice(&value[..self.channels]);
    }

    /// Sample at a texture coordinate with this field's filter mode and
    /// clamp-to-edge addressing.
    pub fn sample(&self, uv: [f32; 2]) -> [f32; 4] {
        let fx = uv[0] * self.width as f32 - 0.5;
        let fy = uv[1] * self.height as f32 - 0.5;
        match self.filter {
            Filter::Nearest => self.fetch(fx.round() as isize, fy.round() as isize),
            Filter::Linear => {
                let x0 = fx.floor();
                let y0 = fy.floor();
                let tx = fx - x0;
                let ty = fy - y0;
                let (x0, y0) = (x0 as isize, y0 as isize);
                let a = self.fetch(x0, y0);
                let b = self.fetch(x0 + 1, y0);
                let c = self.fetch(x0, y0 + 1);
                let d = self.fetch(x0 + 1, y0 + 1);
                let mut out = [0.0; 4];
                for i in 0..self.channels {
                    let bottom = a[i] + (b[i] - a[i]) * tx;
                    let top = c[i] + (d[i] - c[i]) * tx;
                    out[i] = bottom + (top - bottom) * ty;
                }
                out
            }
        }
    }

    /// Sum of the absolute value of every channel of every cell.
    pub fn total_magnitude(&self) -> f64 {
        self.data.iter().map(|v| v.abs() as f64).sum()
    }

    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texel_size_is_reciprocal() {
        let f = Field::new(64, 32, Channels::Scalar, Filter::Nearest);
        assert_eq!(f.texel_size(), [1.0 / 64.0, 1.0 / 32.0]);
        assert_eq!(f.data().len(), 64 * 32);
    }

    #[test]
    fn fetch_clamps_to_edge() {
        let mut f = Field::new(4, 4, Channels::Vector2, Filter::Nearest);
        f.set(0, 0, [1.0, 2.0, 9.0, 9.0]);
        assert_eq!(f.fetch(-3, -1), [1.0, 2.0, 0.0, 0.0]);
        f.set(3, 3, [5.0, 6.0, 0.0, 0.0]);
        assert_eq!(f.fetch(10, 10), [5.0, 6.0, 0.0, 0.0]);
    }

    #[test]
    fn linear_sampling_interpolates_between_centers() {
        let mut f = Field::new(2, 1, Channels::Scalar, Filter::Linear);
        f.set(0, 0, [0.0; 4]);
        f.set(1, 0, [1.0, 0.0, 0.0, 0.0]);
        let mid = f.sample([0.5, 0.5])[0];
        assert!((mid - 0.5).abs() < 1e-6);
        let at_center = f.sample(f.uv(1, 0))[0];
        assert!((at_center - 1.0).abs() < 1e-6);
    }

    #[test]
    fn nearest_sampling_hits_grid_points() {
        let mut f = Field::new(4, 4, Channels::Scalar, Filter::Nearest);
        f.set(2, 1, [3.0, 0.0, 0.0, 0.0]);
        assert_eq!(f.sample(f.uv(2, 1))[0], 3.0);
    }
}

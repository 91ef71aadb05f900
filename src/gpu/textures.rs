//! GPU-resident field store.

use wgpu::{Device, Extent3d, Texture, TextureFormat, TextureUsages, TextureView};

use crate::sim::{backend::GridSize, double_buffer::DoubleBuffer};

/// Every field is stored as half-float RGBA so one format covers scalars,
/// vectors and colors.
pub const FIELD_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

/// Compute workgroup edge length shared by every pass kernel.
pub const WORKGROUP_SIZE: u32 = 8;

pub struct GpuField {
    texture: Texture,
    view: TextureView,
    size: (u32, u32),
}

impl GpuField {
    pub fn new(device: &Device, label: &str, size: (u32, u32)) -> Self {
        let size = (size.0.max(1), size.1.max(1));
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FIELD_FORMAT,
            usage: TextureUsages::STORAGE_BINDING | TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size,
        }
    }

    pub fn view(&self) -> &TextureView {
        &self.view
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn texel_size(&self) -> [f32; 2] {
        [1.0 / self.size.0 as f32, 1.0 / self.size.1 as f32]
    }

    /// Workgroup counts covering every texel.
    pub fn workgroups(&self) -> (u32, u32) {
        (
            self.size.0.div_ceil(WORKGROUP_SIZE),
            self.size.1.div_ceil(WORKGROUP_SIZE),
        )
    }

    fn destroy(&self) {
        self.texture.destroy();
    }
}

/// All simulation fields for one grid size.
pub struct FieldSet {
    pub velocity: DoubleBuffer<GpuField>,
    pub dye: DoubleBuffer<GpuField>,
    pub pressure: DoubleBuffer<GpuField>,
    pub divergence: GpuField,
    pub curl: GpuField,
}

impl FieldSet {
    /// Allocate zeroed fields, clamping each side to `max_dimension`.
    pub fn new(device: &Device, grid: GridSize, max_dimension: u32) -> Self {
        let clamp = |(w, h): (u32, u32)| (w.min(max_dimension), h.min(max_dimension));
        let sim = clamp(grid.sim);
        let dye = clamp(grid.dye);
        log::debug!(
            "allocating GPU fields: sim {}x{}, dye {}x{}",
            sim.0,
            sim.1,
            dye.0,
            dye.1
        );
        Self {
            velocity: DoubleBuffer::from_fn(|| GpuField::new(device, "velocity", sim)),
            dye: DoubleBuffer::from_fn(|| GpuField::new(device, "dye", dye)),
            pressure: DoubleBuffer::from_fn(|| GpuField::new(device, "pressure", sim)),
            divergence: GpuField::new(device, "divergence", sim),
            curl: GpuField::new(device, "curl", sim),
        }
    }

    /// Free texture memory now rather than when the last reference drops.
    /// Only call once no unsubmitted work refers to these fields.
    pub fn destroy(self) {
        let (va, vb) = self.velocity.into_inner();
        let (da, db) = self.dye.into_inner();
        let (pa, pb) = self.pressure.into_inner();
        for field in [&va, &vb, &da, &db, &pa, &pb, &self.divergence, &self.curl] {
            field.destroy();
        }
    }
}

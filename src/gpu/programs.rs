//! Compiled pass programs and the per-frame uniform arena.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, BindingType, Buffer, BufferBinding, BufferUsages,
    ComputePipeline, Device, PipelineLayoutDescriptor, Queue, RenderPipeline, Sampler,
    ShaderStages, TextureFormat, TextureSampleType, TextureView, TextureViewDimension,
};

use super::textures::FIELD_FORMAT;
use crate::error::{FluidError, Result};

const COMMON_SOURCE: &str = include_str!("shaders/common.wgsl");

/// Uniform block shared by every pass. Each pass reads the fields it needs.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PassUniforms {
    pub texel: [f32; 2],
    pub point: [f32; 2],
    pub payload: [f32; 4],
    pub dt: f32,
    pub dissipation: f32,
    pub radius: f32,
    pub aspect_ratio: f32,
    pub curl: f32,
    pub factor: f32,
    pub bloom: f32,
    pub gamma: f32,
}

const UNIFORM_SIZE: u64 = std::mem::size_of::<PassUniforms>() as u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pass {
    Curl,
    Vorticity,
    Divergence,
    Clear,
    Jacobi,
    Gradient,
    Advect,
    Splat,
}

impl Pass {
    pub const ALL: [Pass; 8] = [
        Pass::Curl,
        Pass::Vorticity,
        Pass::Divergence,
        Pass::Clear,
        Pass::Jacobi,
        Pass::Gradient,
        Pass::Advect,
        Pass::Splat,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Pass::Curl => "curl",
            Pass::Vorticity => "vorticity",
            Pass::Divergence => "divergence",
            Pass::Clear => "clear",
            Pass::Jacobi => "jacobi",
            Pass::Gradient => "gradient",
            Pass::Advect => "advect",
            Pass::Splat => "splat",
        }
    }

    fn source(self) -> &'static str {
        match self {
            Pass::Curl => include_str!("shaders/curl.wgsl"),
            Pass::Vorticity => include_str!("shaders/vorticity.wgsl"),
            Pass::Divergence => include_str!("shaders/divergence.wgsl"),
            Pass::Clear => include_str!("shaders/clear.wgsl"),
            Pass::Jacobi => include_str!("shaders/jacobi.wgsl"),
            Pass::Gradient => include_str!("shaders/gradient.wgsl"),
            Pass::Advect => include_str!("shaders/advect.wgsl"),
            Pass::Splat => include_str!("shaders/splat.wgsl"),
        }
    }

    /// Number of sampled input fields, bound at `0..inputs`.
    /// The output storage texture follows them.
    pub fn inputs(self) -> u32 {
        match self {
            Pass::Curl | Pass::Divergence | Pass::Clear | Pass::Splat => 1,
            Pass::Vorticity | Pass::Jacobi | Pass::Gradient | Pass::Advect => 2,
        }
    }

    /// Whether a bilinear sampler is bound after the output.
    fn sampled(self) -> bool {
        matches!(self, Pass::Advect)
    }
}

struct ComputeProgram {
    pipeline: ComputePipeline,
    layout: BindGroupLayout,
}

pub struct Programs {
    uniform_layout: BindGroupLayout,
    compute: Vec<ComputeProgram>,
    display: RenderPipeline,
    display_layout: BindGroupLayout,
    sampler: Sampler,
}

fn texture_entry(binding: u32, visibility: ShaderStages) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: BindingType::Texture {
            sample_type: TextureSampleType::Float { filterable: true },
            view_dimension: TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32, visibility: ShaderStages) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

/// Surface a validation error raised while building `pass`.
async fn check_scope(device: &Device, pass: &'static str) -> Result<()> {
    match device.pop_error_scope().await {
        None => Ok(()),
        Some(err) => Err(FluidError::Shader {
            pass,
            message: err.to_string(),
        }),
    }
}

impl Programs {
    pub async fn new(device: &Device, surface_format: TextureFormat) -> Result<Self> {
        let uniform_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("pass uniforms bind group layout"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::COMPUTE | ShaderStages::FRAGMENT,
                ty: BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(UNIFORM_SIZE),
                },
                count: None,
            }],
        });

        let mut compute = Vec::with_capacity(Pass::ALL.len());
        for pass in Pass::ALL {
            compute.push(Self::build_compute(device, &uniform_layout, pass).await?);
        }

        let (display, display_layout) =
            Self::build_display(device, &uniform_layout, surface_format).await?;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("bilinear clamp sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        log::debug!("built {} compute programs and the display program", compute.len());
        Ok(Self {
            uniform_layout,
            compute,
            display,
            display_layout,
            sampler,
        })
    }

    async fn build_compute(
        device: &Device,
        uniform_layout: &BindGroupLayout,
        pass: Pass,
    ) -> Result<ComputeProgram> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let source = format!("{COMMON_SOURCE}\n{}", pass.source());
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(pass.name()),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let mut entries: Vec<_> = (0..pass.inputs())
            .map(|binding| texture_entry(binding, ShaderStages::COMPUTE))
            .collect();
        entries.push(BindGroupLayoutEntry {
            binding: pass.inputs(),
            visibility: ShaderStages::COMPUTE,
            ty: BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: FIELD_FORMAT,
                view_dimension: TextureViewDimension::D2,
            },
            count: None,
        });
        if pass.sampled() {
            entries.push(sampler_entry(pass.inputs() + 1, ShaderStages::COMPUTE));
        }
        let layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some(pass.name()),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some(pass.name()),
            bind_group_layouts: &[uniform_layout, &layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(pass.name()),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        check_scope(device, pass.name()).await?;
        Ok(ComputeProgram { pipeline, layout })
    }

    async fn build_display(
        device: &Device,
        uniform_layout: &BindGroupLayout,
        surface_format: TextureFormat,
    ) -> Result<(RenderPipeline, BindGroupLayout)> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("display"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/display.wgsl").into()),
        });

        let layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("display bind group layout"),
            entries: &[
                texture_entry(0, ShaderStages::FRAGMENT),
                sampler_entry(1, ShaderStages::FRAGMENT),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("display pipeline layout"),
            bind_group_layouts: &[uniform_layout, &layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("display pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        check_scope(device, "display").await?;
        Ok((pipeline, layout))
    }

    pub fn uniform_layout(&self) -> &BindGroupLayout {
        &self.uniform_layout
    }

    pub fn compute_pipeline(&self, pass: Pass) -> &ComputePipeline {
        &self.compute[pass as usize].pipeline
    }

    pub fn display_pipeline(&self) -> &RenderPipeline {
        &self.display
    }

    /// Bind `inputs` as sampled textures followed by `output` as the storage
    /// target.
    pub fn compute_bind_group(
        &self,
        device: &Device,
        pass: Pass,
        inputs: &[&TextureView],
        output: &TextureView,
    ) -> BindGroup {
        debug_assert_eq!(inputs.len() as u32, pass.inputs());
        let mut entries: Vec<_> = inputs
            .iter()
            .enumerate()
            .map(|(i, view)| BindGroupEntry {
                binding: i as u32,
                resource: BindingResource::TextureView(view),
            })
            .collect();
        entries.push(BindGroupEntry {
            binding: pass.inputs(),
            resource: BindingResource::TextureView(output),
        });
        if pass.sampled() {
            entries.push(BindGroupEntry {
                binding: pass.inputs() + 1,
                resource: BindingResource::Sampler(&self.sampler),
            });
        }
        device.create_bind_group(&BindGroupDescriptor {
            label: Some(pass.name()),
            layout: &self.compute[pass as usize].layout,
            entries: &entries,
        })
    }

    pub fn display_bind_group(&self, device: &Device, dye: &TextureView) -> BindGroup {
        device.create_bind_group(&BindGroupDescriptor {
            label: Some("display bind group"),
            layout: &self.display_layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(dye),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }
}

/// One uniform buffer holding a slot per dispatch.
///
/// `Queue::write_buffer` calls made before a submit all land before any of
/// its commands run, so reusing a single uniform region would make every
/// dispatch in the frame see the last value. Instead each dispatch gets its
/// own slot, selected with a dynamic offset, and the whole arena is uploaded
/// once per submit.
pub struct UniformArena {
    buffer: Buffer,
    bind_group: BindGroup,
    stride: u64,
    capacity: u32,
    staging: Vec<u8>,
    used: u32,
}

impl UniformArena {
    /// Slots per submit. A frame issues two dispatches per splat plus about
    /// thirty for the solver; larger frames are split across submits.
    pub const SLOTS: u32 = 64;

    pub fn new(device: &Device, layout: &BindGroupLayout) -> Self {
        let align = device.limits().min_uniform_buffer_offset_alignment as u64;
        let stride = UNIFORM_SIZE.div_ceil(align) * align;
        let capacity = Self::SLOTS;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pass uniform arena"),
            size: stride * capacity as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("pass uniform arena bind group"),
            layout,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer(BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(UNIFORM_SIZE),
                }),
            }],
        });
        Self {
            buffer,
            bind_group,
            stride,
            capacity,
            staging: vec![0; (stride * capacity as u64) as usize],
            used: 0,
        }
    }

    pub fn bind_group(&self) -> &BindGroup {
        &self.bind_group
    }

    pub fn is_full(&self) -> bool {
        self.used >= self.capacity
    }

    /// Store `uniforms` in the next free slot and return its dynamic offset.
    /// The caller flushes before this when [`is_full`](Self::is_full).
    pub fn push(&mut self, uniforms: &PassUniforms) -> u32 {
        debug_assert!(!self.is_full());
        let offset = self.used as u64 * self.stride;
        let start = offset as usize;
        self.staging[start..start + UNIFORM_SIZE as usize]
            .copy_from_slice(bytemuck::bytes_of(uniforms));
        self.used += 1;
        offset as u32
    }

    /// Upload every used slot. Must precede the submit that reads them.
    pub fn flush(&mut self, queue: &Queue) {
        if self.used == 0 {
            return;
        }
        let len = (self.used as u64 * self.stride) as usize;
        queue.write_buffer(&self.buffer, 0, &self.staging[..len]);
        self.used = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_matches_wgsl_layout() {
        // vec2, vec2, vec4, then eight scalars.
        assert_eq!(UNIFORM_SIZE, 64);
        assert_eq!(std::mem::align_of::<PassUniforms>(), 4);
    }

    #[test]
    fn every_pass_has_its_own_kernel() {
        for pass in Pass::ALL {
            assert_eq!(Pass::ALL[pass as usize], pass);
            let source = pass.source();
            assert!(source.contains("@compute"), "{}", pass.name());
            let storage = format!("@binding({}) var dst", pass.inputs());
            assert!(source.contains(&storage), "{}", pass.name());
        }
    }

    #[test]
    fn only_advection_samples_bilinearly() {
        for pass in Pass::ALL {
            assert_eq!(pass.sampled(), pass.source().contains("sampler"));
        }
    }
}

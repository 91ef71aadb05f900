//! wgpu backend: fields live in textures, passes are compute dispatches and
//! display is a fullscreen render pass onto the window or canvas surface.

pub mod programs;
pub mod textures;

use wgpu::{
    CommandEncoder, CommandEncoderDescriptor, Device, Instance, LoadOp, Operations, Queue,
    RenderPassColorAttachment, RenderPassDescriptor, StoreOp, Surface, SurfaceConfiguration,
    TextureFormatFeatureFlags, TextureUsages, TextureView, TextureViewDescriptor,
};

use crate::{
    error::{FluidError, Result},
    rendering::SurfaceSize,
    session::{Session, grid_for},
    sim::{
        backend::{DisplayParams, GridSize, PassBackend, SplatTarget},
        config::FluidConfig,
        profile::{DeviceHint, DeviceProfile},
    },
};
use programs::{Pass, PassUniforms, Programs, UniformArena};
use textures::{FIELD_FORMAT, FieldSet, GpuField};

/// Device, queue and the command stream passes are recorded into.
struct Encoding {
    device: Device,
    queue: Queue,
    programs: Programs,
    arena: UniformArena,
    encoder: Option<CommandEncoder>,
}

fn frame_encoder(device: &Device) -> CommandEncoder {
    device.create_command_encoder(&CommandEncoderDescriptor {
        label: Some("fluid frame encoder"),
    })
}

impl Encoding {
    /// Upload pending uniforms and submit everything recorded so far.
    fn submit(&mut self) {
        self.arena.flush(&self.queue);
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    fn dispatch(
        &mut self,
        pass: Pass,
        uniforms: PassUniforms,
        inputs: &[&TextureView],
        output: &GpuField,
    ) {
        if self.arena.is_full() {
            self.submit();
        }
        let offset = self.arena.push(&uniforms);
        let bind_group =
            self.programs
                .compute_bind_group(&self.device, pass, inputs, output.view());
        let (x, y) = output.workgroups();

        let Encoding {
            programs,
            arena,
            encoder,
            device,
            ..
        } = self;
        let encoder = encoder.get_or_insert_with(|| frame_encoder(device));
        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(pass.name()),
            timestamp_writes: None,
        });
        cpass.set_pipeline(programs.compute_pipeline(pass));
        cpass.set_bind_group(0, arena.bind_group(), &[offset]);
        cpass.set_bind_group(1, &bind_group, &[]);
        cpass.dispatch_workgroups(x, y, 1);
    }

    /// Record the tone-mapping pass from `dye` onto `target`.
    fn draw_display(&mut self, uniforms: PassUniforms, dye: &TextureView, target: &TextureView) {
        if self.arena.is_full() {
            self.submit();
        }
        let offset = self.arena.push(&uniforms);
        let bind_group = self.programs.display_bind_group(&self.device, dye);

        let Encoding {
            programs,
            arena,
            encoder,
            device,
            ..
        } = self;
        let encoder = encoder.get_or_insert_with(|| frame_encoder(device));
        let mut render_pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("display pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(wgpu::Color::BLACK),
                    store: StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_pipeline(programs.display_pipeline());
        render_pass.set_bind_group(0, arena.bind_group(), &[offset]);
        render_pass.set_bind_group(1, &bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }
}

struct GpuState {
    _instance: Instance,
    surface: Surface<'static>,
    surface_config: SurfaceConfiguration,
    max_dimension: u32,
    encoding: Encoding,
    fields: FieldSet,
}

pub struct GpuBackend {
    state: Option<GpuState>,
    grid: GridSize,
}

/// Fail unless the adapter can run every pass program.
fn check_capabilities(adapter: &wgpu::Adapter) -> Result<()> {
    let downlevel = adapter.get_downlevel_capabilities();
    if !downlevel
        .flags
        .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
    {
        return Err(FluidError::Unsupported(
            "adapter does not support compute shaders".into(),
        ));
    }
    let format = adapter.get_texture_format_features(FIELD_FORMAT);
    if !format
        .allowed_usages
        .contains(TextureUsages::STORAGE_BINDING | TextureUsages::TEXTURE_BINDING)
    {
        return Err(FluidError::Unsupported(format!(
            "{FIELD_FORMAT:?} cannot be used as a storage texture"
        )));
    }
    if !format.flags.contains(TextureFormatFeatureFlags::FILTERABLE) {
        return Err(FluidError::Unsupported(format!(
            "{FIELD_FORMAT:?} is not filterable"
        )));
    }
    Ok(())
}

impl GpuBackend {
    /// Acquire a device that can present to `target` and allocate fields for
    /// `grid`. `extent` is the initial swapchain size in physical pixels.
    pub async fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        extent: (u32, u32),
        grid: GridSize,
    ) -> Result<Self> {
        let instance = Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(target)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await?;
        log::info!("Using adapter: {:?}", adapter.get_info());
        check_capabilities(&adapter)?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("fluid background device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults()
                    .using_resolution(adapter.limits()),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
                trace: wgpu::Trace::Off,
            })
            .await?;

        // Tone mapping applies gamma itself, so prefer a linear target.
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or(surface_caps.formats.first())
            .copied()
            .ok_or_else(|| FluidError::Unsupported("surface has no usable format".into()))?;
        let max_dimension = device.limits().max_texture_dimension_2d;

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: extent.0.clamp(1, max_dimension),
            height: extent.1.clamp(1, max_dimension),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let programs = Programs::new(&device, surface_format).await?;
        let arena = UniformArena::new(&device, programs.uniform_layout());
        let fields = FieldSet::new(&device, grid, max_dimension);

        Ok(Self {
            state: Some(GpuState {
                _instance: instance,
                surface,
                surface_config,
                max_dimension,
                encoding: Encoding {
                    device,
                    queue,
                    programs,
                    arena,
                    encoder: None,
                },
                fields,
            }),
            grid,
        })
    }

    pub fn is_released(&self) -> bool {
        self.state.is_none()
    }

    /// Current swapchain size, or `None` once released.
    pub fn surface_size(&self) -> Option<(u32, u32)> {
        self.state
            .as_ref()
            .map(|s| (s.surface_config.width, s.surface_config.height))
    }
}

impl PassBackend for GpuBackend {
    fn grid(&self) -> GridSize {
        self.grid
    }

    fn curl(&mut self) {
        let Some(s) = self.state.as_mut() else { return };
        let f = &s.fields;
        let uniforms = PassUniforms {
            texel: f.curl.texel_size(),
            ..Default::default()
        };
        s.encoding
            .dispatch(Pass::Curl, uniforms, &[f.velocity.read().view()], &f.curl);
    }

    fn vorticity(&mut self, curl_strength: f32, dt: f32) {
        let Some(s) = self.state.as_mut() else { return };
        let f = &mut s.fields;
        let (read, write) = f.velocity.split();
        let uniforms = PassUniforms {
            texel: read.texel_size(),
            curl: curl_strength,
            dt,
            ..Default::default()
        };
        s.encoding.dispatch(
            Pass::Vorticity,
            uniforms,
            &[read.view(), f.curl.view()],
            write,
        );
        f.velocity.swap();
    }

    fn divergence(&mut self) {
        let Some(s) = self.state.as_mut() else { return };
        let f = &s.fields;
        let uniforms = PassUniforms {
            texel: f.divergence.texel_size(),
            ..Default::default()
        };
        s.encoding.dispatch(
            Pass::Divergence,
            uniforms,
            &[f.velocity.read().view()],
            &f.divergence,
        );
    }

    fn clear_pressure(&mut self, factor: f32) {
        let Some(s) = self.state.as_mut() else { return };
        let f = &mut s.fields;
        let (read, write) = f.pressure.split();
        let uniforms = PassUniforms {
            texel: read.texel_size(),
            factor,
            ..Default::default()
        };
        s.encoding
            .dispatch(Pass::Clear, uniforms, &[read.view()], write);
        f.pressure.swap();
    }

    fn jacobi(&mut self) {
        let Some(s) = self.state.as_mut() else { return };
        let f = &mut s.fields;
        let (read, write) = f.pressure.split();
        let uniforms = PassUniforms {
            texel: read.texel_size(),
            ..Default::default()
        };
        s.encoding.dispatch(
            Pass::Jacobi,
            uniforms,
            &[read.view(), f.divergence.view()],
            write,
        );
        f.pressure.swap();
    }

    fn subtract_gradient(&mut self) {
        let Some(s) = self.state.as_mut() else { return };
        let f = &mut s.fields;
        let (read, write) = f.velocity.split();
        let uniforms = PassUniforms {
            texel: read.texel_size(),
            ..Default::default()
        };
        s.encoding.dispatch(
            Pass::Gradient,
            uniforms,
            &[f.pressure.read().view(), read.view()],
            write,
        );
        f.velocity.swap();
    }

    fn advect_velocity(&mut self, dt: f32, dissipation: f32) {
        let Some(s) = self.state.as_mut() else { return };
        let f = &mut s.fields;
        let (read, write) = f.velocity.split();
        let uniforms = PassUniforms {
            texel: read.texel_size(),
            dt,
            dissipation,
            ..Default::default()
        };
        s.encoding.dispatch(
            Pass::Advect,
            uniforms,
            &[read.view(), read.view()],
            write,
        );
        f.velocity.swap();
    }

    fn advect_dye(&mut self, dt: f32, dissipation: f32) {
        let Some(s) = self.state.as_mut() else { return };
        let f = &mut s.fields;
        let velocity = f.velocity.read();
        let (read, write) = f.dye.split();
        let uniforms = PassUniforms {
            texel: velocity.texel_size(),
            dt,
            dissipation,
            ..Default::default()
        };
        s.encoding.dispatch(
            Pass::Advect,
            uniforms,
            &[velocity.view(), read.view()],
            write,
        );
        f.dye.swap();
    }

    fn splat(
        &mut self,
        target: SplatTarget,
        point: [f32; 2],
        payload: [f32; 3],
        radius: f32,
        aspect_ratio: f32,
    ) {
        let Some(s) = self.state.as_mut() else { return };
        let buffer = match target {
            SplatTarget::Velocity => &mut s.fields.velocity,
            SplatTarget::Dye => &mut s.fields.dye,
        };
        let (read, write) = buffer.split();
        let uniforms = PassUniforms {
            texel: read.texel_size(),
            point,
            payload: [payload[0], payload[1], payload[2], 0.0],
            radius,
            aspect_ratio,
            ..Default::default()
        };
        s.encoding
            .dispatch(Pass::Splat, uniforms, &[read.view()], write);
        buffer.swap();
    }

    fn display(&mut self, params: &DisplayParams) -> Result<()> {
        let Some(s) = self.state.as_mut() else {
            return Ok(());
        };

        let output = match s.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost or outdated, reconfiguring");
                s.surface
                    .configure(&s.encoding.device, &s.surface_config);
                s.encoding.submit();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("timed out acquiring surface texture, skipping frame");
                s.encoding.submit();
                return Ok(());
            }
            Err(err) => {
                s.encoding.submit();
                return Err(err.into());
            }
        };
        let view = output
            .texture
            .create_view(&TextureViewDescriptor::default());

        let dye = s.fields.dye.read();
        let uniforms = PassUniforms {
            texel: dye.texel_size(),
            bloom: params.bloom_intensity,
            gamma: params.gamma,
            ..Default::default()
        };
        s.encoding.draw_display(uniforms, dye.view(), &view);

        s.encoding.submit();
        output.present();
        Ok(())
    }

    fn reallocate(&mut self, grid: GridSize) {
        let Some(s) = self.state.as_mut() else { return };
        self.grid = grid;
        // Recorded passes keep the old textures alive until they run.
        s.fields = FieldSet::new(&s.encoding.device, grid, s.max_dimension);
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        let Some(s) = self.state.as_mut() else { return };
        s.surface_config.width = width.clamp(1, s.max_dimension);
        s.surface_config.height = height.clamp(1, s.max_dimension);
        s.surface
            .configure(&s.encoding.device, &s.surface_config);
    }

    fn release(&mut self) {
        let Some(mut s) = self.state.take() else { return };
        // Nothing recorded may reference the textures once they are destroyed.
        s.encoding.encoder = None;
        s.fields.destroy();
        log::debug!("GPU fields and programs released");
    }
}

impl Session<GpuBackend> {
    /// Acquire the GPU, allocate fields for the device profile and return a
    /// session ready to tick. Fails without side effects if the adapter lacks
    /// a required capability.
    pub async fn mount(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        hint: DeviceHint,
        surface: SurfaceSize,
        config: FluidConfig,
        rng: fastrand::Rng,
    ) -> Result<Self> {
        let profile = DeviceProfile::select(hint);
        let grid = grid_for(&profile, surface.aspect_ratio());
        let backend = GpuBackend::new(target, surface.extent(), grid).await?;
        Ok(Session::new(backend, profile, surface, config, rng))
    }
}

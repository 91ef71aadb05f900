use std::sync::Arc;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
#[cfg(target_arch = "wasm32")]
use web_sys::HtmlCanvasElement;
use winit::{
    event::{ElementState, MouseButton, TouchPhase, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::{Key, NamedKey},
    window::{Window, WindowAttributes},
};

#[cfg(target_arch = "wasm32")]
use winit::platform::web::WindowAttributesExtWebSys;

pub mod error;
pub mod gpu;
pub mod rendering;
pub mod session;
pub mod sim;
pub mod util;

pub use error::{FluidError, Result};
pub use session::Session;

use crate::{
    gpu::GpuBackend,
    rendering::SurfaceSize,
    sim::{
        config::FluidConfig,
        input::{InputController, InputHandle},
        profile::DeviceHint,
        scheduler::TickOutcome,
    },
};

/// Message type for GPU session events
pub enum AppEvent {
    Mounted(Session<GpuBackend>),
    Failed(FluidError),
}

/// Native and winit-on-web host: one window, one fluid session.
pub struct FluidApp {
    proxy: Option<EventLoopProxy<AppEvent>>,
    window: Option<Arc<Window>>,
    session: Option<Session<GpuBackend>>,
    input: Option<InputHandle>,
    hint: DeviceHint,
    config: FluidConfig,
    cursor: (f32, f32),
    /// The touch currently driving the pointer; other fingers are ignored.
    touch: Option<u64>,
}

/// Window pixels are used as-is on this host, so the swapchain always
/// matches the window.
fn window_surface(window: &Window) -> SurfaceSize {
    let size = window.inner_size();
    SurfaceSize::new(size.width as f64, size.height as f64, 1.0)
}

impl FluidApp {
    pub fn new(event_loop: &EventLoop<AppEvent>, hint: DeviceHint, config: FluidConfig) -> Self {
        Self {
            proxy: Some(event_loop.create_proxy()),
            window: None,
            session: None,
            input: None,
            hint,
            config,
            cursor: (0.0, 0.0),
            touch: None,
        }
    }

    fn request_redraw(&mut self) {
        if let (Some(session), Some(window)) = (self.session.as_mut(), self.window.as_ref()) {
            if session.schedule() {
                window.request_redraw();
            }
        }
    }

    fn teardown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut session) = self.session.take() {
            session.teardown();
        }
        self.input = None;
        event_loop.exit();
    }

    fn on_touch(&mut self, id: u64, phase: TouchPhase, x: f32, y: f32) {
        let Some(input) = self.input.as_ref() else { return };
        match phase {
            TouchPhase::Started if self.touch.is_none() => {
                self.touch = Some(id);
                input.on_down(x, y);
            }
            TouchPhase::Moved if self.touch == Some(id) => input.on_move(x, y),
            TouchPhase::Ended if self.touch == Some(id) => {
                self.touch = None;
                input.on_up();
            }
            TouchPhase::Cancelled if self.touch == Some(id) => {
                self.touch = None;
                input.on_cancel();
            }
            _ => {}
        }
    }

    fn create_window(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<Arc<Window>> {
        #[allow(unused_mut)]
        let mut attrs = WindowAttributes::default().with_title("fluid background");

        #[cfg(target_arch = "wasm32")]
        {
            let dom_window = web_sys::window().ok_or_else(|| anyhow::anyhow!("no window"))?;
            let canvas: HtmlCanvasElement = dom_window
                .document()
                .ok_or_else(|| anyhow::anyhow!("no document"))?
                .get_element_by_id("fluid-surface")
                .ok_or_else(|| anyhow::anyhow!("no element with id `fluid-surface`"))?
                .dyn_into()
                .map_err(|_| anyhow::anyhow!("`fluid-surface` is not a canvas"))?;
            attrs = attrs.with_canvas(Some(canvas));
        }

        Ok(Arc::new(event_loop.create_window(attrs)?))
    }
}

impl winit::application::ApplicationHandler<AppEvent> for FluidApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let window = match self.create_window(event_loop) {
            Ok(window) => window,
            Err(e) => {
                log::error!("failed to create window: {e}");
                return;
            }
        };
        self.window = Some(window.clone());

        let Some(proxy) = self.proxy.take() else {
            return;
        };
        let surface = window_surface(&window);
        let mount = Session::mount(
            window,
            self.hint,
            surface,
            self.config,
            fastrand::Rng::new(),
        );

        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(async move {
            let event = match mount.await {
                Ok(session) => AppEvent::Mounted(session),
                Err(e) => AppEvent::Failed(e),
            };
            let _ = proxy.send_event(event);
        });

        #[cfg(not(target_arch = "wasm32"))]
        {
            // On native, use pollster to block on the future
            let event = match pollster::block_on(mount) {
                Ok(session) => AppEvent::Mounted(session),
                Err(e) => AppEvent::Failed(e),
            };
            let _ = proxy.send_event(event);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => self.teardown(event_loop),
            WindowEvent::Resized(_) => {
                let (Some(session), Some(window)) = (self.session.as_mut(), self.window.as_ref())
                else {
                    return;
                };
                if let Err(e) = session.resize(window_surface(window)) {
                    log::warn!("resize ignored: {e}");
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x as f32, position.y as f32);
                if let Some(input) = &self.input {
                    input.on_move(self.cursor.0, self.cursor.1);
                }
            }
            WindowEvent::CursorLeft { .. } => {
                if let Some(input) = &self.input {
                    input.on_cancel();
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                let Some(input) = &self.input else { return };
                match state {
                    ElementState::Pressed => input.on_down(self.cursor.0, self.cursor.1),
                    ElementState::Released => input.on_up(),
                }
            }
            WindowEvent::Touch(touch) => {
                let (x, y) = (touch.location.x as f32, touch.location.y as f32);
                self.on_touch(touch.id, touch.phase, x, y);
            }
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                match event.logical_key {
                    Key::Named(NamedKey::Space) => {
                        if let Some(session) = self.session.as_mut() {
                            session.toggle_pause();
                        }
                    }
                    Key::Named(NamedKey::Escape) => self.teardown(event_loop),
                    _ => {}
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                match session.tick(util::now_seconds()) {
                    Ok(TickOutcome::Continue) => self.request_redraw(),
                    Ok(TickOutcome::Stopped) => {}
                    Err(e) => {
                        log::error!("frame failed, shutting down: {e}");
                        self.teardown(event_loop);
                    }
                }
            }
            _ => (),
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            AppEvent::Mounted(session) => {
                log::info!("fluid session mounted");
                self.input = Some(session.input());
                self.session = Some(session);
                // Request first redraw to kick off the animation loop
                self.request_redraw();
            }
            AppEvent::Failed(e) => {
                log::error!("fluid background disabled: {e}");
                if cfg!(not(target_arch = "wasm32")) {
                    event_loop.exit();
                }
            }
        }
    }
}

/// Route `log` records to stderr with timestamps.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging(level: log::LevelFilter) -> std::result::Result<(), log::SetLoggerError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339_seconds(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("wgpu_core", log::LevelFilter::Warn)
        .level_for("wgpu_hal", log::LevelFilter::Warn)
        .chain(std::io::stderr())
        .apply()
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn initialize() {
    console_error_panic_hook::set_once();
    let _ = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {}] {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Debug)
        .level_for("wgpu_core", log::LevelFilter::Warn)
        .level_for("wgpu_hal", log::LevelFilter::Warn)
        .chain(fern::Output::call(console_log::log))
        .apply();
}

/// Open a window and run the fluid background until it is closed.
#[cfg(not(target_arch = "wasm32"))]
pub fn run(hint: DeviceHint, config: FluidConfig) -> anyhow::Result<()> {
    log::info!("Starting fluid background");
    let event_loop = EventLoop::<AppEvent>::with_user_event().build()?;
    let mut app = FluidApp::new(&event_loop, hint, config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Run the fluid background on the `fluid-surface` canvas through winit.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn start() -> std::result::Result<(), JsValue> {
    use winit::platform::web::EventLoopExtWebSys;

    log::info!("Starting fluid background");
    let event_loop = EventLoop::<AppEvent>::with_user_event()
        .build()
        .map_err(|e| JsValue::from_str(&format!("Failed to create event loop: {e}")))?;
    let app = FluidApp::new(&event_loop, DeviceHint::default(), FluidConfig::default());
    event_loop.spawn_app(app);
    Ok(())
}

/// A fluid background driven by the page.
///
/// Use this when the page owns the `requestAnimationFrame` loop and the
/// pointer listeners.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub struct FluidBackground {
    session: Session<GpuBackend>,
    input: InputHandle,
    canvas: HtmlCanvasElement,
}

#[cfg(target_arch = "wasm32")]
fn size_canvas(canvas: &HtmlCanvasElement, surface: SurfaceSize) {
    let (width, height) = surface.extent();
    canvas.set_width(width);
    canvas.set_height(height);
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl FluidBackground {
    /// Mount on the canvas with id `canvas_id`. Rejects if the GPU cannot run
    /// the solver, in which case the page should leave the canvas blank.
    #[wasm_bindgen]
    pub async fn mount(
        canvas_id: &str,
        is_mobile: bool,
        is_touch: bool,
    ) -> std::result::Result<FluidBackground, JsValue> {
        let dom_window = web_sys::window().ok_or("No window")?;
        let canvas: HtmlCanvasElement = dom_window
            .document()
            .ok_or("No document")?
            .get_element_by_id(canvas_id)
            .ok_or("Canvas not found")?
            .dyn_into()
            .map_err(|_| "Element is not a canvas")?;

        let surface = SurfaceSize::new(
            canvas.client_width() as f64,
            canvas.client_height() as f64,
            dom_window.device_pixel_ratio(),
        );
        size_canvas(&canvas, surface);

        let seed = (js_sys::Math::random() * u64::MAX as f64) as u64;
        let session = Session::mount(
            wgpu::SurfaceTarget::Canvas(canvas.clone()),
            DeviceHint {
                is_mobile,
                is_touch,
            },
            surface,
            FluidConfig::default(),
            fastrand::Rng::with_seed(seed),
        )
        .await
        .map_err(|e| {
            log::error!("fluid background disabled: {e}");
            JsValue::from_str(&e.to_string())
        })?;
        let input = session.input();

        Ok(Self {
            session,
            input,
            canvas,
        })
    }

    /// Pointer coordinates are CSS pixels relative to the canvas.
    #[wasm_bindgen]
    pub fn pointer_down(&self, x: f32, y: f32) {
        self.input.on_down(x, y);
    }

    #[wasm_bindgen]
    pub fn pointer_move(&self, x: f32, y: f32) {
        self.input.on_move(x, y);
    }

    #[wasm_bindgen]
    pub fn pointer_up(&self) {
        self.input.on_up();
    }

    #[wasm_bindgen]
    pub fn pointer_cancel(&self) {
        self.input.on_cancel();
    }

    /// Apply a new CSS size and device pixel ratio.
    #[wasm_bindgen]
    pub fn resize(
        &mut self,
        width: f64,
        height: f64,
        device_pixel_ratio: f64,
    ) -> std::result::Result<(), JsValue> {
        let surface = SurfaceSize::new(width, height, device_pixel_ratio);
        if !surface.is_empty() {
            size_canvas(&self.canvas, surface);
        }
        self.session
            .resize(surface)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Run one frame. `now` is the `requestAnimationFrame` timestamp in
    /// milliseconds. Returns whether another frame should be requested.
    #[wasm_bindgen]
    pub fn tick(&mut self, now: f64) -> std::result::Result<bool, JsValue> {
        match self.session.tick(now / 1000.0) {
            Ok(TickOutcome::Continue) => Ok(self.session.schedule()),
            Ok(TickOutcome::Stopped) => Ok(false),
            Err(e) => {
                log::error!("frame failed, tearing down: {e}");
                self.session.teardown();
                Err(JsValue::from_str(&e.to_string()))
            }
        }
    }

    #[wasm_bindgen]
    pub fn toggle_pause(&mut self) {
        self.session.toggle_pause();
    }

    #[wasm_bindgen]
    pub fn pause(&mut self) {
        self.session.pause();
    }

    #[wasm_bindgen]
    pub fn resume(&mut self) {
        self.session.resume();
    }

    #[wasm_bindgen]
    pub fn is_paused(&self) -> bool {
        self.session.state() == sim::scheduler::SchedulerState::Paused
    }

    #[wasm_bindgen]
    pub fn set_curl(&mut self, curl: f32) {
        self.update_config(|c| c.curl = curl);
    }

    #[wasm_bindgen]
    pub fn set_pressure_iterations(&mut self, iterations: u32) {
        self.update_config(|c| c.pressure_iterations = iterations);
    }

    #[wasm_bindgen]
    pub fn set_bloom_intensity(&mut self, intensity: f32) {
        self.update_config(|c| c.bloom_intensity = intensity);
    }

    #[wasm_bindgen]
    pub fn set_dissipation(&mut self, velocity: f32, density: f32) {
        self.update_config(|c| {
            c.velocity_dissipation = velocity;
            c.density_dissipation = density;
        });
    }

    /// Frames simulated so far.
    #[wasm_bindgen]
    pub fn frames(&self) -> f64 {
        self.session.stats().frames as f64
    }

    /// Stop and release every GPU resource. Safe to call repeatedly.
    #[wasm_bindgen]
    pub fn teardown(&mut self) {
        self.session.teardown();
    }

    fn update_config<F: FnOnce(&mut FluidConfig)>(&mut self, f: F) {
        let mut config = *self.session.config();
        f(&mut config);
        self.session.set_config(config);
    }
}

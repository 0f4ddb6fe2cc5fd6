use std::sync::Arc;
use std::time::Instant;

use swirl::render::Context;
use swirl::{request_context, Capabilities, PointerEvent, Problem, Settings, Swirl};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, MouseButton, TouchPhase, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

const BURST_SIZE: u32 = 12;

struct App {
    settings: Settings,
    start: Instant,
    state: Option<State>,
}

struct State {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    context: Context,
    swirl: Swirl,
    cursor: (f32, f32),
    captures: u32,
}

impl App {
    fn new(settings: Settings) -> Self {
        Self {
            settings,
            start: Instant::now(),
            state: None,
        }
    }

    fn timestamp(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl State {
    async fn new(window: Arc<Window>, settings: &Settings) -> Result<Self, Problem> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(Arc::clone(&window))
            .map_err(|err| Problem::PlatformUnsupported(err.to_string()))?;

        let context = request_context(&instance, Some(&surface)).await?;
        let capabilities = Capabilities::probe(&context.adapter, &context.device).await?;

        let size = window.inner_size();
        let config = surface_config(&surface, &context.adapter, size.width, size.height, settings)?;
        surface.configure(&context.device, &config);
        log::debug!("Surface format: {:?}", config.format);

        let swirl = Swirl::new(
            &context.device,
            &capabilities,
            config.format,
            config.width,
            config.height,
            settings,
        )
        .await;

        Ok(Self {
            window,
            surface,
            config,
            context,
            swirl,
            cursor: (0.0, 0.0),
            captures: 0,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.context.device, &self.config);
        self.swirl.resize(width, height);
    }

    fn render(&mut self, timestamp: f64) -> Result<(), wgpu::SurfaceError> {
        let frame = self.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("swirl:render"),
                });

        self.swirl
            .animate(&self.context.device, &mut encoder, &view, timestamp);

        self.context.queue.submit(Some(encoder.finish()));
        self.window.pre_present_notify();
        frame.present();
        Ok(())
    }

    fn save_capture(&mut self) {
        let image = match pollster::block_on(
            self.swirl
                .capture(&self.context.device, &self.context.queue),
        ) {
            Ok(image) => image,
            Err(err) => {
                log::error!("Capture failed: {}", err);
                return;
            }
        };

        self.captures += 1;
        let path = format!("swirl-{:03}.png", self.captures);
        match image.save(&path) {
            Ok(()) => log::info!("📸 Saved {}", path),
            Err(err) => log::error!("Failed to save {}: {}", path, err),
        }
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: &Key) {
        match key {
            Key::Named(NamedKey::Escape) => event_loop.exit(),
            Key::Named(NamedKey::Space) => self.swirl.random_splats(BURST_SIZE),
            Key::Character(c) if c.eq_ignore_ascii_case("p") => {
                let paused = !self.swirl.is_paused();
                log::info!("{}", if paused { "⏸️ Paused" } else { "▶️ Resumed" });
                self.swirl.set_paused(paused);
            }
            Key::Character(c) if c.eq_ignore_ascii_case("c") => self.save_capture(),
            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title("Swirl")
            .with_inner_size(LogicalSize::new(1280, 800))
            .with_transparent(self.settings.transparent);

        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("Failed to create a window: {}", err);
                event_loop.exit();
                return;
            }
        };

        match pollster::block_on(State::new(window, &self.settings)) {
            Ok(state) => {
                state.window.request_redraw();
                self.state = Some(state);
            }
            Err(err) => {
                log::error!("{}", err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let timestamp = self.timestamp();
        let Some(state) = self.state.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::Resized(size) => state.resize(size.width, size.height),

            WindowEvent::CursorMoved { position, .. } => {
                let (x, y) = (position.x as f32, position.y as f32);
                state.cursor = (x, y);
                state.swirl.handle_pointer(
                    PointerEvent::Move {
                        id: swirl::PRIMARY_POINTER_ID,
                        x,
                        y,
                    },
                    timestamp,
                );
            }

            WindowEvent::MouseInput {
                state: button_state,
                button: MouseButton::Left,
                ..
            } => {
                let id = swirl::PRIMARY_POINTER_ID;
                let (x, y) = state.cursor;
                let event = match button_state {
                    ElementState::Pressed => PointerEvent::Down { id, x, y },
                    ElementState::Released => PointerEvent::Up { id },
                };
                state.swirl.handle_pointer(event, timestamp);
            }

            WindowEvent::Touch(touch) => {
                let id = touch.id as i64;
                let (x, y) = (touch.location.x as f32, touch.location.y as f32);
                let event = match touch.phase {
                    TouchPhase::Started => PointerEvent::Down { id, x, y },
                    TouchPhase::Moved => PointerEvent::Move { id, x, y },
                    TouchPhase::Ended | TouchPhase::Cancelled => PointerEvent::Up { id },
                };
                state.swirl.handle_pointer(event, timestamp);
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => state.handle_key(event_loop, &logical_key),

            WindowEvent::RedrawRequested => match state.render(timestamp) {
                Ok(()) => {}
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    let size = state.window.inner_size();
                    state.resize(size.width, size.height);
                }
                Err(wgpu::SurfaceError::OutOfMemory) => {
                    log::error!("Out of GPU memory");
                    event_loop.exit();
                }
                Err(err) => log::warn!("Skipping frame: {}", err),
            },

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = self.state.as_ref() {
            state.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = self.state.take() {
            state.swirl.destroy();
        }
    }
}

fn surface_config(
    surface: &wgpu::Surface,
    adapter: &wgpu::Adapter,
    width: u32,
    height: u32,
    settings: &Settings,
) -> Result<wgpu::SurfaceConfiguration, Problem> {
    let capabilities = surface.get_capabilities(adapter);

    // The display pass writes linear values, so skip sRGB encodings when we can.
    let format = capabilities
        .formats
        .iter()
        .copied()
        .find(|format| !format.is_srgb())
        .or_else(|| capabilities.formats.first().copied())
        .ok_or_else(|| Problem::PlatformUnsupported("the surface has no formats".to_string()))?;

    let alpha_mode = if settings.transparent
        && capabilities
            .alpha_modes
            .contains(&wgpu::CompositeAlphaMode::PreMultiplied)
    {
        wgpu::CompositeAlphaMode::PreMultiplied
    } else {
        capabilities
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto)
    };

    Ok(wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: width.max(1),
        height: height.max(1),
        present_mode: wgpu::PresentMode::AutoVsync,
        desired_maximum_frame_latency: 2,
        alpha_mode,
        view_formats: vec![],
    })
}

fn load_settings() -> Settings {
    let Some(path) = std::env::args().nth(1) else {
        return Settings::default();
    };

    let parsed = std::fs::read_to_string(&path)
        .map_err(|err| err.to_string())
        .and_then(|json| serde_json::from_str(&json).map_err(|err| err.to_string()));

    match parsed {
        Ok(settings) => {
            log::info!("📄 Loaded settings from {}", path);
            settings
        }
        Err(err) => {
            log::warn!("Failed to load {}: {}. Using the defaults.", path, err);
            Settings::default()
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = load_settings();

    let event_loop = EventLoop::new().expect("Failed to create an event loop");
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(settings);
    event_loop.run_app(&mut app).expect("Event loop failed");
}

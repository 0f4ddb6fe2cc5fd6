use crate::clock::{ColorTimer, FrameClock};
use crate::grid::{self, Resolution};
use crate::pointer::{PointerEvent, PointerTracker, Splat};
use crate::render::{self, display, Capabilities, Framebuffer};
use crate::settings::Settings;
use crate::rng;

#[derive(Debug, thiserror::Error)]
pub enum Problem {
    #[error("No usable GPU: {0}")]
    PlatformUnsupported(String),
    #[error("Failed to open the GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("No renderable texture format with {channels} channel(s)")]
    NoRenderTargetFormat { channels: u32 },
    #[error("Failed to read back a texture: {0}")]
    Readback(String),
}

/// What the last call to [`Swirl::animate`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub passes: u32,
    pub splats: u32,
}

pub struct Swirl {
    settings: Settings,
    surface_format: wgpu::TextureFormat,

    fluid: render::fluid::Context,
    display: display::Context,
    pointers: PointerTracker,
    queued_splats: Vec<Splat>,

    clock: FrameClock,
    color_timer: ColorTimer,
    paused: bool,

    // Size the fields were last allocated for, and the latest size reported
    // by the host. Both in device pixels.
    size: (u32, u32),
    pending_size: (u32, u32),

    stats: FrameStats,
}

impl Swirl {
    pub async fn new(
        device: &wgpu::Device,
        capabilities: &Capabilities,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        settings: &Settings,
    ) -> Swirl {
        log::info!("✨ Initialising Swirl");

        rng::init_from_seed(&settings.seed);

        let size = grid::clamp_surface_size(width, height);
        log::info!("📏 Physical size: {}x{}", size.0, size.1);

        let settings = settings.effective(capabilities);
        let fluid = render::fluid::Context::new(device, capabilities, &settings, size.0, size.1).await;
        let display =
            display::Context::new(device, capabilities, surface_format, settings.shading).await;
        let pointers = PointerTracker::new((&settings).into());

        Swirl {
            settings,
            surface_format,
            fluid,
            display,
            pointers,
            queued_splats: Vec::new(),
            clock: FrameClock::new(),
            color_timer: ColorTimer::default(),
            paused: false,
            size,
            pending_size: size,
            stats: FrameStats::default(),
        }
    }

    /// The settings in effect after adapting to the device.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn velocity(&self) -> &Framebuffer {
        self.fluid.velocity()
    }

    pub fn dye(&self) -> &Framebuffer {
        self.fluid.dye()
    }

    pub fn pointers(&self) -> &PointerTracker {
        &self.pointers
    }

    /// `timestamp` is in milliseconds, on the same clock as [`Swirl::animate`].
    pub fn handle_pointer(&mut self, event: PointerEvent, timestamp: f64) {
        let (width, height) = self.pending_size;
        self.pointers.handle(event, timestamp, width, height);
    }

    /// Record the new surface size. The fields are reallocated on the next
    /// frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.pending_size = grid::clamp_surface_size(width, height);
    }

    pub fn splat(&mut self, splat: Splat) {
        self.queued_splats.push(splat);
    }

    pub fn random_splats(&mut self, count: u32) {
        self.queued_splats
            .extend(render::fluid::random_splats(count));
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Record one frame into `encoder`, ending with the dye composited onto
    /// `view`. The caller submits.
    pub fn animate(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        timestamp: f64,
    ) {
        let timestep = self.clock.tick(timestamp);
        let mut frame = render::Frame::new(device, encoder);

        if self.size != self.pending_size {
            let (width, height) = self.pending_size;
            log::debug!("📐 Resizing to {}x{}", width, height);
            self.fluid.resize(&mut frame, width, height);
            self.size = self.pending_size;
        }

        if self
            .color_timer
            .advance(timestep, self.settings.color_update_speed)
        {
            self.pointers.recolor();
        }

        let mut splats = std::mem::take(&mut self.queued_splats);
        splats.extend(self.pointers.drain());

        if !self.paused {
            self.fluid.step(&mut frame, timestep);
        }

        for splat in splats.iter() {
            self.fluid.splat(&mut frame, splat);
        }

        let (width, height) = self.size;
        self.display.render(
            &mut frame,
            view,
            self.surface_format,
            Resolution { width, height },
            self.settings.back_color.to_wgpu(self.settings.transparent),
            self.fluid.dye(),
        );

        self.stats = FrameStats {
            passes: frame.passes,
            splats: splats.len() as u32,
        };
        log::trace!(
            "Frame at {:.1}ms: dt {:.4}s, {} passes, {} splats",
            timestamp,
            timestep,
            self.stats.passes,
            self.stats.splats
        );
    }

    /// Render the current dye at `capture_resolution` and read it back.
    pub async fn capture(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<image::RgbaImage, Problem> {
        let (width, height) = self.size;
        let resolution = render::framebuffer::allocatable(
            device,
            Resolution::new(self.settings.capture_resolution, width, height),
        );
        let target = Framebuffer::new(
            device,
            "capture",
            resolution,
            display::CAPTURE_FORMAT,
            wgpu::FilterMode::Nearest,
        );

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("swirl::capture"),
        });
        {
            let mut frame = render::Frame::new(device, &mut encoder);
            let view = target.target().view;
            self.display.render(
                &mut frame,
                view,
                display::CAPTURE_FORMAT,
                resolution,
                self.settings.back_color.to_wgpu(self.settings.transparent),
                self.fluid.dye(),
            );
        }
        queue.submit(Some(encoder.finish()));

        let pixels = target.read_pixels(device, queue).await?;
        target.destroy();

        let bytes = pixels
            .iter()
            .map(|value| (value.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();

        image::RgbaImage::from_raw(resolution.width, resolution.height, bytes)
            .ok_or_else(|| Problem::Readback("capture has the wrong size".to_string()))
    }

    /// Free every GPU texture. Nothing may be rendered afterwards.
    pub fn destroy(self) {
        log::info!("🧹 Releasing Swirl");
        self.fluid.destroy();
    }
}

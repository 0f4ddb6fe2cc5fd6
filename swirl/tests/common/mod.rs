//! Headless harness for driving a full simulation without a window.

#![allow(dead_code)]

use swirl::grid::Resolution;
use swirl::render::{Capabilities, Context, Framebuffer};
use swirl::{request_context, Settings, Swirl};

pub const SURFACE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub struct Harness {
    pub context: Context,
    pub capabilities: Capabilities,
    pub swirl: Swirl,
    surface: Framebuffer,
}

impl Harness {
    /// Returns `None`, after saying why, when there's no GPU to run on.
    pub async fn new(width: u32, height: u32, settings: Settings) -> Option<Self> {
        Self::with_capabilities(width, height, settings, |_| {}).await
    }

    /// Like [`Harness::new`], but lets the test take features away from the
    /// adapter before the simulation sees it.
    pub async fn with_capabilities(
        width: u32,
        height: u32,
        settings: Settings,
        restrict: impl FnOnce(&mut Capabilities),
    ) -> Option<Self> {
        let _ = env_logger::builder().is_test(true).try_init();

        let instance = wgpu::Instance::default();
        let context = match request_context(&instance, None).await {
            Ok(context) => context,
            Err(err) => {
                eprintln!("Skipping GPU test: {}", err);
                return None;
            }
        };

        let mut capabilities = match Capabilities::probe(&context.adapter, &context.device).await {
            Ok(capabilities) => capabilities,
            Err(err) => {
                eprintln!("Skipping GPU test: {}", err);
                return None;
            }
        };
        restrict(&mut capabilities);

        let swirl = Swirl::new(
            &context.device,
            &capabilities,
            SURFACE_FORMAT,
            width,
            height,
            &settings,
        )
        .await;
        let surface = create_surface(&context.device, width, height);

        Some(Self {
            context,
            capabilities,
            swirl,
            surface,
        })
    }

    pub fn tick(&mut self, timestamp: f64) {
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("test:frame"),
            });
        let view = self.surface.target().view;
        self.swirl
            .animate(&self.context.device, &mut encoder, view, timestamp);
        self.context.queue.submit(Some(encoder.finish()));
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.swirl.resize(width, height);
        self.surface = create_surface(&self.context.device, width, height);
    }

    pub fn read(&self, framebuffer: &Framebuffer) -> Vec<f32> {
        pollster::block_on(framebuffer.read_pixels(&self.context.device, &self.context.queue))
            .expect("readback failed")
    }

    pub fn read_velocity(&self) -> Vec<f32> {
        self.read(self.swirl.velocity())
    }

    pub fn read_dye(&self) -> Vec<f32> {
        self.read(self.swirl.dye())
    }

    pub fn max_texture_dimension(&self) -> u32 {
        self.context.device.limits().max_texture_dimension_2d
    }
}

fn create_surface(device: &wgpu::Device, width: u32, height: u32) -> Framebuffer {
    Framebuffer::new(
        device,
        "surface",
        Resolution { width, height },
        SURFACE_FORMAT,
        wgpu::FilterMode::Nearest,
    )
}

/// The RGBA value at column `x` of row `row`, rows counted from the top.
pub fn texel(pixels: &[f32], width: u32, x: u32, row: u32) -> [f32; 4] {
    let index = 4 * (row * width + x) as usize;
    [
        pixels[index],
        pixels[index + 1],
        pixels[index + 2],
        pixels[index + 3],
    ]
}

/// Sum of the colour channels over the whole field.
pub fn mass(pixels: &[f32]) -> f64 {
    pixels
        .chunks_exact(4)
        .map(|texel| (texel[0] + texel[1] + texel[2]) as f64)
        .sum()
}

/// Column and row of the texel with the most red.
pub fn brightest_red(pixels: &[f32], width: u32) -> (u32, u32) {
    brightest(pixels, width, 0)
}

/// Column and row of the texel with the highest value in `channel`.
pub fn brightest(pixels: &[f32], width: u32, channel: usize) -> (u32, u32) {
    let (index, _) = pixels
        .chunks_exact(4)
        .enumerate()
        .fold((0, f32::MIN), |best, (index, texel)| {
            if texel[channel] > best.1 {
                (index, texel[channel])
            } else {
                best
            }
        });
    (index as u32 % width, index as u32 / width)
}

pub fn seeded(settings: Settings) -> Settings {
    Settings {
        seed: Some("swirl-tests".to_string()),
        ..settings
    }
}

use super::capabilities::Capabilities;
use super::framebuffer::{Framebuffer, TexelUniforms, Target};
use super::program::{Frame, Keywords, Material, ProgramDescriptor};
use crate::grid::Resolution;

/// Format of offscreen captures.
pub const CAPTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Composites the dye onto the surface.
pub struct Context {
    material: Material,
    shading: bool,
}

impl Context {
    pub async fn new(
        device: &wgpu::Device,
        capabilities: &Capabilities,
        surface_format: wgpu::TextureFormat,
        shading: bool,
    ) -> Self {
        let targets = [surface_format, CAPTURE_FORMAT];
        let descriptor = ProgramDescriptor {
            blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
            ..ProgramDescriptor::new(
                "display",
                include_str!("../../shader/display.wgsl"),
                1,
                &targets,
            )
        };

        let material = Material::compile(
            device,
            capabilities,
            &descriptor,
            &[Keywords::empty(), Keywords::SHADING],
            keywords_for(shading),
        )
        .await;

        Self { material, shading }
    }

    pub fn render(
        &mut self,
        frame: &mut Frame,
        view: &wgpu::TextureView,
        format: wgpu::TextureFormat,
        resolution: Resolution,
        background: wgpu::Color,
        dye: &Framebuffer,
    ) {
        if self.material.set_keywords(keywords_for(self.shading)) {
            log::debug!("Display variant is now {:?}", self.material.keywords());
        }

        self.material.blit(
            frame,
            Target {
                view,
                format,
                clear: background,
            },
            &TexelUniforms::new(resolution.texel_size()),
            &[dye],
        );
    }
}

fn keywords_for(shading: bool) -> Keywords {
    if shading {
        Keywords::SHADING
    } else {
        Keywords::empty()
    }
}

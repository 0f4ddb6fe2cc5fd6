//! Caps the dye left behind by advection.
//!
//! Backtracing through a stretching flow samples some texels more often than
//! others, so the advected field can hold more dye than it started with. The
//! limiter sums the dye before and after advection on the GPU, by repeatedly
//! folding 2x2 blocks into one texel, and scales the advected field down so
//! it never holds more than dissipation alone would leave.

use super::capabilities::Capabilities;
use super::framebuffer::{self, Framebuffer, TexelUniforms};
use super::program::{Frame, Keywords, Program, ProgramDescriptor};
use crate::grid::Resolution;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct LimitUniforms {
    texel_size: [f32; 2], // 0
    decay: f32,           // 8
    _padding: f32,        // 12
}

/// Sizes of the reduction chain for a field of `resolution`, ending at 1x1.
///
/// Each level holds half the sum of 2x2 blocks of the level above, so the
/// last one holds the total scaled by `2^-levels`. Only ratios between
/// totals of equally sized fields are ever used, so the scale cancels.
pub fn reduction_levels(resolution: Resolution) -> Vec<Resolution> {
    let mut levels = Vec::new();
    let mut size = resolution;
    loop {
        size = Resolution {
            width: size.width.div_ceil(2).max(1),
            height: size.height.div_ceil(2).max(1),
        };
        levels.push(size);
        if size.width == 1 && size.height == 1 {
            return levels;
        }
    }
}

/// Whether sums of `format` texels can be carried down the chain. Unorm
/// targets clamp at one, so they can't.
pub fn supports(format: wgpu::TextureFormat) -> bool {
    matches!(
        format,
        wgpu::TextureFormat::Rgba16Float | wgpu::TextureFormat::Rgba32Float
    )
}

pub struct MassLimiter {
    reduce: Program,
    limit: Program,
    format: wgpu::TextureFormat,
    resolution: Resolution,
    levels: Vec<Framebuffer>,
    before: Framebuffer,
    after: Framebuffer,
}

impl MassLimiter {
    /// `None` when the dye format can't hold the sums.
    pub async fn new(
        device: &wgpu::Device,
        capabilities: &Capabilities,
        resolution: Resolution,
    ) -> Option<Self> {
        let format = capabilities.formats.rgba;
        if !supports(format) {
            log::debug!("Dye is stored as {:?}; advection runs unlimited", format);
            return None;
        }

        let targets = [format];
        let reduce = ProgramDescriptor::new(
            "reduce",
            include_str!("../../shader/reduce.wgsl"),
            1,
            &targets,
        );
        let limit = ProgramDescriptor::new(
            "limit",
            include_str!("../../shader/limit.wgsl"),
            3,
            &targets,
        );

        let nearest = wgpu::FilterMode::Nearest;
        let resolution = framebuffer::allocatable(device, resolution);
        Some(Self {
            reduce: Program::new(device, capabilities, &reduce, Keywords::empty()).await,
            limit: Program::new(device, capabilities, &limit, Keywords::empty()).await,
            format,
            resolution,
            levels: chain(device, resolution, format),
            before: Framebuffer::new(device, "mass_before", unit(), format, nearest),
            after: Framebuffer::new(device, "mass_after", unit(), format, nearest),
        })
    }

    pub fn resize(&mut self, device: &wgpu::Device, resolution: Resolution) {
        let resolution = framebuffer::allocatable(device, resolution);
        if self.resolution == resolution {
            return;
        }

        // Dropped rather than destroyed: the last frame may still read them.
        self.levels = chain(device, resolution, self.format);
        self.resolution = resolution;
    }

    /// Remember how much dye `field` holds before it's advected.
    pub fn measure(&self, frame: &mut Frame, field: &Framebuffer) {
        self.total(frame, field, &self.before);
    }

    /// Scale `advected` into `target` so it holds no more than the measured
    /// dye divided by `decay`.
    pub fn limit(
        &self,
        frame: &mut Frame,
        advected: &Framebuffer,
        target: framebuffer::Target<'_>,
        decay: f32,
    ) {
        self.total(frame, advected, &self.after);
        self.limit.blit(
            frame,
            target,
            &LimitUniforms {
                texel_size: advected.texel_size(),
                decay,
                _padding: 0.0,
            },
            &[advected, &self.before, &self.after],
        );
    }

    fn total(&self, frame: &mut Frame, field: &Framebuffer, total: &Framebuffer) {
        let mut source = field;
        for level in self.levels.iter() {
            self.reduce.blit(
                frame,
                level.target(),
                &TexelUniforms::new(level.texel_size()),
                &[source],
            );
            source = level;
        }
        self.reduce.blit(
            frame,
            total.target(),
            &TexelUniforms::new(total.texel_size()),
            &[source],
        );
    }

    pub fn destroy(&self) {
        for level in self.levels.iter() {
            level.destroy();
        }
        self.before.destroy();
        self.after.destroy();
    }
}

fn unit() -> Resolution {
    Resolution {
        width: 1,
        height: 1,
    }
}

// Every level but the final 1x1, which is written into `before` or `after`.
fn chain(
    device: &wgpu::Device,
    resolution: Resolution,
    format: wgpu::TextureFormat,
) -> Vec<Framebuffer> {
    let mut sizes = reduction_levels(resolution);
    sizes.pop();
    sizes
        .into_iter()
        .enumerate()
        .map(|(index, size)| {
            Framebuffer::new(
                device,
                &format!("mass_{}", index),
                size,
                format,
                wgpu::FilterMode::Nearest,
            )
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn size(width: u32, height: u32) -> Resolution {
        Resolution { width, height }
    }

    #[test]
    fn odd_sizes_round_up_on_the_way_down() {
        assert_eq!(
            reduction_levels(size(5, 3)),
            vec![size(3, 2), size(2, 1), size(1, 1)]
        );
    }

    #[test]
    fn strips_keep_halving_the_long_side() {
        let levels = reduction_levels(size(256, 128));
        assert_eq!(levels.len(), 8);
        assert_eq!(levels[6], size(2, 1));
        assert_eq!(levels.last(), Some(&size(1, 1)));
    }

    #[test]
    fn single_texel_still_takes_one_pass() {
        assert_eq!(reduction_levels(size(1, 1)), vec![size(1, 1)]);
    }

    #[test]
    fn only_float_dye_is_limited() {
        assert!(supports(wgpu::TextureFormat::Rgba16Float));
        assert!(!supports(wgpu::TextureFormat::Rgba8Unorm));
    }

    #[test]
    fn limit_uniforms_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<LimitUniforms>(), 16);
    }
}

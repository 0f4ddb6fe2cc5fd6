use super::capabilities::Capabilities;
use super::framebuffer::{self, DoubleFramebuffer, Framebuffer, TexelUniforms};
use super::limiter::MassLimiter;
use super::program::{Frame, Keywords, Material, Program, ProgramDescriptor};
use crate::color;
use crate::grid::{self, Resolution};
use crate::pointer::Splat;
use crate::rng;
use crate::settings::Settings;

const RANDOM_SPLAT_FORCE: f32 = 1000.0;
const RANDOM_SPLAT_INTENSITY: f32 = 10.0;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct ClearUniforms {
    texel_size: [f32; 2], // 0
    value: f32,           // 8
    _padding: f32,        // 12
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct SplatUniforms {
    texel_size: [f32; 2], // 0
    point: [f32; 2],      // 8
    color: [f32; 3],      // 16
    radius: f32,          // 28
    aspect_ratio: f32,    // 32
    _padding: [f32; 3],   // 36
                          // roundUp(16, 36) = 48
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct AdvectionUniforms {
    texel_size: [f32; 2],        // 0
    source_texel_size: [f32; 2], // 8
    dt: f32,                     // 16
    dissipation: f32,            // 20
    _padding: [f32; 2],          // 24
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct VorticityUniforms {
    texel_size: [f32; 2], // 0
    curl: f32,            // 8
    dt: f32,              // 12
}

/// Every program the solver runs, compiled once.
pub struct Programs {
    pub copy: Program,
    clear: Program,
    splat: Program,
    curl: Program,
    vorticity: Program,
    divergence: Program,
    pressure: Program,
    gradient_subtract: Program,
    advection: Material,
}

impl Programs {
    pub async fn new(device: &wgpu::Device, capabilities: &Capabilities) -> Self {
        let formats = capabilities.formats;
        let fields = [formats.rg, formats.rgba];
        let scalars = [formats.r];
        let vectors = [formats.rg];

        let copy = ProgramDescriptor::new(
            "copy",
            include_str!("../../shader/copy.wgsl"),
            1,
            &fields,
        );
        let clear = ProgramDescriptor::new(
            "clear",
            include_str!("../../shader/clear.wgsl"),
            1,
            &scalars,
        );
        let splat = ProgramDescriptor::new(
            "splat",
            include_str!("../../shader/splat.wgsl"),
            1,
            &fields,
        );
        let curl = ProgramDescriptor::new(
            "curl",
            include_str!("../../shader/curl.wgsl"),
            1,
            &scalars,
        );
        let vorticity = ProgramDescriptor::new(
            "vorticity",
            include_str!("../../shader/vorticity.wgsl"),
            2,
            &vectors,
        );
        let divergence = ProgramDescriptor::new(
            "divergence",
            include_str!("../../shader/divergence.wgsl"),
            1,
            &scalars,
        );
        let pressure = ProgramDescriptor::new(
            "pressure",
            include_str!("../../shader/pressure.wgsl"),
            2,
            &scalars,
        );
        let gradient_subtract = ProgramDescriptor::new(
            "gradient_subtract",
            include_str!("../../shader/gradient_subtract.wgsl"),
            2,
            &vectors,
        );
        let advection = ProgramDescriptor::new(
            "advection",
            include_str!("../../shader/advection.wgsl"),
            2,
            &fields,
        );

        let filtering = if capabilities.linear_filtering {
            Keywords::empty()
        } else {
            Keywords::MANUAL_FILTERING
        };

        Self {
            copy: Program::new(device, capabilities, &copy, Keywords::empty()).await,
            clear: Program::new(device, capabilities, &clear, Keywords::empty()).await,
            splat: Program::new(device, capabilities, &splat, Keywords::empty()).await,
            curl: Program::new(device, capabilities, &curl, Keywords::empty()).await,
            vorticity: Program::new(device, capabilities, &vorticity, Keywords::empty()).await,
            divergence: Program::new(device, capabilities, &divergence, Keywords::empty()).await,
            pressure: Program::new(device, capabilities, &pressure, Keywords::empty()).await,
            gradient_subtract: Program::new(device, capabilities, &gradient_subtract, Keywords::empty())
                .await,
            advection: Material::compile(
                device,
                capabilities,
                &advection,
                &[Keywords::empty(), Keywords::MANUAL_FILTERING],
                filtering,
            )
            .await,
        }
    }
}

/// The simulation fields and the passes that evolve them.
pub struct Context {
    settings: Settings,
    capabilities: Capabilities,
    programs: Programs,
    aspect_ratio: f32,

    velocity: DoubleFramebuffer,
    dye: DoubleFramebuffer,
    divergence: Framebuffer,
    curl: Framebuffer,
    pressure: DoubleFramebuffer,
    limiter: Option<MassLimiter>,
}

impl Context {
    pub async fn new(
        device: &wgpu::Device,
        capabilities: &Capabilities,
        settings: &Settings,
        width: u32,
        height: u32,
    ) -> Self {
        let programs = Programs::new(device, capabilities).await;
        let formats = capabilities.formats;
        let filter = capabilities.linear_filter();

        let sim_resolution = framebuffer::allocatable(
            device,
            Resolution::new(settings.sim_resolution, width, height),
        );
        let dye_resolution = framebuffer::allocatable(
            device,
            Resolution::new(settings.dye_resolution, width, height),
        );
        log::debug!(
            "📐 Simulation {}x{}, dye {}x{}",
            sim_resolution.width,
            sim_resolution.height,
            dye_resolution.width,
            dye_resolution.height
        );

        let (divergence, curl, pressure) = scalar_fields(device, capabilities, sim_resolution);
        let limiter = MassLimiter::new(device, capabilities, dye_resolution).await;

        Self {
            settings: settings.clone(),
            capabilities: *capabilities,
            programs,
            aspect_ratio: grid::aspect_ratio(width, height),
            velocity: DoubleFramebuffer::create(device, "velocity", sim_resolution, formats.rg, filter),
            dye: DoubleFramebuffer::create(device, "dye", dye_resolution, formats.rgba, filter),
            divergence,
            curl,
            pressure,
            limiter,
        }
    }

    pub fn velocity(&self) -> &Framebuffer {
        self.velocity.read()
    }

    pub fn dye(&self) -> &Framebuffer {
        self.dye.read()
    }

    /// Reallocate every field for a surface of `width`x`height`. Velocity
    /// and dye keep their contents.
    pub fn resize(&mut self, frame: &mut Frame, width: u32, height: u32) {
        let sim_resolution = framebuffer::allocatable(
            frame.device,
            Resolution::new(self.settings.sim_resolution, width, height),
        );
        let dye_resolution = framebuffer::allocatable(
            frame.device,
            Resolution::new(self.settings.dye_resolution, width, height),
        );
        self.aspect_ratio = grid::aspect_ratio(width, height);

        self.velocity.resize(frame, &self.programs.copy, sim_resolution);
        self.dye.resize(frame, &self.programs.copy, dye_resolution);
        if let Some(limiter) = &mut self.limiter {
            limiter.resize(frame.device, dye_resolution);
        }

        if self.divergence.resolution() != sim_resolution {
            let (divergence, curl, pressure) =
                scalar_fields(frame.device, &self.capabilities, sim_resolution);
            self.divergence = divergence;
            self.curl = curl;
            self.pressure = pressure;
        }
    }

    /// Advance the fluid by `dt` seconds.
    pub fn step(&mut self, frame: &mut Frame, dt: f32) {
        let texel_size = self.velocity.read().texel_size();
        let texel_uniforms = TexelUniforms::new(texel_size);

        self.programs.curl.blit(
            frame,
            self.curl.target(),
            &texel_uniforms,
            &[self.velocity.read()],
        );

        let (velocity, target) = self.velocity.ping_pong();
        self.programs.vorticity.blit(
            frame,
            target,
            &VorticityUniforms {
                texel_size,
                curl: self.settings.curl,
                dt,
            },
            &[velocity, &self.curl],
        );
        self.velocity.swap();

        self.programs.divergence.blit(
            frame,
            self.divergence.target(),
            &texel_uniforms,
            &[self.velocity.read()],
        );

        // Warm start from a damped copy of the last solution.
        let (pressure, target) = self.pressure.ping_pong();
        self.programs.clear.blit(
            frame,
            target,
            &ClearUniforms {
                texel_size,
                value: self.settings.pressure,
                _padding: 0.0,
            },
            &[pressure],
        );
        self.pressure.swap();

        for _ in 0..self.settings.pressure_iterations {
            let (pressure, target) = self.pressure.ping_pong();
            self.programs.pressure.blit(
                frame,
                target,
                &texel_uniforms,
                &[pressure, &self.divergence],
            );
            self.pressure.swap();
        }

        let (velocity, target) = self.velocity.ping_pong();
        self.programs.gradient_subtract.blit(
            frame,
            target,
            &texel_uniforms,
            &[self.pressure.read(), velocity],
        );
        self.velocity.swap();

        let (velocity, target) = self.velocity.ping_pong();
        self.programs.advection.blit(
            frame,
            target,
            &AdvectionUniforms {
                texel_size,
                source_texel_size: texel_size,
                dt,
                dissipation: self.settings.velocity_dissipation,
                _padding: [0.0; 2],
            },
            &[velocity, velocity],
        );
        self.velocity.swap();

        if let Some(limiter) = &self.limiter {
            limiter.measure(frame, self.dye.read());
        }

        let (dye, target) = self.dye.ping_pong();
        self.programs.advection.blit(
            frame,
            target,
            &AdvectionUniforms {
                texel_size,
                source_texel_size: dye.texel_size(),
                dt,
                dissipation: self.settings.density_dissipation,
                _padding: [0.0; 2],
            },
            &[self.velocity.read(), dye],
        );
        self.dye.swap();

        if let Some(limiter) = &self.limiter {
            let (dye, target) = self.dye.ping_pong();
            let decay = 1.0 + self.settings.density_dissipation * dt;
            limiter.limit(frame, dye, target, decay);
            self.dye.swap();
        }
    }

    /// Push a Gaussian blob of momentum and dye into the fields.
    pub fn splat(&mut self, frame: &mut Frame, splat: &Splat) {
        let radius = correct_radius(self.settings.splat_radius / 100.0, self.aspect_ratio);

        let (velocity, target) = self.velocity.ping_pong();
        self.programs.splat.blit(
            frame,
            target,
            &SplatUniforms {
                texel_size: velocity.texel_size(),
                point: splat.position,
                color: [splat.velocity[0], splat.velocity[1], 0.0],
                radius,
                aspect_ratio: self.aspect_ratio,
                _padding: [0.0; 3],
            },
            &[velocity],
        );
        self.velocity.swap();

        let (dye, target) = self.dye.ping_pong();
        self.programs.splat.blit(
            frame,
            target,
            &SplatUniforms {
                texel_size: dye.texel_size(),
                point: splat.position,
                color: splat.color,
                radius,
                aspect_ratio: self.aspect_ratio,
                _padding: [0.0; 3],
            },
            &[dye],
        );
        self.dye.swap();
    }

    pub fn destroy(&self) {
        self.velocity.destroy();
        self.dye.destroy();
        self.divergence.destroy();
        self.curl.destroy();
        self.pressure.destroy();
        if let Some(limiter) = &self.limiter {
            limiter.destroy();
        }
    }
}

fn scalar_fields(
    device: &wgpu::Device,
    capabilities: &Capabilities,
    resolution: Resolution,
) -> (Framebuffer, Framebuffer, DoubleFramebuffer) {
    let format = capabilities.formats.r;
    let nearest = wgpu::FilterMode::Nearest;

    (
        Framebuffer::new(device, "divergence", resolution, format, nearest),
        Framebuffer::new(device, "curl", resolution, format, nearest),
        DoubleFramebuffer::create(device, "pressure", resolution, format, nearest),
    )
}

// On landscape surfaces the splat is squashed horizontally by the aspect
// correction in the shader, so widen it to stay round.
fn correct_radius(radius: f32, aspect_ratio: f32) -> f32 {
    if aspect_ratio > 1.0 {
        radius * aspect_ratio
    } else {
        radius
    }
}

/// `count` splats at random positions with bright random colors.
pub fn random_splats(count: u32) -> Vec<Splat> {
    (0..count)
        .map(|_| Splat {
            position: [rng::gen::<f32>(), rng::gen::<f32>()],
            velocity: [
                RANDOM_SPLAT_FORCE * (rng::gen::<f32>() - 0.5),
                RANDOM_SPLAT_FORCE * (rng::gen::<f32>() - 0.5),
            ],
            color: color::scale(color::generate_color(), RANDOM_SPLAT_INTENSITY),
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn uniform_structs_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<TexelUniforms>(), 16);
        assert_eq!(std::mem::size_of::<ClearUniforms>(), 16);
        assert_eq!(std::mem::size_of::<SplatUniforms>(), 48);
        assert_eq!(std::mem::size_of::<AdvectionUniforms>(), 32);
        assert_eq!(std::mem::size_of::<VorticityUniforms>(), 16);
    }

    #[test]
    fn splat_radius_widens_on_landscape_only() {
        assert_relative_eq!(correct_radius(0.002, 2.0), 0.004);
        assert_relative_eq!(correct_radius(0.002, 0.5), 0.002);
        assert_relative_eq!(correct_radius(0.002, 1.0), 0.002);
    }

    #[test]
    fn random_splats_stay_on_the_surface() {
        rng::init_from_seed(&Some("burst".to_string()));
        let splats = random_splats(16);
        assert_eq!(splats.len(), 16);

        for splat in splats {
            assert!(splat.position.iter().all(|p| (0.0..1.0).contains(p)));
            assert!(splat.velocity.iter().all(|v| v.abs() <= RANDOM_SPLAT_FORCE / 2.0));
            assert!(splat.color.iter().any(|c| *c > 1.0));
        }
    }
}

use super::capabilities::Capabilities;
use super::framebuffer::{Framebuffer, Target};

use rustc_hash::FxHashMap;
use std::borrow::Cow;
use wgpu::util::DeviceExt;

// The full-screen triangle and the sampling helpers every pass shares.
const COMMON_SHADER: &str = include_str!("../../shader/common.wgsl");

bitflags::bitflags! {
    /// Compile-time switches baked into a shader variant.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Keywords: u32 {
        const SHADING = 1 << 0;
        const MANUAL_FILTERING = 1 << 1;
    }
}

impl Keywords {
    /// WGSL constants declaring every keyword as on or off.
    pub fn preamble(self) -> String {
        Keywords::all()
            .iter_names()
            .map(|(name, keyword)| format!("const {}: bool = {};\n", name, self.contains(keyword)))
            .collect()
    }
}

/// Per-frame recording state handed to every pass.
pub struct Frame<'a> {
    pub device: &'a wgpu::Device,
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub passes: u32,
}

impl<'a> Frame<'a> {
    pub fn new(device: &'a wgpu::Device, encoder: &'a mut wgpu::CommandEncoder) -> Self {
        Self {
            device,
            encoder,
            passes: 0,
        }
    }
}

pub struct ProgramDescriptor<'a> {
    pub label: &'a str,
    pub source: &'a str,
    pub texture_units: u32,
    pub targets: &'a [wgpu::TextureFormat],
    pub blend: Option<wgpu::BlendState>,
}

impl<'a> ProgramDescriptor<'a> {
    pub fn new(
        label: &'a str,
        source: &'a str,
        texture_units: u32,
        targets: &'a [wgpu::TextureFormat],
    ) -> Self {
        Self {
            label,
            source,
            texture_units,
            targets,
            blend: None,
        }
    }
}

/// A fragment shader compiled into one pipeline per render target format.
pub struct Program {
    label: String,
    texture_units: u32,
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: FxHashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

impl Program {
    pub async fn new(
        device: &wgpu::Device,
        capabilities: &Capabilities,
        descriptor: &ProgramDescriptor<'_>,
        keywords: Keywords,
    ) -> Self {
        let label = if keywords.is_empty() {
            descriptor.label.to_string()
        } else {
            let names: Vec<&str> = keywords.iter_names().map(|(name, _)| name).collect();
            format!("{}[{}]", descriptor.label, names.join("+"))
        };

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        for unit in 0..descriptor.texture_units {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: texture_binding(unit),
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: capabilities.sample_type(),
                },
                count: None,
            });
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: sampler_binding(unit),
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(capabilities.sampler_binding_type()),
                count: None,
            });
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("layout:{}", label)),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("pipeline_layout:{}", label)),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let source = format!("{}\n{}\n{}", keywords.preamble(), COMMON_SHADER, descriptor.source);

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("shader:{}", label)),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(source)),
        });
        if let Some(error) = device.pop_error_scope().await {
            log::error!("Failed to compile {}: {}", label, error);
            return Self {
                label,
                texture_units: descriptor.texture_units,
                bind_group_layout,
                pipelines: FxHashMap::default(),
            };
        }

        let mut pipelines = FxHashMap::default();
        for &format in descriptor.targets {
            if pipelines.contains_key(&format) {
                continue;
            }

            device.push_error_scope(wgpu::ErrorFilter::Validation);
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&format!("pipeline:{}:{:?}", label, format)),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some("fs"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: descriptor.blend,
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

            match device.pop_error_scope().await {
                None => {
                    pipelines.insert(format, pipeline);
                }
                Some(error) => {
                    log::error!("Failed to build {} for {:?}: {}", label, format, error);
                }
            }
        }

        log::debug!("Compiled {} for {} target(s)", label, pipelines.len());

        Self {
            label,
            texture_units: descriptor.texture_units,
            bind_group_layout,
            pipelines,
        }
    }

    /// Draw a full-screen pass into `target`, reading from `textures` in
    /// texture unit order. Targets without a pipeline are left untouched.
    pub fn blit<U: bytemuck::Pod>(
        &self,
        frame: &mut Frame,
        target: Target<'_>,
        uniforms: &U,
        textures: &[&Framebuffer],
    ) {
        let Some(pipeline) = self.pipelines.get(&target.format) else {
            log::trace!("Skipping {}: no pipeline for {:?}", self.label, target.format);
            return;
        };
        debug_assert_eq!(textures.len() as u32, self.texture_units);

        let uniform_buffer = frame
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("uniform:{}", self.label)),
                contents: bytemuck::bytes_of(uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: uniform_buffer.as_entire_binding(),
        }];
        for (unit, framebuffer) in textures.iter().enumerate() {
            entries.extend(framebuffer.attach(unit as u32));
        }

        let bind_group = frame.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("bind_group:{}", self.label)),
            layout: &self.bind_group_layout,
            entries: &entries,
        });

        let mut render_pass = frame
            .encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&self.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(target.clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.draw(0..3, 0..1);
        drop(render_pass);

        frame.passes += 1;
    }
}

pub fn texture_binding(unit: u32) -> u32 {
    1 + 2 * unit
}

pub fn sampler_binding(unit: u32) -> u32 {
    2 + 2 * unit
}

/// Keyword variants of one shader, all compiled up front.
pub struct Variants<T> {
    variants: FxHashMap<Keywords, T>,
    active: Keywords,
    switches: u32,
}

impl<T> Variants<T> {
    pub fn new(variants: impl IntoIterator<Item = (Keywords, T)>, active: Keywords) -> Self {
        Self {
            variants: variants.into_iter().collect(),
            active,
            switches: 0,
        }
    }

    /// Make `keywords` the active variant. Returns whether anything changed.
    pub fn set_keywords(&mut self, keywords: Keywords) -> bool {
        if keywords == self.active || !self.variants.contains_key(&keywords) {
            return false;
        }

        self.active = keywords;
        self.switches += 1;
        true
    }

    pub fn keywords(&self) -> Keywords {
        self.active
    }

    pub fn active(&self) -> Option<&T> {
        self.variants.get(&self.active)
    }

    pub fn switches(&self) -> u32 {
        self.switches
    }
}

/// A program with keyword variants.
pub type Material = Variants<Program>;

impl Material {
    pub async fn compile(
        device: &wgpu::Device,
        capabilities: &Capabilities,
        descriptor: &ProgramDescriptor<'_>,
        keyword_sets: &[Keywords],
        active: Keywords,
    ) -> Self {
        let mut variants = Vec::with_capacity(keyword_sets.len());
        for &keywords in keyword_sets {
            variants.push((
                keywords,
                Program::new(device, capabilities, descriptor, keywords).await,
            ));
        }

        Variants::new(variants, active)
    }

    pub fn blit<U: bytemuck::Pod>(
        &self,
        frame: &mut Frame,
        target: Target<'_>,
        uniforms: &U,
        textures: &[&Framebuffer],
    ) {
        if let Some(program) = self.active() {
            program.blit(frame, target, uniforms, textures);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn preamble_declares_every_keyword() {
        assert_eq!(
            Keywords::SHADING.preamble(),
            "const SHADING: bool = true;\nconst MANUAL_FILTERING: bool = false;\n"
        );
        assert_eq!(
            Keywords::empty().preamble(),
            "const SHADING: bool = false;\nconst MANUAL_FILTERING: bool = false;\n"
        );
    }

    #[test]
    fn texture_units_do_not_overlap_uniforms() {
        let bindings: Vec<u32> = (0..3)
            .flat_map(|unit| [texture_binding(unit), sampler_binding(unit)])
            .collect();
        assert_eq!(bindings, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn variants_only_switch_on_change() {
        let mut variants = Variants::new(
            [(Keywords::empty(), "plain"), (Keywords::SHADING, "shaded")],
            Keywords::SHADING,
        );
        assert_eq!(variants.active(), Some(&"shaded"));

        assert!(!variants.set_keywords(Keywords::SHADING));
        assert_eq!(variants.switches(), 0);

        assert!(variants.set_keywords(Keywords::empty()));
        assert_eq!(variants.active(), Some(&"plain"));
        assert!(!variants.set_keywords(Keywords::empty()));
        assert_eq!(variants.switches(), 1);
    }

    #[test]
    fn unknown_variants_are_ignored() {
        let mut variants = Variants::new([(Keywords::empty(), 0)], Keywords::empty());
        assert!(!variants.set_keywords(Keywords::MANUAL_FILTERING));
        assert_eq!(variants.keywords(), Keywords::empty());
    }
}

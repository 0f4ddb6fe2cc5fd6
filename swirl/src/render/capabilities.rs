use crate::Problem;

// Probed in order; the first format that survives a real render wins.
const R_CANDIDATES: &[wgpu::TextureFormat] = &[
    wgpu::TextureFormat::R16Float,
    wgpu::TextureFormat::Rg16Float,
    wgpu::TextureFormat::Rgba16Float,
    wgpu::TextureFormat::Rgba8Unorm,
];
const RG_CANDIDATES: &[wgpu::TextureFormat] = &[
    wgpu::TextureFormat::Rg16Float,
    wgpu::TextureFormat::Rgba16Float,
    wgpu::TextureFormat::Rgba8Unorm,
];
const RGBA_CANDIDATES: &[wgpu::TextureFormat] = &[
    wgpu::TextureFormat::Rgba16Float,
    wgpu::TextureFormat::Rgba8Unorm,
];

const PROBE_SIZE: u32 = 4;

pub struct Context {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

/// Find a high-performance adapter, compatible with `compatible_surface` when
/// one is given, and open a device on it.
pub async fn request_context(
    instance: &wgpu::Instance,
    compatible_surface: Option<&wgpu::Surface<'_>>,
) -> Result<Context, Problem> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface,
        })
        .await
        .map_err(|err| Problem::PlatformUnsupported(err.to_string()))?;

    let info = adapter.get_info();
    log::info!("🖥️ Using {} ({:?})", info.name, info.backend);

    let limits = wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits());
    let features = adapter.features() & wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES;

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("swirl:device"),
            required_features: features,
            required_limits: limits,
            ..Default::default()
        })
        .await?;

    Ok(Context {
        adapter,
        device,
        queue,
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Formats {
    pub r: wgpu::TextureFormat,
    pub rg: wgpu::TextureFormat,
    pub rgba: wgpu::TextureFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub formats: Formats,
    /// Whether every chosen format can be sampled with a linear filter.
    pub linear_filtering: bool,
}

impl Capabilities {
    pub async fn probe(adapter: &wgpu::Adapter, device: &wgpu::Device) -> Result<Self, Problem> {
        let formats = Formats {
            rgba: pick_format(adapter, device, RGBA_CANDIDATES, 4).await?,
            rg: pick_format(adapter, device, RG_CANDIDATES, 2).await?,
            r: pick_format(adapter, device, R_CANDIDATES, 1).await?,
        };
        log::debug!("Render target formats: {:?}", formats);

        let linear_filtering = [formats.r, formats.rg, formats.rgba]
            .into_iter()
            .all(|format| {
                format_features(adapter, device, format)
                    .flags
                    .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE)
            });

        if !linear_filtering {
            log::warn!("⚠️ Render target formats can't be filtered linearly. Falling back to manual filtering.");
        }

        Ok(Self {
            formats,
            linear_filtering,
        })
    }

    pub fn sample_type(&self) -> wgpu::TextureSampleType {
        wgpu::TextureSampleType::Float {
            filterable: self.linear_filtering,
        }
    }

    pub fn sampler_binding_type(&self) -> wgpu::SamplerBindingType {
        if self.linear_filtering {
            wgpu::SamplerBindingType::Filtering
        } else {
            wgpu::SamplerBindingType::NonFiltering
        }
    }

    /// The filter fields that need linear filtering actually get.
    pub fn linear_filter(&self) -> wgpu::FilterMode {
        if self.linear_filtering {
            wgpu::FilterMode::Linear
        } else {
            wgpu::FilterMode::Nearest
        }
    }
}

async fn pick_format(
    adapter: &wgpu::Adapter,
    device: &wgpu::Device,
    candidates: &[wgpu::TextureFormat],
    channels: u32,
) -> Result<wgpu::TextureFormat, Problem> {
    for &format in candidates {
        let usages = format_features(adapter, device, format).allowed_usages;
        if !usages.contains(
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        ) {
            log::debug!("{:?} is not a render target on this adapter", format);
            continue;
        }

        if can_render_to(device, format).await {
            return Ok(format);
        }

        log::debug!("Rendering to {:?} failed", format);
    }

    Err(Problem::NoRenderTargetFormat { channels })
}

// Format tables can be optimistic, so draw into a scratch target and see
// whether the device complains.
async fn can_render_to(device: &wgpu::Device, format: wgpu::TextureFormat) -> bool {
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("texture:probe"),
        size: wgpu::Extent3d {
            width: PROBE_SIZE,
            height: PROBE_SIZE,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("swirl::probe"),
    });
    {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("swirl::probe"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }
    drop(encoder.finish());

    let error = device.pop_error_scope().await;
    texture.destroy();
    error.is_none()
}

fn format_features(
    adapter: &wgpu::Adapter,
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
) -> wgpu::TextureFormatFeatures {
    if device
        .features()
        .contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES)
    {
        adapter.get_texture_format_features(format)
    } else {
        format.guaranteed_format_features(device.features())
    }
}

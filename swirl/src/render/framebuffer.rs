use super::program::{Frame, Program};
use crate::grid::Resolution;
use crate::Problem;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TexelUniforms {
    pub texel_size: [f32; 2], // 0
    _padding: [f32; 2],       // 8
}

impl TexelUniforms {
    pub fn new(texel_size: [f32; 2]) -> Self {
        Self {
            texel_size,
            _padding: [0.0; 2],
        }
    }
}

/// Where a pass draws to, and what the target is cleared to first.
#[derive(Clone, Copy, Debug)]
pub struct Target<'a> {
    pub view: &'a wgpu::TextureView,
    pub format: wgpu::TextureFormat,
    pub clear: wgpu::Color,
}

/// A texture that passes render into and sample from.
pub struct Framebuffer {
    label: String,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    resolution: Resolution,
    format: wgpu::TextureFormat,
    filter: wgpu::FilterMode,
}

impl Framebuffer {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        resolution: Resolution,
        format: wgpu::TextureFormat,
        filter: wgpu::FilterMode,
    ) -> Self {
        let resolution = allocatable(device, resolution);

        // New textures are zeroed, which is transparent black.
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("texture:{}", label)),
            size: resolution.extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            view_formats: &[],
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&format!("view:{}", label)),
            ..Default::default()
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("sampler:{}", label)),
            mag_filter: filter,
            min_filter: filter,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        Self {
            label: label.to_string(),
            texture,
            view,
            sampler,
            resolution,
            format,
            filter,
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    pub fn texel_size(&self) -> [f32; 2] {
        self.resolution.texel_size()
    }

    /// Bind for reading at texture unit `unit`.
    pub fn attach(&self, unit: u32) -> [wgpu::BindGroupEntry<'_>; 2] {
        [
            wgpu::BindGroupEntry {
                binding: super::program::texture_binding(unit),
                resource: wgpu::BindingResource::TextureView(&self.view),
            },
            wgpu::BindGroupEntry {
                binding: super::program::sampler_binding(unit),
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ]
    }

    pub fn target(&self) -> Target<'_> {
        Target {
            view: &self.view,
            format: self.format,
            clear: wgpu::Color::TRANSPARENT,
        }
    }

    /// Reallocate at `resolution`, carrying the current contents over.
    pub fn resize(&mut self, frame: &mut Frame, copy: &Program, resolution: Resolution) {
        let resolution = allocatable(frame.device, resolution);
        if self.resolution == resolution {
            return;
        }

        log::debug!(
            "Resizing {} from {}x{} to {}x{}",
            self.label,
            self.resolution.width,
            self.resolution.height,
            resolution.width,
            resolution.height
        );

        let resized = Framebuffer::new(frame.device, &self.label, resolution, self.format, self.filter);
        copy.blit(
            frame,
            resized.target(),
            &TexelUniforms::new(resized.texel_size()),
            &[&*self],
        );

        // The old texture stays alive until the recorded copy has run.
        *self = resized;
    }

    /// Read the texture back as RGBA floats, top row first. Channels the
    /// format doesn't have read as zero.
    pub async fn read_pixels(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<Vec<f32>, Problem> {
        let Resolution { width, height } = self.resolution;
        let texel_bytes = self
            .format
            .block_copy_size(None)
            .ok_or_else(|| Problem::Readback(format!("{:?} can't be copied", self.format)))?;
        let bytes_per_row = padded_bytes_per_row(width * texel_bytes);

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("readback:{}", self.label)),
            size: (bytes_per_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("swirl::readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            self.resolution.extent(),
        );
        queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|err| Problem::Readback(err.to_string()))?;

        receiver
            .await
            .map_err(|_| Problem::Readback("mapping was cancelled".to_string()))?
            .map_err(|err| Problem::Readback(err.to_string()))?;

        let pixels = {
            let data = slice.get_mapped_range();
            let mut pixels = Vec::with_capacity((4 * width * height) as usize);
            for row in data.chunks_exact(bytes_per_row as usize) {
                let row = &row[..(width * texel_bytes) as usize];
                for texel in row.chunks_exact(texel_bytes as usize) {
                    pixels.extend(decode_texel(self.format, texel)?);
                }
            }
            pixels
        };
        buffer.unmap();

        Ok(pixels)
    }

    pub fn destroy(&self) {
        self.texture.destroy();
    }
}

/// The largest texture the device will hand out that doesn't exceed
/// `resolution`.
pub fn allocatable(device: &wgpu::Device, resolution: Resolution) -> Resolution {
    resolution.clamp_to(device.limits().max_texture_dimension_2d)
}

fn padded_bytes_per_row(unpadded: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

fn decode_texel(format: wgpu::TextureFormat, bytes: &[u8]) -> Result<[f32; 4], Problem> {
    let mut texel = [0.0; 4];

    match format {
        wgpu::TextureFormat::R16Float
        | wgpu::TextureFormat::Rg16Float
        | wgpu::TextureFormat::Rgba16Float => {
            for (channel, pair) in texel.iter_mut().zip(bytes.chunks_exact(2)) {
                *channel = half::f16::from_le_bytes([pair[0], pair[1]]).to_f32();
            }
        }
        wgpu::TextureFormat::R32Float
        | wgpu::TextureFormat::Rg32Float
        | wgpu::TextureFormat::Rgba32Float => {
            for (channel, float) in texel.iter_mut().zip(bytes.chunks_exact(4)) {
                *channel = f32::from_le_bytes([float[0], float[1], float[2], float[3]]);
            }
        }
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => {
            for (channel, byte) in texel.iter_mut().zip(bytes.iter()) {
                *channel = *byte as f32 / 255.0;
            }
        }
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => {
            texel = [
                bytes[2] as f32 / 255.0,
                bytes[1] as f32 / 255.0,
                bytes[0] as f32 / 255.0,
                bytes[3] as f32 / 255.0,
            ];
        }
        _ => return Err(Problem::Readback(format!("can't decode {:?}", format))),
    }

    Ok(texel)
}

/// A read/write pair. Passes read from `read`, render into `write`, then
/// swap.
#[derive(Debug)]
pub struct DoubleBuffer<T> {
    read: T,
    write: T,
}

impl<T> DoubleBuffer<T> {
    pub fn new(read: T, write: T) -> Self {
        Self { read, write }
    }

    pub fn read(&self) -> &T {
        &self.read
    }

    pub fn write(&self) -> &T {
        &self.write
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.read, &mut self.write);
    }
}

pub type DoubleFramebuffer = DoubleBuffer<Framebuffer>;

impl DoubleFramebuffer {
    pub fn create(
        device: &wgpu::Device,
        label: &str,
        resolution: Resolution,
        format: wgpu::TextureFormat,
        filter: wgpu::FilterMode,
    ) -> Self {
        Self::new(
            Framebuffer::new(device, &format!("{}_0", label), resolution, format, filter),
            Framebuffer::new(device, &format!("{}_1", label), resolution, format, filter),
        )
    }

    pub fn resolution(&self) -> Resolution {
        self.read.resolution()
    }

    /// Keep the contents of `read`. `write` is overwritten by the next pass
    /// anyway, so it's simply replaced.
    pub fn resize(&mut self, frame: &mut Frame, copy: &Program, resolution: Resolution) {
        let resolution = allocatable(frame.device, resolution);
        if self.resolution() == resolution {
            return;
        }

        self.read.resize(frame, copy, resolution);
        self.write = Framebuffer::new(
            frame.device,
            &self.write.label,
            resolution,
            self.write.format,
            self.write.filter,
        );
    }

    /// Pair `read` with the other framebuffer for one pass.
    pub fn ping_pong(&self) -> (&Framebuffer, Target<'_>) {
        (&self.read, self.write.target())
    }

    pub fn destroy(&self) {
        self.read.destroy();
        self.write.destroy();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn swapping_twice_is_identity() {
        let mut buffer = DoubleBuffer::new("velocity_0", "velocity_1");
        let read = *buffer.read();

        buffer.swap();
        assert_eq!(*buffer.read(), "velocity_1");
        assert_eq!(*buffer.write(), read);

        buffer.swap();
        assert_eq!(*buffer.read(), read);
    }

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(4), 256);
        assert_eq!(padded_bytes_per_row(256), 256);
        assert_eq!(padded_bytes_per_row(128 * 8), 1024);
        assert_eq!(padded_bytes_per_row(130 * 8), 1280);
    }

    #[test]
    fn half_float_texels_fill_missing_channels_with_zero() {
        let mut bytes = Vec::new();
        bytes.extend(half::f16::from_f32(0.5).to_le_bytes());
        bytes.extend(half::f16::from_f32(-2.0).to_le_bytes());

        let texel = decode_texel(wgpu::TextureFormat::Rg16Float, &bytes).unwrap();
        assert_eq!(texel, [0.5, -2.0, 0.0, 0.0]);
    }

    #[test]
    fn unorm_texels_are_normalised() {
        let texel = decode_texel(wgpu::TextureFormat::Rgba8Unorm, &[255, 0, 51, 255]).unwrap();
        assert_relative_eq!(texel[0], 1.0);
        assert_relative_eq!(texel[1], 0.0);
        assert_relative_eq!(texel[2], 0.2);
        assert_relative_eq!(texel[3], 1.0);
    }

    #[test]
    fn depth_formats_are_rejected() {
        assert!(decode_texel(wgpu::TextureFormat::Depth32Float, &[0; 4]).is_err());
    }
}

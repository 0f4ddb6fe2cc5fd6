/// Width and height of a simulation field.
///
/// The short side of the field gets `resolution` texels; the long side is
/// stretched by the aspect ratio of the surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(resolution: u32, surface_width: u32, surface_height: u32) -> Self {
        let (surface_width, surface_height) = clamp_surface_size(surface_width, surface_height);
        let mut aspect_ratio = surface_width as f32 / surface_height as f32;
        if aspect_ratio < 1.0 {
            aspect_ratio = 1.0 / aspect_ratio;
        }

        let resolution = resolution.max(1) as f32;
        let min = resolution.round() as u32;
        let max = (resolution * aspect_ratio).round() as u32;

        if surface_width > surface_height {
            Self {
                width: max,
                height: min,
            }
        } else {
            Self {
                width: min,
                height: max,
            }
        }
    }

    /// Keep both sides between one texel and `max_dimension`, the largest
    /// texture the device can allocate. Very thin surfaces lose their aspect
    /// ratio here.
    pub fn clamp_to(self, max_dimension: u32) -> Self {
        let max_dimension = max_dimension.max(1);
        Self {
            width: self.width.clamp(1, max_dimension),
            height: self.height.clamp(1, max_dimension),
        }
    }

    pub fn texel_size(&self) -> [f32; 2] {
        [1.0 / self.width as f32, 1.0 / self.height as f32]
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

/// Hidden or collapsed containers report a zero size. Nothing we allocate
/// can be smaller than a single texel.
pub fn clamp_surface_size(width: u32, height: u32) -> (u32, u32) {
    (width.max(1), height.max(1))
}

pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    let (width, height) = clamp_surface_size(width, height);
    width as f32 / height as f32
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn is_sane_resolution_for_landscape_display() {
        assert_eq!(
            Resolution::new(128, 1920, 1080),
            Resolution {
                width: 228,
                height: 128
            }
        );
    }

    #[test]
    fn is_sane_resolution_for_iphone_xr() {
        assert_eq!(
            Resolution::new(128, 414, 896),
            Resolution {
                width: 128,
                height: 277
            }
        );
    }

    #[test]
    fn is_sane_resolution_for_square_surface() {
        assert_eq!(
            Resolution::new(1440, 800, 800),
            Resolution {
                width: 1440,
                height: 1440
            }
        );
    }

    #[test]
    fn zero_sized_surface_is_clamped() {
        let resolution = Resolution::new(128, 0, 0);
        assert_eq!(resolution.width, 128);
        assert_eq!(resolution.height, 128);
        assert_eq!(aspect_ratio(0, 0), 1.0);
    }

    #[test]
    fn zero_height_surface_fits_the_device() {
        let resolution = Resolution::new(64, 300, 0).clamp_to(2048);
        assert_eq!(resolution.height, 64);
        assert_eq!(resolution.width, 2048);
    }

    #[test]
    fn one_pixel_strip_fits_the_device() {
        let resolution = Resolution::new(128, 1920, 1).clamp_to(16384);
        assert_eq!(
            resolution,
            Resolution {
                width: 16384,
                height: 128
            }
        );

        let resolution = Resolution::new(128, 1, 1920).clamp_to(16384);
        assert_eq!(resolution.width, 128);
        assert_eq!(resolution.height, 16384);
    }

    #[test]
    fn clamping_leaves_ordinary_fields_alone() {
        let resolution = Resolution::new(1440, 1920, 1080);
        assert_eq!(resolution.clamp_to(8192), resolution);
    }

    #[test]
    fn resolution_above_the_limit_shrinks_both_sides() {
        let resolution = Resolution::new(4096, 800, 800).clamp_to(2048);
        assert_eq!(
            resolution,
            Resolution {
                width: 2048,
                height: 2048
            }
        );
        assert_eq!(Resolution::new(8, 4, 4).clamp_to(0).width, 1);
    }
}

use crate::render::capabilities::Capabilities;
use serde::{Deserialize, Serialize};

// Dye resolution used when the device can't filter float textures.
pub const DEGRADED_DYE_RESOLUTION: u32 = 256;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub seed: Option<String>,

    pub sim_resolution: u32,
    pub dye_resolution: u32,
    pub capture_resolution: u32,
    pub density_dissipation: f32,
    pub velocity_dissipation: f32,
    pub pressure: f32,
    pub pressure_iterations: u32,
    pub curl: f32,
    pub splat_radius: f32,
    pub splat_force: f32,

    pub shading: bool,
    pub color_update_speed: f32,
    pub back_color: BackColor,
    pub transparent: bool,

    pub container_id: Option<String>,
    pub auto_splat: bool,
    /// Minimum gap between hover splats, in milliseconds.
    pub auto_splat_interval: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            seed: None,
            sim_resolution: 128,
            dye_resolution: 1440,
            capture_resolution: 512,
            density_dissipation: 3.5,
            velocity_dissipation: 2.0,
            pressure: 0.1,
            pressure_iterations: 20,
            curl: 3.0,
            splat_radius: 0.2,
            splat_force: 6000.0,
            shading: true,
            color_update_speed: 10.0,
            back_color: BackColor::default(),
            transparent: true,
            container_id: None,
            auto_splat: false,
            auto_splat_interval: 25.0,
        }
    }
}

impl Settings {
    /// The settings the simulation actually runs with on this device.
    pub fn effective(&self, capabilities: &Capabilities) -> Settings {
        let mut settings = self.clone();

        if !capabilities.linear_filtering {
            log::warn!(
                "⚠️ Linear filtering of float textures is unavailable. Reducing dye resolution to {} and disabling shading.",
                DEGRADED_DYE_RESOLUTION
            );
            settings.dye_resolution = settings.dye_resolution.min(DEGRADED_DYE_RESOLUTION);
            settings.shading = false;
        }

        settings.pressure_iterations = settings.pressure_iterations.max(1);
        settings
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct BackColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl BackColor {
    pub fn to_wgpu(self, transparent: bool) -> wgpu::Color {
        if transparent {
            wgpu::Color::TRANSPARENT
        } else {
            wgpu::Color {
                r: self.r as f64,
                g: self.g as f64,
                b: self.b as f64,
                a: 1.0,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::render::capabilities::Formats;

    fn capabilities(linear_filtering: bool) -> Capabilities {
        Capabilities {
            formats: Formats {
                r: wgpu::TextureFormat::R16Float,
                rg: wgpu::TextureFormat::Rg16Float,
                rgba: wgpu::TextureFormat::Rgba16Float,
            },
            linear_filtering,
        }
    }

    #[test]
    fn partial_json_is_merged_with_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "splatRadius": 0.15, "autoSplat": true }"#).unwrap();

        assert_eq!(settings.splat_radius, 0.15);
        assert!(settings.auto_splat);
        assert_eq!(settings.sim_resolution, 128);
        assert_eq!(settings.pressure_iterations, 20);
        assert_eq!(settings.auto_splat_interval, 25.0);
    }

    #[test]
    fn back_color_reads_from_json() {
        let settings: Settings =
            serde_json::from_str(r#"{ "backColor": { "r": 0.5, "g": 0.0, "b": 0.25 }, "transparent": false }"#)
                .unwrap();

        assert_eq!(
            settings.back_color.to_wgpu(settings.transparent),
            wgpu::Color {
                r: 0.5,
                g: 0.0,
                b: 0.25,
                a: 1.0
            }
        );
    }

    #[test]
    fn missing_linear_filtering_degrades_dye_and_shading() {
        let settings = Settings::default().effective(&capabilities(false));
        assert_eq!(settings.dye_resolution, DEGRADED_DYE_RESOLUTION);
        assert!(!settings.shading);
    }

    #[test]
    fn full_capabilities_keep_settings() {
        let settings = Settings::default();
        assert_eq!(settings.effective(&capabilities(true)), settings);
    }
}

use crate::rng;

// Pointer colors are kept dim. The dye accumulates, and the click splat
// brightens its copy by ten.
const POINTER_INTENSITY: f32 = 0.15;

pub type Rgb = [f32; 3];

/// Convert HSV, each component in `0..=1`, to RGB.
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb {
    let i = (h * 6.0).floor();
    let f = h * 6.0 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);

    match (i as i32).rem_euclid(6) {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

/// A random fully-saturated hue at pointer intensity.
pub fn generate_color() -> Rgb {
    scale(hsv_to_rgb(rng::gen::<f32>(), 1.0, 1.0), POINTER_INTENSITY)
}

pub fn scale(color: Rgb, factor: f32) -> Rgb {
    color.map(|c| c * factor)
}

/// Client coordinates, in CSS pixels, to device pixels measured from the
/// top-left corner of the element at `origin`.
pub fn client_to_device(
    client_x: i32,
    client_y: i32,
    origin: (f64, f64),
    pixel_ratio: f64,
) -> (f32, f32) {
    let (left, top) = origin;
    (
        ((f64::from(client_x) - left) * pixel_ratio) as f32,
        ((f64::from(client_y) - top) * pixel_ratio) as f32,
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn offset_canvas_is_measured_from_its_own_corner() {
        // A canvas placed 100px from the left and 50px from the top.
        assert_eq!(client_to_device(150, 70, (100.0, 50.0), 2.0), (100.0, 40.0));
        assert_eq!(client_to_device(100, 50, (100.0, 50.0), 1.5), (0.0, 0.0));
    }

    #[test]
    fn scrolled_page_can_go_negative() {
        assert_eq!(client_to_device(10, 10, (20.0, 30.5), 1.0), (-10.0, -20.5));
    }
}

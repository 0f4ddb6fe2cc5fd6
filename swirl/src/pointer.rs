use crate::color::{self, Rgb};
use crate::rng;

/// The mouse, or the first pen. Touches use their platform id.
pub const PRIMARY_POINTER_ID: i64 = -1;

// Click splats are brighter than the pointer color and pushed in a random
// direction, so a tap without any movement still leaves a mark.
const CLICK_SPLAT_INTENSITY: f32 = 10.0;
const CLICK_SPLAT_JITTER: [f32; 2] = [10.0, 30.0];

/// Raw input, in device pixels relative to the surface's top-left corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerEvent {
    Down { id: i64, x: f32, y: f32 },
    Move { id: i64, x: f32, y: f32 },
    Up { id: i64 },
}

/// A single forcing impulse, applied to both velocity and dye.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Splat {
    /// Y-up texture coordinates.
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub color: Rgb,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pointer {
    pub id: i64,
    pub down: bool,
    pub moved: bool,
    pub texcoord: [f32; 2],
    pub prev_texcoord: [f32; 2],
    pub delta: [f32; 2],
    pub color: Rgb,
    last_move: Option<f64>,
}

impl Pointer {
    fn new(id: i64) -> Self {
        Self {
            id,
            down: false,
            moved: false,
            texcoord: [0.0, 0.0],
            prev_texcoord: [0.0, 0.0],
            delta: [0.0, 0.0],
            color: color::generate_color(),
            last_move: None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TrackerSettings {
    pub splat_force: f32,
    pub auto_splat: bool,
    /// Milliseconds.
    pub auto_splat_interval: f64,
}

impl From<&crate::Settings> for TrackerSettings {
    fn from(settings: &crate::Settings) -> Self {
        Self {
            splat_force: settings.splat_force,
            auto_splat: settings.auto_splat,
            auto_splat_interval: settings.auto_splat_interval as f64,
        }
    }
}

/// Folds pointer events into per-pointer records between ticks.
///
/// Only the latest position of each pointer survives until the next
/// [`drain`](PointerTracker::drain). Nothing here touches the GPU.
#[derive(Debug)]
pub struct PointerTracker {
    settings: TrackerSettings,
    pointers: Vec<Pointer>,
    click_splats: Vec<Splat>,
}

impl PointerTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            pointers: vec![Pointer::new(PRIMARY_POINTER_ID)],
            click_splats: Vec::new(),
        }
    }

    pub fn pointers(&self) -> &[Pointer] {
        &self.pointers
    }

    pub fn primary(&self) -> &Pointer {
        &self.pointers[0]
    }

    /// Apply one event. `timestamp` is in milliseconds; `width` and `height`
    /// are the surface size in device pixels.
    pub fn handle(&mut self, event: PointerEvent, timestamp: f64, width: u32, height: u32) {
        let (width, height) = crate::grid::clamp_surface_size(width, height);
        let (width, height) = (width as f32, height as f32);

        match event {
            PointerEvent::Down { id, x, y } => {
                let texcoord = [x / width, 1.0 - y / height];
                let pointer = self.start(id);
                pointer.down = true;
                pointer.moved = false;
                pointer.texcoord = texcoord;
                pointer.prev_texcoord = texcoord;
                pointer.delta = [0.0, 0.0];
                pointer.color = color::generate_color();
                pointer.last_move = Some(timestamp);

                let splat = click_splat(pointer);
                self.click_splats.push(splat);
            }

            PointerEvent::Move { id, x, y } => {
                let settings = self.settings;
                let Some(pointer) = self.find(id) else {
                    return;
                };

                if !pointer.down && !settings.auto_splat {
                    return;
                }

                if settings.auto_splat {
                    if let Some(last_move) = pointer.last_move {
                        if timestamp - last_move < settings.auto_splat_interval {
                            return;
                        }
                    }
                }

                let texcoord = [x / width, 1.0 - y / height];
                // The first hover only tells us where the pointer is.
                if pointer.last_move.is_none() {
                    pointer.texcoord = texcoord;
                }

                pointer.last_move = Some(timestamp);
                pointer.prev_texcoord = pointer.texcoord;
                pointer.texcoord = texcoord;

                let aspect_ratio = width / height;
                pointer.delta = correct_delta(
                    [
                        pointer.texcoord[0] - pointer.prev_texcoord[0],
                        pointer.texcoord[1] - pointer.prev_texcoord[1],
                    ],
                    aspect_ratio,
                );
                pointer.moved = pointer.delta[0].abs() > 0.0 || pointer.delta[1].abs() > 0.0;
            }

            PointerEvent::Up { id } => {
                if let Some(pointer) = self.find(id) {
                    pointer.down = false;
                }
            }
        }
    }

    /// Take the forcing accumulated since the last tick: click splats first,
    /// then one drag splat per pointer that moved.
    pub fn drain(&mut self) -> Vec<Splat> {
        let splat_force = self.settings.splat_force;
        let mut splats = std::mem::take(&mut self.click_splats);

        for pointer in self.pointers.iter_mut().filter(|pointer| pointer.moved) {
            pointer.moved = false;
            splats.push(Splat {
                position: pointer.texcoord,
                velocity: [
                    pointer.delta[0] * splat_force,
                    pointer.delta[1] * splat_force,
                ],
                color: pointer.color,
            });
        }

        // Released touches are done for good.
        self.pointers
            .retain(|pointer| pointer.id == PRIMARY_POINTER_ID || pointer.down);

        splats
    }

    pub fn recolor(&mut self) {
        for pointer in self.pointers.iter_mut() {
            pointer.color = color::generate_color();
        }
    }

    fn find(&mut self, id: i64) -> Option<&mut Pointer> {
        self.pointers.iter_mut().find(|pointer| pointer.id == id)
    }

    fn start(&mut self, id: i64) -> &mut Pointer {
        if id != PRIMARY_POINTER_ID {
            // A new touch never inherits an old record with the same id.
            self.pointers.retain(|pointer| pointer.id != id);
            self.pointers.push(Pointer::new(id));
        }

        let index = self
            .pointers
            .iter()
            .position(|pointer| pointer.id == id)
            .unwrap_or(0);
        &mut self.pointers[index]
    }
}

fn click_splat(pointer: &Pointer) -> Splat {
    Splat {
        position: pointer.texcoord,
        velocity: [
            CLICK_SPLAT_JITTER[0] * (rng::gen::<f32>() - 0.5),
            CLICK_SPLAT_JITTER[1] * (rng::gen::<f32>() - 0.5),
        ],
        color: color::scale(pointer.color, CLICK_SPLAT_INTENSITY),
    }
}

// Texture coordinates are normalised per axis. Shrink the longer axis so a
// swipe of the same length pushes equally hard in either direction.
fn correct_delta(delta: [f32; 2], aspect_ratio: f32) -> [f32; 2] {
    let [mut dx, mut dy] = delta;
    if aspect_ratio < 1.0 {
        dx *= aspect_ratio;
    }
    if aspect_ratio > 1.0 {
        dy /= aspect_ratio;
    }
    [dx, dy]
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn tracker(auto_splat: bool) -> PointerTracker {
        rng::init_from_seed(&Some("pointer".to_string()));
        PointerTracker::new(TrackerSettings {
            splat_force: 6000.0,
            auto_splat,
            auto_splat_interval: 25.0,
        })
    }

    #[test]
    fn click_without_drag_still_splats() {
        let mut tracker = tracker(false);
        tracker.handle(PointerEvent::Down { id: PRIMARY_POINTER_ID, x: 100.0, y: 50.0 }, 0.0, 400, 200);
        tracker.handle(PointerEvent::Up { id: PRIMARY_POINTER_ID }, 16.0, 400, 200);

        let splats = tracker.drain();
        assert_eq!(splats.len(), 1);

        let splat = splats[0];
        assert_relative_eq!(splat.position[0], 0.25);
        assert_relative_eq!(splat.position[1], 0.75);
        assert!(splat.color.iter().any(|c| *c > 0.0));
        assert!(splat.velocity[0].abs() <= 5.0);
        assert!(splat.velocity[1].abs() <= 15.0);

        assert!(tracker.drain().is_empty());
    }

    #[test]
    fn click_splat_is_brighter_than_pointer() {
        let mut tracker = tracker(false);
        tracker.handle(PointerEvent::Down { id: PRIMARY_POINTER_ID, x: 10.0, y: 10.0 }, 0.0, 100, 100);

        let pointer_color = tracker.primary().color;
        let splat = tracker.drain()[0];
        for (splat, pointer) in splat.color.iter().zip(pointer_color.iter()) {
            assert_relative_eq!(*splat, pointer * CLICK_SPLAT_INTENSITY);
        }
    }

    #[test]
    fn hover_is_ignored_without_auto_splat() {
        let mut tracker = tracker(false);
        tracker.handle(PointerEvent::Move { id: PRIMARY_POINTER_ID, x: 10.0, y: 10.0 }, 0.0, 100, 100);
        tracker.handle(PointerEvent::Move { id: PRIMARY_POINTER_ID, x: 50.0, y: 50.0 }, 40.0, 100, 100);
        assert!(!tracker.primary().moved);
        assert!(tracker.drain().is_empty());
    }

    #[test]
    fn drag_produces_a_scaled_splat() {
        let mut tracker = tracker(false);
        tracker.handle(PointerEvent::Down { id: PRIMARY_POINTER_ID, x: 0.0, y: 100.0 }, 0.0, 100, 100);
        tracker.drain();

        tracker.handle(PointerEvent::Move { id: PRIMARY_POINTER_ID, x: 10.0, y: 100.0 }, 16.0, 100, 100);
        let splats = tracker.drain();
        assert_eq!(splats.len(), 1);
        assert_relative_eq!(splats[0].velocity[0], 0.1 * 6000.0, epsilon = 1e-2);
        assert_relative_eq!(splats[0].velocity[1], 0.0);
        assert_eq!(splats[0].color, tracker.primary().color);
        assert!(!tracker.primary().moved);
    }

    #[test]
    fn moving_in_place_does_not_count() {
        let mut tracker = tracker(false);
        tracker.handle(PointerEvent::Down { id: PRIMARY_POINTER_ID, x: 20.0, y: 20.0 }, 0.0, 100, 100);
        tracker.handle(PointerEvent::Move { id: PRIMARY_POINTER_ID, x: 20.0, y: 20.0 }, 16.0, 100, 100);
        assert!(!tracker.primary().moved);
    }

    #[test]
    fn delta_is_corrected_on_landscape_surfaces() {
        let mut tracker = tracker(false);
        tracker.handle(PointerEvent::Down { id: PRIMARY_POINTER_ID, x: 0.0, y: 0.0 }, 0.0, 400, 200);
        tracker.handle(PointerEvent::Move { id: PRIMARY_POINTER_ID, x: 0.0, y: 100.0 }, 16.0, 400, 200);
        assert_relative_eq!(tracker.primary().delta[1], -0.25);

        tracker.handle(PointerEvent::Move { id: PRIMARY_POINTER_ID, x: 200.0, y: 100.0 }, 32.0, 400, 200);
        assert_relative_eq!(tracker.primary().delta[0], 0.5);
    }

    #[test]
    fn delta_is_corrected_on_portrait_surfaces() {
        let mut tracker = tracker(false);
        tracker.handle(PointerEvent::Down { id: PRIMARY_POINTER_ID, x: 0.0, y: 0.0 }, 0.0, 200, 400);
        tracker.handle(PointerEvent::Move { id: PRIMARY_POINTER_ID, x: 100.0, y: 0.0 }, 16.0, 200, 400);
        assert_relative_eq!(tracker.primary().delta[0], 0.25);
        assert_relative_eq!(tracker.primary().delta[1], 0.0);
    }

    #[test]
    fn auto_splat_moves_within_interval_coalesce() {
        let mut tracker = tracker(true);
        tracker.handle(PointerEvent::Move { id: PRIMARY_POINTER_ID, x: 0.0, y: 0.0 }, 0.0, 100, 100);
        tracker.drain();

        tracker.handle(PointerEvent::Move { id: PRIMARY_POINTER_ID, x: 10.0, y: 0.0 }, 30.0, 100, 100);
        tracker.handle(PointerEvent::Move { id: PRIMARY_POINTER_ID, x: 20.0, y: 0.0 }, 40.0, 100, 100);
        assert_eq!(tracker.drain().len(), 1);

        // The dropped move folds into the next accepted one.
        tracker.handle(PointerEvent::Move { id: PRIMARY_POINTER_ID, x: 30.0, y: 0.0 }, 60.0, 100, 100);
        let splats = tracker.drain();
        assert_eq!(splats.len(), 1);
        assert_relative_eq!(tracker.primary().delta[0], 0.2, epsilon = 1e-6);
    }

    #[test]
    fn first_hover_only_places_the_pointer() {
        let mut tracker = tracker(true);
        tracker.handle(PointerEvent::Move { id: PRIMARY_POINTER_ID, x: 150.0, y: 50.0 }, 0.0, 200, 200);

        let pointer = tracker.primary();
        assert_eq!(pointer.delta, [0.0, 0.0]);
        assert_eq!(pointer.texcoord, [0.75, 0.75]);
        assert_eq!(pointer.prev_texcoord, pointer.texcoord);
        assert!(!pointer.moved);
        assert!(tracker.drain().is_empty());

        tracker.handle(PointerEvent::Move { id: PRIMARY_POINTER_ID, x: 160.0, y: 50.0 }, 30.0, 200, 200);
        let splats = tracker.drain();
        assert_eq!(splats.len(), 1);
        assert_relative_eq!(splats[0].velocity[0], 0.05 * 6000.0, epsilon = 1e-2);
        assert_relative_eq!(splats[0].velocity[1], 0.0);
    }

    #[test]
    fn auto_splat_keeps_forcing_after_release() {
        let mut tracker = tracker(true);
        tracker.handle(PointerEvent::Down { id: PRIMARY_POINTER_ID, x: 0.0, y: 0.0 }, 0.0, 100, 100);
        tracker.handle(PointerEvent::Up { id: PRIMARY_POINTER_ID }, 10.0, 100, 100);
        tracker.drain();

        tracker.handle(PointerEvent::Move { id: PRIMARY_POINTER_ID, x: 50.0, y: 0.0 }, 100.0, 100, 100);
        assert_eq!(tracker.drain().len(), 1);
    }

    #[test]
    fn released_touches_are_dropped_after_drain() {
        let mut tracker = tracker(false);
        tracker.handle(PointerEvent::Down { id: 7, x: 10.0, y: 10.0 }, 0.0, 100, 100);
        tracker.handle(PointerEvent::Move { id: 7, x: 30.0, y: 10.0 }, 16.0, 100, 100);
        assert_eq!(tracker.pointers().len(), 2);

        tracker.handle(PointerEvent::Up { id: 7 }, 20.0, 100, 100);
        assert_eq!(tracker.drain().len(), 2);
        assert_eq!(tracker.pointers().len(), 1);
        assert_eq!(tracker.primary().id, PRIMARY_POINTER_ID);

        // Events for a finished touch go nowhere.
        tracker.handle(PointerEvent::Move { id: 7, x: 50.0, y: 10.0 }, 30.0, 100, 100);
        assert!(tracker.drain().is_empty());
    }

    #[test]
    fn touch_ids_are_not_reused() {
        let mut tracker = tracker(false);
        tracker.handle(PointerEvent::Down { id: 3, x: 10.0, y: 10.0 }, 0.0, 100, 100);
        tracker.handle(PointerEvent::Move { id: 3, x: 20.0, y: 10.0 }, 16.0, 100, 100);
        tracker.handle(PointerEvent::Down { id: 3, x: 90.0, y: 90.0 }, 20.0, 100, 100);

        let touches: Vec<_> = tracker.pointers().iter().filter(|p| p.id == 3).collect();
        assert_eq!(touches.len(), 1);
        assert!(!touches[0].moved);
        assert_relative_eq!(touches[0].texcoord[0], 0.9);
    }

    #[test]
    fn recolor_changes_every_pointer() {
        let mut tracker = tracker(false);
        tracker.handle(PointerEvent::Down { id: 1, x: 10.0, y: 10.0 }, 0.0, 100, 100);
        let before: Vec<Rgb> = tracker.pointers().iter().map(|p| p.color).collect();
        tracker.recolor();
        let after: Vec<Rgb> = tracker.pointers().iter().map(|p| p.color).collect();
        assert_eq!(before.len(), after.len());
        assert!(before.iter().zip(after.iter()).all(|(a, b)| a != b));
    }
}

/// Longest timestep the solver will ever see, in seconds.
pub const MAX_TIMESTEP: f32 = 1.0 / 60.0;

/// Turns host timestamps into solver timesteps.
#[derive(Debug, Default)]
pub struct FrameClock {
    last_timestamp: Option<f64>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to `timestamp` (milliseconds) and return the clamped timestep
    /// in seconds. The first tick and backwards jumps use the ceiling.
    pub fn tick(&mut self, timestamp: f64) -> f32 {
        let timestep = match self.last_timestamp {
            Some(last_timestamp) if timestamp >= last_timestamp => {
                f32::min(MAX_TIMESTEP, (0.001 * (timestamp - last_timestamp)) as f32)
            }
            _ => MAX_TIMESTEP,
        };

        self.last_timestamp = Some(timestamp);
        timestep
    }
}

/// Accumulates time and reports when pointer colors are due for a change.
#[derive(Debug, Default)]
pub struct ColorTimer {
    value: f32,
}

impl ColorTimer {
    pub fn advance(&mut self, timestep: f32, color_update_speed: f32) -> bool {
        self.value += timestep * color_update_speed;
        if self.value >= 1.0 {
            self.value = wrap(self.value, 0.0, 1.0);
            true
        } else {
            false
        }
    }
}

fn wrap(value: f32, min: f32, max: f32) -> f32 {
    let range = max - min;
    if range == 0.0 {
        return min;
    }
    (value - min).rem_euclid(range) + min
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn long_gaps_are_clamped() {
        let mut clock = FrameClock::new();
        clock.tick(0.0);
        assert_relative_eq!(clock.tick(10_000.0), MAX_TIMESTEP);
    }

    #[test]
    fn short_frames_pass_through() {
        let mut clock = FrameClock::new();
        clock.tick(1000.0);
        assert_relative_eq!(clock.tick(1008.0), 0.008, epsilon = 1e-6);
        assert_relative_eq!(clock.tick(1020.0), 0.012, epsilon = 1e-6);
    }

    #[test]
    fn backwards_jumps_use_the_ceiling() {
        let mut clock = FrameClock::new();
        clock.tick(500.0);
        assert_relative_eq!(clock.tick(100.0), MAX_TIMESTEP);
    }

    #[test]
    fn color_timer_fires_and_wraps() {
        let mut timer = ColorTimer::default();
        // 10 updates per second
        assert!(!timer.advance(0.05, 10.0));
        assert!(timer.advance(0.06, 10.0));
        assert_relative_eq!(timer.value, 0.1, epsilon = 1e-5);
    }

    #[test]
    fn color_timer_never_fires_at_zero_speed() {
        let mut timer = ColorTimer::default();
        for _ in 0..100 {
            assert!(!timer.advance(MAX_TIMESTEP, 0.0));
        }
    }
}

//! Updates-per-second throttle with a time accumulator

/// Slack for float round-off when deciding a tick is due
const TICK_EPSILON: f32 = 1e-5;

/// Limits how often a particle system (or manager) actually simulates.
///
/// With `updates_per_second == 0` every frame passes straight through.
/// Otherwise frame time accumulates and each call runs at most one tick of
/// exactly one interval. Time accrued beyond a further interval is dropped
/// rather than replayed as a burst of catch-up ticks.
#[derive(Debug, Clone, Default)]
pub struct FrameThrottle {
    updates_per_second: u32,
    interval: f32,
    accumulator: f32,
}

impl FrameThrottle {
    pub fn new(updates_per_second: u32) -> Self {
        let mut throttle = Self::default();
        throttle.set_updates_per_second(updates_per_second);
        throttle
    }

    pub fn updates_per_second(&self) -> u32 {
        self.updates_per_second
    }

    pub fn set_updates_per_second(&mut self, updates_per_second: u32) {
        self.updates_per_second = updates_per_second;
        self.interval = if updates_per_second > 0 {
            1.0 / updates_per_second as f32
        } else {
            0.0
        };
        self.accumulator = 0.0;
    }

    /// Feed one frame's time; returns the time step to simulate, if any
    pub fn consume(&mut self, dt: f32) -> Option<f32> {
        if self.updates_per_second == 0 {
            return Some(dt);
        }

        self.accumulator += dt.max(0.0);
        if self.accumulator + TICK_EPSILON < self.interval {
            return None;
        }

        self.accumulator = (self.accumulator - self.interval).max(0.0);
        if self.accumulator >= self.interval {
            // Drop whole intervals we can't run this frame
            self.accumulator %= self.interval;
        }
        Some(self.interval)
    }

    /// Accumulated time not yet simulated
    pub fn pending(&self) -> f32 {
        self.accumulator
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

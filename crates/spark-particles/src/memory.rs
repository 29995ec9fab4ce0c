//! Auto memory manager: the policy that grows and shrinks a particle
//! system's pool

use serde::Deserialize;
use std::collections::VecDeque;

/// How a particle system manages its pool size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoMemoryManagerMode {
    /// Never resize; spawning into a full pool fails
    Disabled,
    /// Never resize; spawning into a full pool recycles an active particle
    DisabledWithEarlyRecycling,
    #[default]
    IncreaseAndDecrease,
    IncreaseOnly,
    DecreaseOnly,
}

impl AutoMemoryManagerMode {
    pub fn allows_increase(self) -> bool {
        matches!(self, Self::IncreaseAndDecrease | Self::IncreaseOnly)
    }

    pub fn allows_decrease(self) -> bool {
        matches!(self, Self::IncreaseAndDecrease | Self::DecreaseOnly)
    }

    pub fn recycles_early(self) -> bool {
        self == Self::DisabledWithEarlyRecycling
    }
}

pub const MIN_REDUCE_AMOUNT: f32 = 1.0;
pub const MAX_REDUCE_AMOUNT: f32 = 2.0;
pub const MIN_INCREASE_AMOUNT: f32 = 1.01;
pub const MAX_INCREASE_AMOUNT: f32 = 10.0;
pub const MIN_HOLD_SECONDS: f32 = 0.01;

/// Tuning for the auto memory manager. Every setter clamps instead of
/// rejecting out-of-range values.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "AutoMemoryManagerSettingsToml")]
pub struct AutoMemoryManagerSettings {
    mode: AutoMemoryManagerMode,
    absolute_min_particles: usize,
    reduce_amount: f32,
    increase_amount: f32,
    seconds_high_water_mark_must_hold_before_shrinking: f32,
}

impl Default for AutoMemoryManagerSettings {
    fn default() -> Self {
        Self {
            mode: AutoMemoryManagerMode::IncreaseAndDecrease,
            absolute_min_particles: 10,
            reduce_amount: 1.1,
            increase_amount: 1.5,
            seconds_high_water_mark_must_hold_before_shrinking: 3.0,
        }
    }
}

impl AutoMemoryManagerSettings {
    pub fn new(mode: AutoMemoryManagerMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> AutoMemoryManagerMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: AutoMemoryManagerMode) {
        self.mode = mode;
    }

    pub fn absolute_min_particles(&self) -> usize {
        self.absolute_min_particles
    }

    pub fn set_absolute_min_particles(&mut self, count: usize) {
        self.absolute_min_particles = count.max(1);
    }

    pub fn reduce_amount(&self) -> f32 {
        self.reduce_amount
    }

    /// Head-room kept above the high-water mark when shrinking
    pub fn set_reduce_amount(&mut self, amount: f32) {
        self.reduce_amount = clamp_or(amount, MIN_REDUCE_AMOUNT, MAX_REDUCE_AMOUNT);
    }

    pub fn increase_amount(&self) -> f32 {
        self.increase_amount
    }

    /// Growth factor applied when spawning into a full pool
    pub fn set_increase_amount(&mut self, amount: f32) {
        self.increase_amount = clamp_or(amount, MIN_INCREASE_AMOUNT, MAX_INCREASE_AMOUNT);
    }

    pub fn seconds_high_water_mark_must_hold_before_shrinking(&self) -> f32 {
        self.seconds_high_water_mark_must_hold_before_shrinking
    }

    pub fn set_seconds_high_water_mark_must_hold_before_shrinking(&mut self, seconds: f32) {
        self.seconds_high_water_mark_must_hold_before_shrinking =
            clamp_or(seconds, MIN_HOLD_SECONDS, f32::MAX);
    }

    /// Capacity after growing a full pool of `allocated` slots
    pub fn grown_capacity(&self, allocated: usize, max_allowed: usize) -> usize {
        let scaled = (allocated as f32 * self.increase_amount).ceil() as usize;
        scaled
            .max(allocated + 1)
            .max(self.absolute_min_particles)
            .min(max_allowed)
    }

    /// Capacity to shrink to for a steady high-water mark of `high_water_mark`
    pub fn shrink_target(&self, high_water_mark: usize, max_allowed: usize) -> usize {
        let padded = (high_water_mark as f32 * self.reduce_amount).ceil() as usize;
        padded.max(self.absolute_min_particles).min(max_allowed)
    }
}

fn clamp_or(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct AutoMemoryManagerSettingsToml {
    mode: AutoMemoryManagerMode,
    absolute_min_particles: usize,
    reduce_amount: f32,
    increase_amount: f32,
    seconds_high_water_mark_must_hold_before_shrinking: f32,
}

impl Default for AutoMemoryManagerSettingsToml {
    fn default() -> Self {
        let d = AutoMemoryManagerSettings::default();
        Self {
            mode: d.mode,
            absolute_min_particles: d.absolute_min_particles,
            reduce_amount: d.reduce_amount,
            increase_amount: d.increase_amount,
            seconds_high_water_mark_must_hold_before_shrinking: d
                .seconds_high_water_mark_must_hold_before_shrinking,
        }
    }
}

impl From<AutoMemoryManagerSettingsToml> for AutoMemoryManagerSettings {
    fn from(raw: AutoMemoryManagerSettingsToml) -> Self {
        let mut settings = Self::new(raw.mode);
        settings.set_absolute_min_particles(raw.absolute_min_particles);
        settings.set_reduce_amount(raw.reduce_amount);
        settings.set_increase_amount(raw.increase_amount);
        settings.set_seconds_high_water_mark_must_hold_before_shrinking(
            raw.seconds_high_water_mark_must_hold_before_shrinking,
        );
        settings
    }
}

/// Rolling record of active-particle counts over a trailing time window.
///
/// Samples are kept as a monotonic deque (counts strictly decreasing from the
/// front), so the window's peak is always the front entry. Separately it
/// remembers when the count last climbed above everything seen since the
/// current hold period began, which is what the shrink decision waits on.
#[derive(Debug, Clone, Default)]
pub struct HighWaterMark {
    samples: VecDeque<(f32, usize)>,
    now: f32,
    hold_peak: usize,
    last_rise: f32,
    recorded: bool,
}

impl HighWaterMark {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record this update's active count, `dt` seconds after the previous one
    pub fn record(&mut self, dt: f32, active: usize, window: f32) {
        self.now += dt.max(0.0);
        self.recorded = true;
        if active > self.hold_peak {
            self.hold_peak = active;
            self.last_rise = self.now;
        }

        while self.samples.back().is_some_and(|&(_, n)| n <= active) {
            self.samples.pop_back();
        }
        self.samples.push_back((self.now, active));

        let cutoff = self.now - window;
        while self.samples.len() > 1 && self.samples.front().is_some_and(|&(t, _)| t < cutoff) {
            self.samples.pop_front();
        }
    }

    /// Highest active count seen in the window
    pub fn peak(&self) -> usize {
        self.samples.front().map_or(0, |&(_, n)| n)
    }

    /// Whether the count has not risen for at least `window` seconds
    pub fn has_held_for(&self, window: f32) -> bool {
        self.recorded && self.now - self.last_rise >= window
    }

    /// Start a new hold period (after acting on the current one)
    pub fn restart_hold(&mut self) {
        self.last_rise = self.now;
        self.hold_peak = self.peak();
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn setters_clamp() {
        let mut s = AutoMemoryManagerSettings::default();
        s.set_reduce_amount(0.2);
        assert_eq!(s.reduce_amount(), 1.0);
        s.set_reduce_amount(5.0);
        assert_eq!(s.reduce_amount(), 2.0);
        s.set_increase_amount(1.0);
        assert_eq!(s.increase_amount(), 1.01);
        s.set_increase_amount(f32::NAN);
        assert_eq!(s.increase_amount(), 1.01);
        s.set_increase_amount(50.0);
        assert_eq!(s.increase_amount(), 10.0);
        s.set_absolute_min_particles(0);
        assert_eq!(s.absolute_min_particles(), 1);
        s.set_seconds_high_water_mark_must_hold_before_shrinking(-1.0);
        assert!(s.seconds_high_water_mark_must_hold_before_shrinking() > 0.0);
    }

    #[test]
    fn growth_is_at_least_one() {
        let mut s = AutoMemoryManagerSettings::default();
        s.set_absolute_min_particles(1);
        s.set_increase_amount(1.01);
        assert_eq!(s.grown_capacity(10, 1000), 11);
        s.set_increase_amount(2.0);
        assert_eq!(s.grown_capacity(10, 1000), 20);
        assert_eq!(s.grown_capacity(10, 15), 15);
    }

    #[test]
    fn shrink_target_respects_minimum() {
        let mut s = AutoMemoryManagerSettings::default();
        s.set_absolute_min_particles(50);
        s.set_reduce_amount(1.5);
        assert_eq!(s.shrink_target(10, 1000), 50);
        assert_eq!(s.shrink_target(100, 1000), 150);
        assert_eq!(s.shrink_target(100, 120), 120);
    }

    #[test]
    fn parse_from_toml_clamps() {
        let toml_str = r#"
mode = "decrease_only"
reduce_amount = 9.0
absolute_min_particles = 25
"#;
        let s: AutoMemoryManagerSettings = toml::from_str(toml_str).unwrap();
        assert_eq!(s.mode(), AutoMemoryManagerMode::DecreaseOnly);
        assert_eq!(s.reduce_amount(), 2.0);
        assert_eq!(s.absolute_min_particles(), 25);
        assert_eq!(s.increase_amount(), 1.5);
    }

    #[test]
    fn high_water_mark_holds_after_window() {
        let mut hwm = HighWaterMark::new();
        hwm.record(0.5, 40, 1.0);
        hwm.record(0.5, 80, 1.0);
        assert_eq!(hwm.peak(), 80);
        assert!(!hwm.has_held_for(1.0));

        hwm.record(0.5, 30, 1.0);
        hwm.record(0.5, 30, 1.0);
        assert!(hwm.has_held_for(1.0));
        assert_eq!(hwm.peak(), 80);

        // The 80 sample ages out of the window
        hwm.record(0.6, 30, 1.0);
        assert_eq!(hwm.peak(), 30);

        hwm.restart_hold();
        assert!(!hwm.has_held_for(1.0));
    }

    proptest! {
        #[test]
        fn resize_decisions_stay_in_bounds(
            allocated in 0usize..5000,
            max_allowed in 1usize..5000,
            min in 1usize..200,
            hwm in 0usize..5000,
            increase in 0.0f32..20.0,
            reduce in 0.0f32..4.0,
        ) {
            let mut s = AutoMemoryManagerSettings::default();
            s.set_absolute_min_particles(min);
            s.set_increase_amount(increase);
            s.set_reduce_amount(reduce);
            let allocated = allocated.min(max_allowed);

            let grown = s.grown_capacity(allocated, max_allowed);
            prop_assert!(grown <= max_allowed);
            prop_assert!(grown >= min.min(max_allowed));
            if allocated < max_allowed {
                prop_assert!(grown > allocated);
            }

            let target = s.shrink_target(hwm, max_allowed);
            prop_assert!(target <= max_allowed);
            prop_assert!(target >= min.min(max_allowed));
            prop_assert!(target >= hwm.min(max_allowed));
        }
    }
}

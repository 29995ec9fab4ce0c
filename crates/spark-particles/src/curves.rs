//! Value-over-lifetime curves (start → end, shaped by an easing curve)

use glam::{Vec3, Vec4};
use serde::Deserialize;

/// Shape applied to a particle's normalized age before interpolating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Curve {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    SmoothStep,
}

impl Curve {
    /// Map `t` (clamped to [0, 1]) through the curve
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Curve::Linear => t,
            Curve::EaseIn => t * t,
            Curve::EaseOut => t * (2.0 - t),
            Curve::SmoothStep => t * t * (3.0 - 2.0 * t),
        }
    }
}

/// Linear interpolation between two floats
pub fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

pub fn lerp_vec3(a: Vec3, b: Vec3, t: f32) -> Vec3 {
    a.lerp(b, t)
}

/// Linear interpolation between two RGBA colors
pub fn lerp_color(a: Vec4, b: Vec4, t: f32) -> Vec4 {
    a.lerp(b, t)
}

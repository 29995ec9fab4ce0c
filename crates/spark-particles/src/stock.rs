//! Ready-made particle events for [`DefaultParticle`]
//!
//! Register them on a system's [`ParticleEvents`] with the matching constant
//! from [`order`] so forces apply before integration, and integration before
//! the lifetime visuals.

use crate::curves::{lerp_color, lerp_f32, Curve};
use crate::events::{ParticleEvents, DEFAULT_GROUP};
use crate::particle::DefaultParticle;
use glam::Vec3;

/// Execution orders used by the stock events
pub mod order {
    pub const FORCES: i32 = 100;
    pub const DAMPING: i32 = 200;
    pub const VELOCITY: i32 = 300;
    pub const POSITION: i32 = 400;
    pub const ROTATION: i32 = 500;
    pub const VISUALS: i32 = 600;
}

pub fn update_velocity_using_acceleration(particle: &mut DefaultParticle, dt: f32) {
    particle.velocity += particle.acceleration * dt;
}

pub fn update_position_using_velocity(particle: &mut DefaultParticle, dt: f32) {
    particle.position += particle.velocity * dt;
}

pub fn update_rotation_using_rotational_velocity(particle: &mut DefaultParticle, dt: f32) {
    particle.rotation += particle.rotational_velocity * dt;
}

/// Constant acceleration shared by every particle
pub fn apply_gravity(gravity: Vec3) -> impl FnMut(&mut DefaultParticle, f32) {
    move |particle, dt| particle.velocity += gravity * dt
}

/// Linear drag: velocity loses `damping` of itself per second
pub fn apply_damping(damping: f32) -> impl FnMut(&mut DefaultParticle, f32) {
    let damping = damping.max(0.0);
    move |particle, dt| {
        if damping > 0.0 {
            particle.velocity *= (1.0 - damping * dt).max(0.0);
        }
    }
}

/// Size from `start_size` to `end_size` over the particle's lifetime
pub fn lerp_size_over_lifetime(curve: Curve) -> impl FnMut(&mut DefaultParticle, f32) {
    move |particle, _| {
        let t = curve.apply(particle.base.normalized_elapsed_time());
        particle.size = lerp_f32(particle.start_size, particle.end_size, t);
    }
}

/// Color from `start_color` to `end_color` over the particle's lifetime
pub fn lerp_color_over_lifetime(curve: Curve) -> impl FnMut(&mut DefaultParticle, f32) {
    move |particle, _| {
        let t = curve.apply(particle.base.normalized_elapsed_time());
        particle.color = lerp_color(particle.start_color, particle.end_color, t);
    }
}

/// Which stock events [`register_stock_events`] installs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockEvents {
    pub gravity: Vec3,
    pub damping: f32,
    pub size_curve: Curve,
    pub color_curve: Curve,
    pub group: i32,
}

impl Default for StockEvents {
    fn default() -> Self {
        Self {
            gravity: Vec3::ZERO,
            damping: 0.0,
            size_curve: Curve::Linear,
            color_curve: Curve::Linear,
            group: DEFAULT_GROUP,
        }
    }
}

/// Install the full motion + lifetime-visuals chain
pub fn register_stock_events(events: &mut ParticleEvents<DefaultParticle>, stock: &StockEvents) {
    let group = stock.group;
    if stock.gravity != Vec3::ZERO {
        events.add_every_time_event(apply_gravity(stock.gravity), order::FORCES, group);
    }
    if stock.damping > 0.0 {
        events.add_every_time_event(apply_damping(stock.damping), order::DAMPING, group);
    }
    events.add_every_time_event(update_velocity_using_acceleration, order::VELOCITY, group);
    events.add_every_time_event(update_position_using_velocity, order::POSITION, group);
    events.add_every_time_event(
        update_rotation_using_rotational_velocity,
        order::ROTATION,
        group,
    );
    events.add_every_time_event(lerp_size_over_lifetime(stock.size_curve), order::VISUALS, group);
    events.add_every_time_event(lerp_color_over_lifetime(stock.color_curve), order::VISUALS, group);
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn particle() -> DefaultParticle {
        let mut p = DefaultParticle::default();
        p.base.set_lifetime(2.0);
        p
    }

    #[test]
    fn motion_integrates() {
        let mut p = particle();
        p.velocity = Vec3::new(1.0, 0.0, 0.0);
        p.acceleration = Vec3::new(0.0, 2.0, 0.0);
        p.rotational_velocity = 3.0;

        update_velocity_using_acceleration(&mut p, 0.5);
        update_position_using_velocity(&mut p, 0.5);
        update_rotation_using_rotational_velocity(&mut p, 0.5);

        assert_eq!(p.velocity, Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(p.position, Vec3::new(0.5, 0.5, 0.0));
        assert_eq!(p.rotation, 1.5);
    }

    #[test]
    fn damping_never_reverses() {
        let mut p = particle();
        p.velocity = Vec3::new(4.0, 0.0, 0.0);
        let mut damp = apply_damping(0.5);
        damp(&mut p, 1.0);
        assert_eq!(p.velocity.x, 2.0);
        damp(&mut p, 10.0);
        assert_eq!(p.velocity.x, 0.0);
    }

    #[test]
    fn visuals_follow_lifetime() {
        let mut p = particle();
        p.start_size = 2.0;
        p.end_size = 0.0;
        p.start_color = Vec4::ONE;
        p.end_color = Vec4::new(1.0, 1.0, 1.0, 0.0);
        p.base.advance_time(1.0);

        let mut size = lerp_size_over_lifetime(Curve::Linear);
        let mut color = lerp_color_over_lifetime(Curve::Linear);
        size(&mut p, 1.0);
        color(&mut p, 1.0);
        assert_eq!(p.size, 1.0);
        assert_eq!(p.color.w, 0.5);

        let mut eased = lerp_size_over_lifetime(Curve::EaseIn);
        eased(&mut p, 1.0);
        assert_eq!(p.size, 1.5);
    }

    #[test]
    fn forces_run_before_integration() {
        let mut events = ParticleEvents::new();
        let stock = StockEvents {
            gravity: Vec3::new(0.0, -10.0, 0.0),
            ..StockEvents::default()
        };
        register_stock_events(&mut events, &stock);
        assert_eq!(events.len(), 6);

        let mut p = particle();
        p.base.advance_time(0.1);
        events.prepare();
        events.run(&mut p, 0.1);
        // Gravity updated velocity first, so position moved this step
        assert!((p.velocity.y + 1.0).abs() < 1e-6);
        assert!((p.position.y + 0.1).abs() < 1e-6);
    }
}

//! Randomized initial state for [`DefaultParticle`]s

use crate::curves::Curve;
use crate::particle::DefaultParticle;
use crate::rand::ParticleRng;
use crate::stock::StockEvents;
use crate::system::SpawnContext;
use glam::{Vec3, Vec4};
use serde::Deserialize;

/// Where around the emitter particles appear, in emitter space
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmissionShape {
    #[default]
    Point,
    Sphere {
        radius: f32,
    },
    /// Particles leave the emitter within `angle` degrees of `direction`
    Cone {
        angle: f32,
    },
    Box {
        extents: Vec3,
    },
}

/// Ranges the initializer samples from. Loads from the `[particles]` table of
/// an effect file; missing keys keep their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct InitialProperties {
    pub lifetime_min: f32,
    pub lifetime_max: f32,
    pub speed_min: f32,
    pub speed_max: f32,
    /// Emission direction in emitter space
    pub direction: Vec3,
    /// Half-angle in degrees of the cone velocities are drawn from
    pub spread: f32,
    pub shape: EmissionShape,
    pub size_start: f32,
    pub size_end: f32,
    pub color_start: Vec4,
    pub color_end: Vec4,
    pub gravity: Vec3,
    pub damping: f32,
    pub rotational_speed_min: f32,
    pub rotational_speed_max: f32,
    pub size_curve: Curve,
    pub color_curve: Curve,
}

impl Default for InitialProperties {
    fn default() -> Self {
        Self {
            lifetime_min: 1.0,
            lifetime_max: 2.0,
            speed_min: 1.0,
            speed_max: 3.0,
            direction: Vec3::Y,
            spread: 15.0,
            shape: EmissionShape::Point,
            size_start: 0.1,
            size_end: 0.0,
            color_start: Vec4::ONE,
            color_end: Vec4::new(1.0, 1.0, 1.0, 0.0),
            gravity: Vec3::new(0.0, -9.81, 0.0),
            damping: 0.0,
            rotational_speed_min: 0.0,
            rotational_speed_max: 0.0,
            size_curve: Curve::Linear,
            color_curve: Curve::Linear,
        }
    }
}

/// Sample from `[min, max)`, tolerating swapped or negative bounds
fn sample(rng: &mut ParticleRng, min: f32, max: f32) -> f32 {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    rng.range(lo, hi)
}

impl InitialProperties {
    /// Set up a freshly reset particle spawned at `ctx`
    pub fn initialize(&self, particle: &mut DefaultParticle, ctx: &SpawnContext, rng: &mut ParticleRng) {
        let (offset, shape_dir) = match self.shape {
            EmissionShape::Point => (Vec3::ZERO, None),
            EmissionShape::Sphere { radius } => {
                let dir = rng.random_direction();
                (dir * rng.range(0.0, radius.max(0.0)), None)
            }
            EmissionShape::Cone { angle } => (Vec3::ZERO, Some(rng.cone_direction(self.direction, angle))),
            EmissionShape::Box { extents } => {
                let extents = extents.abs();
                (rng.range_vec3(-extents, extents), None)
            }
        };

        let dir = match shape_dir {
            Some(dir) => dir,
            None => rng.cone_direction(self.direction, self.spread),
        };
        let speed = sample(rng, self.speed_min, self.speed_max).max(0.0);

        particle.position = ctx.position + ctx.orientation * offset;
        particle.velocity = ctx.orientation * dir * speed;
        particle.acceleration = self.gravity;

        particle.base.set_lifetime(sample(rng, self.lifetime_min, self.lifetime_max).max(0.0));
        particle.start_size = self.size_start.max(0.0);
        particle.end_size = self.size_end.max(0.0);
        particle.size = particle.start_size;
        particle.start_color = self.color_start;
        particle.end_color = self.color_end;
        particle.color = self.color_start;
        particle.rotation = rng.range(0.0, std::f32::consts::TAU);
        particle.rotational_velocity = sample(rng, self.rotational_speed_min, self.rotational_speed_max);
    }

    /// Initializer closure owning its own random source
    pub fn into_initializer(self, seed: u32) -> impl FnMut(&mut DefaultParticle, &SpawnContext) {
        let mut rng = ParticleRng::new(seed);
        move |particle, ctx| self.initialize(particle, ctx, &mut rng)
    }

    /// Stock events matching these properties. Gravity is already the
    /// particles' acceleration, so it isn't applied a second time.
    pub fn stock_events(&self) -> StockEvents {
        StockEvents {
            gravity: Vec3::ZERO,
            damping: self.damping,
            size_curve: self.size_curve,
            color_curve: self.color_curve,
            ..StockEvents::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn context(position: Vec3, orientation: Quat) -> SpawnContext {
        SpawnContext {
            emitter_id: None,
            position,
            orientation,
            index: 0,
            count: 1,
        }
    }

    #[test]
    fn parse_from_toml() {
        let toml_str = r#"
lifetime_min = 0.5
lifetime_max = 0.5
direction = [0, 0, 1]
shape = { type = "sphere", radius = 2.0 }
color_end = [1, 0, 0, 0]
size_curve = "ease_out"
"#;
        let props: InitialProperties = toml::from_str(toml_str).unwrap();
        assert_eq!(props.lifetime_max, 0.5);
        assert_eq!(props.direction, Vec3::Z);
        assert_eq!(props.shape, EmissionShape::Sphere { radius: 2.0 });
        assert_eq!(props.color_end, Vec4::new(1.0, 0.0, 0.0, 0.0));
        assert_eq!(props.size_curve, Curve::EaseOut);
        // Untouched keys keep defaults
        assert_eq!(props.speed_min, 1.0);
        assert_eq!(props.gravity.y, -9.81);
    }

    #[test]
    fn box_shape_from_toml() {
        let props: InitialProperties =
            toml::from_str("shape = { type = \"box\", extents = [1, 2, 3] }").unwrap();
        assert_eq!(props.shape, EmissionShape::Box { extents: Vec3::new(1.0, 2.0, 3.0) });
    }

    #[test]
    fn samples_stay_in_range() {
        let props = InitialProperties {
            shape: EmissionShape::Box { extents: Vec3::splat(0.5) },
            ..InitialProperties::default()
        };
        let mut rng = ParticleRng::new(7);
        let ctx = context(Vec3::new(10.0, 0.0, 0.0), Quat::IDENTITY);
        for _ in 0..500 {
            let mut p = DefaultParticle::default();
            props.initialize(&mut p, &ctx, &mut rng);
            assert!((1.0..=2.0).contains(&p.base.lifetime()));
            let speed = p.velocity.length();
            assert!((0.99..3.01).contains(&speed), "speed {speed}");
            let offset = p.position - ctx.position;
            assert!(offset.abs().max_element() <= 0.5);
            assert_eq!(p.size, 0.1);
            assert_eq!(p.acceleration, props.gravity);
        }
    }

    #[test]
    fn emitter_orientation_rotates_direction() {
        let props = InitialProperties {
            spread: 0.0,
            speed_min: 2.0,
            speed_max: 2.0,
            ..InitialProperties::default()
        };
        let mut rng = ParticleRng::new(3);
        // Turn +Y onto +X
        let orientation = Quat::from_rotation_z(-std::f32::consts::FRAC_PI_2);
        let mut p = DefaultParticle::default();
        props.initialize(&mut p, &context(Vec3::ZERO, orientation), &mut rng);
        assert!((p.velocity - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn same_seed_same_particles() {
        let ctx = context(Vec3::ZERO, Quat::IDENTITY);
        let mut first = InitialProperties::default().into_initializer(42);
        let mut second = InitialProperties::default().into_initializer(42);
        for _ in 0..10 {
            let mut a = DefaultParticle::default();
            let mut b = DefaultParticle::default();
            first(&mut a, &ctx);
            second(&mut b, &ctx);
            assert_eq!(a, b);
        }
    }
}

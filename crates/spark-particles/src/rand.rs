//! Lightweight xorshift32 PRNG for particle initialization

use glam::{Quat, Vec3};

/// Seeded, reproducible random source. Initializers own one each so effects
/// replay identically for the same seed.
#[derive(Debug, Clone)]
pub struct ParticleRng {
    state: u32,
}

impl ParticleRng {
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Returns a float in [0, 1)
    pub fn next_f32(&mut self) -> f32 {
        // 24 random mantissa bits keep the result strictly below 1.0
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Returns a float in [min, max)
    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        min + self.next_f32() * (max - min)
    }

    /// Returns a vector with each component in [min, max)
    pub fn range_vec3(&mut self, min: Vec3, max: Vec3) -> Vec3 {
        Vec3::new(
            self.range(min.x, max.x),
            self.range(min.y, max.y),
            self.range(min.z, max.z),
        )
    }

    /// Returns a random unit direction vector (uniformly on sphere surface)
    pub fn random_direction(&mut self) -> Vec3 {
        // Marsaglia method for uniform sphere sampling
        loop {
            let x = self.range(-1.0, 1.0);
            let y = self.range(-1.0, 1.0);
            let s = x * x + y * y;
            if s < 1.0 {
                let factor = 2.0 * (1.0 - s).sqrt();
                return Vec3::new(x * factor, y * factor, 1.0 - 2.0 * s);
            }
        }
    }

    /// Returns a direction within a cone around `base_dir` with half-angle `angle_deg`
    pub fn cone_direction(&mut self, base_dir: Vec3, angle_deg: f32) -> Vec3 {
        let forward = base_dir.try_normalize().unwrap_or(Vec3::Y);
        if angle_deg <= 0.0 {
            return forward;
        }
        if angle_deg >= 180.0 {
            return self.random_direction();
        }

        let cos_angle = angle_deg.to_radians().cos();

        // Random point in cone: uniform cos_theta in [cos_angle, 1], uniform phi in [0, 2pi]
        let cos_theta = self.range(cos_angle, 1.0);
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let phi = self.range(0.0, std::f32::consts::TAU);

        // Local direction in cone around +Z, rotated onto `forward`
        let local = Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta);
        Quat::from_rotation_arc(Vec3::Z, forward) * local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rng_range_bounds() {
        let mut rng = ParticleRng::new(42);
        for _ in 0..1000 {
            let v = rng.range(0.0, 10.0);
            assert!((0.0..10.0).contains(&v));
        }
    }

    #[test]
    fn rng_is_reproducible() {
        let mut a = ParticleRng::new(7);
        let mut b = ParticleRng::new(7);
        for _ in 0..16 {
            assert_eq!(a.next_f32(), b.next_f32());
        }
    }

    #[test]
    fn rng_direction_unit_length() {
        let mut rng = ParticleRng::new(123);
        for _ in 0..100 {
            let d = rng.random_direction();
            assert!((d.length() - 1.0).abs() < 0.01);
        }
    }

    #[test]
    fn cone_direction_zero_spread() {
        let mut rng = ParticleRng::new(99);
        let dir = rng.cone_direction(Vec3::Y, 0.0);
        assert!((dir - Vec3::Y).length() < 0.01);
    }

    #[test]
    fn cone_direction_stays_in_cone() {
        let mut rng = ParticleRng::new(5);
        let axis = Vec3::new(1.0, 1.0, 0.0).normalize();
        let min_cos = 30.0f32.to_radians().cos() - 1e-3;
        for _ in 0..200 {
            let dir = rng.cone_direction(axis, 30.0);
            assert!(dir.dot(axis) >= min_cos);
        }
    }
}

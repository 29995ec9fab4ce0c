//! Particle types: the shared time/lifetime component, the particle-kind
//! capability trait, and the pool every system keeps its particles in

use glam::{Vec3, Vec4};

/// Time and lifetime bookkeeping shared by every particle kind.
///
/// `normalized_elapsed_time` always equals `elapsed_time / lifetime` while the
/// lifetime is positive. A lifetime of 0 means the particle never dies, and
/// both normalized fields stay pinned at 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    elapsed_time: f32,
    last_elapsed_time: f32,
    normalized_elapsed_time: f32,
    last_normalized_elapsed_time: f32,
    lifetime: f32,
    pub visible: bool,
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            elapsed_time: 0.0,
            last_elapsed_time: 0.0,
            normalized_elapsed_time: 0.0,
            last_normalized_elapsed_time: 0.0,
            lifetime: 0.0,
            visible: true,
        }
    }
}

impl Particle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every field back to a freshly-born, immortal, visible particle
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn elapsed_time(&self) -> f32 {
        self.elapsed_time
    }

    pub fn last_elapsed_time(&self) -> f32 {
        self.last_elapsed_time
    }

    pub fn normalized_elapsed_time(&self) -> f32 {
        self.normalized_elapsed_time
    }

    pub fn last_normalized_elapsed_time(&self) -> f32 {
        self.last_normalized_elapsed_time
    }

    pub fn lifetime(&self) -> f32 {
        self.lifetime
    }

    /// Age the particle by `dt`, remembering where it was before.
    pub fn advance_time(&mut self, dt: f32) {
        self.last_elapsed_time = self.elapsed_time;
        self.last_normalized_elapsed_time = self.normalized_elapsed_time;
        self.elapsed_time = (self.elapsed_time + dt).max(0.0);
        self.normalized_elapsed_time = self.normalized_for(self.elapsed_time);
    }

    pub fn set_elapsed_time(&mut self, elapsed: f32) {
        self.elapsed_time = elapsed.max(0.0);
        self.normalized_elapsed_time = self.normalized_for(self.elapsed_time);
    }

    /// Set progress as a fraction of the lifetime. Ignored (stays 0) for
    /// particles that live forever.
    pub fn set_normalized_elapsed_time(&mut self, normalized: f32) {
        if self.lifetime > 0.0 {
            self.normalized_elapsed_time = normalized.max(0.0);
            self.elapsed_time = self.normalized_elapsed_time * self.lifetime;
        } else {
            self.normalized_elapsed_time = 0.0;
        }
    }

    /// Negative lifetimes clamp to 0. A non-positive lifetime pins both
    /// normalized fields to 0 even if time has already elapsed.
    pub fn set_lifetime(&mut self, lifetime: f32) {
        self.lifetime = if lifetime > 0.0 { lifetime } else { 0.0 };
        if self.lifetime > 0.0 {
            self.normalized_elapsed_time = self.elapsed_time / self.lifetime;
        } else {
            self.normalized_elapsed_time = 0.0;
            self.last_normalized_elapsed_time = 0.0;
        }
    }

    pub fn is_active(&self) -> bool {
        self.lifetime <= 0.0 || self.elapsed_time < self.lifetime
    }

    fn normalized_for(&self, elapsed: f32) -> f32 {
        if self.lifetime > 0.0 {
            elapsed / self.lifetime
        } else {
            0.0
        }
    }
}

/// Capability every particle kind provides to the systems that pool it.
///
/// Systems are generic over the kind, so event callbacks operate on the
/// concrete type. `reset` must leave the base in its `Particle::reset` state;
/// `copy_from` must copy every field, base included.
pub trait ParticleKind: Clone + Default + 'static {
    fn base(&self) -> &Particle;

    fn base_mut(&mut self) -> &mut Particle;

    fn reset(&mut self) {
        *self = Self::default();
        self.base_mut().reset();
    }

    fn copy_from(&mut self, other: &Self) {
        self.clone_from(other);
    }
}

impl ParticleKind for Particle {
    fn base(&self) -> &Particle {
        self
    }

    fn base_mut(&mut self) -> &mut Particle {
        self
    }

    fn reset(&mut self) {
        Particle::reset(self);
    }
}

/// General-purpose particle with motion, size and color over lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultParticle {
    pub base: Particle,
    pub position: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
    /// Rotation around the view axis, radians
    pub rotation: f32,
    pub rotational_velocity: f32,
    pub size: f32,
    pub start_size: f32,
    pub end_size: f32,
    pub color: Vec4,
    pub start_color: Vec4,
    pub end_color: Vec4,
}

impl Default for DefaultParticle {
    fn default() -> Self {
        Self {
            base: Particle::default(),
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            rotation: 0.0,
            rotational_velocity: 0.0,
            size: 1.0,
            start_size: 1.0,
            end_size: 1.0,
            color: Vec4::ONE,
            start_color: Vec4::ONE,
            end_color: Vec4::ONE,
        }
    }
}

impl ParticleKind for DefaultParticle {
    fn base(&self) -> &Particle {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Particle {
        &mut self.base
    }
}

/// Fixed-capacity pool split into an active region `[0, active_count)` and a
/// free region behind it.
///
/// The active region is kept in spawn order: new particles are appended and
/// retirement compacts survivors without reordering them, so the front of the
/// region always holds the oldest particle.
pub struct ParticlePool<P> {
    particles: Vec<P>,
    active_count: usize,
}

impl<P: ParticleKind> ParticlePool<P> {
    pub fn new(capacity: usize) -> Self {
        let mut particles = Vec::with_capacity(capacity);
        particles.resize_with(capacity, P::default);
        Self {
            particles,
            active_count: 0,
        }
    }

    /// Allocated slots (active + free)
    pub fn capacity(&self) -> usize {
        self.particles.len()
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn free_count(&self) -> usize {
        self.particles.len() - self.active_count
    }

    pub fn is_full(&self) -> bool {
        self.active_count >= self.particles.len()
    }

    /// Move a free particle into the active region, reset it and hand it back
    /// for initialization. Returns None if the pool is full.
    pub fn spawn(&mut self) -> Option<&mut P> {
        if self.is_full() {
            return None;
        }
        let idx = self.active_count;
        self.active_count += 1;
        let particle = &mut self.particles[idx];
        particle.reset();
        Some(particle)
    }

    /// Run `update` on every active particle, then return the ones that are no
    /// longer active to the free region. Survivors keep their spawn order.
    /// Returns the number retired.
    pub fn update_and_compact(&mut self, mut update: impl FnMut(&mut P)) -> usize {
        let before = self.active_count;
        let mut kept = 0;
        for i in 0..before {
            update(&mut self.particles[i]);
            if self.particles[i].base().is_active() {
                if kept != i {
                    self.particles.swap(kept, i);
                }
                kept += 1;
            }
        }
        self.active_count = kept;
        before - kept
    }

    /// Retire up to `count` particles from the front of the active region (the
    /// oldest by spawn order) without looking at their ages. Returns how many
    /// slots were freed.
    pub fn recycle_oldest(&mut self, count: usize) -> usize {
        let count = count.min(self.active_count);
        if count == 0 {
            return 0;
        }
        self.particles[..self.active_count].rotate_left(count);
        self.active_count -= count;
        count
    }

    /// Retire all particles without releasing memory
    pub fn clear(&mut self) {
        self.active_count = 0;
    }

    /// Change the number of allocated slots.
    ///
    /// Active particles are kept by value; if `capacity` is below the active
    /// count the excess tail of the active region is dropped. Does nothing when
    /// the capacity is unchanged.
    pub fn resize(&mut self, capacity: usize) {
        let current = self.particles.len();
        if capacity == current {
            return;
        }
        if capacity > current {
            self.particles.resize_with(capacity, P::default);
        } else {
            self.active_count = self.active_count.min(capacity);
            self.particles.truncate(capacity);
            self.particles.shrink_to_fit();
        }
    }

    /// Active particles, oldest first
    pub fn active(&self) -> &[P] {
        &self.particles[..self.active_count]
    }

    pub fn active_mut(&mut self) -> &mut [P] {
        &mut self.particles[..self.active_count]
    }
}

//! Emitters: spawn-rate bookkeeping and the moving transform particles are
//! spawned from

use glam::{Quat, Vec3};
use spark_core::{EmitterId, IdGenerator, Result, SparkError};

/// Position with velocity and acceleration integration
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position3D {
    pub position: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
}

impl Position3D {
    pub fn update(&mut self, dt: f32) {
        self.velocity += self.acceleration * dt;
        self.position += self.velocity * dt;
    }
}

/// Orientation with angular velocity and acceleration (scaled-axis, radians/s)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation3D {
    pub orientation: Quat,
    pub rotational_velocity: Vec3,
    pub rotational_acceleration: Vec3,
}

impl Default for Orientation3D {
    fn default() -> Self {
        Self {
            orientation: Quat::IDENTITY,
            rotational_velocity: Vec3::ZERO,
            rotational_acceleration: Vec3::ZERO,
        }
    }
}

impl Orientation3D {
    pub fn update(&mut self, dt: f32) {
        self.rotational_velocity += self.rotational_acceleration * dt;
        if self.rotational_velocity != Vec3::ZERO {
            let step = Quat::from_scaled_axis(self.rotational_velocity * dt);
            self.orientation = (step * self.orientation).normalize();
        }
    }
}

/// Orbits a position/orientation pair around a fixed pivot point
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pivot3D {
    pub pivot_point: Vec3,
    pub rotational_velocity: Vec3,
    pub rotational_acceleration: Vec3,
    /// Whether orbiting also turns the orientation to keep facing the same way
    /// relative to the pivot
    pub rotate_orientation: bool,
}

impl Pivot3D {
    pub fn update(&mut self, dt: f32, position: &mut Vec3, orientation: &mut Quat) {
        self.rotational_velocity += self.rotational_acceleration * dt;
        if self.rotational_velocity == Vec3::ZERO {
            return;
        }
        let step = Quat::from_scaled_axis(self.rotational_velocity * dt);
        *position = self.pivot_point + step * (*position - self.pivot_point);
        if self.rotate_orientation {
            *orientation = (step * *orientation).normalize();
        }
    }
}

type BurstCompleteCallback = Box<dyn FnMut(EmitterId)>;

/// Turns an emission rate and frame time into a whole number of particles,
/// carrying the fractional remainder from frame to frame.
///
/// Per update at most one emission mode is used: continuous emission when
/// `emit_automatically` is set, otherwise a time-bounded burst, otherwise a
/// count-bounded burst.
pub struct Emitter {
    id: EmitterId,
    pub enabled: bool,
    particles_per_second: f32,
    seconds_per_particle: f32,
    accumulated_time: f32,
    pub emit_automatically: bool,
    burst_particles: u32,
    burst_time: f32,
    pub position: Position3D,
    pub orientation: Orientation3D,
    pub pivot: Pivot3D,
    previous_position: Vec3,
    previous_orientation: Quat,
    pub lerp_emission_position_and_orientation: bool,
    pub suppress_lerp_next_update: bool,
    burst_complete: Vec<BurstCompleteCallback>,
}

impl Emitter {
    pub fn new(id: EmitterId) -> Self {
        let mut emitter = Self {
            id,
            enabled: true,
            particles_per_second: 0.0,
            seconds_per_particle: 0.0,
            accumulated_time: 0.0,
            emit_automatically: true,
            burst_particles: 0,
            burst_time: 0.0,
            position: Position3D::default(),
            orientation: Orientation3D::default(),
            pivot: Pivot3D::default(),
            previous_position: Vec3::ZERO,
            previous_orientation: Quat::IDENTITY,
            lerp_emission_position_and_orientation: true,
            suppress_lerp_next_update: false,
            burst_complete: Vec::new(),
        };
        emitter.set_particles_per_second(100.0);
        // Go through the setters so construction follows the same path as
        // every later change
        emitter.set_burst_particles(0);
        emitter.set_burst_time(0.0);
        emitter
    }

    pub fn id(&self) -> EmitterId {
        self.id
    }

    pub fn particles_per_second(&self) -> f32 {
        self.particles_per_second
    }

    /// Negative rates clamp to 0, which disables emission
    pub fn set_particles_per_second(&mut self, rate: f32) {
        self.particles_per_second = if rate > 0.0 { rate } else { 0.0 };
        self.seconds_per_particle = if self.particles_per_second > 0.0 {
            1.0 / self.particles_per_second
        } else {
            0.0
        };
    }

    pub fn seconds_per_particle(&self) -> f32 {
        self.seconds_per_particle
    }

    pub fn accumulated_time(&self) -> f32 {
        self.accumulated_time
    }

    pub fn burst_particles(&self) -> u32 {
        self.burst_particles
    }

    /// Number of particles still to emit in a count-bounded burst.
    ///
    /// Setting a value of 0 or less fires the burst-complete callbacks before
    /// returning, every time.
    pub fn set_burst_particles(&mut self, count: i64) {
        self.burst_particles = count.clamp(0, u32::MAX as i64) as u32;
        if count <= 0 {
            self.fire_burst_complete();
        }
    }

    pub fn burst_time(&self) -> f32 {
        self.burst_time
    }

    /// Seconds left in a time-bounded burst. Same zero-crossing rule as
    /// [`Emitter::set_burst_particles`].
    pub fn set_burst_time(&mut self, seconds: f32) {
        if seconds > 0.0 {
            self.burst_time = seconds;
        } else {
            self.burst_time = 0.0;
            self.fire_burst_complete();
        }
    }

    /// Subscribe to burst-complete notifications
    pub fn on_burst_complete(&mut self, callback: impl FnMut(EmitterId) + 'static) {
        self.burst_complete.push(Box::new(callback));
    }

    pub fn clear_burst_complete_callbacks(&mut self) {
        self.burst_complete.clear();
    }

    fn fire_burst_complete(&mut self) {
        let id = self.id;
        for callback in &mut self.burst_complete {
            callback(id);
        }
    }

    /// Drop accumulated fractional time and start emitting from scratch
    pub fn reset_accumulated_time(&mut self) {
        self.accumulated_time = 0.0;
    }

    /// Jump to the current transform without lerping on the next emission
    pub fn snap_previous_transform(&mut self) {
        self.previous_position = self.position.position;
        self.previous_orientation = self.orientation.orientation;
    }

    pub fn previous_position(&self) -> Vec3 {
        self.previous_position
    }

    pub fn previous_orientation(&self) -> Quat {
        self.previous_orientation
    }

    /// Fixed-remainder accumulator: emits `floor(accumulated / spp)` and keeps
    /// the rest, so the long-run rate converges on `particles_per_second`
    /// whatever the frame-time jitter.
    pub fn compute_count(&mut self, dt: f32) -> u32 {
        if self.seconds_per_particle <= 0.0 {
            return 0;
        }
        self.accumulated_time += dt.max(0.0);
        let count = (self.accumulated_time / self.seconds_per_particle).floor();
        if count < 1.0 {
            return 0;
        }
        self.accumulated_time -= count * self.seconds_per_particle;
        if self.accumulated_time < 0.0 {
            self.accumulated_time = 0.0;
        }
        count as u32
    }

    /// Move the transform forward by `dt` and work out how many particles to
    /// emit this frame.
    pub fn update_and_compute_emit_count(&mut self, dt: f32) -> u32 {
        self.snap_previous_transform();
        self.position.update(dt);
        self.orientation.update(dt);
        self.pivot.update(
            dt,
            &mut self.position.position,
            &mut self.orientation.orientation,
        );

        if !self.enabled || self.particles_per_second <= 0.0 {
            return 0;
        }

        if self.emit_automatically {
            return self.compute_count(dt);
        }

        if self.burst_time > 0.0 {
            let burst_dt = dt.min(self.burst_time);
            let count = self.compute_count(burst_dt);
            self.set_burst_time(self.burst_time - burst_dt);
            return count;
        }

        if self.burst_particles > 0 {
            let count = self.compute_count(dt).min(self.burst_particles);
            self.set_burst_particles(self.burst_particles as i64 - count as i64);
            return count;
        }

        0
    }

    /// Transform for the `index`-th of `count` particles emitted this frame.
    ///
    /// With lerping on and more than one particle, spawns are spread evenly
    /// from just past the previous transform up to the current one.
    pub fn spawn_transform(&self, index: u32, count: u32) -> (Vec3, Quat) {
        if !self.lerp_emission_position_and_orientation
            || self.suppress_lerp_next_update
            || count <= 1
        {
            return (self.position.position, self.orientation.orientation);
        }
        let t = (index + 1) as f32 / count as f32;
        (
            self.previous_position.lerp(self.position.position, t),
            self.previous_orientation
                .slerp(self.orientation.orientation, t),
        )
    }

    /// Called once the particles of an update cycle have been emitted
    pub fn finish_emission(&mut self) {
        self.suppress_lerp_next_update = false;
    }
}

/// The emitters of one particle system, keyed by id in insertion order
pub struct ParticleEmitterCollection {
    emitters: Vec<Emitter>,
    ids: IdGenerator,
}

impl ParticleEmitterCollection {
    pub fn new() -> Self {
        Self::with_id_generator(IdGenerator::new())
    }

    /// Use an externally seeded generator, e.g. to keep ids unique across
    /// several collections
    pub fn with_id_generator(ids: IdGenerator) -> Self {
        Self {
            emitters: Vec::new(),
            ids,
        }
    }

    /// Add a default emitter and return its id
    pub fn add(&mut self) -> EmitterId {
        let id = self.ids.next_emitter_id();
        self.emitters.push(Emitter::new(id));
        id
    }

    /// Add an emitter configured by `setup`
    pub fn add_with(&mut self, setup: impl FnOnce(&mut Emitter)) -> EmitterId {
        let id = self.add();
        if let Some(emitter) = self.emitters.last_mut() {
            setup(emitter);
        }
        id
    }

    pub fn get(&self, id: EmitterId) -> Option<&Emitter> {
        self.emitters.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: EmitterId) -> Option<&mut Emitter> {
        self.emitters.iter_mut().find(|e| e.id == id)
    }

    pub fn contains(&self, id: EmitterId) -> bool {
        self.get(id).is_some()
    }

    /// Remove and drop an emitter. Absent ids are a caller bug.
    pub fn remove(&mut self, id: EmitterId) -> Result<Emitter> {
        let index = self
            .emitters
            .iter()
            .position(|e| e.id == id)
            .ok_or(SparkError::EmitterNotFound(id))?;
        Ok(self.emitters.remove(index))
    }

    pub fn remove_all(&mut self) {
        self.emitters.clear();
    }

    pub fn first(&self) -> Option<&Emitter> {
        self.emitters.first()
    }

    pub fn first_mut(&mut self) -> Option<&mut Emitter> {
        self.emitters.first_mut()
    }

    pub(crate) fn get_index(&self, index: usize) -> Option<&Emitter> {
        self.emitters.get(index)
    }

    pub(crate) fn get_index_mut(&mut self, index: usize) -> Option<&mut Emitter> {
        self.emitters.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Emitter> {
        self.emitters.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Emitter> {
        self.emitters.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.emitters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }
}

impl Default for ParticleEmitterCollection {
    fn default() -> Self {
        Self::new()
    }
}

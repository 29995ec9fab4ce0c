//! The particle system: one pool of particles driven by its emitters, event
//! chains and the auto memory manager

use crate::emitter::{Emitter, ParticleEmitterCollection};
use crate::events::{EndOfLife, EventTimeline, ParticleEvents, SystemEvents};
use crate::manager::{ManagedParticleSystem, OrderSubscription};
use crate::memory::{AutoMemoryManagerSettings, HighWaterMark};
use crate::particle::{ParticleKind, ParticlePool};
use crate::render::{DrawBatch, ParticleRenderer};
use crate::throttle::FrameThrottle;
use glam::{Quat, Vec3};
use spark_core::{EmitterId, ParticleSystemId, Result, SparkError};
use std::rc::Weak;

/// Where and how a particle is being spawned, handed to the initializer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnContext {
    /// Emitter doing the spawning; None for particles added directly
    pub emitter_id: Option<EmitterId>,
    pub position: Vec3,
    pub orientation: Quat,
    /// Index of this particle among those spawned together
    pub index: u32,
    pub count: u32,
}

impl SpawnContext {
    fn from_emitter(emitter: &Emitter, index: u32, count: u32) -> Self {
        let (position, orientation) = emitter.spawn_transform(index, count);
        Self {
            emitter_id: Some(emitter.id()),
            position,
            orientation,
            index,
            count,
        }
    }

    fn direct(emitter: Option<&Emitter>, index: u32, count: u32) -> Self {
        match emitter {
            Some(emitter) => Self {
                emitter_id: Some(emitter.id()),
                position: emitter.position.position,
                orientation: emitter.orientation.orientation,
                index,
                count,
            },
            None => Self {
                emitter_id: None,
                position: Vec3::ZERO,
                orientation: Quat::IDENTITY,
                index,
                count,
            },
        }
    }
}

/// Sets up a freshly reset particle. Must set every field the particle kind
/// needs to update and render correctly.
pub type ParticleInitializer<P> = Box<dyn FnMut(&mut P, &SpawnContext)>;

/// Runs at the end of `auto_initialize`, typically registering events and
/// configuring emitters
pub type LoadHook<P> = Box<dyn FnMut(&mut ParticleSystem<P>)>;

/// A pool of particles of one kind plus everything that drives it.
///
/// Per update: system events, emission, per-particle events and retirement,
/// then the auto memory manager. `0 <= active <= allocated <= max_allowed`
/// holds between calls.
pub struct ParticleSystem<P: ParticleKind> {
    id: ParticleSystemId,
    name: String,
    initialized: bool,
    enabled: bool,
    visible: bool,
    pool: ParticlePool<P>,
    max_allowed: usize,
    simulation_speed: f32,
    throttle: FrameThrottle,
    update_order: i32,
    draw_order: i32,
    order_subscriptions: Vec<Weak<OrderSubscription>>,
    emitters: ParticleEmitterCollection,
    particle_events: ParticleEvents<P>,
    system_events: SystemEvents<ParticleSystem<P>>,
    event_timeline: EventTimeline,
    initializer: Option<ParticleInitializer<P>>,
    renderer: Option<Box<dyn ParticleRenderer<P>>>,
    texture: Option<String>,
    load_hook: Option<LoadHook<P>>,
    memory: AutoMemoryManagerSettings,
    high_water_mark: HighWaterMark,
    elapsed_time: f32,
}

impl<P: ParticleKind> ParticleSystem<P> {
    pub fn new(id: ParticleSystemId) -> Self {
        Self {
            id,
            name: format!("particle-system-{id}"),
            initialized: false,
            enabled: true,
            visible: true,
            pool: ParticlePool::new(0),
            max_allowed: 0,
            simulation_speed: 1.0,
            throttle: FrameThrottle::default(),
            update_order: 0,
            draw_order: 0,
            order_subscriptions: Vec::new(),
            emitters: ParticleEmitterCollection::new(),
            particle_events: ParticleEvents::new(),
            system_events: SystemEvents::new(),
            event_timeline: EventTimeline::default(),
            initializer: None,
            renderer: None,
            texture: None,
            load_hook: None,
            memory: AutoMemoryManagerSettings::default(),
            high_water_mark: HighWaterMark::new(),
            elapsed_time: 0.0,
        }
    }

    pub fn with_name(id: ParticleSystemId, name: impl Into<String>) -> Self {
        let mut system = Self::new(id);
        system.name = name.into();
        system
    }

    pub fn id(&self) -> ParticleSystemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Hook run by every `auto_initialize`, so a destroyed system comes back
    /// fully configured
    pub fn set_load_hook(&mut self, hook: impl FnMut(&mut ParticleSystem<P>) + 'static) {
        self.load_hook = Some(Box::new(hook));
    }

    /// Allocate the pool, install the renderer and initializer, create the
    /// default emitter and run the load hook.
    ///
    /// Fails with `AlreadyInitialized` unless the system is fresh or has been
    /// destroyed.
    pub fn auto_initialize(
        &mut self,
        renderer: Box<dyn ParticleRenderer<P>>,
        initial_capacity: usize,
        max_allowed: usize,
        initializer: impl FnMut(&mut P, &SpawnContext) + 'static,
        texture: Option<&str>,
    ) -> Result<()> {
        if self.initialized {
            return Err(SparkError::AlreadyInitialized(self.id));
        }

        self.max_allowed = max_allowed;
        self.pool = ParticlePool::new(initial_capacity.min(max_allowed));
        self.renderer = Some(renderer);
        self.initializer = Some(Box::new(initializer));
        self.texture = texture.map(str::to_string);
        self.enabled = true;
        self.visible = true;
        self.throttle.reset();
        self.elapsed_time = 0.0;
        self.event_timeline.reset();
        self.high_water_mark.clear();
        if self.emitters.is_empty() {
            self.emitters.add();
        }
        self.initialized = true;

        log::debug!(
            "[particles] Initialized '{}' ({} allocated, {} max)",
            self.name,
            self.pool.capacity(),
            self.max_allowed
        );

        if let Some(mut hook) = self.load_hook.take() {
            hook(self);
            if self.load_hook.is_none() {
                self.load_hook = Some(hook);
            }
        }
        Ok(())
    }

    /// Release the pool and everything installed by `auto_initialize`. The
    /// system can be auto-initialized again afterwards.
    pub fn destroy(&mut self) {
        if !self.initialized {
            return;
        }
        self.initialized = false;
        self.pool = ParticlePool::new(0);
        self.max_allowed = 0;
        self.renderer = None;
        self.initializer = None;
        self.texture = None;
        self.emitters.remove_all();
        self.particle_events.remove_all_events();
        self.system_events = SystemEvents::new();
        self.event_timeline = EventTimeline::default();
        self.high_water_mark.clear();
        self.throttle.reset();
        self.elapsed_time = 0.0;
        log::debug!("[particles] Destroyed '{}'", self.name);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Advance the simulation by `dt` seconds of wall time
    pub fn update(&mut self, dt: f32) {
        if !self.initialized || !self.enabled || self.simulation_speed <= 0.0 {
            return;
        }
        let scaled = dt.max(0.0) * self.simulation_speed;
        let Some(dt) = self.throttle.consume(scaled) else {
            return;
        };
        self.elapsed_time += dt;

        if !self.run_system_events(dt) {
            return;
        }
        self.emit_particles(dt);
        self.update_particles(dt);
        self.apply_memory_manager(dt);
    }

    /// Returns false if the system was destroyed by its events
    fn run_system_events(&mut self, dt: f32) -> bool {
        let step = self.event_timeline.advance(dt);
        let mut events = std::mem::take(&mut self.system_events);
        events.run(self, step, dt);
        if !self.initialized {
            // Destroyed from inside a callback; the detached chain goes too
            return false;
        }
        let placeholder = std::mem::replace(&mut self.system_events, events);
        self.system_events.absorb(placeholder);
        if step.ended && self.event_timeline.end_of_life == EndOfLife::Destroy {
            self.destroy();
            return false;
        }
        true
    }

    fn emit_particles(&mut self, dt: f32) {
        for index in 0..self.emitters.len() {
            let Some(emitter) = self.emitters.get_index_mut(index) else {
                break;
            };
            let count = emitter.update_and_compute_emit_count(dt);
            if count == 0 {
                continue;
            }
            self.recycle_for(count as usize);

            for i in 0..count {
                let Some(emitter) = self.emitters.get_index(index) else {
                    break;
                };
                let context = SpawnContext::from_emitter(emitter, i, count);
                if !self.spawn_one(&context) {
                    log::trace!(
                        "[particles] '{}' dropped {} particle(s): pool full",
                        self.name,
                        count - i
                    );
                    break;
                }
            }

            if let Some(emitter) = self.emitters.get_index_mut(index) {
                emitter.finish_emission();
            }
        }
    }

    fn update_particles(&mut self, dt: f32) {
        self.particle_events.prepare();
        let events = &mut self.particle_events;
        self.pool.update_and_compact(|particle| {
            particle.base_mut().advance_time(dt);
            events.run(particle, dt);
        });
    }

    fn apply_memory_manager(&mut self, dt: f32) {
        let window = self
            .memory
            .seconds_high_water_mark_must_hold_before_shrinking();
        self.high_water_mark
            .record(dt, self.pool.active_count(), window);

        if !self.memory.mode().allows_decrease() || !self.high_water_mark.has_held_for(window) {
            return;
        }
        let target = self
            .memory
            .shrink_target(self.high_water_mark.peak(), self.max_allowed)
            .max(self.pool.active_count());
        if target < self.pool.capacity() {
            log::debug!(
                "[particles] '{}' shrinking pool {} -> {} (high-water mark {})",
                self.name,
                self.pool.capacity(),
                target,
                self.high_water_mark.peak()
            );
            self.pool.resize(target);
        }
        self.high_water_mark.restart_hold();
    }

    /// Under early recycling, free enough of the oldest particles for `wanted`
    /// spawns in one pass.
    fn recycle_for(&mut self, wanted: usize) {
        if !self.memory.mode().recycles_early() {
            return;
        }
        let free = self.pool.free_count();
        if wanted > free {
            let recycled = self.pool.recycle_oldest(wanted - free);
            log::trace!("[particles] '{}' recycled {} particle(s)", self.name, recycled);
        }
    }

    /// Make room for one more particle in a full pool by growing it, if the
    /// memory manager allows that.
    fn make_room(&mut self) -> bool {
        let mode = self.memory.mode();
        let allocated = self.pool.capacity();
        if mode.allows_increase() && allocated < self.max_allowed {
            let grown = self.memory.grown_capacity(allocated, self.max_allowed);
            log::debug!(
                "[particles] '{}' growing pool {} -> {}",
                self.name,
                allocated,
                grown
            );
            self.pool.resize(grown);
            return true;
        }
        false
    }

    fn spawn_one(&mut self, context: &SpawnContext) -> bool {
        if self.pool.is_full() && !self.make_room() {
            return false;
        }
        let Some(particle) = self.pool.spawn() else {
            return false;
        };
        if let Some(initializer) = self.initializer.as_mut() {
            initializer(particle, context);
        }
        true
    }

    /// Hand the visible active particles to the renderer. Reads particle state
    /// only. Returns the number drawn.
    pub fn draw(&mut self) -> usize {
        if !self.initialized || !self.visible {
            return 0;
        }
        let Some(renderer) = self.renderer.as_mut() else {
            return 0;
        };
        renderer.draw(DrawBatch {
            system_id: self.id,
            texture: self.texture.as_deref(),
            particles: self.pool.active(),
        })
    }

    /// Spawn one particle at the first emitter's current transform. Returns
    /// false when the pool is full and the memory manager can't make room.
    pub fn add_particle(&mut self) -> bool {
        self.add_particles(1) == 1
    }

    /// Spawn up to `count` particles, returning how many were added
    pub fn add_particles(&mut self, count: usize) -> usize {
        if !self.initialized {
            return 0;
        }
        let total = count.min(u32::MAX as usize) as u32;
        self.recycle_for(total as usize);
        let mut added = 0;
        for i in 0..total {
            let context = SpawnContext::direct(self.emitters.first(), i, total);
            if !self.spawn_one(&context) {
                break;
            }
            added += 1;
        }
        added
    }

    /// Retire every active particle, keeping the allocation
    pub fn remove_all_particles(&mut self) {
        self.pool.clear();
    }

    pub fn active_particle_count(&self) -> usize {
        self.pool.active_count()
    }

    pub fn allocated_particle_count(&self) -> usize {
        self.pool.capacity()
    }

    /// Resize the pool directly (clamped to `max_allowed`). Shrinking below the
    /// active count drops the excess particles.
    pub fn set_allocated_particle_count(&mut self, count: usize) {
        self.pool.resize(count.min(self.max_allowed));
    }

    pub fn max_allowed(&self) -> usize {
        self.max_allowed
    }

    /// Lowering the limit below the allocation shrinks the pool to match
    pub fn set_max_allowed(&mut self, max_allowed: usize) {
        self.max_allowed = max_allowed;
        if self.pool.capacity() > max_allowed {
            self.pool.resize(max_allowed);
        }
    }

    pub fn particles(&self) -> &[P] {
        self.pool.active()
    }

    pub fn particles_mut(&mut self) -> &mut [P] {
        self.pool.active_mut()
    }

    pub fn simulation_speed(&self) -> f32 {
        self.simulation_speed
    }

    /// Scales every update's time step. Negative speeds clamp to 0 (paused).
    pub fn set_simulation_speed(&mut self, speed: f32) {
        self.simulation_speed = if speed > 0.0 { speed } else { 0.0 };
    }

    pub fn updates_per_second(&self) -> u32 {
        self.throttle.updates_per_second()
    }

    /// 0 simulates on every call to `update`
    pub fn set_updates_per_second(&mut self, updates_per_second: u32) {
        self.throttle.set_updates_per_second(updates_per_second);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn update_order(&self) -> i32 {
        self.update_order
    }

    pub fn set_update_order(&mut self, order: i32) {
        if self.update_order != order {
            self.update_order = order;
            self.notify_order_changed(OrderSubscription::update_order_changed);
        }
    }

    pub fn draw_order(&self) -> i32 {
        self.draw_order
    }

    pub fn set_draw_order(&mut self, order: i32) {
        if self.draw_order != order {
            self.draw_order = order;
            self.notify_order_changed(OrderSubscription::draw_order_changed);
        }
    }

    /// Listen for update/draw order changes. Dropping the subscription
    /// unsubscribes.
    pub fn subscribe_order_changes(&mut self, subscription: Weak<OrderSubscription>) {
        self.order_subscriptions.push(subscription);
    }

    fn notify_order_changed(&mut self, notify: fn(&OrderSubscription)) {
        self.order_subscriptions.retain(|weak| match weak.upgrade() {
            Some(subscription) => {
                notify(&subscription);
                true
            }
            None => false,
        });
    }

    pub fn emitters(&self) -> &ParticleEmitterCollection {
        &self.emitters
    }

    pub fn emitters_mut(&mut self) -> &mut ParticleEmitterCollection {
        &mut self.emitters
    }

    /// The default emitter (first in the collection)
    pub fn emitter(&self) -> Option<&Emitter> {
        self.emitters.first()
    }

    pub fn emitter_mut(&mut self) -> Option<&mut Emitter> {
        self.emitters.first_mut()
    }

    pub fn particle_events(&self) -> &ParticleEvents<P> {
        &self.particle_events
    }

    pub fn particle_events_mut(&mut self) -> &mut ParticleEvents<P> {
        &mut self.particle_events
    }

    /// The system event chain. Inside a system event callback this is an empty
    /// stand-in that only records changes, so `len()` and `contains_group()`
    /// report nothing there.
    pub fn system_events(&self) -> &SystemEvents<ParticleSystem<P>> {
        &self.system_events
    }

    pub fn system_events_mut(&mut self) -> &mut SystemEvents<ParticleSystem<P>> {
        &mut self.system_events
    }

    pub fn event_timeline(&self) -> &EventTimeline {
        &self.event_timeline
    }

    pub fn event_timeline_mut(&mut self) -> &mut EventTimeline {
        &mut self.event_timeline
    }

    pub fn set_initializer(&mut self, initializer: impl FnMut(&mut P, &SpawnContext) + 'static) {
        self.initializer = Some(Box::new(initializer));
    }

    pub fn auto_memory_manager_settings(&self) -> &AutoMemoryManagerSettings {
        &self.memory
    }

    pub fn set_auto_memory_manager_settings(&mut self, settings: AutoMemoryManagerSettings) {
        self.memory = settings;
        self.high_water_mark.clear();
    }

    pub fn texture(&self) -> Option<&str> {
        self.texture.as_deref()
    }

    /// Total simulated time since initialization
    pub fn elapsed_time(&self) -> f32 {
        self.elapsed_time
    }
}

impl<P: ParticleKind> ManagedParticleSystem for ParticleSystem<P> {
    fn id(&self) -> ParticleSystemId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn update(&mut self, dt: f32) {
        ParticleSystem::update(self, dt);
    }

    fn draw(&mut self) -> usize {
        ParticleSystem::draw(self)
    }

    fn destroy(&mut self) {
        ParticleSystem::destroy(self);
    }

    fn update_order(&self) -> i32 {
        self.update_order
    }

    fn draw_order(&self) -> i32 {
        self.draw_order
    }

    fn subscribe_order_changes(&mut self, subscription: Weak<OrderSubscription>) {
        ParticleSystem::subscribe_order_changes(self, subscription);
    }

    fn set_simulation_speed(&mut self, speed: f32) {
        ParticleSystem::set_simulation_speed(self, speed);
    }

    fn set_updates_per_second(&mut self, updates_per_second: u32) {
        ParticleSystem::set_updates_per_second(self, updates_per_second);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    fn active_particle_count(&self) -> usize {
        self.pool.active_count()
    }

    fn allocated_particle_count(&self) -> usize {
        self.pool.capacity()
    }
}

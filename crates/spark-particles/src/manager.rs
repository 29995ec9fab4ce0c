//! Owns a set of particle systems and drives them in update and draw order
//!
//! Systems are shared (`Rc<RefCell<..>>`) so their creators keep typed access
//! while the manager holds them behind [`ManagedParticleSystem`]. The manager's
//! own state is never borrowed while a system is updating, which is what lets
//! a system add or remove systems (itself included) from inside its update.

use crate::throttle::FrameThrottle;
use spark_core::{ParticleSystemId, Result, SparkError};
use std::cell::{Cell, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// The manager's view of a particle system, independent of its particle kind
pub trait ManagedParticleSystem {
    fn id(&self) -> ParticleSystemId;
    fn name(&self) -> &str;
    fn is_initialized(&self) -> bool;
    fn update(&mut self, dt: f32);
    /// Returns the number of particles drawn
    fn draw(&mut self) -> usize;
    fn destroy(&mut self);
    fn update_order(&self) -> i32;
    fn draw_order(&self) -> i32;
    fn subscribe_order_changes(&mut self, subscription: Weak<OrderSubscription>);
    fn set_simulation_speed(&mut self, speed: f32);
    fn set_updates_per_second(&mut self, updates_per_second: u32);
    fn set_enabled(&mut self, enabled: bool);
    fn set_visible(&mut self, visible: bool);
    fn active_particle_count(&self) -> usize;
    fn allocated_particle_count(&self) -> usize;
}

#[derive(Debug, Default)]
struct OrderFlags {
    update_dirty: Cell<bool>,
    draw_dirty: Cell<bool>,
}

/// A listener for one system's order changes. Systems hold it weakly, so
/// dropping the last strong reference unsubscribes.
#[derive(Debug, Default)]
pub struct OrderSubscription {
    flags: Rc<OrderFlags>,
}

impl OrderSubscription {
    fn new(flags: Rc<OrderFlags>) -> Self {
        Self { flags }
    }

    pub fn update_order_changed(&self) {
        self.flags.update_dirty.set(true);
    }

    pub fn draw_order_changed(&self) {
        self.flags.draw_dirty.set(true);
    }

    /// Read and clear the update-order flag
    pub fn take_update_dirty(&self) -> bool {
        self.flags.update_dirty.replace(false)
    }

    /// Read and clear the draw-order flag
    pub fn take_draw_dirty(&self) -> bool {
        self.flags.draw_dirty.replace(false)
    }
}

/// A particle system shared between its creator and a manager
#[derive(Clone)]
pub struct SharedParticleSystem {
    id: ParticleSystemId,
    inner: Rc<RefCell<dyn ManagedParticleSystem>>,
}

impl SharedParticleSystem {
    pub fn new<S: ManagedParticleSystem + 'static>(system: S) -> Self {
        let id = system.id();
        Self {
            id,
            inner: Rc::new(RefCell::new(system)),
        }
    }

    /// Share a system the caller keeps typed access to. Returns None if the
    /// system is mutably borrowed right now.
    pub fn from_rc<S: ManagedParticleSystem + 'static>(system: Rc<RefCell<S>>) -> Option<Self> {
        let id = system.try_borrow().ok()?.id();
        Some(Self { id, inner: system })
    }

    pub fn id(&self) -> ParticleSystemId {
        self.id
    }

    /// Mutable access, failing with `SystemBusy` while the system is updating
    pub fn try_borrow_mut(&self) -> Result<RefMut<'_, dyn ManagedParticleSystem + 'static>> {
        self.inner
            .try_borrow_mut()
            .map_err(|_| SparkError::SystemBusy(self.id))
    }

    /// Run `f` on the system, failing with `SystemBusy` while it is updating
    pub fn with<R>(&self, f: impl FnOnce(&dyn ManagedParticleSystem) -> R) -> Result<R> {
        let system = self
            .inner
            .try_borrow()
            .map_err(|_| SparkError::SystemBusy(self.id))?;
        Ok(f(&*system))
    }

    pub fn ptr_eq(&self, other: &SharedParticleSystem) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for SharedParticleSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedParticleSystem")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Cursor over the update order for the pass in progress
#[derive(Debug, Default)]
struct UpdatePass {
    cursor: usize,
    current: Option<ParticleSystemId>,
    current_removed: bool,
}

struct ManagerState {
    by_update: Vec<SharedParticleSystem>,
    by_draw: Vec<SharedParticleSystem>,
    subscriptions: HashMap<ParticleSystemId, Rc<OrderSubscription>>,
    flags: Rc<OrderFlags>,
    pass: Option<UpdatePass>,
    drawing: bool,
    simulation_speed: f32,
    throttle: FrameThrottle,
}

impl ManagerState {
    fn new() -> Self {
        Self {
            by_update: Vec::new(),
            by_draw: Vec::new(),
            subscriptions: HashMap::new(),
            flags: Rc::new(OrderFlags::default()),
            pass: None,
            drawing: false,
            simulation_speed: 1.0,
            throttle: FrameThrottle::default(),
        }
    }

    fn index_of(&self, id: ParticleSystemId) -> Option<usize> {
        self.by_update.iter().position(|s| s.id == id)
    }

    fn remove(&mut self, id: ParticleSystemId) -> Result<SharedParticleSystem> {
        let index = self
            .index_of(id)
            .ok_or(SparkError::ParticleSystemNotFound(id))?;
        let system = self.by_update.remove(index);
        self.by_draw.retain(|s| s.id != id);
        self.subscriptions.remove(&id);

        if let Some(pass) = self.pass.as_mut() {
            if index < pass.cursor {
                pass.cursor -= 1;
            } else if index == pass.cursor {
                // Whatever slid into this slot is next
                pass.current_removed = true;
            }
        }
        Ok(system)
    }

    fn clear(&mut self) {
        self.by_update.clear();
        self.by_draw.clear();
        self.subscriptions.clear();
        if let Some(pass) = self.pass.as_mut() {
            pass.cursor = 0;
            pass.current_removed = true;
        }
    }

    fn sort_update_order_if_dirty(&mut self) {
        if self.flags.update_dirty.replace(false) && !sort_by_order(&mut self.by_update, |s| s.update_order()) {
            self.flags.update_dirty.set(true);
        }
    }

    fn sort_draw_order_if_dirty(&mut self) {
        if self.flags.draw_dirty.replace(false) && !sort_by_order(&mut self.by_draw, |s| s.draw_order()) {
            self.flags.draw_dirty.set(true);
        }
    }
}

/// Stable sort by an order key. Leaves the list untouched and returns false
/// if any system is busy and can't report its key.
fn sort_by_order(
    systems: &mut [SharedParticleSystem],
    key: impl Fn(&dyn ManagedParticleSystem) -> i32,
) -> bool {
    let mut keyed = Vec::with_capacity(systems.len());
    for system in systems.iter() {
        match system.with(&key) {
            Ok(order) => keyed.push((order, system.clone())),
            Err(_) => {
                log::warn!("[particles] Deferring sort: system {} is busy", system.id);
                return false;
            }
        }
    }
    keyed.sort_by_key(|(order, _)| *order);
    for (slot, (_, system)) in systems.iter_mut().zip(keyed) {
        *slot = system;
    }
    true
}

/// Clears the pass marker however the pass ends
struct PassGuard<'a> {
    state: &'a RefCell<ManagerState>,
    drawing: bool,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            if self.drawing {
                state.drawing = false;
            } else {
                state.pass = None;
            }
        }
    }
}

/// Keeps a collection of particle systems in update and draw order.
///
/// ```
/// use spark_core::ParticleSystemId;
/// use spark_particles::{ParticleSystem, Particle, ParticleSystemManager, SharedParticleSystem};
///
/// let manager = ParticleSystemManager::new();
/// let system: ParticleSystem<Particle> = ParticleSystem::new(ParticleSystemId::from_raw(1));
/// manager.add_particle_system(SharedParticleSystem::new(system)).unwrap();
/// manager.update_all_particle_systems(1.0 / 60.0).unwrap();
/// assert_eq!(manager.len(), 1);
/// ```
pub struct ParticleSystemManager {
    state: Rc<RefCell<ManagerState>>,
}

impl Default for ParticleSystemManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticleSystemManager {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(ManagerState::new())),
        }
    }

    /// Weak handle for use inside system callbacks
    pub fn handle(&self) -> ManagerHandle {
        ManagerHandle {
            state: Rc::downgrade(&self.state),
        }
    }

    /// Add a system and subscribe to its order changes. Systems added during
    /// an update pass are updated later in the same pass.
    pub fn add_particle_system(&self, system: SharedParticleSystem) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.index_of(system.id).is_some() {
            return Err(SparkError::DuplicateParticleSystem(system.id));
        }

        let subscription = Rc::new(OrderSubscription::new(state.flags.clone()));
        {
            let mut inner = system.try_borrow_mut()?;
            inner.subscribe_order_changes(Rc::downgrade(&subscription));
            log::debug!("[particles] Manager added '{}' ({})", inner.name(), system.id);
        }
        state.subscriptions.insert(system.id, subscription);
        state.by_update.push(system.clone());
        state.by_draw.push(system);
        state.flags.update_dirty.set(true);
        state.flags.draw_dirty.set(true);
        Ok(())
    }

    pub fn remove_particle_system(&self, system: &SharedParticleSystem) -> Result<()> {
        self.remove_particle_system_by_id(system.id)
    }

    /// Remove a system. Safe from inside any system's update, including the
    /// system being removed.
    pub fn remove_particle_system_by_id(&self, id: ParticleSystemId) -> Result<()> {
        let removed = self.state.borrow_mut().remove(id)?;
        log::debug!("[particles] Manager removed {}", removed.id);
        Ok(())
    }

    pub fn contains_particle_system(&self, id: ParticleSystemId) -> bool {
        self.state.borrow().index_of(id).is_some()
    }

    pub fn get_particle_system(&self, id: ParticleSystemId) -> Option<SharedParticleSystem> {
        let state = self.state.borrow();
        state.index_of(id).map(|i| state.by_update[i].clone())
    }

    /// Every system, in update order
    pub fn particle_systems(&self) -> Vec<SharedParticleSystem> {
        let mut state = self.state.borrow_mut();
        if state.pass.is_none() {
            state.sort_update_order_if_dirty();
        }
        state.by_update.clone()
    }

    /// Every system, in draw order
    pub fn particle_systems_in_draw_order(&self) -> Vec<SharedParticleSystem> {
        let mut state = self.state.borrow_mut();
        if !state.drawing {
            state.sort_draw_order_if_dirty();
        }
        state.by_draw.clone()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().by_update.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().by_update.is_empty()
    }

    /// Forget every system without touching them
    pub fn remove_all_particle_systems(&self) {
        self.state.borrow_mut().clear();
    }

    /// Destroy every system, then forget them. Fails without changing anything
    /// if any system is busy.
    pub fn destroy_and_remove_all_particle_systems(&self) -> Result<()> {
        let systems = self.state.borrow().by_update.clone();
        let mut borrowed = Vec::with_capacity(systems.len());
        for system in &systems {
            borrowed.push(system.try_borrow_mut()?);
        }
        for mut system in borrowed {
            system.destroy();
        }
        self.state.borrow_mut().clear();
        Ok(())
    }

    pub fn simulation_speed(&self) -> f32 {
        self.state.borrow().simulation_speed
    }

    /// Scales the time step of every update pass. Negative speeds clamp to 0.
    pub fn set_simulation_speed(&self, speed: f32) {
        self.state.borrow_mut().simulation_speed = speed.max(0.0);
    }

    pub fn updates_per_second(&self) -> u32 {
        self.state.borrow().throttle.updates_per_second()
    }

    /// Throttle whole update passes; 0 runs one pass per call
    pub fn set_updates_per_second(&self, updates_per_second: u32) {
        self.state
            .borrow_mut()
            .throttle
            .set_updates_per_second(updates_per_second);
    }

    /// Update every system once, in update order.
    ///
    /// Iterates by index: a removal behind the cursor shifts it back, and
    /// removing the system being updated makes its successor the next one
    /// visited. Errors with `ReentrantUpdate` if called from inside a pass.
    pub fn update_all_particle_systems(&self, dt: f32) -> Result<()> {
        let dt = {
            let mut state = self.state.borrow_mut();
            if state.pass.is_some() || state.drawing {
                return Err(SparkError::ReentrantUpdate);
            }
            if state.simulation_speed <= 0.0 {
                return Ok(());
            }
            let scaled = dt.max(0.0) * state.simulation_speed;
            let Some(dt) = state.throttle.consume(scaled) else {
                return Ok(());
            };
            state.sort_update_order_if_dirty();
            state.pass = Some(UpdatePass::default());
            dt
        };
        let _guard = PassGuard {
            state: &self.state,
            drawing: false,
        };

        while let Some(system) = self.next_in_pass() {
            match system.inner.try_borrow_mut() {
                Ok(mut inner) => inner.update(dt),
                Err(_) => log::warn!("[particles] Skipping busy system {}", system.id),
            }

            let mut state = self.state.borrow_mut();
            if let Some(pass) = state.pass.as_mut() {
                if !pass.current_removed {
                    pass.cursor += 1;
                }
                pass.current = None;
            }
        }
        Ok(())
    }

    fn next_in_pass(&self) -> Option<SharedParticleSystem> {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        let pass = state.pass.as_mut()?;
        let system = state.by_update.get(pass.cursor)?;
        pass.current = Some(system.id);
        pass.current_removed = false;
        Some(system.clone())
    }

    /// Id of the system being updated right now, if any
    pub fn currently_updating(&self) -> Option<ParticleSystemId> {
        self.state.borrow().pass.as_ref().and_then(|p| p.current)
    }

    /// Draw every system in draw order, returning the number of particles drawn
    pub fn draw_all_particle_systems(&self) -> Result<usize> {
        let systems = {
            let mut state = self.state.borrow_mut();
            if state.pass.is_some() || state.drawing {
                return Err(SparkError::ReentrantUpdate);
            }
            state.sort_draw_order_if_dirty();
            state.drawing = true;
            state.by_draw.clone()
        };
        let _guard = PassGuard {
            state: &self.state,
            drawing: true,
        };

        let mut drawn = 0;
        for system in systems {
            match system.inner.try_borrow_mut() {
                Ok(mut inner) => drawn += inner.draw(),
                Err(_) => log::warn!("[particles] Skipping busy system {}", system.id),
            }
        }
        Ok(drawn)
    }

    fn for_each_initialized(&self, mut f: impl FnMut(&mut dyn ManagedParticleSystem)) {
        let systems = self.state.borrow().by_update.clone();
        for system in systems {
            match system.inner.try_borrow_mut() {
                Ok(mut inner) => {
                    if inner.is_initialized() {
                        f(&mut *inner);
                    }
                }
                Err(_) => log::warn!("[particles] Skipping busy system {}", system.id),
            }
        }
    }

    pub fn set_simulation_speed_for_all(&self, speed: f32) {
        self.for_each_initialized(|s| s.set_simulation_speed(speed));
    }

    pub fn set_updates_per_second_for_all(&self, updates_per_second: u32) {
        self.for_each_initialized(|s| s.set_updates_per_second(updates_per_second));
    }

    pub fn set_enabled_for_all(&self, enabled: bool) {
        self.for_each_initialized(|s| s.set_enabled(enabled));
    }

    pub fn set_visible_for_all(&self, visible: bool) {
        self.for_each_initialized(|s| s.set_visible(visible));
    }

    /// Active particles across all systems (busy systems are not counted)
    pub fn total_active_particles(&self) -> usize {
        self.sum_over_systems(|s| s.active_particle_count())
    }

    /// Allocated particles across all systems (busy systems are not counted)
    pub fn total_particles_allocated(&self) -> usize {
        self.sum_over_systems(|s| s.allocated_particle_count())
    }

    fn sum_over_systems(&self, f: impl Fn(&dyn ManagedParticleSystem) -> usize) -> usize {
        let systems = self.state.borrow().by_update.clone();
        systems
            .iter()
            .filter_map(|system| system.with(&f).ok())
            .sum()
    }
}

/// Non-owning reference to a manager, for callbacks that need to add or
/// remove systems
#[derive(Clone)]
pub struct ManagerHandle {
    state: Weak<RefCell<ManagerState>>,
}

impl ManagerHandle {
    /// Fails with `ManagerDropped` once the manager is gone
    pub fn upgrade(&self) -> Result<ParticleSystemManager> {
        self.state
            .upgrade()
            .map(|state| ParticleSystemManager { state })
            .ok_or(SparkError::ManagerDropped)
    }

    pub fn add_particle_system(&self, system: SharedParticleSystem) -> Result<()> {
        self.upgrade()?.add_particle_system(system)
    }

    pub fn remove_particle_system_by_id(&self, id: ParticleSystemId) -> Result<()> {
        self.upgrade()?.remove_particle_system_by_id(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::Particle;
    use crate::render::{NullRenderer, RecordingRenderer};
    use crate::system::{ParticleSystem, SpawnContext};
    use pretty_assertions::assert_eq;

    type Visits = Rc<RefCell<Vec<&'static str>>>;

    fn id(raw: u64) -> ParticleSystemId {
        ParticleSystemId::from_raw(raw)
    }

    fn tracked_system(raw: u64, name: &'static str, visits: &Visits) -> Rc<RefCell<ParticleSystem<Particle>>> {
        let mut system = ParticleSystem::with_name(id(raw), name);
        system
            .auto_initialize(
                Box::new(NullRenderer),
                4,
                4,
                |_: &mut Particle, _: &SpawnContext| {},
                None,
            )
            .unwrap();
        let visits = visits.clone();
        system
            .system_events_mut()
            .add_every_time_event(move |_, _| visits.borrow_mut().push(name), 0, 0);
        Rc::new(RefCell::new(system))
    }

    fn add(manager: &ParticleSystemManager, system: &Rc<RefCell<ParticleSystem<Particle>>>) {
        manager
            .add_particle_system(SharedParticleSystem::from_rc(system.clone()).unwrap())
            .unwrap();
    }

    #[test]
    fn self_removal_skips_nothing() {
        let manager = ParticleSystemManager::new();
        let visits = Visits::default();
        let a = tracked_system(1, "a", &visits);
        let b = tracked_system(2, "b", &visits);
        let c = tracked_system(3, "c", &visits);

        let handle = manager.handle();
        b.borrow_mut().system_events_mut().add_every_time_event(
            move |s: &mut ParticleSystem<Particle>, _| {
                handle.remove_particle_system_by_id(s.id()).unwrap();
            },
            1,
            0,
        );
        for system in [&a, &b, &c] {
            add(&manager, system);
        }

        manager.update_all_particle_systems(0.1).unwrap();
        assert_eq!(*visits.borrow(), vec!["a", "b", "c"]);
        assert!(!manager.contains_particle_system(id(2)));
        assert_eq!(manager.len(), 2);

        visits.borrow_mut().clear();
        manager.update_all_particle_systems(0.1).unwrap();
        assert_eq!(*visits.borrow(), vec!["a", "c"]);
        assert_eq!(manager.currently_updating(), None);
    }

    #[test]
    fn removing_an_earlier_system_keeps_cursor() {
        let manager = ParticleSystemManager::new();
        let visits = Visits::default();
        let a = tracked_system(1, "a", &visits);
        let b = tracked_system(2, "b", &visits);
        let c = tracked_system(3, "c", &visits);

        let handle = manager.handle();
        b.borrow_mut().system_events_mut().add_every_time_event(
            move |_, _| {
                let _ = handle.remove_particle_system_by_id(id(1));
            },
            0,
            0,
        );
        for system in [&a, &b, &c] {
            add(&manager, system);
        }

        manager.update_all_particle_systems(0.1).unwrap();
        assert_eq!(*visits.borrow(), vec!["a", "b", "c"]);
        assert_eq!(
            manager.particle_systems().iter().map(|s| s.id()).collect::<Vec<_>>(),
            vec![id(2), id(3)]
        );
    }

    #[test]
    fn remove_all_from_inside_a_pass_stops_it() {
        let manager = ParticleSystemManager::new();
        let visits = Visits::default();
        let a = tracked_system(1, "a", &visits);
        let b = tracked_system(2, "b", &visits);

        let handle = manager.handle();
        a.borrow_mut().system_events_mut().add_every_time_event(
            move |_, _| handle.upgrade().unwrap().remove_all_particle_systems(),
            0,
            0,
        );
        add(&manager, &a);
        add(&manager, &b);

        manager.update_all_particle_systems(0.1).unwrap();
        assert_eq!(*visits.borrow(), vec!["a"]);
        assert!(manager.is_empty());
    }

    #[test]
    fn systems_added_mid_pass_run_in_same_pass() {
        let manager = ParticleSystemManager::new();
        let visits = Visits::default();
        let a = tracked_system(1, "a", &visits);
        let late = tracked_system(2, "late", &visits);

        let handle = manager.handle();
        let pending = RefCell::new(Some(late));
        a.borrow_mut().system_events_mut().add_every_time_event(
            move |_, _| {
                if let Some(system) = pending.borrow_mut().take() {
                    handle
                        .add_particle_system(SharedParticleSystem::from_rc(system).unwrap())
                        .unwrap();
                }
            },
            0,
            0,
        );
        add(&manager, &a);

        manager.update_all_particle_systems(0.1).unwrap();
        assert_eq!(*visits.borrow(), vec!["a", "late"]);
    }

    #[test]
    fn update_order_is_stable_and_lazy() {
        let manager = ParticleSystemManager::new();
        let visits = Visits::default();
        let a = tracked_system(1, "a", &visits);
        let b = tracked_system(2, "b", &visits);
        let c = tracked_system(3, "c", &visits);
        c.borrow_mut().set_update_order(-1);
        for system in [&a, &b, &c] {
            add(&manager, system);
        }

        manager.update_all_particle_systems(0.1).unwrap();
        assert_eq!(*visits.borrow(), vec!["c", "a", "b"]);

        visits.borrow_mut().clear();
        a.borrow_mut().set_update_order(5);
        manager.update_all_particle_systems(0.1).unwrap();
        assert_eq!(*visits.borrow(), vec!["c", "b", "a"]);
    }

    #[test]
    fn draw_order_is_independent() {
        let manager = ParticleSystemManager::new();
        let renderer = RecordingRenderer::new();
        let log = renderer.log();
        for (raw, draw_order) in [(1, 2), (2, 0), (3, 1)] {
            let mut system: ParticleSystem<Particle> = ParticleSystem::new(id(raw));
            system
                .auto_initialize(
                    Box::new(renderer.clone()),
                    2,
                    2,
                    |_: &mut Particle, _: &SpawnContext| {},
                    None,
                )
                .unwrap();
            system.set_draw_order(draw_order);
            system.add_particles(raw as usize - 1);
            manager.add_particle_system(SharedParticleSystem::new(system)).unwrap();
        }

        assert_eq!(manager.draw_all_particle_systems().unwrap(), 3);
        let drawn: Vec<_> = log.borrow().iter().map(|r| r.system_id).collect();
        assert_eq!(drawn, vec![id(2), id(3), id(1)]);
        let updated: Vec<_> = manager.particle_systems().iter().map(|s| s.id()).collect();
        assert_eq!(updated, vec![id(1), id(2), id(3)]);
    }

    #[test]
    fn identity_errors() {
        let manager = ParticleSystemManager::new();
        let system: ParticleSystem<Particle> = ParticleSystem::new(id(7));
        let shared = SharedParticleSystem::new(system);
        manager.add_particle_system(shared.clone()).unwrap();

        assert!(matches!(
            manager.add_particle_system(shared.clone()),
            Err(SparkError::DuplicateParticleSystem(_))
        ));
        manager.remove_particle_system(&shared).unwrap();
        assert!(matches!(
            manager.remove_particle_system(&shared),
            Err(SparkError::ParticleSystemNotFound(_))
        ));
    }

    #[test]
    fn reentrant_update_is_rejected() {
        let manager = ParticleSystemManager::new();
        let visits = Visits::default();
        let a = tracked_system(1, "a", &visits);
        let outcome = Rc::new(RefCell::new(None));
        let handle = manager.handle();
        let seen = outcome.clone();
        a.borrow_mut().system_events_mut().add_every_time_event(
            move |_, _| {
                let result = handle.upgrade().unwrap().update_all_particle_systems(0.1);
                *seen.borrow_mut() = Some(result.is_err());
            },
            0,
            0,
        );
        add(&manager, &a);

        manager.update_all_particle_systems(0.1).unwrap();
        assert_eq!(*outcome.borrow(), Some(true));
        assert_eq!(*visits.borrow(), vec!["a"]);
    }

    #[test]
    fn shared_mutable_access_reports_busy_systems() {
        let visits = Visits::default();
        let a = tracked_system(1, "a", &visits);
        let shared = SharedParticleSystem::from_rc(a.clone()).unwrap();

        shared.try_borrow_mut().unwrap().set_enabled(false);
        assert!(!a.borrow().is_enabled());

        let held = a.borrow_mut();
        assert!(matches!(shared.try_borrow_mut(), Err(SparkError::SystemBusy(found)) if found == id(1)));
        drop(held);
        assert!(shared.try_borrow_mut().is_ok());
    }

    #[test]
    fn broadcasts_skip_uninitialized_systems() {
        let manager = ParticleSystemManager::new();
        let visits = Visits::default();
        let ready = tracked_system(1, "ready", &visits);
        let idle: Rc<RefCell<ParticleSystem<Particle>>> =
            Rc::new(RefCell::new(ParticleSystem::new(id(2))));
        add(&manager, &ready);
        add(&manager, &idle);

        manager.set_simulation_speed_for_all(3.0);
        manager.set_updates_per_second_for_all(30);
        manager.set_visible_for_all(false);
        assert_eq!(ready.borrow().simulation_speed(), 3.0);
        assert_eq!(ready.borrow().updates_per_second(), 30);
        assert!(!ready.borrow().is_visible());
        assert_eq!(idle.borrow().simulation_speed(), 1.0);
        assert_eq!(idle.borrow().updates_per_second(), 0);
        assert!(idle.borrow().is_visible());
    }

    #[test]
    fn totals_and_destroy_all() {
        let manager = ParticleSystemManager::new();
        let visits = Visits::default();
        let a = tracked_system(1, "a", &visits);
        let b = tracked_system(2, "b", &visits);
        a.borrow_mut().add_particles(3);
        b.borrow_mut().add_particles(1);
        add(&manager, &a);
        add(&manager, &b);

        assert_eq!(manager.total_active_particles(), 4);
        assert_eq!(manager.total_particles_allocated(), 8);

        manager.destroy_and_remove_all_particle_systems().unwrap();
        assert!(manager.is_empty());
        assert!(!a.borrow().is_initialized());
        assert!(!b.borrow().is_initialized());
    }

    #[test]
    fn manager_speed_and_throttle() {
        let manager = ParticleSystemManager::new();
        let visits = Visits::default();
        let a = tracked_system(1, "a", &visits);
        add(&manager, &a);

        manager.set_simulation_speed(0.0);
        manager.update_all_particle_systems(0.1).unwrap();
        assert!(visits.borrow().is_empty());

        manager.set_simulation_speed(1.0);
        manager.set_updates_per_second(10);
        for _ in 0..4 {
            manager.update_all_particle_systems(0.05).unwrap();
        }
        assert_eq!(visits.borrow().len(), 2);
        assert!((a.borrow().elapsed_time() - 0.2).abs() < 1e-5);
    }

    #[test]
    fn removed_systems_stop_marking_order_dirty() {
        let manager = ParticleSystemManager::new();
        let visits = Visits::default();
        let a = tracked_system(1, "a", &visits);
        add(&manager, &a);
        manager.particle_systems();
        manager.remove_particle_system_by_id(id(1)).unwrap();

        a.borrow_mut().set_update_order(9);
        assert!(!manager.state.borrow().flags.update_dirty.get());
    }

    #[test]
    fn handle_outliving_manager() {
        let manager = ParticleSystemManager::new();
        let handle = manager.handle();
        drop(manager);
        assert!(matches!(
            handle.remove_particle_system_by_id(id(1)),
            Err(SparkError::ManagerDropped)
        ));
    }
}

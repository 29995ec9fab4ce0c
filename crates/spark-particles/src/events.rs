//! Event chains: ordered callbacks run on every particle (particle events) or
//! once per update on the system itself (system events)

use crate::particle::ParticleKind;
use serde::Deserialize;

/// When an event fires
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventTrigger {
    /// Every update
    EveryTime,
    /// Once, on the update where elapsed time reaches this many seconds
    Timed(f32),
    /// Once, on the update where normalized elapsed time reaches this value
    NormalizedTimed(f32),
}

impl EventTrigger {
    /// Whether the trigger falls inside `(last, now]`. A trigger at 0 fires on
    /// the first update that moves time forward.
    fn crossed(at: f32, last: f32, now: f32) -> bool {
        at <= now && (at > last || (at == 0.0 && last == 0.0 && now > 0.0))
    }

    fn fires(&self, last: f32, now: f32, last_normalized: f32, normalized: f32) -> bool {
        match *self {
            EventTrigger::EveryTime => true,
            EventTrigger::Timed(at) => Self::crossed(at, last, now),
            EventTrigger::NormalizedTimed(at) => Self::crossed(at, last_normalized, normalized),
        }
    }
}

/// Group used when the caller doesn't care about removing events selectively
pub const DEFAULT_GROUP: i32 = 0;

struct Event<F: ?Sized> {
    trigger: EventTrigger,
    execution_order: i32,
    group: i32,
    callback: Box<F>,
}

/// Sorted list of events, re-sorted lazily after insertions.
///
/// Lower execution orders run first; equal orders run in registration order
/// (the sort is stable and new events are appended).
struct EventList<F: ?Sized> {
    events: Vec<Event<F>>,
    needs_sort: bool,
}

impl<F: ?Sized> Default for EventList<F> {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            needs_sort: false,
        }
    }
}

impl<F: ?Sized> EventList<F> {
    fn push(&mut self, trigger: EventTrigger, execution_order: i32, group: i32, callback: Box<F>) {
        self.events.push(Event {
            trigger,
            execution_order,
            group,
            callback,
        });
        self.needs_sort = true;
    }

    fn sort_if_needed(&mut self) {
        if self.needs_sort {
            self.events.sort_by_key(|e| e.execution_order);
            self.needs_sort = false;
        }
    }

    fn remove_group(&mut self, group: i32) -> usize {
        let before = self.events.len();
        self.events.retain(|e| e.group != group);
        before - self.events.len()
    }

    fn contains_group(&self, group: i32) -> bool {
        self.events.iter().any(|e| e.group == group)
    }
}

type ParticleCallback<P> = dyn FnMut(&mut P, f32);

/// Per-particle event chain, run on every active particle each update after
/// its time has advanced.
pub struct ParticleEvents<P> {
    list: EventList<ParticleCallback<P>>,
}

impl<P> Default for ParticleEvents<P> {
    fn default() -> Self {
        Self {
            list: EventList::default(),
        }
    }
}

impl<P: ParticleKind> ParticleEvents<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_every_time_event(
        &mut self,
        callback: impl FnMut(&mut P, f32) + 'static,
        execution_order: i32,
        group: i32,
    ) {
        self.list.push(
            EventTrigger::EveryTime,
            execution_order,
            group,
            Box::new(callback),
        );
    }

    /// Fires once per particle when its elapsed time reaches `seconds`
    pub fn add_timed_event(
        &mut self,
        seconds: f32,
        callback: impl FnMut(&mut P, f32) + 'static,
        execution_order: i32,
        group: i32,
    ) {
        self.list.push(
            EventTrigger::Timed(seconds.max(0.0)),
            execution_order,
            group,
            Box::new(callback),
        );
    }

    /// Fires once per particle when its normalized elapsed time reaches
    /// `normalized` (never, for particles without a lifetime)
    pub fn add_normalized_timed_event(
        &mut self,
        normalized: f32,
        callback: impl FnMut(&mut P, f32) + 'static,
        execution_order: i32,
        group: i32,
    ) {
        self.list.push(
            EventTrigger::NormalizedTimed(normalized.max(0.0)),
            execution_order,
            group,
            Box::new(callback),
        );
    }

    pub fn remove_all_events_in_group(&mut self, group: i32) -> usize {
        self.list.remove_group(group)
    }

    pub fn remove_all_events(&mut self) {
        self.list.events.clear();
    }

    pub fn contains_group(&self, group: i32) -> bool {
        self.list.contains_group(group)
    }

    pub fn len(&self) -> usize {
        self.list.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.events.is_empty()
    }

    /// Sort once before running the chain over a frame's particles
    pub fn prepare(&mut self) {
        self.list.sort_if_needed();
    }

    /// Run the chain on one particle. Call [`ParticleEvents::prepare`] first.
    pub fn run(&mut self, particle: &mut P, dt: f32) {
        for event in &mut self.list.events {
            let base = particle.base();
            if event.trigger.fires(
                base.last_elapsed_time(),
                base.elapsed_time(),
                base.last_normalized_elapsed_time(),
                base.normalized_elapsed_time(),
            ) {
                (event.callback)(particle, dt);
            }
        }
    }
}

/// What happens when a system's event timeline reaches its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndOfLife {
    /// Keep running every-time events; timed events have all fired
    #[default]
    Nothing,
    /// Wrap the timeline back to 0 so timed events fire again
    Repeat,
    /// Destroy the particle system
    Destroy,
}

/// Clock that system events are timed against
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EventTimeline {
    elapsed: f32,
    last_elapsed: f32,
    /// Seconds until `end_of_life` applies; 0 means the timeline never ends
    pub lifetime: f32,
    pub end_of_life: EndOfLife,
}

impl EventTimeline {
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
        self.last_elapsed = 0.0;
    }

    /// Advance by `dt`, returning the window to test timed events against
    pub(crate) fn advance(&mut self, dt: f32) -> TimelineStep {
        self.last_elapsed = self.elapsed;
        self.elapsed += dt.max(0.0);
        let step = TimelineStep {
            last: self.last_elapsed,
            now: self.elapsed,
            ended: self.lifetime > 0.0 && self.elapsed >= self.lifetime,
        };
        if step.ended && self.end_of_life == EndOfLife::Repeat {
            self.elapsed -= self.lifetime;
            self.last_elapsed = 0.0;
        }
        step
    }
}

/// One advance of an [`EventTimeline`]: timed events in `(last, now]` are due
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TimelineStep {
    pub last: f32,
    pub now: f32,
    /// The timeline reached its lifetime on this step
    pub ended: bool,
}

type SystemCallback<S> = dyn FnMut(&mut S, f32);

enum PendingChange {
    RemoveGroup(i32),
    RemoveAll,
}

/// Per-system event chain.
///
/// Callbacks get the whole system. While the chain runs it is detached from
/// the system, so additions and removals made from inside a callback are
/// recorded and applied once the run finishes: they take effect from the next
/// update. Queries made from inside a callback see the empty stand-in.
pub struct SystemEvents<S> {
    list: EventList<SystemCallback<S>>,
    pending: Vec<PendingChange>,
}

impl<S> Default for SystemEvents<S> {
    fn default() -> Self {
        Self {
            list: EventList::default(),
            pending: Vec::new(),
        }
    }
}

impl<S> SystemEvents<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_every_time_event(
        &mut self,
        callback: impl FnMut(&mut S, f32) + 'static,
        execution_order: i32,
        group: i32,
    ) {
        self.list.push(
            EventTrigger::EveryTime,
            execution_order,
            group,
            Box::new(callback),
        );
    }

    /// Fires when the system's event timeline reaches `seconds`
    pub fn add_timed_event(
        &mut self,
        seconds: f32,
        callback: impl FnMut(&mut S, f32) + 'static,
        execution_order: i32,
        group: i32,
    ) {
        self.list.push(
            EventTrigger::Timed(seconds.max(0.0)),
            execution_order,
            group,
            Box::new(callback),
        );
    }

    pub fn remove_all_events_in_group(&mut self, group: i32) -> usize {
        self.pending.push(PendingChange::RemoveGroup(group));
        self.list.remove_group(group)
    }

    pub fn remove_all_events(&mut self) {
        self.pending.push(PendingChange::RemoveAll);
        self.list.events.clear();
    }

    pub fn contains_group(&self, group: i32) -> bool {
        self.list.contains_group(group)
    }

    pub fn len(&self) -> usize {
        self.list.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.events.is_empty()
    }

    /// Run the events due in `step` against `target`
    pub(crate) fn run(&mut self, target: &mut S, step: TimelineStep, dt: f32) {
        self.list.sort_if_needed();
        self.pending.clear();
        for event in &mut self.list.events {
            if event.trigger.fires(step.last, step.now, 0.0, 0.0) {
                (event.callback)(target, dt);
            }
        }
    }

    /// Fold in the changes recorded on the placeholder chain that stood in
    /// for this one while it ran.
    pub(crate) fn absorb(&mut self, placeholder: SystemEvents<S>) {
        for change in placeholder.pending {
            match change {
                PendingChange::RemoveGroup(group) => {
                    self.list.remove_group(group);
                }
                PendingChange::RemoveAll => self.list.events.clear(),
            }
        }
        for event in placeholder.list.events {
            self.list.push(
                event.trigger,
                event.execution_order,
                event.group,
                event.callback,
            );
        }
        self.pending.clear();
    }
}

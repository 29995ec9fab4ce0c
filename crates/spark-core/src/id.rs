//! Stable identifiers and the generator that hands them out

use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
        pub struct $name(pub u64);

        impl $name {
            /// Create an id from a raw value (for testing and lookups)
            pub fn from_raw(id: u64) -> Self {
                Self(id)
            }

            /// Get the raw u64 value
            pub fn raw(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Identifies a particle system for its whole lifetime, across destroy and re-initialize.
    ParticleSystemId
);

define_id!(
    /// Identifies an emitter within (and across) emitter collections.
    EmitterId
);

/// Monotonic id source.
///
/// Owned by whoever mints ids (an emitter collection, a scene, a test) rather
/// than living in a static, so two generators never interfere and tests see
/// deterministic values.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    /// Create a generator whose first id is 1
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Create a generator whose first id is `first`
    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    /// Hand out the next raw value
    pub fn next_raw(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn next_system_id(&mut self) -> ParticleSystemId {
        ParticleSystemId(self.next_raw())
    }

    pub fn next_emitter_id(&mut self) -> EmitterId {
        EmitterId(self.next_raw())
    }

    /// Make sure ids handed out from now on are greater than `value`
    pub fn ensure_above(&mut self, value: u64) {
        if self.next <= value {
            self.next = value + 1;
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

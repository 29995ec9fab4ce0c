//! Spark Particles - pooled particle systems for real-time effects
//!
//! Provides:
//! - Generic particle systems over a particle kind, with a swap-remove pool
//! - Emitters with drift-free fractional emission, bursts and lerped spawns
//! - An auto memory manager that grows pools on demand and shrinks them once
//!   a high-water mark has held
//! - Ordered particle and system event chains
//! - A manager that updates and draws many systems in order, tolerating
//!   systems that remove themselves mid-update
//! - Stock events, randomized initial properties and TOML effect files for
//!   the default particle kind

pub mod config;
pub mod curves;
pub mod emitter;
pub mod events;
pub mod initial;
pub mod manager;
pub mod memory;
pub mod particle;
pub mod rand;
pub mod render;
pub mod stock;
pub mod system;
pub mod throttle;

pub use config::EffectConfig;
pub use emitter::{Emitter, Orientation3D, ParticleEmitterCollection, Pivot3D, Position3D};
pub use events::{EndOfLife, EventTimeline, ParticleEvents, SystemEvents, DEFAULT_GROUP};
pub use initial::{EmissionShape, InitialProperties};
pub use manager::{
    ManagedParticleSystem, ManagerHandle, OrderSubscription, ParticleSystemManager,
    SharedParticleSystem,
};
pub use memory::{AutoMemoryManagerMode, AutoMemoryManagerSettings};
pub use particle::{DefaultParticle, Particle, ParticleKind, ParticlePool};
pub use render::{DrawBatch, DrawRecord, NullRenderer, ParticleRenderer, RecordingRenderer};
pub use system::{ParticleInitializer, ParticleSystem, SpawnContext};
pub use throttle::FrameThrottle;

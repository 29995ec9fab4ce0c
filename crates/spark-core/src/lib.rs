//! Spark Core - Foundational types for the Spark particle framework
//!
//! This crate provides the types every other Spark crate depends on:
//! - `ParticleSystemId`, `EmitterId` - Stable identifiers
//! - `IdGenerator` - Injectable monotonic id source
//! - Error types and Result alias

mod error;
mod id;

pub use error::{Result, SparkError};
pub use id::{EmitterId, IdGenerator, ParticleSystemId};

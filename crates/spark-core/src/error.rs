//! Error types for Spark

use crate::id::{EmitterId, ParticleSystemId};
use thiserror::Error;

/// The main error type for Spark operations.
///
/// Bad numbers are clamped and a full pool is reported through return values,
/// so everything here is either a caller bug or a load failure.
#[derive(Debug, Error)]
pub enum SparkError {
    #[error("Particle system not found: {0}")]
    ParticleSystemNotFound(ParticleSystemId),

    #[error("Particle system already registered: {0}")]
    DuplicateParticleSystem(ParticleSystemId),

    #[error("Emitter not found: {0}")]
    EmitterNotFound(EmitterId),

    #[error("Particle system {0} is already initialized; destroy it first")]
    AlreadyInitialized(ParticleSystemId),

    #[error("Particle system {0} is busy (currently being updated)")]
    SystemBusy(ParticleSystemId),

    #[error("Particle system manager entered from inside its own update or draw pass")]
    ReentrantUpdate,

    #[error("Particle system manager has been dropped")]
    ManagerDropped,

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("TOML parse error: {0}")]
    TomlParseError(String),
}

/// Result type alias for Spark operations
pub type Result<T> = std::result::Result<T, SparkError>;

impl From<toml::de::Error> for SparkError {
    fn from(err: toml::de::Error) -> Self {
        SparkError::TomlParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_include_ids() {
        let err = SparkError::ParticleSystemNotFound(ParticleSystemId::from_raw(7));
        assert_eq!(err.to_string(), "Particle system not found: 7");

        let err = SparkError::EmitterNotFound(EmitterId::from_raw(3));
        assert_eq!(err.to_string(), "Emitter not found: 3");
    }

    #[test]
    fn toml_errors_convert() {
        let parsed: std::result::Result<toml::Value, _> = toml::from_str("rate = = 1");
        let err: SparkError = parsed.unwrap_err().into();
        assert!(matches!(err, SparkError::TomlParseError(_)));
    }
}

//! TOML effect files: one file describes a complete [`DefaultParticle`] system
//!
//! ```toml
//! name = "fountain"
//! seed = 7
//!
//! [system]
//! initial_capacity = 64
//! max_allowed = 2000
//!
//! [emitter]
//! particles_per_second = 250
//!
//! [memory]
//! mode = "increase_and_decrease"
//!
//! [particles]
//! lifetime_min = 1.0
//! lifetime_max = 1.5
//! shape = { type = "cone", angle = 20 }
//! ```

use crate::emitter::Emitter;
use crate::events::EndOfLife;
use crate::initial::InitialProperties;
use crate::memory::AutoMemoryManagerSettings;
use crate::particle::DefaultParticle;
use crate::render::ParticleRenderer;
use crate::stock::register_stock_events;
use crate::system::ParticleSystem;
use glam::Vec3;
use serde::Deserialize;
use spark_core::{ParticleSystemId, Result, SparkError};
use std::path::Path;

/// `[system]` table
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SystemSection {
    pub initial_capacity: usize,
    pub max_allowed: usize,
    pub simulation_speed: f32,
    pub updates_per_second: u32,
    pub update_order: i32,
    pub draw_order: i32,
    pub texture: Option<String>,
    /// Seconds until `end_of_life` applies; 0 runs forever
    pub lifetime: f32,
    pub end_of_life: EndOfLife,
}

impl Default for SystemSection {
    fn default() -> Self {
        Self {
            initial_capacity: 100,
            max_allowed: 1000,
            simulation_speed: 1.0,
            updates_per_second: 0,
            update_order: 0,
            draw_order: 0,
            texture: None,
            lifetime: 0.0,
            end_of_life: EndOfLife::Nothing,
        }
    }
}

/// `[emitter]` table, applied to the system's default emitter
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmitterSection {
    pub particles_per_second: f32,
    pub emit_automatically: bool,
    pub burst_particles: i64,
    pub burst_time: f32,
    pub lerp: bool,
    pub position: Vec3,
    pub velocity: Vec3,
}

impl Default for EmitterSection {
    fn default() -> Self {
        Self {
            particles_per_second: 100.0,
            emit_automatically: true,
            burst_particles: 0,
            burst_time: 0.0,
            lerp: true,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
        }
    }
}

impl EmitterSection {
    pub fn apply(&self, emitter: &mut Emitter) {
        emitter.set_particles_per_second(self.particles_per_second);
        emitter.emit_automatically = self.emit_automatically;
        emitter.lerp_emission_position_and_orientation = self.lerp;
        emitter.position.position = self.position;
        emitter.position.velocity = self.velocity;
        emitter.snap_previous_transform();
        emitter.set_burst_time(self.burst_time);
        emitter.set_burst_particles(self.burst_particles);
    }
}

/// A whole effect file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    pub name: String,
    /// Seed for the initializer's random source
    pub seed: u32,
    pub system: SystemSection,
    pub emitter: EmitterSection,
    pub memory: AutoMemoryManagerSettings,
    pub particles: InitialProperties,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            name: "effect".to_string(),
            seed: 1,
            system: SystemSection::default(),
            emitter: EmitterSection::default(),
            memory: AutoMemoryManagerSettings::default(),
            particles: InitialProperties::default(),
        }
    }
}

impl EffectConfig {
    /// Load an effect from a `.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SparkError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EffectConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject what clamping can't fix
    pub fn validate(&self) -> Result<()> {
        if self.system.max_allowed == 0 {
            return Err(SparkError::ConfigError(format!(
                "Effect '{}' has max_allowed = 0",
                self.name
            )));
        }
        if self.system.initial_capacity > self.system.max_allowed {
            log::warn!(
                "[particles] '{}': initial_capacity {} exceeds max_allowed {}, clamping",
                self.name,
                self.system.initial_capacity,
                self.system.max_allowed
            );
        }
        Ok(())
    }

    /// Build and initialize a system for this effect. The emitter, stock
    /// events and system settings are applied from a load hook, so the system
    /// comes back the same after `destroy` + `auto_initialize`.
    pub fn build_system(
        &self,
        id: ParticleSystemId,
        renderer: Box<dyn ParticleRenderer<DefaultParticle>>,
    ) -> Result<ParticleSystem<DefaultParticle>> {
        let mut system = ParticleSystem::with_name(id, self.name.clone());
        system.set_auto_memory_manager_settings(self.memory);

        let hook_config = self.clone();
        system.set_load_hook(move |s| hook_config.configure(s));

        system.auto_initialize(
            renderer,
            self.system.initial_capacity,
            self.system.max_allowed,
            self.particles.into_initializer(self.seed),
            self.system.texture.as_deref(),
        )?;
        Ok(system)
    }

    fn configure(&self, system: &mut ParticleSystem<DefaultParticle>) {
        register_stock_events(system.particle_events_mut(), &self.particles.stock_events());
        if let Some(emitter) = system.emitter_mut() {
            self.emitter.apply(emitter);
        }
        system.set_simulation_speed(self.system.simulation_speed);
        system.set_updates_per_second(self.system.updates_per_second);
        system.set_update_order(self.system.update_order);
        system.set_draw_order(self.system.draw_order);

        let timeline = system.event_timeline_mut();
        timeline.lifetime = self.system.lifetime.max(0.0);
        timeline.end_of_life = self.system.end_of_life;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initial::EmissionShape;
    use crate::memory::AutoMemoryManagerMode;
    use crate::render::NullRenderer;

    const FOUNTAIN: &str = r#"
name = "fountain"
seed = 7

[system]
initial_capacity = 16
max_allowed = 500
update_order = 3
texture = "droplet.png"
lifetime = 2.0
end_of_life = "repeat"

[emitter]
particles_per_second = 50
position = [0, 1, 0]

[memory]
mode = "increase_only"
increase_amount = 2.0

[particles]
lifetime_min = 0.5
lifetime_max = 0.5
damping = 0.2
shape = { type = "cone", angle = 20 }
"#;

    #[test]
    fn parse_full_effect() {
        let config = EffectConfig::from_toml_str(FOUNTAIN).unwrap();
        assert_eq!(config.name, "fountain");
        assert_eq!(config.seed, 7);
        assert_eq!(config.system.max_allowed, 500);
        assert_eq!(config.system.texture.as_deref(), Some("droplet.png"));
        assert_eq!(config.system.end_of_life, EndOfLife::Repeat);
        assert_eq!(config.emitter.particles_per_second, 50.0);
        assert_eq!(config.emitter.position, Vec3::Y);
        assert_eq!(config.memory.mode(), AutoMemoryManagerMode::IncreaseOnly);
        assert_eq!(config.memory.increase_amount(), 2.0);
        assert_eq!(config.particles.shape, EmissionShape::Cone { angle: 20.0 });
    }

    #[test]
    fn shipped_effects_parse() {
        for content in [
            include_str!("../../../effects/fountain.toml"),
            include_str!("../../../effects/smoke_puff.toml"),
        ] {
            let config = EffectConfig::from_toml_str(content).unwrap();
            config
                .build_system(ParticleSystemId::from_raw(1), Box::new(NullRenderer))
                .unwrap();
        }
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = EffectConfig::from_toml_str("").unwrap();
        assert_eq!(config, EffectConfig::default());
    }

    #[test]
    fn zero_max_allowed_is_rejected() {
        let err = EffectConfig::from_toml_str("[system]\nmax_allowed = 0").unwrap_err();
        assert!(matches!(err, SparkError::ConfigError(_)));
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        let err = EffectConfig::from_toml_str("[system\nmax_allowed = 3").unwrap_err();
        assert!(matches!(err, SparkError::TomlParseError(_)));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = EffectConfig::load(Path::new("/nonexistent/effect.toml")).unwrap_err();
        assert!(matches!(err, SparkError::ConfigError(_)));
    }

    #[test]
    fn built_system_runs_and_survives_reinitialize() {
        let config = EffectConfig::from_toml_str(FOUNTAIN).unwrap();
        let mut system = config
            .build_system(ParticleSystemId::from_raw(1), Box::new(NullRenderer))
            .unwrap();
        assert_eq!(system.update_order(), 3);
        assert_eq!(system.texture(), Some("droplet.png"));
        assert_eq!(system.particle_events().len(), 6);

        for _ in 0..100 {
            system.update(0.01);
        }
        // 50/s with a 0.5s lifetime settles around 25
        let active = system.active_particle_count();
        assert!((23..=26).contains(&active), "active {active}");
        assert!(system.particles().iter().all(|p| p.size <= 0.1 + 1e-6));

        system.destroy();
        system
            .auto_initialize(
                Box::new(NullRenderer),
                8,
                100,
                config.particles.into_initializer(1),
                None,
            )
            .unwrap();
        assert_eq!(system.particle_events().len(), 6);
        assert_eq!(system.emitter().unwrap().particles_per_second(), 50.0);
    }
}

//! Effect file check command

use anyhow::{Context, Result};
use spark_particles::{EffectConfig, EmissionShape};
use std::path::Path;

pub fn run(effect: &str) -> Result<()> {
    let config = EffectConfig::load(Path::new(effect))
        .with_context(|| format!("Failed to load effect '{}'", effect))?;

    println!("Effect: {}", config.name);
    println!("  Seed: {}", config.seed);

    let system = &config.system;
    println!("  System:");
    println!(
        "    Capacity: {} initial, {} max",
        system.initial_capacity.min(system.max_allowed),
        system.max_allowed
    );
    println!("    Simulation speed: {}", system.simulation_speed);
    if system.updates_per_second > 0 {
        println!("    Updates per second: {}", system.updates_per_second);
    } else {
        println!("    Updates per second: unthrottled");
    }
    println!(
        "    Update order: {}, draw order: {}",
        system.update_order, system.draw_order
    );
    if let Some(texture) = &system.texture {
        println!("    Texture: {}", texture);
    }
    if system.lifetime > 0.0 {
        println!(
            "    Lifetime: {}s, then {:?}",
            system.lifetime, system.end_of_life
        );
    }

    let emitter = &config.emitter;
    println!("  Emitter:");
    println!("    Rate: {}/s", emitter.particles_per_second);
    if !emitter.emit_automatically {
        println!(
            "    Burst: {} particle(s), {}s",
            emitter.burst_particles, emitter.burst_time
        );
    }

    let memory = &config.memory;
    println!("  Memory manager: {:?}", memory.mode());
    println!(
        "    Min {} | increase x{} | reduce x{} | hold {}s",
        memory.absolute_min_particles(),
        memory.increase_amount(),
        memory.reduce_amount(),
        memory.seconds_high_water_mark_must_hold_before_shrinking()
    );

    let particles = &config.particles;
    println!("  Particles:");
    println!(
        "    Lifetime: {}..{}s, speed: {}..{}",
        particles.lifetime_min, particles.lifetime_max, particles.speed_min, particles.speed_max
    );
    let shape = match particles.shape {
        EmissionShape::Point => "point".to_string(),
        EmissionShape::Sphere { radius } => format!("sphere (r={})", radius),
        EmissionShape::Cone { angle } => format!("cone ({}°)", angle),
        EmissionShape::Box { extents } => {
            format!("box ({}, {}, {})", extents.x, extents.y, extents.z)
        }
    };
    println!("    Shape: {}", shape);

    Ok(())
}

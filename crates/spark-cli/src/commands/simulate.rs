//! Headless simulation command

use anyhow::{bail, Context, Result};
use spark_core::IdGenerator;
use spark_particles::{
    EffectConfig, NullRenderer, ParticleSystemManager, SharedParticleSystem,
};
use std::path::Path;

pub struct SimulateArgs {
    pub effects: Vec<String>,
    pub seconds: f32,
    pub dt: f32,
    pub report_every: u32,
    pub speed: f32,
}

pub fn run(args: SimulateArgs) -> Result<()> {
    if args.dt <= 0.0 {
        bail!("--dt must be positive (got {})", args.dt);
    }

    let manager = ParticleSystemManager::new();
    manager.set_simulation_speed(args.speed);

    let mut ids = IdGenerator::new();
    for path in &args.effects {
        let config = EffectConfig::load(Path::new(path))
            .with_context(|| format!("Failed to load effect '{}'", path))?;
        let system = config
            .build_system(ids.next_system_id(), Box::new(NullRenderer))
            .with_context(|| format!("Failed to initialize '{}'", config.name))?;
        log::info!("Loaded '{}' from {}", config.name, path);
        manager.add_particle_system(SharedParticleSystem::new(system))?;
    }

    let frames = (args.seconds / args.dt).ceil().max(0.0) as u64;
    let report_every = u64::from(args.report_every.max(1));
    println!(
        "Simulating {} system(s) for {}s ({} frames at dt={})",
        manager.len(),
        args.seconds,
        frames,
        args.dt
    );
    print_header(&manager)?;

    let mut peak_active = 0;
    let mut peak_allocated = 0;
    for frame in 1..=frames {
        manager.update_all_particle_systems(args.dt)?;
        let drawn = manager.draw_all_particle_systems()?;

        let active = manager.total_active_particles();
        let allocated = manager.total_particles_allocated();
        peak_active = peak_active.max(active);
        peak_allocated = peak_allocated.max(allocated);

        if frame % report_every == 0 || frame == frames {
            print_row(&manager, frame as f32 * args.dt, drawn)?;
        }
    }

    println!();
    println!(
        "Peak: {} active, {} allocated ({} system(s) remaining)",
        peak_active,
        peak_allocated,
        manager.len()
    );
    Ok(())
}

fn print_header(manager: &ParticleSystemManager) -> Result<()> {
    let mut header = format!("{:>8}  {:>7}", "time", "drawn");
    for system in manager.particle_systems() {
        let name = system.with(|s| s.name().to_string())?;
        header.push_str(&format!("  {:>20}", name));
    }
    println!("{}", header);
    Ok(())
}

fn print_row(manager: &ParticleSystemManager, time: f32, drawn: usize) -> Result<()> {
    let mut row = format!("{:>7.2}s  {:>7}", time, drawn);
    for system in manager.particle_systems() {
        let (active, allocated) =
            system.with(|s| (s.active_particle_count(), s.allocated_particle_count()))?;
        row.push_str(&format!("  {:>9} / {:>8}", active, allocated));
    }
    println!("{}", row);
    Ok(())
}

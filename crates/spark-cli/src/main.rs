//! Spark CLI - run particle effects headless

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{check, simulate};

#[derive(Parser)]
#[command(name = "spark")]
#[command(about = "Headless runner for Spark particle effects", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate one or more effect files and print pool statistics
    Simulate {
        /// Effect files (TOML); each becomes one particle system
        #[arg(required = true)]
        effects: Vec<String>,

        /// Simulated seconds to run
        #[arg(long, default_value_t = 5.0)]
        seconds: f32,

        /// Time step per frame
        #[arg(long, default_value_t = 1.0 / 60.0)]
        dt: f32,

        /// Print a report line every N frames
        #[arg(long, default_value_t = 30)]
        report_every: u32,

        /// Manager-wide simulation speed
        #[arg(long, default_value_t = 1.0)]
        speed: f32,
    },

    /// Parse an effect file and print the resolved settings
    Check {
        /// Effect file (TOML)
        effect: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Simulate {
            effects,
            seconds,
            dt,
            report_every,
            speed,
        } => simulate::run(simulate::SimulateArgs {
            effects,
            seconds,
            dt,
            report_every,
            speed,
        }),
        Commands::Check { effect } => check::run(&effect),
    }
}

//! Command-line front end for the TCAS traffic simulation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tcas_engine::config::SimConfig;
use tcas_engine::events::FileSink;
use tcas_engine::supervisor::Simulation;

#[derive(Parser, Debug)]
#[command(name = "tcas-sim", about = "En-route traffic simulation with TCAS")]
struct Args {
    /// Number of planes to distribute across the generated airports.
    #[arg(long, default_value_t = 8)]
    planes: u32,

    /// Draw each flight's cruising altitude from the altitude bands
    /// instead of a single fixed level.
    #[arg(long)]
    varying_altitudes: bool,

    /// How long the simulation runs, in minutes.
    #[arg(long, default_value_t = 2)]
    duration_minutes: u64,

    /// Directory for the console and TCAS event logs.
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Fixed seed for reproducible worlds.
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tcas_engine=info".parse()?)
                .add_directive("tcas_cli=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = SimConfig::new(args.planes, args.varying_altitudes)?;
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }

    let sink = Arc::new(FileSink::open(&args.log_dir)?);
    let sim = Arc::new(Simulation::configure(config, sink)?);

    sim.on_plane_takeoff(|plane| {
        if let Some(flight) = plane.current_flight() {
            tracing::info!(
                plane = %plane.serial,
                flight = %flight.flight_id,
                to = %flight.arrival_airport,
                "airborne"
            );
        }
    });
    sim.on_plane_land(|serial| {
        tracing::info!(plane = %serial, "parked");
    });

    tracing::info!(
        planes = args.planes,
        minutes = args.duration_minutes,
        "starting simulation; Ctrl-C stops it early"
    );
    sim.start(args.duration_minutes)?;

    let stopper = sim.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.emergency_stop();
        }
    });

    sim.wait().await;

    let snapshot = sim.snapshot();
    tracing::info!(
        flights = snapshot.flight_count,
        engagements = snapshot.engagements.len(),
        in_flight = snapshot.in_flight.len(),
        "simulation finished"
    );
    for airport in &snapshot.airports {
        tracing::info!(
            airport = %airport.serial,
            parked = airport.parked.len(),
            runways = airport.runways_total,
            "final airport state"
        );
    }

    Ok(())
}

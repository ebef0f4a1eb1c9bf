//! Simulation lifecycle: start, duration timer, emergency stop,
//! orderly shutdown and read-only inspection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use tcas_core::conflict::TcasEngagement;
use tcas_core::models::Plane;
use tcas_core::spatial::Coordinate;

use crate::config::SimConfig;
use crate::events::EventSink;
use crate::loops::{airport_loop, monitor_loop};
use crate::state::{Airport, SimState};
use crate::world;

/// Handle over one simulation. Owns the state for its lifetime; after a
/// stop the state stays inspectable until the next start.
pub struct Simulation {
    state: Arc<SimState>,
    shutdown: broadcast::Sender<()>,
    stop_armed: AtomicBool,
    join: Mutex<Option<JoinHandle<()>>>,
    base_seed: u64,
}

impl Simulation {
    /// Build a simulation with a generated world.
    pub fn configure(config: SimConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        if config.plane_count < 4 {
            bail!("plane count must be at least 4, got {}", config.plane_count);
        }
        let base_seed = config.seed.unwrap_or_else(wall_seed);
        let mut rng = ChaCha8Rng::seed_from_u64(base_seed);
        let airports = world::build_world(&config, &mut rng);
        Ok(Self::with_airports(&config, airports, sink))
    }

    /// Build a simulation over an explicit airport layout (scripted
    /// scenarios, tests).
    pub fn with_airports(
        config: &SimConfig,
        airports: Vec<Arc<Airport>>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(16);
        Self {
            state: Arc::new(SimState::new(airports, config, sink)),
            shutdown,
            stop_armed: AtomicBool::new(false),
            join: Mutex::new(None),
            base_seed: config.seed.unwrap_or_else(wall_seed),
        }
    }

    /// The live state, for read access and advisory scans.
    pub fn state(&self) -> &Arc<SimState> {
        &self.state
    }

    /// Register the takeoff callback; fired on the engine's task with a
    /// snapshot of the departing plane. First registration wins.
    pub fn on_plane_takeoff(&self, callback: impl Fn(Plane) + Send + Sync + 'static) {
        self.state.register_takeoff_callback(Box::new(callback));
    }

    /// Register the landing callback; fired with the landed plane's
    /// serial. First registration wins.
    pub fn on_plane_land(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.state.register_land_callback(Box::new(callback));
    }

    /// Start the simulation for a whole number of minutes. Non-blocking;
    /// use [`Simulation::wait`] to await completion.
    pub fn start(&self, duration_minutes: u64) -> Result<()> {
        if duration_minutes < 1 {
            bail!("simulation duration must be at least 1 minute");
        }
        self.start_for(Duration::from_secs(duration_minutes * 60))
    }

    /// Start the simulation for an arbitrary duration.
    pub fn start_for(&self, duration: Duration) -> Result<()> {
        if self.state.is_running() {
            bail!("a simulation is already running");
        }
        self.state.set_running(true);
        self.state.reset_flight_counter();
        self.stop_armed.store(false, Ordering::SeqCst);

        let sink = self.state.sink();
        sink.general(&format!("--- TCAS Simulation Started for {duration:?} ---"));
        sink.general("--- Starting Airport Launch Operations ---");
        sink.general("--- Starting Flight Landing and TCAS Monitor ---");
        sink.general(&format!(
            "--- Varying Altitudes: {} ---",
            self.state.varying_altitudes
        ));
        tracing::info!(?duration, "simulation started");

        let mut handles = Vec::new();
        for (i, airport) in self.state.airports().iter().enumerate() {
            handles.push(tokio::spawn(airport_loop::run_airport_loop(
                self.state.clone(),
                airport.clone(),
                self.shutdown.subscribe(),
                self.base_seed.wrapping_add(1000 * (i as u64 + 1)),
            )));
        }
        handles.push(tokio::spawn(monitor_loop::run_monitor_loop(
            self.state.clone(),
            self.shutdown.subscribe(),
        )));

        // Duration timer: first of the timer or an earlier shutdown wins.
        let timer_state = self.state.clone();
        let timer_tx = self.shutdown.clone();
        let mut timer_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer_rx.recv() => {}
                _ = tokio::time::sleep(duration) => {
                    timer_state
                        .sink()
                        .general("--- Simulation Duration Reached. Initiating shutdown... ---");
                    tracing::info!("simulation duration reached; shutting down");
                    let _ = timer_tx.send(());
                }
            }
        });

        // Crash watcher: a live crash-bound engagement terminates the
        // run after a short grace period.
        let crash_state = self.state.clone();
        let crash_tx = self.shutdown.clone();
        let mut crash_rx = self.shutdown.subscribe();
        let grace = self.state.tunables.crash_stop_grace;
        tokio::spawn(async move {
            tokio::select! {
                _ = crash_rx.recv() => {}
                _ = crash_state.crash_signalled() => {
                    crash_state
                        .sink()
                        .tcas("TCAS: Collision imminent. Terminating the simulation.");
                    tracing::error!("crash-bound engagement live; terminating simulation");
                    tokio::time::sleep(grace).await;
                    let _ = crash_tx.send(());
                }
            }
        });

        // Completion: wait for every actor to drain, then summarize.
        let done_state = self.state.clone();
        let join = tokio::spawn(async move {
            for handle in handles {
                let _ = handle.await;
            }
            summarize(&done_state);
            done_state.set_running(false);
        });
        *self.join.lock().unwrap_or_else(|e| e.into_inner()) = Some(join);
        Ok(())
    }

    /// Stop the simulation immediately. Idempotent: the second and
    /// later calls are no-ops.
    pub fn emergency_stop(&self) {
        if !self.state.is_running() {
            tracing::info!("emergency stop: simulation not running");
            return;
        }
        if self.stop_armed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state
            .sink()
            .general("--- EMERGENCY STOP ACTIVATED! Signaling all tasks to stop... ---");
        tracing::warn!("emergency stop activated");
        let _ = self.shutdown.send(());
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Await the orderly shutdown of every task of the current run.
    pub async fn wait(&self) {
        let handle = self.join.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Read-only view of the whole simulation, stable in ordering.
    pub fn snapshot(&self) -> SimSnapshot {
        let airports = self
            .state
            .airports()
            .iter()
            .map(|airport| {
                let inner = airport.lock();
                AirportSnapshot {
                    serial: airport.serial.clone(),
                    location: airport.location,
                    runways_total: airport.runways_total,
                    runways_in_use: inner.runways_in_use,
                    receiving_plane: inner.receiving_plane,
                    parked: inner.parked.iter().cloned().collect(),
                }
            })
            .collect();

        let mut in_flight = self.state.in_flight_snapshot();
        in_flight.sort_by(|a, b| a.serial.cmp(&b.serial));

        let mut engagements = self.state.engagements_snapshot();
        engagements.sort_by(|a, b| a.engagement_id.cmp(&b.engagement_id));

        SimSnapshot {
            sim_time: self.state.sim_time(),
            running: self.state.is_running(),
            flight_count: self.state.flight_count(),
            airports,
            in_flight,
            engagements,
        }
    }
}

fn wall_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn summarize(state: &SimState) {
    let sink = state.sink();
    sink.general("--- All simulation tasks have stopped. ---");
    sink.general("Final Simulation State Summary:");
    sink.general(&format!(
        "  Planes currently in flight: {}",
        state.in_flight_count()
    ));
    for airport in state.airports() {
        sink.general(&format!(
            "  Airport {} has {} planes parked.",
            airport.serial,
            airport.parked_count()
        ));
    }
    sink.general("--- TCAS Simulation Ended ---");
    tracing::info!("simulation ended");
}

/// Point-in-time view of one airport.
#[derive(Debug, Clone, Serialize)]
pub struct AirportSnapshot {
    pub serial: String,
    pub location: Coordinate,
    pub runways_total: u32,
    pub runways_in_use: u32,
    pub receiving_plane: bool,
    pub parked: Vec<Plane>,
}

/// Point-in-time view of the whole simulation.
#[derive(Debug, Clone, Serialize)]
pub struct SimSnapshot {
    pub sim_time: DateTime<Utc>,
    pub running: bool,
    pub flight_count: u32,
    pub airports: Vec<AirportSnapshot>,
    pub in_flight: Vec<Plane>,
    pub engagements: Vec<TcasEngagement>,
}

impl SimSnapshot {
    /// Total planes across parked pools and the in-flight set.
    pub fn total_planes(&self) -> usize {
        let parked: usize = self.airports.iter().map(|a| a.parked.len()).sum();
        parked + self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;

    #[test]
    fn configure_builds_the_requested_world() {
        let config = SimConfig::new(12, false).expect("config").with_seed(99);
        let sim = Simulation::configure(config, Arc::new(NullSink)).expect("configure");

        let snapshot = sim.snapshot();
        assert_eq!(snapshot.total_planes(), 12);
        assert!(!snapshot.running);
        assert!(snapshot.in_flight.is_empty());
    }

    #[test]
    fn start_rejects_zero_minutes() {
        let config = SimConfig::new(4, false).expect("config").with_seed(1);
        let sim = Simulation::configure(config, Arc::new(NullSink)).expect("configure");
        assert!(sim.start(0).is_err());
    }

    #[test]
    fn emergency_stop_without_a_run_is_a_no_op() {
        let config = SimConfig::new(4, false).expect("config").with_seed(2);
        let sim = Simulation::configure(config, Arc::new(NullSink)).expect("configure");
        sim.emergency_stop();
        assert!(!sim.is_running());
    }
}

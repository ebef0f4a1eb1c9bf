//! Simulation configuration and tunable constants.

use std::time::Duration;

use anyhow::{bail, Result};

use tcas_core::conflict::{COLLISION_THRESHOLD, TRIGGER_ENGAGE_TCAS, TRIGGER_TCAS};
use tcas_core::models::CRUISE_SPEED;

/// Every pacing and threshold knob of the engine, with the production
/// defaults. Tests shrink the durations so scenarios finish in
/// milliseconds.
#[derive(Debug, Clone)]
pub struct Tunables {
    /// World units per second for every plane.
    pub cruise_speed: f64,
    /// Runway occupancy on departure.
    pub takeoff_duration: Duration,
    /// Runway occupancy on arrival.
    pub landing_duration: Duration,
    /// Cadence of the landing scan.
    pub monitor_interval: Duration,
    /// Inter-departure pacing band per airport.
    pub launch_interval_min: Duration,
    pub launch_interval_max: Duration,
    /// Pre-takeoff danger distance.
    pub collision_threshold: f64,
    /// In-flight warning distance.
    pub trigger_tcas: f64,
    /// In-flight engagement distance.
    pub trigger_engage_tcas: f64,
    /// Delay between a crash-bound engagement and the forced shutdown.
    pub crash_stop_grace: Duration,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            cruise_speed: CRUISE_SPEED,
            takeoff_duration: Duration::from_secs(3),
            landing_duration: Duration::from_secs(7),
            monitor_interval: Duration::from_millis(100),
            launch_interval_min: Duration::from_secs(1),
            launch_interval_max: Duration::from_secs(60),
            collision_threshold: COLLISION_THRESHOLD,
            trigger_tcas: TRIGGER_TCAS,
            trigger_engage_tcas: TRIGGER_ENGAGE_TCAS,
            crash_stop_grace: Duration::from_secs(2),
        }
    }
}

impl Tunables {
    /// Aggressively shortened pacing for tests and demos.
    pub fn fast() -> Self {
        Self {
            takeoff_duration: Duration::from_millis(30),
            landing_duration: Duration::from_millis(50),
            monitor_interval: Duration::from_millis(10),
            launch_interval_min: Duration::from_millis(10),
            launch_interval_max: Duration::from_millis(40),
            crash_stop_grace: Duration::from_millis(50),
            ..Self::default()
        }
    }
}

/// Validated input for one simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub plane_count: u32,
    pub varying_altitudes: bool,
    /// Fixed seed for reproducible world generation and actor streams.
    /// When unset, seeds derive from wall time plus the actor index.
    pub seed: Option<u64>,
    pub tunables: Tunables,
}

impl SimConfig {
    /// Build a configuration, rejecting invalid input before it can
    /// reach the engine.
    pub fn new(plane_count: u32, varying_altitudes: bool) -> Result<Self> {
        if plane_count < 4 {
            bail!("plane count must be at least 4, got {plane_count}");
        }
        Ok(Self {
            plane_count,
            varying_altitudes,
            seed: None,
            tunables: Tunables::default(),
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_tunables(mut self, tunables: Tunables) -> Self {
        self.tunables = tunables;
        self
    }
}

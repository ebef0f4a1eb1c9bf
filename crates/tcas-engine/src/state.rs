//! Shared simulation state.
//!
//! Lock discipline: each airport serializes its own runway and parked
//! list behind one mutex; the simulation lock serializes membership of
//! the global in-flight set. No code path holds both at once.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{broadcast, Notify};

use tcas_core::conflict::{EngagementKey, TcasEngagement};
use tcas_core::models::Plane;
use tcas_core::serial::SerialCounter;
use tcas_core::spatial::Coordinate;

use crate::clock::SimClock;
use crate::config::{SimConfig, Tunables};
use crate::events::EventSink;

/// Callback fired with a snapshot of the plane that just took off.
pub type TakeoffCallback = Box<dyn Fn(Plane) + Send + Sync>;
/// Callback fired with the serial of the plane that just landed.
pub type LandCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Mutable airport state, guarded by the airport lock.
#[derive(Debug)]
pub struct AirportInner {
    pub parked: VecDeque<Plane>,
    pub runways_in_use: u32,
    pub receiving_plane: bool,
}

/// An airport: immutable identity plus its runway resource and parked
/// pool. Runway waiters park on a condition variable instead of
/// polling.
pub struct Airport {
    pub serial: String,
    pub location: Coordinate,
    pub runways_total: u32,
    inner: Mutex<AirportInner>,
    runway_released: Notify,
}

impl Airport {
    pub fn new(
        serial: impl Into<String>,
        location: Coordinate,
        runways_total: u32,
        parked: Vec<Plane>,
    ) -> Self {
        Self {
            serial: serial.into(),
            location,
            runways_total,
            inner: Mutex::new(AirportInner {
                parked: parked.into(),
                runways_in_use: 0,
                receiving_plane: false,
            }),
            runway_released: Notify::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, AirportInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn parked_count(&self) -> usize {
        self.lock().parked.len()
    }

    /// The plane next in line for departure, if any and no landing is
    /// in progress. The plane stays parked until the takeoff
    /// transition claims it.
    pub fn peek_departure_candidate(&self) -> Option<Plane> {
        let inner = self.lock();
        if inner.receiving_plane {
            return None;
        }
        inner.parked.front().cloned()
    }

    /// Remove a specific plane from the parked pool, if still present.
    pub fn claim_parked(&self, serial: &str) -> Option<Plane> {
        let mut inner = self.lock();
        let idx = inner.parked.iter().position(|p| p.serial == serial)?;
        inner.parked.remove(idx)
    }

    /// Occupy a runway for a departure: waits until a runway is free
    /// and no landing is in progress. Returns `false` when the
    /// shutdown signal arrives first.
    pub async fn acquire_runway(&self, shutdown: &mut broadcast::Receiver<()>) -> bool {
        loop {
            let notified = self.runway_released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if !inner.receiving_plane && inner.runways_in_use < self.runways_total {
                    inner.runways_in_use += 1;
                    return true;
                }
            }

            tokio::select! {
                _ = shutdown.recv() => return false,
                _ = &mut notified => {}
            }
        }
    }

    /// Release a runway held by a departure and wake waiters.
    pub fn release_runway(&self) {
        {
            let mut inner = self.lock();
            inner.runways_in_use = inner.runways_in_use.saturating_sub(1);
        }
        self.runway_released.notify_waiters();
    }

    /// Occupy the airport for a landing: waits until every runway is
    /// free, then atomically takes one and raises `receiving_plane` so
    /// no departure can interleave. Returns `false` on shutdown.
    pub async fn begin_landing(&self, shutdown: &mut broadcast::Receiver<()>) -> bool {
        loop {
            let notified = self.runway_released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if inner.runways_in_use == 0 {
                    inner.runways_in_use = 1;
                    inner.receiving_plane = true;
                    return true;
                }
            }

            tokio::select! {
                _ = shutdown.recv() => return false,
                _ = &mut notified => {}
            }
        }
    }

    /// Roll back an occupied landing without touching the plane.
    pub fn abort_landing(&self) {
        {
            let mut inner = self.lock();
            inner.runways_in_use = inner.runways_in_use.saturating_sub(1);
            inner.receiving_plane = false;
        }
        self.runway_released.notify_waiters();
    }

    /// Finish a landing: free the runway, clear the receiving flag and
    /// park the plane. The caller has already finalized the plane's
    /// flight record.
    pub fn complete_landing(&self, plane: Plane) {
        {
            let mut inner = self.lock();
            inner.runways_in_use = inner.runways_in_use.saturating_sub(1);
            inner.receiving_plane = false;
            inner.parked.push_back(plane);
        }
        self.runway_released.notify_waiters();
    }
}

/// A plane whose scheduled arrival time has passed.
#[derive(Debug, Clone)]
pub struct DueArrival {
    pub serial: String,
    pub destination: Coordinate,
}

/// Result of one landing scan.
#[derive(Debug, Default)]
pub struct ArrivalScan {
    pub due: Vec<DueArrival>,
    /// In-flight planes with an empty flight log; skipped defensively.
    pub missing_log: Vec<String>,
}

/// The live state of one simulation run, owned by the supervisor.
pub struct SimState {
    airports: Vec<Arc<Airport>>,
    /// The simulation lock: in-flight membership is linearizable.
    in_flight: Mutex<HashMap<String, Plane>>,
    /// Engagement records, inserted at most once per key.
    engagements: DashMap<EngagementKey, TcasEngagement>,
    clock: SimClock,
    pub varying_altitudes: bool,
    pub tunables: Tunables,
    running: AtomicBool,
    flights: SerialCounter,
    sink: Arc<dyn EventSink>,
    on_takeoff: OnceLock<TakeoffCallback>,
    on_land: OnceLock<LandCallback>,
    crash_signal: Notify,
    crash_flagged: AtomicBool,
}

impl SimState {
    pub fn new(airports: Vec<Arc<Airport>>, config: &SimConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            airports,
            in_flight: Mutex::new(HashMap::new()),
            engagements: DashMap::new(),
            clock: SimClock::start_now(),
            varying_altitudes: config.varying_altitudes,
            tunables: config.tunables.clone(),
            running: AtomicBool::new(false),
            flights: SerialCounter::new(),
            sink,
            on_takeoff: OnceLock::new(),
            on_land: OnceLock::new(),
            crash_signal: Notify::new(),
            crash_flagged: AtomicBool::new(false),
        }
    }

    pub fn airports(&self) -> &[Arc<Airport>] {
        &self.airports
    }

    /// Resolve an airport by coordinate match within the tolerance.
    pub fn airport_by_location(&self, location: Coordinate) -> Option<Arc<Airport>> {
        self.airports
            .iter()
            .find(|ap| ap.location.approx_eq(location))
            .cloned()
    }

    pub fn sink(&self) -> &dyn EventSink {
        self.sink.as_ref()
    }

    pub fn sim_time(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn next_flight_id(&self) -> String {
        self.flights.mint("f")
    }

    pub fn reset_flight_counter(&self) {
        self.flights.reset();
    }

    pub fn flight_count(&self) -> u32 {
        self.flights.minted()
    }

    // ---- in-flight membership (simulation lock) ----

    fn in_flight_lock(&self) -> MutexGuard<'_, HashMap<String, Plane>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight_lock().len()
    }

    /// Clone of every plane currently in flight.
    pub fn in_flight_snapshot(&self) -> Vec<Plane> {
        self.in_flight_lock().values().cloned().collect()
    }

    pub fn insert_in_flight(&self, plane: Plane) {
        self.in_flight_lock().insert(plane.serial.clone(), plane);
    }

    pub fn remove_in_flight(&self, serial: &str) -> Option<Plane> {
        self.in_flight_lock().remove(serial)
    }

    /// Mutate one in-flight plane in place under the simulation lock.
    pub fn update_in_flight<R>(&self, serial: &str, f: impl FnOnce(&mut Plane) -> R) -> Option<R> {
        self.in_flight_lock().get_mut(serial).map(f)
    }

    /// Snapshot the planes whose scheduled arrival has passed.
    pub fn scan_arrivals(&self, now: DateTime<Utc>) -> ArrivalScan {
        let guard = self.in_flight_lock();
        let mut scan = ArrivalScan::default();
        for plane in guard.values() {
            match plane.current_flight() {
                Some(flight) if now >= flight.arrival_time => scan.due.push(DueArrival {
                    serial: plane.serial.clone(),
                    destination: flight.path.destination,
                }),
                Some(_) => {}
                None => scan.missing_log.push(plane.serial.clone()),
            }
        }
        scan
    }

    // ---- engagement records ----

    /// Fetch the engagement for `key`, creating it with `make` exactly
    /// once. Concurrent callers observe either nothing or the complete
    /// record; the first draw is binding.
    pub fn engagement_or_insert(
        &self,
        key: EngagementKey,
        make: impl FnOnce() -> TcasEngagement,
    ) -> TcasEngagement {
        self.engagements.entry(key).or_insert_with(make).clone()
    }

    pub fn engagement(&self, key: &EngagementKey) -> Option<TcasEngagement> {
        self.engagements.get(key).map(|e| e.clone())
    }

    pub fn engagements_snapshot(&self) -> Vec<TcasEngagement> {
        self.engagements.iter().map(|e| e.clone()).collect()
    }

    /// Every recorded engagement a plane is party to.
    pub fn engagements_for_plane(&self, serial: &str) -> Vec<TcasEngagement> {
        self.engagements
            .iter()
            .filter(|e| e.involves(serial))
            .map(|e| e.clone())
            .collect()
    }

    // ---- callbacks ----

    /// Register the takeoff callback. First registration wins.
    pub fn register_takeoff_callback(&self, callback: TakeoffCallback) {
        let _ = self.on_takeoff.set(callback);
    }

    /// Register the landing callback. First registration wins.
    pub fn register_land_callback(&self, callback: LandCallback) {
        let _ = self.on_land.set(callback);
    }

    pub fn fire_takeoff(&self, plane: &Plane) {
        if let Some(callback) = self.on_takeoff.get() {
            callback(plane.clone());
        }
    }

    pub fn fire_landing(&self, serial: &str) {
        if let Some(callback) = self.on_land.get() {
            callback(serial);
        }
    }

    // ---- crash signalling ----

    /// Tell the supervisor a crash-bound engagement went live.
    pub fn signal_crash(&self) {
        self.crash_flagged.store(true, Ordering::SeqCst);
        self.crash_signal.notify_one();
    }

    pub fn crash_flagged(&self) -> bool {
        self.crash_flagged.load(Ordering::SeqCst)
    }

    /// Resolves once a crash has been signalled.
    pub async fn crash_signalled(&self) {
        if self.crash_flagged() {
            return;
        }
        self.crash_signal.notified().await;
    }

    /// Parked plus in-flight, across the whole world.
    pub fn total_plane_count(&self) -> usize {
        let parked: usize = self.airports.iter().map(|ap| ap.parked_count()).sum();
        parked + self.in_flight_count()
    }
}

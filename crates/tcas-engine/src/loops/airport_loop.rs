//! Per-airport launch loop.
//!
//! Each airport paces its own departures: pick the plane at the head of
//! the parked pool, plan a flight, run the pre-takeoff TCAS check, then
//! move the plane into the air under the runway resource.

use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::broadcast;

use tcas_core::models::{Flight, FlightPath, FlightStatus, Plane, ALTITUDE_BANDS, FIXED_ALTITUDE};

use crate::state::{Airport, SimState};
use crate::tcas;

/// Run one airport's launch operations until shutdown.
pub async fn run_airport_loop(
    state: Arc<SimState>,
    airport: Arc<Airport>,
    mut shutdown: broadcast::Receiver<()>,
    seed: u64,
) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    loop {
        let pause = launch_pause(&state, &mut rng);
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!(airport = %airport.serial, "launch loop stopping");
                return;
            }
            _ = tokio::time::sleep(pause) => {}
        }

        // Nothing to launch while the pool is empty or a landing is in
        // progress. The plane stays parked until the transition below.
        let Some(candidate) = airport.peek_departure_candidate() else {
            continue;
        };

        // With no other airport in the world this actor can only idle.
        let Some(planned) = plan_flight(&state, &airport, &candidate, &mut rng) else {
            continue;
        };

        // The check records engagements but never blocks the takeoff.
        let _engagements = tcas::pre_takeoff_check(&state, &candidate, &planned, &mut rng);

        if !airport.acquire_runway(&mut shutdown).await {
            return;
        }

        // Claim the plane and move it into the air: parked removal under
        // the airport lock, then membership under the simulation lock.
        let Some(mut plane) = airport.claim_parked(&candidate.serial) else {
            airport.release_runway();
            continue;
        };
        let serial = plane.serial.clone();
        plane.flight_log.push(planned.clone());
        plane.in_flight = true;
        state.insert_in_flight(plane);

        state.sink().general(&format!(
            "Plane {} is taking off from Airport {} ({}) heading to Airport {} on flight {}.",
            serial, airport.serial, airport.location, planned.arrival_airport, planned.flight_id
        ));
        tracing::info!(
            plane = %serial,
            from = %airport.serial,
            to = %planned.arrival_airport,
            flight = %planned.flight_id,
            "takeoff"
        );

        // The runway stays occupied for the whole takeoff.
        let cancelled = tokio::select! {
            _ = shutdown.recv() => true,
            _ = tokio::time::sleep(state.tunables.takeoff_duration) => false,
        };
        if cancelled {
            airport.release_runway();
            return;
        }

        state.update_in_flight(&serial, |p| {
            if let Some(flight) = p.current_flight_mut() {
                flight.advance_status(FlightStatus::InTransit);
            }
        });
        airport.release_runway();

        if let Some(snapshot) = state.update_in_flight(&serial, |p| p.clone()) {
            state.fire_takeoff(&snapshot);
        }
    }
}

fn launch_pause(state: &SimState, rng: &mut ChaCha8Rng) -> Duration {
    let min = state.tunables.launch_interval_min.as_millis() as u64;
    let max = state.tunables.launch_interval_max.as_millis() as u64;
    Duration::from_millis(rng.gen_range(min..=max.max(min)))
}

/// Plan a flight from `airport` for `plane`: uniform random destination
/// among the other airports, altitude from the configured bands.
fn plan_flight(
    state: &SimState,
    airport: &Airport,
    plane: &Plane,
    rng: &mut ChaCha8Rng,
) -> Option<Flight> {
    let destinations: Vec<&Arc<Airport>> = state
        .airports()
        .iter()
        .filter(|ap| ap.serial != airport.serial)
        .collect();
    if destinations.is_empty() {
        return None;
    }
    let destination = destinations[rng.gen_range(0..destinations.len())];

    let altitude = if state.varying_altitudes {
        ALTITUDE_BANDS[rng.gen_range(0..ALTITUDE_BANDS.len())]
    } else {
        FIXED_ALTITUDE
    };

    Some(Flight::plan(
        state.next_flight_id(),
        FlightPath::new(airport.location, destination.location),
        altitude,
        &airport.serial,
        &destination.serial,
        state.sim_time(),
        plane.cruise_speed,
    ))
}

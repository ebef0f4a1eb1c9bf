//! The flight monitor: detects arrivals and drives landings.
//!
//! A single loop scans the in-flight set on a fixed cadence and lands
//! each due plane at its destination airport. Landings queue behind
//! ongoing departures on the same airport and never overtake each
//! other.

use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::broadcast;

use tcas_core::models::FlightStatus;

use crate::state::{Airport, SimState};

/// Run the landing monitor until shutdown.
pub async fn run_monitor_loop(state: Arc<SimState>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(state.tunables.monitor_interval);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                state.sink().general("Flight monitor stopping.");
                tracing::debug!("flight monitor stopping");
                return;
            }
            _ = ticker.tick() => {}
        }

        let scan = state.scan_arrivals(state.sim_time());

        for serial in &scan.missing_log {
            state.sink().general(&format!(
                "Monitor: Plane {serial} is in flight with no flight history; skipping."
            ));
        }

        for arrival in scan.due {
            let Some(airport) = state.airport_by_location(arrival.destination) else {
                state.sink().general(&format!(
                    "Monitor Error: Destination airport not found for plane {} (arrival coord: {}).",
                    arrival.serial, arrival.destination
                ));
                continue;
            };

            match land(&state, &airport, &arrival.serial, &mut shutdown).await {
                Ok(true) => {}
                // Cancelled mid-landing: exit without further mutation.
                Ok(false) => return,
                Err(err) => {
                    state.sink().general(&format!(
                        "Landing aborted for plane {}: {err:#}",
                        arrival.serial
                    ));
                    tracing::warn!(plane = %arrival.serial, "landing aborted: {err:#}");
                }
            }
        }
    }
}

/// Land one plane at `airport`. Returns `Ok(false)` when the shutdown
/// signal interrupted the landing; an `Err` aborts this landing without
/// leaving any state mutated, and the monitor's next scan retries.
async fn land(
    state: &SimState,
    airport: &Airport,
    serial: &str,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<bool> {
    let sink = state.sink();
    sink.general(&format!(
        "Plane {} is attempting to land at Airport {} ({}).",
        serial, airport.serial, airport.location
    ));

    // Wait until every runway is free, then atomically occupy one with
    // the receiving flag raised so no departure can interleave.
    if !airport.begin_landing(shutdown).await {
        return Ok(false);
    }

    sink.general(&format!(
        "Plane {} is now landing at Airport {} ({}).",
        serial, airport.serial, airport.location
    ));

    // Mark the approach on the live flight record.
    let marked = state.update_in_flight(serial, |plane| match plane.current_flight_mut() {
        Some(flight) => {
            flight.advance_status(FlightStatus::AboutToLand);
            true
        }
        None => false,
    });
    match marked {
        Some(true) => {}
        Some(false) => {
            airport.abort_landing();
            bail!("plane {serial} has no flight history; cannot initiate landing");
        }
        None => {
            airport.abort_landing();
            bail!("plane {serial} not found in the in-flight set");
        }
    }

    // The landing occupies the runway for its full duration.
    let cancelled = tokio::select! {
        _ = shutdown.recv() => true,
        _ = tokio::time::sleep(state.tunables.landing_duration) => false,
    };
    if cancelled {
        airport.abort_landing();
        return Ok(false);
    }

    // Verify this airport really is the flight's destination.
    let destination = state
        .update_in_flight(serial, |plane| {
            plane.current_flight().map(|f| f.path.destination)
        })
        .flatten();
    let Some(destination) = destination else {
        airport.abort_landing();
        bail!("plane {serial} disappeared before touchdown");
    };
    if !airport.location.approx_eq(destination) {
        airport.abort_landing();
        bail!(
            "plane {} attempting to land at airport {} ({}), but its current flight's destination is {}",
            serial,
            airport.serial,
            airport.location,
            destination
        );
    }

    // Membership change strictly under the simulation lock.
    let Some(mut plane) = state.remove_in_flight(serial) else {
        airport.abort_landing();
        bail!("plane {serial} not found in the in-flight set");
    };

    plane.in_flight = false;
    let now = state.sim_time();
    if let Some(flight) = plane.current_flight_mut() {
        flight.advance_status(FlightStatus::Landed);
        flight.actual_landing_time = Some(now);
    }
    // Frees the runway, clears the receiving flag and parks the plane
    // under the airport lock.
    airport.complete_landing(plane);

    sink.general(&format!(
        "Plane {} successfully landed at Airport {} ({}). It is now parked.",
        serial, airport.serial, airport.location
    ));
    tracing::info!(plane = %serial, airport = %airport.serial, "landed");
    state.fire_landing(serial);
    Ok(true)
}

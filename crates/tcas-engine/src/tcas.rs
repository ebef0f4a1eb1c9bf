//! The TCAS engine: pre-takeoff conflict checks and the in-flight
//! proximity advisory.

use std::collections::HashMap;

use rand::Rng;

use tcas_core::conflict::{
    closest_approach_details, resolve_crash, EngagementKey, TcasEngagement,
};
use tcas_core::models::{Flight, FlightPhase, Plane, TcasCapability};

use crate::state::SimState;

/// Check a departing plane's planned flight against every plane in the
/// air. Conflicts within the collision threshold run the resolution
/// draw once and record the engagement; existing records for the same
/// pair and flight are reused without a second draw. The check never
/// blocks the takeoff.
///
/// Returns the engagements sorted by time of engagement, soonest first.
pub fn pre_takeoff_check(
    state: &SimState,
    plane: &Plane,
    planned: &Flight,
    rng: &mut impl Rng,
) -> Vec<TcasEngagement> {
    let sink = state.sink();
    sink.tcas(&format!(
        "TCAS: Plane {} ({:?}) is checking for conflicts before takeoff.",
        plane.serial, plane.capability
    ));

    // Read-only snapshot under the simulation lock; released before any
    // engagement bookkeeping.
    let others = state.in_flight_snapshot();

    let mut engagements = Vec::new();
    for other in &others {
        if other.serial == plane.serial || !other.in_flight {
            continue;
        }
        let Some(other_flight) = other.current_flight() else {
            sink.tcas(&format!(
                "TCAS: Plane {} is marked in flight but has no flight history; skipping.",
                other.serial
            ));
            continue;
        };

        let ca = closest_approach_details(planned, other_flight);

        let landing_phase = matches!(
            ca.other_phase,
            FlightPhase::AboutToLand | FlightPhase::LandedOrLanding
        );
        if landing_phase || other_flight.cruising_altitude != planned.cruising_altitude {
            sink.tcas(&format!(
                "TCAS: Plane {}'s flight {} and Plane {}'s flight {} have closest approach \
                 ({:.2} units at {}), but no concern: other plane is '{:?}' or at a different altitude.",
                plane.serial,
                planned.flight_id,
                other.serial,
                other_flight.flight_id,
                ca.distance,
                ca.time.format("%H:%M:%S"),
                ca.other_phase,
            ));
            continue;
        }

        if ca.distance < state.tunables.collision_threshold {
            sink.tcas(&format!(
                "TCAS ALERT: Potential collision detected between Plane {} (TCAS: {:?}) and \
                 Plane {} (TCAS: {:?}). Closest approach: {:.2} units at {}.",
                plane.serial,
                plane.capability,
                other.serial,
                other.capability,
                ca.distance,
                ca.time.format("%H:%M:%S"),
            ));

            let key = EngagementKey::new(&plane.serial, &other.serial, &planned.flight_id);
            let engagement = state.engagement_or_insert(key, || {
                let will_crash = resolve_crash(plane.capability, other.capability, rng);
                log_resolution(state, plane, other, will_crash);
                TcasEngagement::engage(
                    &planned.flight_id,
                    &plane.serial,
                    &other.serial,
                    ca.time,
                    will_crash,
                )
            });
            engagements.push(engagement);
        }
    }

    engagements.sort_by_key(|e| e.time_of_engagement);
    engagements
}

fn log_resolution(state: &SimState, plane: &Plane, other: &Plane, will_crash: bool) {
    use TcasCapability::{Faulty, Perfect};
    let sink = state.sink();
    let line = match (plane.capability, other.capability, will_crash) {
        (Perfect, Perfect, _) => format!(
            "TCAS: Both planes have perfect TCAS. Collision averted between {} and {}.",
            plane.serial, other.serial
        ),
        (Faulty, Faulty, true) => format!(
            "TCAS: Two faulty TCAS. Collision occurred between {} and {}.",
            plane.serial, other.serial
        ),
        (Faulty, Faulty, false) => format!(
            "TCAS: Two faulty TCAS. Collision narrowly averted between {} and {}.",
            plane.serial, other.serial
        ),
        (_, _, true) => format!(
            "TCAS: One perfect, one faulty TCAS. Collision occurred between {} and {}.",
            plane.serial, other.serial
        ),
        (_, _, false) => format!(
            "TCAS: One perfect, one faulty TCAS. Collision narrowly averted between {} and {}.",
            plane.serial, other.serial
        ),
    };
    sink.tcas(&line);
}

/// Live proximity states for the viewer: one entry per plane, the most
/// critical engagement across its pairings this tick.
pub type AdvisoryMap = HashMap<String, TcasEngagement>;

/// Scan every pair of in-flight planes sharing a cruising altitude.
///
/// Inside the engage distance the pair escalates to a full engagement,
/// drawing the resolution once and persisting it. Inside the warning
/// distance a transient warning is reported but never persisted. A
/// crash-bound engagement going live signals the supervisor.
pub fn proximity_scan(state: &SimState, rng: &mut impl Rng) -> AdvisoryMap {
    let planes = state.in_flight_snapshot();
    let now = state.sim_time();
    let mut current: AdvisoryMap = HashMap::new();

    for i in 0..planes.len() {
        for j in (i + 1)..planes.len() {
            let a = &planes[i];
            let b = &planes[j];
            let (Some(fa), Some(fb)) = (a.current_flight(), b.current_flight()) else {
                continue;
            };
            if fa.cruising_altitude != fb.cruising_altitude {
                continue;
            }

            let distance = fa.position_at(now).distance(fb.position_at(now));

            let candidate = if distance < state.tunables.trigger_engage_tcas {
                let key = EngagementKey::new(&a.serial, &b.serial, &fa.flight_id);
                let engagement = state.engagement_or_insert(key, || {
                    let will_crash = resolve_crash(a.capability, b.capability, rng);
                    log_resolution(state, a, b, will_crash);
                    TcasEngagement::engage(&fa.flight_id, &a.serial, &b.serial, now, will_crash)
                });
                if engagement.engaged && engagement.will_crash {
                    state.signal_crash();
                }
                Some(engagement)
            } else if distance < state.tunables.trigger_tcas {
                // An engaged record for this pairing outranks a fresh
                // warning; warnings themselves stay transient.
                let key = EngagementKey::new(&a.serial, &b.serial, &fa.flight_id);
                Some(state.engagement(&key).unwrap_or_else(|| {
                    TcasEngagement::warning(&fa.flight_id, &a.serial, &b.serial, now)
                }))
            } else {
                None
            };

            if let Some(engagement) = candidate {
                rank_in(&mut current, &a.serial, &engagement);
                rank_in(&mut current, &b.serial, &engagement);
            }
        }
    }

    current
}

fn rank_in(current: &mut AdvisoryMap, serial: &str, engagement: &TcasEngagement) {
    match current.get(serial) {
        Some(existing) if existing.engaged || !engagement.engaged => {}
        _ => {
            current.insert(serial.to_string(), engagement.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::events::MemorySink;
    use crate::state::SimState;
    use chrono::Utc;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;
    use tcas_core::models::{FlightPath, FlightStatus, CRUISE_SPEED, FIXED_ALTITUDE};
    use tcas_core::spatial::Coordinate;

    fn state_with_sink() -> (SimState, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let config = SimConfig::new(4, false).expect("config");
        (SimState::new(Vec::new(), &config, sink.clone()), sink)
    }

    fn flying_plane(
        serial: &str,
        capability: TcasCapability,
        flight_id: &str,
        from: Coordinate,
        to: Coordinate,
        altitude: f64,
        takeoff: chrono::DateTime<Utc>,
    ) -> Plane {
        let mut plane = Plane::new(serial, capability);
        plane.in_flight = true;
        plane.flight_log.push(Flight::plan(
            flight_id,
            FlightPath::new(from, to),
            altitude,
            "ap0",
            "ap1",
            takeoff,
            CRUISE_SPEED,
        ));
        plane
    }

    fn planned_flight(id: &str, from: Coordinate, to: Coordinate, altitude: f64) -> Flight {
        Flight::plan(
            id,
            FlightPath::new(from, to),
            altitude,
            "ap0",
            "ap1",
            Utc::now(),
            CRUISE_SPEED,
        )
    }

    #[test]
    fn head_on_conflict_records_one_shared_engagement() {
        let (state, sink) = state_with_sink();
        let a = Coordinate::ORIGIN;
        let b = Coordinate::new(200.0, 0.0, 0.0);

        let other = flying_plane(
            "p1",
            TcasCapability::Perfect,
            "f0",
            b,
            a,
            FIXED_ALTITUDE,
            Utc::now(),
        );
        state.insert_in_flight(other);

        let departing = Plane::new("p0", TcasCapability::Perfect);
        let planned = planned_flight("f1", a, b, FIXED_ALTITUDE);

        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let engagements = pre_takeoff_check(&state, &departing, &planned, &mut rng);

        assert_eq!(engagements.len(), 1);
        assert!(engagements[0].engaged);
        // Both perfect: the draw can never produce a crash.
        assert!(!engagements[0].will_crash);

        // The record is shared: both planes can look it up.
        assert_eq!(state.engagements_for_plane("p0").len(), 1);
        assert_eq!(state.engagements_for_plane("p1").len(), 1);
        assert!(sink
            .tcas_lines()
            .iter()
            .any(|l| l.contains("is checking for conflicts")));
        assert!(sink.tcas_lines().iter().any(|l| l.contains("TCAS ALERT")));
    }

    #[test]
    fn repeat_check_reuses_the_first_draw() {
        let (state, _sink) = state_with_sink();
        let a = Coordinate::ORIGIN;
        let b = Coordinate::new(200.0, 0.0, 0.0);

        state.insert_in_flight(flying_plane(
            "p1",
            TcasCapability::Faulty,
            "f0",
            b,
            a,
            FIXED_ALTITUDE,
            Utc::now(),
        ));
        let departing = Plane::new("p0", TcasCapability::Faulty);
        let planned = planned_flight("f1", a, b, FIXED_ALTITUDE);

        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let first = pre_takeoff_check(&state, &departing, &planned, &mut rng);
        let second = pre_takeoff_check(&state, &departing, &planned, &mut rng);

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].engagement_id, second[0].engagement_id);
        assert_eq!(first[0].will_crash, second[0].will_crash);
        assert_eq!(state.engagements_snapshot().len(), 1);
    }

    #[test]
    fn altitude_separation_suppresses_the_engagement() {
        let (state, _sink) = state_with_sink();
        let a = Coordinate::ORIGIN;
        let b = Coordinate::new(200.0, 0.0, 0.0);

        state.insert_in_flight(flying_plane(
            "p1",
            TcasCapability::Perfect,
            "f0",
            b,
            a,
            11_000.0,
            Utc::now(),
        ));
        let departing = Plane::new("p0", TcasCapability::Perfect);
        let planned = planned_flight("f1", a, b, 10_000.0);

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let engagements = pre_takeoff_check(&state, &departing, &planned, &mut rng);

        assert!(engagements.is_empty());
        assert!(state.engagements_snapshot().is_empty());
    }

    #[test]
    fn landing_phase_suppresses_the_engagement() {
        let (state, _sink) = state_with_sink();
        let a = Coordinate::ORIGIN;
        let b = Coordinate::new(200.0, 0.0, 0.0);

        // The other plane's flight is already past its arrival time
        // when the subject reaches the closest approach.
        let takeoff = Utc::now() - chrono::Duration::seconds(60);
        let mut other = flying_plane(
            "p1",
            TcasCapability::Perfect,
            "f0",
            b,
            a,
            FIXED_ALTITUDE,
            takeoff,
        );
        if let Some(flight) = other.current_flight_mut() {
            flight.advance_status(FlightStatus::AboutToLand);
        }
        state.insert_in_flight(other);

        let departing = Plane::new("p0", TcasCapability::Perfect);
        let planned = planned_flight("f1", a, b, FIXED_ALTITUDE);

        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let engagements = pre_takeoff_check(&state, &departing, &planned, &mut rng);
        assert!(engagements.is_empty());
    }

    #[test]
    fn distant_paths_do_not_engage() {
        let (state, _sink) = state_with_sink();

        state.insert_in_flight(flying_plane(
            "p1",
            TcasCapability::Perfect,
            "f0",
            Coordinate::new(0.0, 500.0, 0.0),
            Coordinate::new(200.0, 500.0, 0.0),
            FIXED_ALTITUDE,
            Utc::now(),
        ));
        let departing = Plane::new("p0", TcasCapability::Perfect);
        let planned = planned_flight(
            "f1",
            Coordinate::ORIGIN,
            Coordinate::new(200.0, 0.0, 0.0),
            FIXED_ALTITUDE,
        );

        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(pre_takeoff_check(&state, &departing, &planned, &mut rng).is_empty());
    }

    #[test]
    fn proximity_scan_raises_transient_warnings() {
        let (state, _sink) = state_with_sink();
        let now = Utc::now();

        // Two planes cruising 30 units apart: inside the warning ring,
        // outside the engage ring.
        state.insert_in_flight(flying_plane(
            "p0",
            TcasCapability::Perfect,
            "f0",
            Coordinate::ORIGIN,
            Coordinate::new(0.0, 1000.0, 0.0),
            FIXED_ALTITUDE,
            now - chrono::Duration::seconds(10),
        ));
        state.insert_in_flight(flying_plane(
            "p1",
            TcasCapability::Perfect,
            "f1",
            Coordinate::new(30.0, 0.0, 0.0),
            Coordinate::new(30.0, 1000.0, 0.0),
            FIXED_ALTITUDE,
            now - chrono::Duration::seconds(10),
        ));

        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let advisories = proximity_scan(&state, &mut rng);

        let advisory = advisories.get("p0").expect("warning for p0");
        assert!(advisory.warning_triggered);
        assert!(!advisory.engaged);
        // Warnings are never persisted.
        assert!(state.engagements_snapshot().is_empty());
    }

    #[test]
    fn proximity_scan_escalates_to_engagement_and_persists() {
        let (state, _sink) = state_with_sink();
        let now = Utc::now();

        state.insert_in_flight(flying_plane(
            "p0",
            TcasCapability::Perfect,
            "f0",
            Coordinate::ORIGIN,
            Coordinate::new(0.0, 1000.0, 0.0),
            FIXED_ALTITUDE,
            now - chrono::Duration::seconds(10),
        ));
        state.insert_in_flight(flying_plane(
            "p1",
            TcasCapability::Perfect,
            "f1",
            Coordinate::new(5.0, 0.0, 0.0),
            Coordinate::new(5.0, 1000.0, 0.0),
            FIXED_ALTITUDE,
            now - chrono::Duration::seconds(10),
        ));

        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let advisories = proximity_scan(&state, &mut rng);

        let advisory = advisories.get("p1").expect("engagement for p1");
        assert!(advisory.engaged);
        assert_eq!(state.engagements_snapshot().len(), 1);

        // A second tick reuses the stored record.
        let again = proximity_scan(&state, &mut rng);
        assert_eq!(
            again.get("p1").expect("still engaged").engagement_id,
            advisory.engagement_id
        );
        assert_eq!(state.engagements_snapshot().len(), 1);
    }

    #[test]
    fn proximity_scan_skips_different_altitudes() {
        let (state, _sink) = state_with_sink();
        let now = Utc::now();

        state.insert_in_flight(flying_plane(
            "p0",
            TcasCapability::Perfect,
            "f0",
            Coordinate::ORIGIN,
            Coordinate::new(0.0, 1000.0, 0.0),
            10_000.0,
            now - chrono::Duration::seconds(10),
        ));
        state.insert_in_flight(flying_plane(
            "p1",
            TcasCapability::Perfect,
            "f1",
            Coordinate::new(5.0, 0.0, 0.0),
            Coordinate::new(5.0, 1000.0, 0.0),
            11_000.0,
            now - chrono::Duration::seconds(10),
        ));

        let mut rng = ChaCha8Rng::seed_from_u64(6);
        assert!(proximity_scan(&state, &mut rng).is_empty());
    }

    #[test]
    fn crash_bound_engagement_signals_the_supervisor() {
        let (state, _sink) = state_with_sink();
        let now = Utc::now();

        // Two faulty planes flying on top of each other; with this seed
        // the 50% draw comes up crash.
        state.insert_in_flight(flying_plane(
            "p0",
            TcasCapability::Faulty,
            "f0",
            Coordinate::ORIGIN,
            Coordinate::new(0.0, 1000.0, 0.0),
            FIXED_ALTITUDE,
            now - chrono::Duration::seconds(10),
        ));
        state.insert_in_flight(flying_plane(
            "p1",
            TcasCapability::Faulty,
            "f1",
            Coordinate::new(1.0, 0.0, 0.0),
            Coordinate::new(1.0, 1000.0, 0.0),
            FIXED_ALTITUDE,
            now - chrono::Duration::seconds(10),
        ));

        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let advisories = proximity_scan(&state, &mut rng);

        let engagement = advisories.get("p0").expect("engagement for p0");
        assert!(engagement.engaged);
        // The supervisor is signalled exactly when the draw was a crash.
        assert_eq!(state.crash_flagged(), engagement.will_crash);
    }
}

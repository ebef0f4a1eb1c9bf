//! Conflict rules: closest-approach details between flights and the
//! TCAS capability-based collision resolution.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Flight, FlightPhase, TcasCapability};
use crate::spatial::{self, EPSILON};

/// Distance below which a planned flight is in conflict with a live one.
pub const COLLISION_THRESHOLD: f64 = 50.0;

/// In-flight proximity that raises a transient warning.
pub const TRIGGER_TCAS: f64 = 50.0;

/// In-flight proximity that escalates to a full engagement.
pub const TRIGGER_ENGAGE_TCAS: f64 = 15.0;

/// Identity of an engagement: the unordered plane pair plus the flight
/// that triggered the check. At most one engagement exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngagementKey {
    first: String,
    second: String,
    flight_id: String,
}

impl EngagementKey {
    pub fn new(plane_a: &str, plane_b: &str, flight_id: &str) -> Self {
        let (first, second) = if plane_a <= plane_b {
            (plane_a, plane_b)
        } else {
            (plane_b, plane_a)
        };
        Self {
            first: first.to_string(),
            second: second.to_string(),
            flight_id: flight_id.to_string(),
        }
    }

    pub fn involves(&self, serial: &str) -> bool {
        self.first == serial || self.second == serial
    }
}

/// A recorded pair-wise near-miss decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcasEngagement {
    pub engagement_id: String,
    pub flight_id: String,
    pub plane_serial: String,
    pub other_plane_serial: String,
    pub time_of_engagement: DateTime<Utc>,
    /// Outcome of the resolution draw; immutable once `engaged` is set.
    pub will_crash: bool,
    pub warning_triggered: bool,
    pub engaged: bool,
}

impl TcasEngagement {
    /// A fully engaged record with a resolved outcome.
    pub fn engage(
        flight_id: &str,
        plane_serial: &str,
        other_plane_serial: &str,
        at: DateTime<Utc>,
        will_crash: bool,
    ) -> Self {
        Self {
            engagement_id: Uuid::new_v4().to_string(),
            flight_id: flight_id.to_string(),
            plane_serial: plane_serial.to_string(),
            other_plane_serial: other_plane_serial.to_string(),
            time_of_engagement: at,
            will_crash,
            warning_triggered: false,
            engaged: true,
        }
    }

    /// A transient advisory warning. Never persisted to history.
    pub fn warning(
        flight_id: &str,
        plane_serial: &str,
        other_plane_serial: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            engagement_id: Uuid::new_v4().to_string(),
            flight_id: flight_id.to_string(),
            plane_serial: plane_serial.to_string(),
            other_plane_serial: other_plane_serial.to_string(),
            time_of_engagement: at,
            will_crash: false,
            warning_triggered: true,
            engaged: false,
        }
    }

    pub fn key(&self) -> EngagementKey {
        EngagementKey::new(&self.plane_serial, &self.other_plane_serial, &self.flight_id)
    }

    pub fn involves(&self, serial: &str) -> bool {
        self.plane_serial == serial || self.other_plane_serial == serial
    }
}

/// Probability that a conflict between two planes ends in a collision.
pub fn crash_probability(a: TcasCapability, b: TcasCapability) -> f64 {
    match (a, b) {
        (TcasCapability::Perfect, TcasCapability::Perfect) => 0.0,
        (TcasCapability::Faulty, TcasCapability::Faulty) => 0.5,
        _ => 0.25,
    }
}

/// Run the resolution draw for a new engagement. Sampled exactly once
/// per engagement; callers must reuse the stored record afterwards.
pub fn resolve_crash(a: TcasCapability, b: TcasCapability, rng: &mut impl Rng) -> bool {
    let p = crash_probability(a, b);
    p > 0.0 && rng.gen_bool(p)
}

/// Closest-approach details of a (planned) flight against another live
/// flight, as needed by the pre-takeoff check.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosestApproach {
    /// Distance between the subject's closest-approach point and the
    /// other plane's actual position when the subject reaches it.
    pub distance: f64,
    /// When the subject plane reaches its closest-approach point.
    pub time: DateTime<Utc>,
    /// The other plane's phase at that time.
    pub other_phase: FlightPhase,
}

/// Compute where and when `subject` comes closest to `other`'s path,
/// and how far `other` actually is at that moment.
///
/// A degenerate subject path (shorter than the coordinate tolerance)
/// yields an infinite sentinel distance so no threshold can trip.
pub fn closest_approach_details(subject: &Flight, other: &Flight) -> ClosestApproach {
    let length = subject.path.length();
    if length < EPSILON {
        return ClosestApproach {
            distance: f64::INFINITY,
            time: subject.takeoff_time,
            other_phase: other.phase_at(subject.takeoff_time),
        };
    }

    let (subject_point, _) = spatial::closest_approach(
        (subject.path.departure, subject.path.destination),
        (other.path.departure, other.path.destination),
    );

    let fraction = subject.path.departure.distance(subject_point) / length;
    let offset_ms = (subject.duration().num_milliseconds() as f64 * fraction).round() as i64;
    let time = subject.takeoff_time + Duration::milliseconds(offset_ms);

    let other_position = other.position_at(time);

    ClosestApproach {
        distance: subject_point.distance(other_position),
        time,
        other_phase: other.phase_at(time),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FlightPath, CRUISE_SPEED, FIXED_ALTITUDE};
    use crate::spatial::Coordinate;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn flight_between(id: &str, from: Coordinate, to: Coordinate, takeoff: DateTime<Utc>) -> Flight {
        Flight::plan(
            id,
            FlightPath::new(from, to),
            FIXED_ALTITUDE,
            "ap0",
            "ap1",
            takeoff,
            CRUISE_SPEED,
        )
    }

    #[test]
    fn key_is_unordered() {
        let a = EngagementKey::new("p1", "p7", "f3");
        let b = EngagementKey::new("p7", "p1", "f3");
        assert_eq!(a, b);
        assert!(a.involves("p7"));
        assert!(!a.involves("p2"));
    }

    #[test]
    fn crash_table_matches_capabilities() {
        use TcasCapability::{Faulty, Perfect};
        assert_eq!(crash_probability(Perfect, Perfect), 0.0);
        assert_eq!(crash_probability(Perfect, Faulty), 0.25);
        assert_eq!(crash_probability(Faulty, Perfect), 0.25);
        assert_eq!(crash_probability(Faulty, Faulty), 0.5);
    }

    #[test]
    fn perfect_pair_never_crashes() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..100 {
            assert!(!resolve_crash(
                TcasCapability::Perfect,
                TcasCapability::Perfect,
                &mut rng
            ));
        }
    }

    #[test]
    fn faulty_pair_crashes_about_half_the_time() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let crashes = (0..4000)
            .filter(|_| resolve_crash(TcasCapability::Faulty, TcasCapability::Faulty, &mut rng))
            .count();
        assert!((1800..2200).contains(&crashes), "crashes: {crashes}");
    }

    #[test]
    fn head_on_reciprocal_flights_are_a_zero_distance_conflict() {
        let now = Utc::now();
        let a = Coordinate::ORIGIN;
        let b = Coordinate::new(200.0, 0.0, 0.0);

        // The other plane departed at the same moment on the reciprocal
        // route; both reach the shared midpoint together.
        let subject = flight_between("f0", a, b, now);
        let other = flight_between("f1", b, a, now);

        let ca = closest_approach_details(&subject, &other);
        assert!(ca.distance < EPSILON);
        assert_eq!(ca.other_phase, FlightPhase::InTransit);
        assert_eq!(ca.time, now + Duration::seconds(10));
    }

    #[test]
    fn crossing_paths_report_other_planes_actual_position() {
        let now = Utc::now();
        // Paths cross at (100, 0, 0) but the other plane is still far
        // from the crossing when the subject reaches it.
        let subject = flight_between("f0", Coordinate::ORIGIN, Coordinate::new(200.0, 0.0, 0.0), now);
        let other = flight_between(
            "f1",
            Coordinate::new(100.0, -400.0, 0.0),
            Coordinate::new(100.0, 400.0, 0.0),
            now,
        );

        let ca = closest_approach_details(&subject, &other);
        // Subject reaches the crossing after 10 s; the other plane has
        // covered 100 units of its 800-unit path by then.
        assert!((ca.distance - 300.0).abs() < 1.0);
    }

    #[test]
    fn degenerate_path_propagates_sentinel_distance() {
        let now = Utc::now();
        let point = Coordinate::new(5.0, 5.0, 0.0);
        let subject = flight_between("f0", point, point, now);
        let other = flight_between("f1", Coordinate::ORIGIN, Coordinate::new(10.0, 0.0, 0.0), now);

        let ca = closest_approach_details(&subject, &other);
        assert!(ca.distance.is_infinite());
        assert!(ca.distance >= COLLISION_THRESHOLD);
    }
}

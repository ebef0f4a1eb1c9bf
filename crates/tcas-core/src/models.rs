//! Domain models for planes and flights.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::spatial::Coordinate;

/// Default cruise speed, in world units per second.
pub const CRUISE_SPEED: f64 = 10.0;

/// Fixed cruising altitude in meters when varying altitudes are disabled.
pub const FIXED_ALTITUDE: f64 = 10_000.0;

/// The selectable cruising altitudes when varying altitudes are enabled.
pub const ALTITUDE_BANDS: [f64; 3] = [10_000.0, 11_000.0, 12_000.0];

/// The collision-avoidance capability installed on a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TcasCapability {
    /// Fully functional; always resolves its half of a conflict.
    Perfect,
    /// Degraded; may fail to resolve a conflict.
    Faulty,
}

impl TcasCapability {
    /// Draw a capability for a newly built plane. One plane in four
    /// carries a faulty unit.
    pub fn draw(rng: &mut impl Rng) -> Self {
        if rng.gen_bool(0.25) {
            TcasCapability::Faulty
        } else {
            TcasCapability::Perfect
        }
    }
}

/// Lifecycle of a single flight. Transitions only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightStatus {
    TakingOff,
    InTransit,
    AboutToLand,
    Landed,
}

impl FlightStatus {
    fn rank(self) -> u8 {
        match self {
            FlightStatus::TakingOff => 0,
            FlightStatus::InTransit => 1,
            FlightStatus::AboutToLand => 2,
            FlightStatus::Landed => 3,
        }
    }
}

/// Where a plane is within a flight at a given instant, as seen by the
/// conflict checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightPhase {
    Parked,
    TakingOff,
    InTransit,
    AboutToLand,
    Arriving,
    LandedOrLanding,
}

/// The straight-line path of a flight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlightPath {
    pub departure: Coordinate,
    pub destination: Coordinate,
}

impl FlightPath {
    pub fn new(departure: Coordinate, destination: Coordinate) -> Self {
        Self {
            departure,
            destination,
        }
    }

    pub fn length(&self) -> f64 {
        self.departure.distance(self.destination)
    }
}

/// A single scheduled traversal between two airports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flight {
    pub flight_id: String,
    pub path: FlightPath,
    pub takeoff_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    /// Meters; compared exactly, altitudes come from a discrete band set.
    pub cruising_altitude: f64,
    pub departure_airport: String,
    pub arrival_airport: String,
    pub status: FlightStatus,
    pub actual_landing_time: Option<DateTime<Utc>>,
}

impl Flight {
    /// Plan a flight departing at `takeoff_time`. The scheduled arrival
    /// is derived from the path length and the plane's cruise speed.
    #[allow(clippy::too_many_arguments)]
    pub fn plan(
        flight_id: impl Into<String>,
        path: FlightPath,
        cruising_altitude: f64,
        departure_airport: impl Into<String>,
        arrival_airport: impl Into<String>,
        takeoff_time: DateTime<Utc>,
        cruise_speed: f64,
    ) -> Self {
        let millis = (path.length() / cruise_speed * 1000.0).round() as i64;
        Self {
            flight_id: flight_id.into(),
            path,
            takeoff_time,
            arrival_time: takeoff_time + Duration::milliseconds(millis),
            cruising_altitude,
            departure_airport: departure_airport.into(),
            arrival_airport: arrival_airport.into(),
            status: FlightStatus::TakingOff,
            actual_landing_time: None,
        }
    }

    pub fn duration(&self) -> Duration {
        self.arrival_time - self.takeoff_time
    }

    /// Advance the status, ignoring transitions that would move backwards.
    pub fn advance_status(&mut self, next: FlightStatus) {
        if next.rank() > self.status.rank() {
            self.status = next;
        }
    }

    /// Fraction of the flight completed at `at`, clamped to `[0, 1]`.
    pub fn progress_fraction(&self, at: DateTime<Utc>) -> f64 {
        let total = self.duration().num_milliseconds();
        if total <= 0 {
            return if at > self.arrival_time { 1.0 } else { 0.0 };
        }
        let elapsed = (at - self.takeoff_time).num_milliseconds();
        (elapsed as f64 / total as f64).clamp(0.0, 1.0)
    }

    /// Position along the path at `at`: the departure point before
    /// takeoff, the destination after arrival, interpolated in between.
    pub fn position_at(&self, at: DateTime<Utc>) -> Coordinate {
        if at <= self.takeoff_time {
            self.path.departure
        } else if at >= self.arrival_time {
            self.path.destination
        } else {
            self.path
                .departure
                .lerp(self.path.destination, self.progress_fraction(at))
        }
    }

    /// Classify where the plane is within this flight at `at`.
    pub fn phase_at(&self, at: DateTime<Utc>) -> FlightPhase {
        if at > self.arrival_time {
            return FlightPhase::LandedOrLanding;
        }
        if at > self.takeoff_time && at < self.arrival_time {
            return if self.status == FlightStatus::AboutToLand {
                FlightPhase::AboutToLand
            } else {
                FlightPhase::InTransit
            };
        }
        if at == self.takeoff_time {
            return FlightPhase::TakingOff;
        }
        if at == self.arrival_time {
            return FlightPhase::Arriving;
        }
        FlightPhase::Parked
    }

    /// Human-readable progress, as shown by inspection surfaces.
    pub fn progress_string(&self, at: DateTime<Utc>) -> String {
        if at >= self.arrival_time && self.status == FlightStatus::Landed {
            "100% (Landed)".to_string()
        } else if at >= self.arrival_time && self.status == FlightStatus::AboutToLand {
            "100% (About to land)".to_string()
        } else if at > self.takeoff_time && at < self.arrival_time {
            format!(
                "{:.2}% (As at {})",
                self.progress_fraction(at) * 100.0,
                at.format("%H:%M:%S")
            )
        } else {
            "0% (Plane about to take off or still taking off)".to_string()
        }
    }
}

/// An aircraft and its flight history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plane {
    pub serial: String,
    pub in_flight: bool,
    pub cruise_speed: f64,
    pub capability: TcasCapability,
    /// Append-only; the last entry is the current flight.
    pub flight_log: Vec<Flight>,
}

impl Plane {
    pub fn new(serial: impl Into<String>, capability: TcasCapability) -> Self {
        Self {
            serial: serial.into(),
            in_flight: false,
            cruise_speed: CRUISE_SPEED,
            capability,
            flight_log: Vec::new(),
        }
    }

    pub fn current_flight(&self) -> Option<&Flight> {
        self.flight_log.last()
    }

    pub fn current_flight_mut(&mut self) -> Option<&mut Flight> {
        self.flight_log.last_mut()
    }

    /// Current position, if the plane has ever flown.
    pub fn position_at(&self, at: DateTime<Utc>) -> Option<Coordinate> {
        self.current_flight().map(|flight| flight.position_at(at))
    }
}

//! TCAS Core - Pure logic for the en-route traffic simulation
//!
//! This crate contains the domain models, the closest-approach geometry
//! and the collision-resolution rules with NO runtime dependencies.

pub mod conflict;
pub mod models;
pub mod serial;
pub mod spatial;

pub use conflict::{
    crash_probability, closest_approach_details, ClosestApproach, EngagementKey, TcasEngagement,
    COLLISION_THRESHOLD, TRIGGER_ENGAGE_TCAS, TRIGGER_TCAS,
};
pub use models::{Flight, FlightPath, FlightPhase, FlightStatus, Plane, TcasCapability};
pub use serial::SerialCounter;
pub use spatial::{closest_approach, Coordinate, EPSILON};

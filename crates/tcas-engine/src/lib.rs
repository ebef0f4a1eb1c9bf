//! TCAS Engine - the concurrent en-route traffic simulation.
//!
//! One actor per airport launches flights, a single monitor drives
//! landings, and the TCAS engine checks every departure against the
//! planes already in the air. The [`supervisor::Simulation`] value owns
//! the whole lifecycle; nothing here lives in module-scope state, so a
//! process can run simulations back to back without bleed-through.

pub mod clock;
pub mod config;
pub mod events;
pub mod loops;
pub mod state;
pub mod supervisor;
pub mod tcas;
pub mod world;

pub use config::{SimConfig, Tunables};
pub use events::{EventSink, FileSink, MemorySink, NullSink};
pub use state::{Airport, SimState};
pub use supervisor::{AirportSnapshot, SimSnapshot, Simulation};

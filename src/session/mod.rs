//! Session lifecycle
//!
//! `SessionMachine` holds the rules, `SessionDriver` feeds it server
//! responses and control-loop ticks.

pub mod driver;
pub mod error;
pub mod machine;
pub mod state;

pub use driver::SessionDriver;
pub use error::SessionError;
pub use machine::{RequestKind, RequestTicket, SessionMachine, TickInput};
pub use state::{SessionEvent, SessionPhase, SessionState, TrackZones, Zone};

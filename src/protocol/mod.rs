//! Session server protocol
//!
//! - `decoder`: lenient, total field extraction from JSON text
//! - `snapshot`: the typed, immutable view of one response
//! - `client`: async request/response operations against the server

pub mod client;
pub mod decoder;
pub mod error;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod stub;

pub use client::{Endpoint, SessionClient};
pub use error::ClientError;
pub use snapshot::{RemotePhase, SessionSnapshot};

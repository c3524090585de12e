//! Connection identity and presence.
//!
//! The registry maps live connections to users. Presence is derived from it
//! (one entry per online user) and never stored separately.

pub mod handlers;
pub mod registry;

pub use registry::{ConnectionRegistry, ConnectionSession, DisplacedSession, Registration};

//! Session tracking for live connections.

pub mod registry;

pub use registry::{Outbound, SessionRegistry};

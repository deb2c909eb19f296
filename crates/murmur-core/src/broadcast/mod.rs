//! Intent serialization and event fan-out.
//!
//! The [`BroadcastEngine`] owns the session registry and is the only place
//! where messages are persisted and events are queued for delivery.

pub mod engine;
pub mod retry;

pub use engine::{BroadcastEngine, EngineSettings, SessionHandle};
pub use retry::StoreRetryPolicy;

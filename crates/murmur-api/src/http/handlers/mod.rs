//! HTTP request handlers.

pub mod message;
pub mod session;
pub mod ws;

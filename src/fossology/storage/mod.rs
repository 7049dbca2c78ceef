//! Storage abstractions for idle remote sessions.
//!
//! This module provides a trait-based cache so that the pool can be tested
//! against other implementations; the default one uses DashMap for
//! lock-free concurrent access.

mod session;
mod traits;

pub use session::DashMapIdleSessions;
pub use traits::IdleSessionStorage;

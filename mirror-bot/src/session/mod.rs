//! Per-user conversation memory.
//!
//! A session holds the recent turns of one user plus a rolling summary of
//! older ones. Sessions live only in process memory.

mod context;
mod store;
mod types;

pub use context::ContextBuilder;
pub use store::{CompactionClaim, MemoryConfig, SessionStore};
pub use types::{Session, Turn, TurnRole};

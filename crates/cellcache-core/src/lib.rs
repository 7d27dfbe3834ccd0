//! Cellcache Core
//!
//! Shared vocabulary for cellcache: the error taxonomy, callable identifiers,
//! the argument value model used to derive cache keys, and the port traits
//! that storage adapters implement.

pub mod args;
pub mod error;
pub mod ids;
pub mod ports;

pub use args::{ArgValue, CallArgs};
pub use error::{Error, Result};
pub use ids::CallableId;

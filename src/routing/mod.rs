//! Route registration and path matching
//!
//! A route pattern is a path with named `{placeholders}`:
//!
//! ```
//! use sockserve::routing::Pattern;
//!
//! let pattern = Pattern::compile("/user/{token}/").unwrap();
//! let params = pattern.extract("/user/abc123/");
//! assert_eq!(params.get("token").map(String::as_str), Some("abc123"));
//! ```
//!
//! Patterns are compiled once when registered. A [`Router`] keeps its
//! actions in registration order and the first matching action wins; it is
//! built before serving starts and only read afterwards, so it is shared
//! between connection threads without locking.

pub mod pattern;
pub mod router;

pub use pattern::Pattern;
pub use router::{Action, Router};

use crate::http::Method;

/// Result type for routing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Routing errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Route {0:?} must allow at least one verb")]
    EmptyVerbSet(String),

    #[error("No route matches {0}")]
    NoMatchingRoute(String),

    #[error("{verb} is not allowed on {path}")]
    VerbNotAllowed { verb: Method, path: String },
}

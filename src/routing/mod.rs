//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (handler lookup)
//!     → matcher.rs (segment-aware prefix match, strip)
//!     → Return: matched ContentRoute + content id, or NoMatch
//!
//! Route Compilation (at startup):
//!     HandlerConfig[]
//!     → Sort by prefix length (longest first)
//!     → Freeze as immutable ContentRouter
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use matcher::PathPrefixMatcher;
pub use router::{ContentRoute, ContentRouter};

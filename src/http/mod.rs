//! HTTP transport subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, tracing)
//!     → routing layer picks the content handler
//!     → plain content request or JSON-RPC control request
//!     → session manager creates and activates a session
//!     → handler waits for the session's answer on the exchange
//!     → Send to client
//! ```

pub mod server;

pub use server::{AppState, HttpServer};

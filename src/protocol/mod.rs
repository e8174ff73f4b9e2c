//! Control protocol and client answers.
//!
//! # Data Flow
//! ```text
//! axum handler
//!     → exchange.rs (request + one-shot reply slot)
//!     → session keeps it as InitialContext
//!     → responder.rs answers once: redirect, tunnel, JSON-RPC result or error
//!     → jsonrpc.rs (wire format of control requests/answers)
//! ```

pub mod exchange;
pub mod jsonrpc;
pub mod responder;

pub use exchange::{ExchangeReply, HttpExchange, ResponseSink};
pub use jsonrpc::{ControlMethod, JsonRpcRequest, JsonRpcResponse};
pub use responder::{InitialContext, ProtocolResponder};

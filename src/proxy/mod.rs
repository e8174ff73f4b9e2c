//! Streaming proxy subsystem.
//!
//! # Data Flow
//! ```text
//! Client ── request body ──▶ Gateway ── request body ──▶ Delivery URL
//! Client ◀── response body ── Gateway ◀── response body ── Delivery URL
//!
//! 101 Switching Protocols:
//! Client ◀═══ raw bytes, both ways ═══▶ Delivery URL
//! ```
//!
//! # Design Decisions
//! - One spawned task per tunnel, no buffering beyond a small chunk queue
//! - The owner gets a [`TunnelHandle`]; cancel and natural completion race
//!   on a single flag and only the winner has an effect
//! - No timeout: a tunnel lives until one side closes or it is cancelled

pub mod tunnel;

use std::time::Duration;

use axum::body::Body;
use axum::http::HeaderName;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

pub use tunnel::{TunnelHandle, TunnelOutcome};

/// Upstream request failed or broke mid-stream.
pub const CODE_UPSTREAM_FAILURE: i32 = 20030;
/// Client went away while the tunnel was relaying.
pub const CODE_CLIENT_CLOSED: i32 = 20031;
/// Protocol upgrade could not be completed on one of the sides.
pub const CODE_UPGRADE_FAILURE: i32 = 20032;

/// Why a tunnel ended unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProxyError {
    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("client closed the connection")]
    ClientClosed,

    #[error("protocol upgrade failed: {0}")]
    Upgrade(String),
}

impl ProxyError {
    pub fn code(&self) -> i32 {
        match self {
            ProxyError::Upstream(_) => CODE_UPSTREAM_FAILURE,
            ProxyError::ClientClosed => CODE_CLIENT_CLOSED,
            ProxyError::Upgrade(_) => CODE_UPGRADE_FAILURE,
        }
    }
}

/// Relays client exchanges to delivery URLs.
#[derive(Debug, Clone)]
pub struct StreamingProxy {
    client: Client<HttpConnector, Body>,
}

impl StreamingProxy {
    /// Create a proxy whose upstream connections give up after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client }
    }
}

/// Headers that describe a single connection and must not be relayed.
pub(crate) fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

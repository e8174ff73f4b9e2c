//! Content Gateway Library
//!
//! Serves media content over HTTP by pairing each client request with a
//! content session: the session asks a media engine for a delivery endpoint
//! and answers the client with a redirect, a streamed tunnel, or a JSON-RPC
//! result.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod media;
pub mod observability;
pub mod protocol;
pub mod proxy;
pub mod routing;
pub mod session;

pub use config::schema::GatewayConfig;
pub use error::ContentError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use session::{ContentSession, SessionManager};

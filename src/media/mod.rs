//! Media engine collaborator interface.
//!
//! # Data Flow
//! ```text
//! content path ──build_processing_endpoint──▶ MediaElement (player, recorder)
//!                                                  │
//!      caller-provided elements ───────────────────┤
//!                                                  ▼
//!                         build_and_connect_delivery_endpoint
//!                                                  │
//!                                                  ▼
//!                     DeliveryEndpoint ── url() ──▶ client answer
//!                                      └─ subscribe() ──▶ MediaEvent stream
//! ```
//!
//! # Design Decisions
//! - The engine is out-of-process; every call may suspend or fail
//! - Events are delivered over a broadcast channel, one receiver per session
//! - Objects are released explicitly, never on drop

pub mod origin;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

pub use origin::OriginEngine;

/// Failure reported by the media engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{description} (code {code})")]
pub struct MediaError {
    pub code: i32,
    pub description: String,
}

impl MediaError {
    pub fn new(code: i32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }
}

/// Kind of processing element built ahead of the delivery endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Player,
    Recorder,
    Rtp,
    Filter,
}

/// Explicit action issued on a processing element once media starts flowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAction {
    Play,
    Record,
}

impl ElementKind {
    /// Closed mapping from element kind to the action it needs on session start.
    pub fn start_action(&self) -> Option<StartAction> {
        match self {
            ElementKind::Player => Some(StartAction::Play),
            ElementKind::Recorder => Some(StartAction::Record),
            ElementKind::Rtp | ElementKind::Filter => None,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Player => "player",
            ElementKind::Recorder => "recorder",
            ElementKind::Rtp => "rtp",
            ElementKind::Filter => "filter",
        };
        f.write_str(name)
    }
}

/// Which way media crosses the delivery endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDirection {
    /// Engine sends media to the HTTP client.
    ToClient,
    /// HTTP client uploads media to the engine.
    FromClient,
}

/// Events emitted by the engine for a delivery endpoint and its pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// Fatal pipeline error.
    Error { code: i32, description: String },
    /// Media started flowing through the delivery endpoint.
    SessionStarted,
    /// Media flow ended normally.
    SessionTerminated,
}

/// A processing element living in the engine.
#[async_trait]
pub trait MediaElement: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn kind(&self) -> ElementKind;

    async fn start(&self, action: StartAction) -> Result<(), MediaError>;

    async fn release(&self) -> Result<(), MediaError>;
}

/// An HTTP-facing endpoint exposing a URL media flows through.
#[async_trait]
pub trait DeliveryEndpoint: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    /// URL the client (or the tunnel) should talk to.
    async fn url(&self) -> Result<Option<String>, MediaError>;

    /// Subscribe to error, started and terminated events.
    fn subscribe(&self) -> broadcast::Receiver<MediaEvent>;

    async fn release(&self) -> Result<(), MediaError>;
}

/// Builder side of the media engine.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Build a processing element (player, recorder) sourcing or sinking `content_path`.
    async fn build_processing_endpoint(
        &self,
        kind: ElementKind,
        content_path: &str,
    ) -> Result<Arc<dyn MediaElement>, MediaError>;

    /// Build a delivery endpoint and connect it to `elements`. `elements` is never empty.
    async fn build_and_connect_delivery_endpoint(
        &self,
        direction: FlowDirection,
        elements: &[Arc<dyn MediaElement>],
    ) -> Result<Arc<dyn DeliveryEndpoint>, MediaError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_action_mapping_is_closed() {
        assert_eq!(ElementKind::Player.start_action(), Some(StartAction::Play));
        assert_eq!(ElementKind::Recorder.start_action(), Some(StartAction::Record));
        assert_eq!(ElementKind::Rtp.start_action(), None);
        assert_eq!(ElementKind::Filter.start_action(), None);
    }
}

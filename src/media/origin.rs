//! Media engine backed by a plain HTTP media origin.
//!
//! Processing elements are bookkeeping only: a player or recorder is a content
//! path, and its delivery endpoint is that path resolved against the origin
//! URL. Media flow events are not observable from here, except the
//! terminated event emitted when a delivery endpoint is released.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use url::Url;
use uuid::Uuid;

use crate::error::CODE_MEDIA_FAILURE;
use crate::media::{
    DeliveryEndpoint, ElementKind, FlowDirection, MediaElement, MediaEngine, MediaError,
    MediaEvent, StartAction,
};

const EVENT_CAPACITY: usize = 16;

/// Engine resolving content paths against a media origin.
#[derive(Debug, Clone)]
pub struct OriginEngine {
    origin: Url,
    /// Content path of every live element built by this engine.
    elements: Arc<DashMap<String, String>>,
}

impl OriginEngine {
    pub fn new(mut origin: Url) -> Self {
        // A base without a trailing slash would lose its last segment on join.
        if !origin.path().ends_with('/') {
            let path = format!("{}/", origin.path());
            origin.set_path(&path);
        }
        Self {
            origin,
            elements: Arc::new(DashMap::new()),
        }
    }

    /// Number of elements not yet released.
    pub fn live_elements(&self) -> usize {
        self.elements.len()
    }

    /// Resolve `content_path` below the origin. Paths that would climb out
    /// of the origin's base path are refused.
    fn resolve(&self, content_path: &str) -> Result<Url, MediaError> {
        let url = self
            .origin
            .join(content_path.trim_start_matches('/'))
            .map_err(|e| {
                MediaError::new(
                    CODE_MEDIA_FAILURE,
                    format!("cannot resolve {content_path} against origin: {e}"),
                )
            })?;
        if !url.as_str().starts_with(self.origin.as_str()) {
            return Err(MediaError::new(
                CODE_MEDIA_FAILURE,
                format!("content path {content_path} leaves the origin"),
            ));
        }
        Ok(url)
    }
}

#[async_trait]
impl MediaEngine for OriginEngine {
    async fn build_processing_endpoint(
        &self,
        kind: ElementKind,
        content_path: &str,
    ) -> Result<Arc<dyn MediaElement>, MediaError> {
        if !matches!(kind, ElementKind::Player | ElementKind::Recorder) {
            return Err(MediaError::new(
                CODE_MEDIA_FAILURE,
                format!("origin engine cannot build {kind} elements"),
            ));
        }
        // Fail early on paths that cannot become a URL.
        self.resolve(content_path)?;

        let element = OriginElement {
            id: Uuid::new_v4().to_string(),
            kind,
            elements: self.elements.clone(),
        };
        self.elements.insert(element.id.clone(), content_path.to_string());
        tracing::debug!(element_id = %element.id, %kind, content_path, "Built origin element");
        Ok(Arc::new(element))
    }

    async fn build_and_connect_delivery_endpoint(
        &self,
        direction: FlowDirection,
        elements: &[Arc<dyn MediaElement>],
    ) -> Result<Arc<dyn DeliveryEndpoint>, MediaError> {
        let first = elements
            .first()
            .ok_or_else(|| MediaError::new(CODE_MEDIA_FAILURE, "no elements to connect"))?;
        let content_path = self
            .elements
            .get(first.id())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                MediaError::new(
                    CODE_MEDIA_FAILURE,
                    format!("element {} is not managed by this engine", first.id()),
                )
            })?;

        let url = self.resolve(&content_path)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let endpoint = OriginDelivery {
            id: Uuid::new_v4().to_string(),
            url: url.to_string(),
            events,
        };
        tracing::debug!(
            endpoint_id = %endpoint.id,
            url = %endpoint.url,
            ?direction,
            "Connected origin delivery endpoint"
        );
        Ok(Arc::new(endpoint))
    }
}

#[derive(Debug)]
struct OriginElement {
    id: String,
    kind: ElementKind,
    elements: Arc<DashMap<String, String>>,
}

#[async_trait]
impl MediaElement for OriginElement {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ElementKind {
        self.kind
    }

    async fn start(&self, action: StartAction) -> Result<(), MediaError> {
        tracing::debug!(element_id = %self.id, ?action, "Origin element started");
        Ok(())
    }

    async fn release(&self) -> Result<(), MediaError> {
        self.elements.remove(&self.id);
        Ok(())
    }
}

#[derive(Debug)]
struct OriginDelivery {
    id: String,
    url: String,
    events: broadcast::Sender<MediaEvent>,
}

#[async_trait]
impl DeliveryEndpoint for OriginDelivery {
    fn id(&self) -> &str {
        &self.id
    }

    async fn url(&self) -> Result<Option<String>, MediaError> {
        Ok(Some(self.url.clone()))
    }

    fn subscribe(&self) -> broadcast::Receiver<MediaEvent> {
        self.events.subscribe()
    }

    async fn release(&self) -> Result<(), MediaError> {
        let _ = self.events.send(MediaEvent::SessionTerminated);
        Ok(())
    }
}

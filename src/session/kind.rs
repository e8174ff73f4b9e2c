//! Session variants.
//!
//! Each variant decides which processing element a content path becomes and
//! which way media crosses the delivery endpoint. RTP sessions have no
//! content-path form; they are always activated with pre-built elements.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ContentError, CODE_MEDIA_FAILURE};
use crate::media::{
    DeliveryEndpoint, ElementKind, FlowDirection, MediaElement, MediaEngine, MediaError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Media flows from the engine to the client.
    Player,
    /// Media flows from the client into the engine.
    Recorder,
    /// Client-provided RTP elements exposed over HTTP.
    Rtp,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Player => "player",
            SessionKind::Recorder => "recorder",
            SessionKind::Rtp => "rtp",
        }
    }

    /// Element kind built from a content path, if this variant supports one.
    pub fn processing_kind(&self) -> Option<ElementKind> {
        match self {
            SessionKind::Player => Some(ElementKind::Player),
            SessionKind::Recorder => Some(ElementKind::Recorder),
            SessionKind::Rtp => None,
        }
    }

    pub fn direction(&self) -> FlowDirection {
        match self {
            SessionKind::Player | SessionKind::Rtp => FlowDirection::ToClient,
            SessionKind::Recorder => FlowDirection::FromClient,
        }
    }

    pub async fn build_processing_endpoint(
        &self,
        engine: &dyn MediaEngine,
        content_path: &str,
    ) -> Result<Arc<dyn MediaElement>, ContentError> {
        let kind = self.processing_kind().ok_or_else(|| {
            MediaError::new(
                CODE_MEDIA_FAILURE,
                format!("{self} sessions cannot be built from a content path"),
            )
        })?;
        Ok(engine.build_processing_endpoint(kind, content_path).await?)
    }

    pub async fn build_and_connect_delivery_endpoint(
        &self,
        engine: &dyn MediaEngine,
        elements: &[Arc<dyn MediaElement>],
    ) -> Result<Arc<dyn DeliveryEndpoint>, ContentError> {
        Ok(engine
            .build_and_connect_delivery_endpoint(self.direction(), elements)
            .await?)
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_map_to_elements_and_directions() {
        assert_eq!(SessionKind::Player.processing_kind(), Some(ElementKind::Player));
        assert_eq!(SessionKind::Recorder.processing_kind(), Some(ElementKind::Recorder));
        assert_eq!(SessionKind::Rtp.processing_kind(), None);
        assert_eq!(SessionKind::Recorder.direction(), FlowDirection::FromClient);
        assert_eq!(SessionKind::Player.direction(), FlowDirection::ToClient);
    }

    #[test]
    fn deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            kind: SessionKind,
        }
        let w: Wrapper = toml::from_str(r#"kind = "recorder""#).unwrap();
        assert_eq!(w.kind, SessionKind::Recorder);
    }
}

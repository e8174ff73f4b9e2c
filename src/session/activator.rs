//! Two-phase construction of a session's delivery endpoint.
//!
//! # Steps
//! 1. Validate the activation input (content path xor elements)
//! 2. HANDLING → STARTING under the session lock
//! 3. Build the processing element from the content path (engine call, unlocked)
//! 4. Build and connect the delivery endpoint (engine call, unlocked)
//! 5. Resolve under the session lock: answer the client, or tear down silently
//!    if the session was terminated while steps 3-4 were pending

use std::sync::{Arc, Weak};
use std::time::Instant;

use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::ContentError;
use crate::media::{MediaElement, MediaEngine, MediaEvent};
use crate::observability::metrics;
use crate::session::{ContentSession, MediaObjects, Resolution, CODE_MEDIA_SESSION_TERMINATED};

/// What to build the delivery endpoint from.
#[derive(Debug, Clone)]
pub enum ActivationInput {
    /// The engine builds the processing element itself.
    ContentPath(String),
    /// Elements already built by the caller. Never empty.
    Elements(Vec<Arc<dyn MediaElement>>),
}

impl ActivationInput {
    /// Exactly one of `content_path` and `elements` must be supplied.
    pub fn new(
        content_path: Option<String>,
        elements: Vec<Arc<dyn MediaElement>>,
    ) -> Result<Self, ContentError> {
        match (content_path, elements.is_empty()) {
            (Some(_), false) => Err(ContentError::ConflictingActivationInput),
            (None, true) => Err(ContentError::MissingActivationInput),
            (Some(path), true) => Ok(ActivationInput::ContentPath(path)),
            (None, false) => Ok(ActivationInput::Elements(elements)),
        }
    }
}

/// Drives activation against the media engine.
#[derive(Clone)]
pub struct EndpointActivator {
    engine: Arc<dyn MediaEngine>,
}

impl EndpointActivator {
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self { engine }
    }

    /// Activate media for `session`. May be called once per session.
    ///
    /// Contract violations are returned as errors. Engine failures tear the
    /// session down and are returned as well, for the owner's diagnostics.
    pub async fn activate(
        &self,
        session: &Arc<ContentSession>,
        content_path: Option<String>,
        elements: Vec<Arc<dyn MediaElement>>,
    ) -> Result<(), ContentError> {
        let input = ActivationInput::new(content_path, elements)?;
        self.activate_input(session, input).await
    }

    pub async fn activate_input(
        &self,
        session: &Arc<ContentSession>,
        input: ActivationInput,
    ) -> Result<(), ContentError> {
        if let Err(e) = session.try_begin_activation() {
            if session.state().is_terminal() {
                tracing::debug!(session_id = %session.id(), "Activation after termination ignored");
                return Ok(());
            }
            tracing::error!(session_id = %session.id(), error = %e, "Content session lifecycle violated");
            return Err(e);
        }

        let started = Instant::now();
        let kind = session.kind();
        let (elements, processing) = match input {
            ActivationInput::ContentPath(path) => {
                tracing::info!(session_id = %session.id(), %kind, content_path = %path, "Activating media");
                match kind.build_processing_endpoint(self.engine.as_ref(), &path).await {
                    Ok(element) => (vec![Arc::clone(&element)], Some(element)),
                    Err(e) => return Self::abort(session, e).await,
                }
            }
            ActivationInput::Elements(elements) => {
                tracing::info!(session_id = %session.id(), %kind, elements = elements.len(), "Activating media");
                (elements, None)
            }
        };

        let delivery = match kind
            .build_and_connect_delivery_endpoint(self.engine.as_ref(), &elements)
            .await
        {
            Ok(delivery) => delivery,
            Err(e) => {
                if let Some(processing) = processing {
                    if let Err(release) = processing.release().await {
                        tracing::warn!(session_id = %session.id(), error = %release, "Failed to release processing endpoint");
                    }
                }
                return Self::abort(session, e).await;
            }
        };

        let mut media = Some(MediaObjects {
            processing: processing.clone(),
            delivery: Arc::clone(&delivery),
        });
        if session.resolve_after_activation(&mut media)? == Resolution::AlreadyTerminated {
            tracing::info!(session_id = %session.id(), "Session terminated while building media, tearing down");
            session.destroy().await;
            if let Some(media) = media {
                media.release(session.id()).await;
            }
            return Ok(());
        }

        let url = match delivery.url().await {
            Ok(Some(url)) if !url.is_empty() => url,
            Ok(_) => return Self::fail(session, ContentError::EmptyDeliveryUrl).await,
            Err(e) => return Self::fail(session, e.into()).await,
        };
        tracing::info!(session_id = %session.id(), url = %url, "Delivery endpoint ready");

        spawn_event_listener(
            Arc::clone(session),
            delivery.subscribe(),
            processing.as_ref().map(Arc::downgrade),
        );

        if let Err(e) = session.responder().answer_activation(session, &url) {
            return Self::fail(session, e).await;
        }
        metrics::record_activation(kind.as_str(), started);
        Ok(())
    }

    /// Construction failed before the session could answer: silent teardown.
    async fn abort(session: &ContentSession, err: ContentError) -> Result<(), ContentError> {
        tracing::warn!(session_id = %session.id(), error = %err, "Failed to build media");
        session.terminate(err.code(), &err.to_string()).await;
        Err(err)
    }

    /// Failure after the session went ACTIVE: terminate with error notification.
    async fn fail(session: &ContentSession, err: ContentError) -> Result<(), ContentError> {
        tracing::error!(session_id = %session.id(), error = %err, "Activation failed");
        session.terminate_with_error(err.code(), &err.to_string()).await;
        Err(err)
    }
}

/// Translate engine events into session calls until the session closes.
fn spawn_event_listener(
    session: Arc<ContentSession>,
    mut events: broadcast::Receiver<MediaEvent>,
    processing: Option<Weak<dyn MediaElement>>,
) {
    let closed = session.closed_token();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = closed.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(MediaEvent::Error { code, description }) => {
                    tracing::error!(session_id = %session.id(), code, %description, "Media pipeline error");
                    session.terminate_with_error(code, &description).await;
                }
                Ok(MediaEvent::SessionStarted) => {
                    session.notify_content_started();
                    let element = processing.as_ref().and_then(Weak::upgrade);
                    if let Some(element) = element {
                        if let Some(action) = element.kind().start_action() {
                            if let Err(e) = element.start(action).await {
                                tracing::warn!(session_id = %session.id(), ?action, error = %e, "Start action failed");
                            }
                        }
                    }
                }
                Ok(MediaEvent::SessionTerminated) => {
                    tracing::info!(session_id = %session.id(), "Media session terminated by engine");
                    session
                        .terminate(CODE_MEDIA_SESSION_TERMINATED, "media session terminated")
                        .await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(session_id = %session.id(), skipped, "Media events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

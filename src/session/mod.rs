//! Content session lifecycle.
//!
//! # Data Flow
//! ```text
//! SessionManager::create_session        (HANDLING)
//!     → EndpointActivator::activate     (STARTING, engine calls outside the lock)
//!     → resolve_after_activation        (ACTIVE, or silent teardown)
//!     → ProtocolResponder answers once  (redirect / tunnel / JSON-RPC)
//!
//! engine events ─┐
//! tunnel done   ─┼─▶ terminate*  ─▶ TERMINATED + destroy (exactly once)
//! client/owner  ─┘
//! ```
//!
//! # Design Decisions
//! - One `std::sync::Mutex` per session; it guards owned memory only and is
//!   never held across an `.await`
//! - Termination is first-caller-wins; the winner runs teardown and notifies
//!   the observer, every other call is a no-op
//! - The pending tunnel handle is taken under the lock before cancelling

pub mod activator;
pub mod kind;
pub mod manager;
pub mod state;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ContentError;
use crate::media::{DeliveryEndpoint, MediaElement};
use crate::protocol::{InitialContext, ProtocolResponder};
use crate::proxy::{TunnelHandle, TunnelOutcome};

pub use activator::{ActivationInput, EndpointActivator};
pub use kind::SessionKind;
pub use manager::{SessionManager, SessionObserver};
pub use state::{Resolution, SessionState};

/// Code reported when the engine ends a media session normally.
pub const CODE_MEDIA_SESSION_TERMINATED: i32 = 1;

/// Opaque, immutable session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How answers reach the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    JsonRpc,
    PlainHttp,
}

/// How a plain-HTTP client reaches the delivery URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Redirect,
    Tunnel,
}

/// Engine objects a session built and must release on teardown.
#[derive(Debug)]
pub struct MediaObjects {
    /// Only set when the session built it from a content path.
    pub processing: Option<Arc<dyn MediaElement>>,
    pub delivery: Arc<dyn DeliveryEndpoint>,
}

impl MediaObjects {
    pub async fn release(self, session_id: &SessionId) {
        if let Err(e) = self.delivery.release().await {
            tracing::warn!(%session_id, endpoint_id = %self.delivery.id(), error = %e, "Failed to release delivery endpoint");
        }
        if let Some(processing) = self.processing {
            if let Err(e) = processing.release().await {
                tracing::warn!(%session_id, element_id = %processing.id(), error = %e, "Failed to release processing endpoint");
            }
        }
    }
}

#[derive(Debug)]
struct SessionInner {
    machine: state::StateMachine,
    initial: Option<InitialContext>,
    tunnel: Option<TunnelHandle>,
    media: Option<MediaObjects>,
}

enum TerminationAnswer {
    Silent,
    Reject,
    Error,
}

/// One client request's end-to-end lifecycle.
pub struct ContentSession {
    id: SessionId,
    kind: SessionKind,
    control_mode: ControlMode,
    delivery_mode: DeliveryMode,
    inner: Mutex<SessionInner>,
    closed: CancellationToken,
    observer: Arc<dyn SessionObserver>,
    responder: Arc<ProtocolResponder>,
}

impl fmt::Debug for ContentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentSession")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("control_mode", &self.control_mode)
            .field("delivery_mode", &self.delivery_mode)
            .field("state", &self.state())
            .finish()
    }
}

impl ContentSession {
    /// Create a session in HANDLING. The control mode follows the initial context.
    pub fn new(
        id: SessionId,
        kind: SessionKind,
        delivery_mode: DeliveryMode,
        initial: InitialContext,
        observer: Arc<dyn SessionObserver>,
        responder: Arc<ProtocolResponder>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind,
            control_mode: initial.control_mode(),
            delivery_mode,
            inner: Mutex::new(SessionInner {
                machine: state::StateMachine::new(),
                initial: Some(initial),
                tunnel: None,
                media: None,
            }),
            closed: CancellationToken::new(),
            observer,
            responder,
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn control_mode(&self) -> ControlMode {
        self.control_mode
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.delivery_mode
    }

    pub fn state(&self) -> SessionState {
        self.lock().machine.state()
    }

    /// True while a tunnel is relaying for this session.
    pub fn has_pending_tunnel(&self) -> bool {
        self.lock().tunnel.is_some()
    }

    /// True until the session answered (or dropped) its initial request.
    pub fn is_awaiting_answer(&self) -> bool {
        self.lock().initial.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        // State transitions are single assignments, so a poisoned lock still
        // holds a consistent state.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn responder(&self) -> &ProtocolResponder {
        &self.responder
    }

    /// Cancelled once teardown started; event listeners stop on it.
    pub(crate) fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub(crate) fn try_begin_activation(&self) -> Result<(), ContentError> {
        self.lock().machine.try_begin_activation()
    }

    /// Resolve after backend construction. On `Proceed` the session takes
    /// ownership of `media`; on `AlreadyTerminated` it stays with the caller.
    pub(crate) fn resolve_after_activation(
        &self,
        media: &mut Option<MediaObjects>,
    ) -> Result<Resolution, ContentError> {
        let mut inner = self.lock();
        let resolution = inner.machine.resolve_after_activation()?;
        if resolution == Resolution::Proceed {
            inner.media = media.take();
        }
        Ok(resolution)
    }

    /// Release the initial request to the caller, who must answer it.
    pub(crate) fn take_initial_context(&self) -> Option<InitialContext> {
        self.lock().initial.take()
    }

    /// Remember the tunnel so teardown can cancel it. A session that was
    /// terminated meanwhile cancels it right away.
    pub(crate) fn attach_tunnel(&self, handle: TunnelHandle) {
        let rejected = {
            let mut inner = self.lock();
            if inner.machine.state().is_terminal() {
                Some(handle)
            } else {
                inner.tunnel = Some(handle);
                None
            }
        };
        if let Some(handle) = rejected {
            tracing::debug!(session_id = %self.id, "Session ended before tunnel was attached");
            handle.cancel();
        }
    }

    pub(crate) async fn on_tunnel_done(&self, outcome: TunnelOutcome) {
        self.lock().tunnel = None;
        match outcome {
            Ok(()) => {
                self.terminate(0, "").await;
            }
            Err(e) => {
                self.terminate(e.code(), &e.to_string()).await;
            }
        }
    }

    pub(crate) fn notify_content_started(&self) {
        tracing::info!(session_id = %self.id, "Content started");
        self.observer.content_started(self);
    }

    /// Normal termination. Never answers the initial request.
    pub async fn terminate(&self, code: i32, message: &str) -> bool {
        self.finish(code, message, TerminationAnswer::Silent).await
    }

    /// Fatal termination. Answers the initial request with an error if it
    /// is still held.
    pub async fn terminate_with_error(&self, code: i32, description: &str) -> bool {
        self.finish(code, description, TerminationAnswer::Error).await
    }

    /// Refuse the request. Answers the initial request with a rejection if
    /// it is still held.
    pub async fn reject(&self, code: i32, description: &str) -> bool {
        self.finish(code, description, TerminationAnswer::Reject).await
    }

    async fn finish(&self, code: i32, message: &str, answer: TerminationAnswer) -> bool {
        let (performed, initial) = {
            let mut inner = self.lock();
            let performed = inner.machine.terminate();
            let initial = if performed { inner.initial.take() } else { None };
            (performed, initial)
        };
        if !performed {
            tracing::trace!(session_id = %self.id, code, "Session already terminated");
            return false;
        }
        tracing::info!(session_id = %self.id, code, message, "Terminating content session");

        if let Some(context) = initial {
            match answer {
                TerminationAnswer::Silent => drop(context),
                TerminationAnswer::Reject => self.responder.send_reject(context, code, message),
                TerminationAnswer::Error => {
                    self.responder.send_error_answer(context, code, message)
                }
            }
        }

        self.destroy().await;
        self.observer.terminated(self, code, message);
        true
    }

    /// Release everything the session owns. Safe to call any number of times.
    pub(crate) async fn destroy(&self) {
        self.closed.cancel();
        let (tunnel, media, initial) = {
            let mut inner = self.lock();
            (inner.tunnel.take(), inner.media.take(), inner.initial.take())
        };
        drop(initial);
        if let Some(tunnel) = tunnel {
            if tunnel.cancel() {
                tracing::debug!(session_id = %self.id, "Cancelled pending tunnel");
            }
        }
        if let Some(media) = media {
            media.release(&self.id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HttpExchange;
    use crate::proxy::StreamingProxy;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingObserver {
        terminated: AtomicUsize,
    }

    impl SessionObserver for CountingObserver {
        fn content_started(&self, _session: &ContentSession) {}

        fn terminated(&self, _session: &ContentSession, _code: i32, _message: &str) {
            self.terminated.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn session(
        observer: Arc<CountingObserver>,
    ) -> (Arc<ContentSession>, crate::protocol::ExchangeReply) {
        let (exchange, reply) =
            HttpExchange::new(Request::builder().uri("/p/x").body(Body::empty()).unwrap());
        let responder = Arc::new(ProtocolResponder::new(StreamingProxy::new(Duration::from_secs(1))));
        let session = ContentSession::new(
            SessionId::from("s-1"),
            SessionKind::Player,
            DeliveryMode::Redirect,
            InitialContext::Http(exchange),
            observer,
            responder,
        );
        (session, reply)
    }

    #[tokio::test]
    async fn starts_in_handling_with_plain_http() {
        let (session, _reply) = session(Arc::default());
        assert_eq!(session.state(), SessionState::Handling);
        assert_eq!(session.control_mode(), ControlMode::PlainHttp);
        assert!(session.is_awaiting_answer());
        assert_eq!(session.id().as_str(), "s-1");
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let observer = Arc::new(CountingObserver::default());
        let (session, reply) = session(observer.clone());

        assert!(session.terminate(0, "client terminated").await);
        assert!(!session.terminate(0, "again").await);
        assert!(!session.terminate_with_error(5001, "late").await);
        assert_eq!(observer.terminated.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), SessionState::Terminated);
        // Silent termination drops the exchange without answering.
        assert!(reply.await.is_err());
    }

    #[tokio::test]
    async fn reject_answers_initial_request() {
        let (session, reply) = session(Arc::default());
        assert!(session.reject(404, "no such content").await);

        let response = reply.await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!session.is_awaiting_answer());
    }

    #[tokio::test]
    async fn lifecycle_calls_after_terminate_are_noops() {
        let (session, _reply) = session(Arc::default());
        session.terminate(0, "").await;

        assert!(!session.reject(500, "late").await);
        assert!(!session.terminate_with_error(500, "late").await);
        session.destroy().await;
        assert_eq!(session.state(), SessionState::Terminated);
    }
}

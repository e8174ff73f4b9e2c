//! Session registry and owner-side hooks.
//!
//! # Responsibilities
//! - Create sessions with their collaborators wired in
//! - Track live sessions by id for control requests
//! - Receive content-started / terminated notifications
//! - Drain every session on shutdown

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::ContentError;
use crate::media::{MediaElement, MediaEngine};
use crate::observability::metrics;
use crate::protocol::{InitialContext, ProtocolResponder};
use crate::proxy::StreamingProxy;
use crate::session::{
    ContentSession, DeliveryMode, EndpointActivator, SessionId, SessionKind, SessionState,
};

/// Code used to reject requests still unanswered at shutdown.
pub const CODE_SHUTTING_DOWN: i32 = 503;

/// Hooks a session calls back into its owner.
pub trait SessionObserver: Send + Sync {
    /// Media started flowing.
    fn content_started(&self, session: &ContentSession);

    /// The session reached TERMINATED. Called exactly once per session.
    fn terminated(&self, session: &ContentSession, code: i32, message: &str);
}

/// Live sessions, keyed by id. Also the observer every session reports to.
struct Registry {
    sessions: DashMap<SessionId, Arc<ContentSession>>,
    downstream: Option<Arc<dyn SessionObserver>>,
}

impl SessionObserver for Registry {
    fn content_started(&self, session: &ContentSession) {
        if let Some(observer) = &self.downstream {
            observer.content_started(session);
        }
    }

    fn terminated(&self, session: &ContentSession, code: i32, message: &str) {
        if self.sessions.remove(session.id()).is_some() {
            metrics::record_session_terminated(session.kind().as_str(), code);
        }
        tracing::debug!(session_id = %session.id(), code, message, live = self.sessions.len(), "Session unregistered");
        if let Some(observer) = &self.downstream {
            observer.terminated(session, code, message);
        }
    }
}

/// Owns every content session of the gateway.
pub struct SessionManager {
    registry: Arc<Registry>,
    activator: EndpointActivator,
    responder: Arc<ProtocolResponder>,
}

impl SessionManager {
    pub fn new(engine: Arc<dyn MediaEngine>, proxy: StreamingProxy) -> Self {
        Self::with_observer(engine, proxy, None)
    }

    /// Like [`SessionManager::new`], forwarding session hooks to `observer`.
    pub fn with_observer(
        engine: Arc<dyn MediaEngine>,
        proxy: StreamingProxy,
        observer: Option<Arc<dyn SessionObserver>>,
    ) -> Self {
        Self {
            registry: Arc::new(Registry {
                sessions: DashMap::new(),
                downstream: observer,
            }),
            activator: EndpointActivator::new(engine),
            responder: Arc::new(ProtocolResponder::new(proxy)),
        }
    }

    /// Create and register a session in HANDLING.
    pub fn create_session(
        &self,
        kind: SessionKind,
        delivery_mode: DeliveryMode,
        initial: InitialContext,
    ) -> Arc<ContentSession> {
        self.create_session_with_id(SessionId::new(), kind, delivery_mode, initial)
    }

    pub fn create_session_with_id(
        &self,
        id: SessionId,
        kind: SessionKind,
        delivery_mode: DeliveryMode,
        initial: InitialContext,
    ) -> Arc<ContentSession> {
        let observer: Arc<dyn SessionObserver> = self.registry.clone();
        let session = ContentSession::new(
            id,
            kind,
            delivery_mode,
            initial,
            observer,
            Arc::clone(&self.responder),
        );
        self.registry
            .sessions
            .insert(session.id().clone(), Arc::clone(&session));
        metrics::record_session_created(kind.as_str());
        tracing::debug!(
            session_id = %session.id(),
            %kind,
            control_mode = ?session.control_mode(),
            delivery_mode = ?delivery_mode,
            "Content session created"
        );
        session
    }

    /// Activate `session` in place.
    pub async fn activate(
        &self,
        session: &Arc<ContentSession>,
        content_path: Option<String>,
        elements: Vec<Arc<dyn MediaElement>>,
    ) -> Result<(), ContentError> {
        self.activator.activate(session, content_path, elements).await
    }

    /// Activate `session` from a content path on a background task.
    pub fn spawn_activation(&self, session: Arc<ContentSession>, content_path: String) {
        let activator = self.activator.clone();
        tokio::spawn(async move {
            if let Err(e) = activator.activate(&session, Some(content_path), Vec::new()).await {
                if e.is_contract_violation() {
                    tracing::error!(session_id = %session.id(), code = e.code(), error = %e, "Activation contract violated");
                } else {
                    tracing::warn!(session_id = %session.id(), code = e.code(), error = %e, "Activation failed");
                }
            }
        });
    }

    pub fn get(&self, id: &str) -> Option<Arc<ContentSession>> {
        self.registry
            .sessions
            .get(&SessionId::from(id))
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.registry.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.sessions.is_empty()
    }

    /// Client-initiated termination.
    pub async fn terminate(&self, id: &str, code: i32, message: &str) -> Result<bool, ContentError> {
        let session = self
            .get(id)
            .ok_or_else(|| ContentError::UnknownSession(id.to_string()))?;
        Ok(session.terminate(code, message).await)
    }

    /// Reject unanswered sessions and terminate the rest.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self
            .registry
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        tracing::info!(sessions = sessions.len(), "Draining content sessions");

        for session in sessions {
            if session.state() == SessionState::Terminated {
                continue;
            }
            if session.is_awaiting_answer() {
                session.reject(CODE_SHUTTING_DOWN, "gateway shutting down").await;
            } else {
                session.terminate(0, "gateway shutting down").await;
            }
        }
    }
}

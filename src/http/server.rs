//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create Axum Router with the content handler
//! - Wire up middleware (request ID, tracing)
//! - Turn requests into content sessions and wait for their answers
//! - Serve JSON-RPC control requests
//! - Drain sessions on graceful shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use url::Url;

use crate::config::GatewayConfig;
use crate::error::CODE_BAD_REQUEST;
use crate::lifecycle::signals::shutdown_signal;
use crate::media::OriginEngine;
use crate::protocol::{
    ControlMethod, ExchangeReply, HttpExchange, InitialContext, JsonRpcRequest, JsonRpcResponse,
};
use crate::proxy::StreamingProxy;
use crate::routing::{ContentRoute, ContentRouter};
use crate::session::{ContentSession, SessionManager};

/// Upper bound for JSON-RPC request bodies.
const MAX_CONTROL_BODY: usize = 64 * 1024;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub routes: Arc<ContentRouter>,
}

/// HTTP front end of the content gateway.
pub struct HttpServer {
    router: Router,
    manager: Arc<SessionManager>,
}

impl HttpServer {
    /// Create a server that hands sessions to `manager`.
    pub fn new(config: &GatewayConfig, manager: Arc<SessionManager>) -> Self {
        let state = AppState {
            manager: Arc::clone(&manager),
            routes: Arc::new(ContentRouter::new(&config.handlers)),
        };
        for route in state.routes.routes() {
            tracing::info!(
                handler = %route.name,
                prefix = %route.prefix(),
                kind = %route.kind,
                delivery_mode = ?route.delivery_mode(),
                control_protocol = route.use_control_protocol,
                "Content handler mounted"
            );
        }
        Self {
            router: Self::build_router(state),
            manager,
        }
    }

    /// Create a server backed by the HTTP origin engine from `config`.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, url::ParseError> {
        let origin = Url::parse(&config.media.origin_url)?;
        let engine = Arc::new(OriginEngine::new(origin));
        let proxy = StreamingProxy::new(Duration::from_secs(config.media.connect_timeout_secs));
        Ok(Self::new(config, Arc::new(SessionManager::new(engine, proxy))))
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(content_handler))
            .route("/", any(content_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Run the server until Ctrl+C/SIGTERM or a message on `shutdown`.
    ///
    /// Live sessions are drained before in-flight connections are awaited.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let manager = self.manager;
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = shutdown_signal() => {}
                    _ = shutdown.recv() => {}
                }
                tracing::info!("Shutdown signal received");
                manager.shutdown().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Entry point for every request.
async fn content_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let path = request.uri().path().to_string();

    let Some((route, content_id)) = state.routes.resolve(&path) else {
        tracing::warn!(request_id = %request_id, path = %path, "No content handler matched");
        return (StatusCode::NOT_FOUND, "No matching content handler").into_response();
    };
    let route = route.clone();
    let content_id = content_id.to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %request.method(),
        path = %path,
        handler = %route.name,
        "Content request"
    );

    if route.use_control_protocol {
        control_request(&state, &route, &content_id, request).await
    } else {
        plain_request(&state, &route, &content_id, request).await
    }
}

/// Plain HTTP: the request itself starts the session.
async fn plain_request(
    state: &AppState,
    route: &ContentRoute,
    content_id: &str,
    request: Request<Body>,
) -> Response {
    let content_path = match route.content_path(content_id) {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!(handler = %route.name, content_id, error = %e, "Rejected content id");
            return (StatusCode::NOT_FOUND, "Unknown content").into_response();
        }
    };
    let (exchange, reply) = HttpExchange::new(request);
    let session = state.manager.create_session(
        route.kind,
        route.delivery_mode(),
        InitialContext::Http(exchange),
    );
    state
        .manager
        .spawn_activation(Arc::clone(&session), content_path);
    await_answer(session, reply).await
}

/// JSON-RPC control request.
async fn control_request(
    state: &AppState,
    route: &ContentRoute,
    content_id: &str,
    request: Request<Body>,
) -> Response {
    if request.method() != Method::POST {
        return (StatusCode::METHOD_NOT_ALLOWED, "Control requests must be POST").into_response();
    }

    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_CONTROL_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return Json(JsonRpcResponse::bad_request(format!("unreadable body: {e}"))).into_response()
        }
    };
    let rpc: JsonRpcRequest = match serde_json::from_slice(&bytes) {
        Ok(rpc) => rpc,
        Err(e) => {
            tracing::debug!(error = %e, "Malformed control request");
            return Json(JsonRpcResponse::bad_request(format!("malformed request: {e}")))
                .into_response();
        }
    };

    match rpc.method() {
        Some(ControlMethod::Start) => {
            let content_id = rpc
                .params
                .content_id
                .clone()
                .filter(|id| !id.is_empty())
                .or_else(|| (!content_id.is_empty()).then(|| content_id.to_string()));
            let content_path = match route.content_path(content_id.as_deref().unwrap_or_default()) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(handler = %route.name, ?content_id, error = %e, "Rejected content id");
                    return Json(JsonRpcResponse::error(e.code(), e.to_string(), rpc.id))
                        .into_response();
                }
            };

            let (exchange, reply) =
                HttpExchange::new(Request::from_parts(parts, Body::from(bytes)));
            let session = state.manager.create_session(
                route.kind,
                route.delivery_mode(),
                InitialContext::JsonRpc {
                    exchange,
                    request_id: rpc.id,
                },
            );
            state
                .manager
                .spawn_activation(Arc::clone(&session), content_path);
            await_answer(session, reply).await
        }
        Some(ControlMethod::Terminate) => {
            let Some(session_id) = rpc.params.session_id.as_deref() else {
                return Json(JsonRpcResponse::error(CODE_BAD_REQUEST, "missing sessionId", rpc.id))
                    .into_response();
            };
            let (code, message) = rpc
                .params
                .reason
                .as_ref()
                .map(|r| (r.code, r.message.as_str()))
                .unwrap_or((0, "client terminated"));

            let answer = match state.manager.terminate(session_id, code, message).await {
                Ok(_) => JsonRpcResponse::terminated(session_id, rpc.id),
                Err(e) => JsonRpcResponse::error(e.code(), e.to_string(), rpc.id),
            };
            Json(answer).into_response()
        }
        None => Json(JsonRpcResponse::error(
            CODE_BAD_REQUEST,
            format!("unknown method {:?}", rpc.method),
            rpc.id,
        ))
        .into_response(),
    }
}

/// Wait for the session to answer the exchange.
///
/// If the client goes away first, the handler future is dropped and the
/// guard terminates the session.
async fn await_answer(session: Arc<ContentSession>, reply: ExchangeReply) -> Response {
    let mut guard = AbandonGuard(Some(Arc::clone(&session)));
    let answer = reply.await;
    guard.disarm();

    match answer {
        Ok(response) => response,
        Err(_) => {
            tracing::debug!(session_id = %session.id(), state = %session.state(), "Session closed without answer");
            (StatusCode::SERVICE_UNAVAILABLE, "Content session closed").into_response()
        }
    }
}

/// Terminates the session if dropped while still armed.
struct AbandonGuard(Option<Arc<ContentSession>>);

impl AbandonGuard {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        let Some(session) = self.0.take() else {
            return;
        };
        if session.state().is_terminal() {
            return;
        }
        tracing::info!(session_id = %session.id(), "Client disconnected before answer");
        tokio::spawn(async move {
            session.terminate(0, "client disconnected").await;
        });
    }
}

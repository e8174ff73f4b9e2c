//! Client-visible answers for content sessions.
//!
//! # Answer Kinds
//! ```text
//! PLAIN_HTTP + REDIRECT  → 307, Location: <url>, exchange completed
//! PLAIN_HTTP + TUNNEL    → streaming proxy owns the exchange until it ends
//! JSON_RPC               → {"id", "result": {"url", "sessionId"}}
//! reject / error         → JSON-RPC error object, or mapped HTTP status
//! ```
//!
//! The initial context is taken out of the session before answering, so a
//! session can answer at most once.

use std::sync::Arc;

use axum::http::HeaderValue;
use serde_json::Value;
use url::Url;

use crate::error::{http_status_for_code, ContentError, CODE_ANSWER_FAILED};
use crate::observability::metrics;
use crate::protocol::exchange::HttpExchange;
use crate::protocol::jsonrpc::JsonRpcResponse;
use crate::proxy::StreamingProxy;
use crate::session::{ContentSession, ControlMode, DeliveryMode};

/// The request a session was created for, kept until it is answered.
#[derive(Debug)]
pub enum InitialContext {
    /// Plain HTTP content request.
    Http(HttpExchange),
    /// JSON-RPC `start` request; the answer echoes `request_id`.
    JsonRpc {
        exchange: HttpExchange,
        request_id: Value,
    },
}

impl InitialContext {
    pub fn control_mode(&self) -> ControlMode {
        match self {
            InitialContext::Http(_) => ControlMode::PlainHttp,
            InitialContext::JsonRpc { .. } => ControlMode::JsonRpc,
        }
    }
}

/// What a plain HTTP answer needs from the delivery URL.
enum Delivery {
    /// JSON-RPC answers carry the URL as is.
    Url,
    Redirect(HeaderValue),
    Tunnel(Url),
}

impl Delivery {
    fn prepare(session: &ContentSession, url: &str) -> Result<Self, ContentError> {
        let invalid = |reason: String| ContentError::InvalidDeliveryUrl {
            url: url.to_string(),
            reason,
        };
        match (session.control_mode(), session.delivery_mode()) {
            (ControlMode::JsonRpc, _) => Ok(Delivery::Url),
            (ControlMode::PlainHttp, DeliveryMode::Redirect) => HeaderValue::from_str(url)
                .map(Delivery::Redirect)
                .map_err(|e| invalid(e.to_string())),
            (ControlMode::PlainHttp, DeliveryMode::Tunnel) => Url::parse(url)
                .map(Delivery::Tunnel)
                .map_err(|e| invalid(e.to_string())),
        }
    }
}

/// Turns activation results and failures into answers.
#[derive(Debug, Clone)]
pub struct ProtocolResponder {
    proxy: StreamingProxy,
}

impl ProtocolResponder {
    pub fn new(proxy: StreamingProxy) -> Self {
        Self { proxy }
    }

    /// Answer a successfully activated session with its delivery URL.
    ///
    /// The URL is checked while the session still holds its initial request,
    /// so a bad URL can still be answered as an error.
    pub fn answer_activation(
        &self,
        session: &Arc<ContentSession>,
        url: &str,
    ) -> Result<(), ContentError> {
        let delivery = Delivery::prepare(session, url)?;
        let Some(context) = session.take_initial_context() else {
            tracing::warn!(session_id = %session.id(), "Initial request already released, no answer sent");
            return Ok(());
        };

        match (context, delivery) {
            (
                InitialContext::JsonRpc {
                    exchange,
                    request_id,
                },
                _,
            ) => {
                let answer = JsonRpcResponse::start_url(url, session.id().as_str(), request_id);
                if !exchange.send_json(&answer)? {
                    tracing::debug!(session_id = %session.id(), "Client left before JSON-RPC answer");
                }
                metrics::record_answer("jsonrpc");
            }
            (InitialContext::Http(exchange), Delivery::Redirect(location)) => {
                tracing::info!(session_id = %session.id(), url, "Sending redirect");
                if !exchange.send_redirect(location) {
                    tracing::debug!(session_id = %session.id(), "Client left before redirect");
                }
                metrics::record_answer("redirect");
            }
            (InitialContext::Http(exchange), Delivery::Tunnel(target)) => {
                tracing::info!(
                    session_id = %session.id(),
                    method = %exchange.request().method(),
                    url,
                    "Activating tunneling proxy"
                );
                let owner = Arc::clone(session);
                let handle = self.proxy.start_tunnel(exchange, target, move |outcome| async move {
                    owner.on_tunnel_done(outcome).await;
                });
                session.attach_tunnel(handle);
                metrics::record_answer("tunnel");
            }
            (InitialContext::Http(exchange), Delivery::Url) => {
                // Control mode is fixed by the initial context at creation.
                tracing::error!(session_id = %session.id(), "Plain request in a JSON-RPC session");
                exchange.send_error(http_status_for_code(CODE_ANSWER_FAILED), "unexpected control mode");
                return Err(ContentError::Answer("control mode mismatch".into()));
            }
        }
        Ok(())
    }

    /// Refuse the request, e.g. because the session was rejected by its owner.
    pub fn send_reject(&self, context: InitialContext, code: i32, description: &str) {
        tracing::info!(code, description, "Rejecting content request");
        self.send_failure(context, code, description);
    }

    /// Report an internal or engine failure on the initial request.
    pub fn send_error_answer(&self, context: InitialContext, code: i32, description: &str) {
        tracing::warn!(code, description, "Answering content request with error");
        self.send_failure(context, code, description);
    }

    fn send_failure(&self, context: InitialContext, code: i32, description: &str) {
        let delivered = match context {
            InitialContext::JsonRpc {
                exchange,
                request_id,
            } => {
                let answer = JsonRpcResponse::error(code, description, request_id);
                match exchange.send_json(&answer) {
                    Ok(delivered) => delivered,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize JSON-RPC error");
                        false
                    }
                }
            }
            InitialContext::Http(exchange) => {
                exchange.send_error(http_status_for_code(code), description)
            }
        };
        if !delivered {
            tracing::debug!(code, "Client left before error answer");
        }
        metrics::record_answer("error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use std::time::Duration;

    fn responder() -> ProtocolResponder {
        ProtocolResponder::new(StreamingProxy::new(Duration::from_secs(1)))
    }

    fn exchange() -> (HttpExchange, crate::protocol::exchange::ExchangeReply) {
        HttpExchange::new(Request::builder().uri("/c/x").body(Body::empty()).unwrap())
    }

    #[tokio::test]
    async fn jsonrpc_error_carries_code() {
        let (exchange, reply) = exchange();
        let context = InitialContext::JsonRpc {
            exchange,
            request_id: json!("42"),
        };
        responder().send_error_answer(context, 20012, "empty url");

        let response = reply.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value,
            json!({"id": "42", "error": {"code": 20012, "message": "empty url"}})
        );
    }

    #[tokio::test]
    async fn http_reject_maps_code_to_status() {
        let (exchange, reply) = exchange();
        responder().send_reject(InitialContext::Http(exchange), 403, "forbidden content");

        let response = reply.await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"forbidden content");
    }

    #[test]
    fn control_mode_follows_context() {
        let (exchange, _reply) = exchange();
        assert_eq!(
            InitialContext::Http(exchange).control_mode(),
            ControlMode::PlainHttp
        );
    }
}

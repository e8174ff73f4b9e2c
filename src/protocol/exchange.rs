//! The client exchange a session answers on.
//!
//! An [`HttpExchange`] pairs the original request with a one-shot reply slot.
//! The HTTP handler keeps the receiving end and turns whatever arrives into
//! its response; if the exchange is dropped unanswered the handler sees the
//! slot close instead.

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, StatusCode};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::ContentError;

/// Receiving end of an exchange, held by the transport.
pub type ExchangeReply = oneshot::Receiver<Response<Body>>;

/// Original request plus the right to answer it once.
#[derive(Debug)]
pub struct HttpExchange {
    request: Request<Body>,
    sink: ResponseSink,
}

impl HttpExchange {
    pub fn new(request: Request<Body>) -> (Self, ExchangeReply) {
        let (tx, rx) = oneshot::channel();
        let exchange = Self {
            request,
            sink: ResponseSink { tx },
        };
        (exchange, rx)
    }

    pub fn request(&self) -> &Request<Body> {
        &self.request
    }

    /// True once the transport stopped waiting for an answer.
    pub fn is_abandoned(&self) -> bool {
        self.sink.is_closed()
    }

    /// Complete the exchange with a ready response.
    pub fn complete(self, response: Response<Body>) -> bool {
        self.sink.send(response)
    }

    /// 307 Temporary Redirect to `location`, empty body.
    pub fn send_redirect(self, location: HeaderValue) -> bool {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::TEMPORARY_REDIRECT;
        response.headers_mut().insert(header::LOCATION, location);
        self.complete(response)
    }

    /// Error status with the description as a plain-text body.
    pub fn send_error(self, status: StatusCode, description: &str) -> bool {
        let mut response = Response::new(Body::from(description.to_string()));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.complete(response)
    }

    /// 200 OK with a JSON body.
    pub fn send_json<T: Serialize>(self, payload: &T) -> Result<bool, ContentError> {
        let body = serde_json::to_vec(payload).map_err(|e| ContentError::Answer(e.to_string()))?;
        let mut response = Response::new(Body::from(body));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(self.complete(response))
    }

    /// Split into the request and the reply slot, for handlers that answer
    /// later (the tunnel).
    pub fn into_parts(self) -> (Request<Body>, ResponseSink) {
        (self.request, self.sink)
    }
}

/// One-shot reply slot of an exchange.
#[derive(Debug)]
pub struct ResponseSink {
    tx: oneshot::Sender<Response<Body>>,
}

impl ResponseSink {
    /// Returns false if the transport is no longer listening.
    pub fn send(self, response: Response<Body>) -> bool {
        self.tx.send(response).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

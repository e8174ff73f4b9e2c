//! Tunnel task and its cancellable handle.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{header, Request, Response, StatusCode, Uri};
use futures_util::StreamExt;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioIo;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::observability::metrics;
use crate::protocol::exchange::{HttpExchange, ResponseSink};
use crate::proxy::{is_hop_by_hop, ProxyError, StreamingProxy};

/// Result reported to the tunnel owner, exactly once.
pub type TunnelOutcome = Result<(), ProxyError>;

/// Chunks buffered between the upstream reader and the client body.
const CHUNK_QUEUE: usize = 16;

/// Owner's grip on a running tunnel.
///
/// Cancellation and natural completion both try to settle the tunnel; the
/// first one wins and the other has no effect.
#[derive(Debug)]
pub struct TunnelHandle {
    token: CancellationToken,
    settled: Arc<AtomicBool>,
}

impl TunnelHandle {
    /// Cancel the tunnel. Returns true if this suppressed the completion
    /// callback, false if the tunnel had already finished on its own.
    pub fn cancel(self) -> bool {
        let won = self
            .settled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        // A tunnel that already finished keeps its client body intact.
        if won {
            self.token.cancel();
        }
        won
    }

    /// True once the tunnel completed or was cancelled.
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }
}

impl StreamingProxy {
    /// Start relaying `exchange` to `target`. Returns immediately.
    ///
    /// `on_done` runs exactly once with the outcome, unless the returned
    /// handle is cancelled first.
    pub fn start_tunnel<F, Fut>(&self, exchange: HttpExchange, target: Url, on_done: F) -> TunnelHandle
    where
        F: FnOnce(TunnelOutcome) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let settled = Arc::new(AtomicBool::new(false));
        let handle = TunnelHandle {
            token: token.clone(),
            settled: Arc::clone(&settled),
        };
        let client = self.client.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                outcome = relay(client, exchange, &target, token.clone()) => Some(outcome),
            };
            let Some(outcome) = outcome else {
                tracing::debug!(url = %target, "Tunnel cancelled");
                metrics::record_tunnel("cancelled");
                return;
            };
            if settled
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                tracing::debug!(url = %target, "Tunnel finished after cancellation, outcome dropped");
                metrics::record_tunnel("cancelled");
                return;
            }
            match &outcome {
                Ok(()) => {
                    tracing::debug!(url = %target, "Tunnel completed");
                    metrics::record_tunnel("completed");
                }
                Err(e) => {
                    tracing::warn!(url = %target, error = %e, "Tunnel failed");
                    metrics::record_tunnel("failed");
                }
            }
            on_done(outcome).await;
        });

        handle
    }
}

async fn relay(
    client: Client<HttpConnector, Body>,
    exchange: HttpExchange,
    target: &Url,
    cancelled: CancellationToken,
) -> TunnelOutcome {
    let (mut request, sink) = exchange.into_parts();
    let wants_upgrade = request.headers().contains_key(header::UPGRADE);
    let client_upgrade = wants_upgrade.then(|| hyper::upgrade::on(&mut request));

    let upstream_request = match upstream_request(request, target, wants_upgrade) {
        Ok(r) => r,
        Err(e) => {
            sink.send(bad_gateway());
            return Err(e);
        }
    };

    let mut response = match client.request(upstream_request).await {
        Ok(r) => r,
        Err(e) => {
            sink.send(bad_gateway());
            return Err(ProxyError::Upstream(e.to_string()));
        }
    };

    if response.status() == StatusCode::SWITCHING_PROTOCOLS {
        let Some(client_upgrade) = client_upgrade else {
            sink.send(bad_gateway());
            return Err(ProxyError::Upgrade("upstream switched protocols unasked".into()));
        };
        let upstream_upgrade = hyper::upgrade::on(&mut response);
        let (parts, _) = response.into_parts();
        if !sink.send(Response::from_parts(parts, Body::empty())) {
            return Err(ProxyError::ClientClosed);
        }

        let (client_io, upstream_io) = tokio::try_join!(client_upgrade, upstream_upgrade)
            .map_err(|e| ProxyError::Upgrade(e.to_string()))?;
        let mut client_io = TokioIo::new(client_io);
        let mut upstream_io = TokioIo::new(upstream_io);
        return tokio::io::copy_bidirectional(&mut client_io, &mut upstream_io)
            .await
            .map(|_| ())
            .map_err(|e| ProxyError::Upstream(e.to_string()));
    }

    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    stream_body(parts, Body::new(body), sink, cancelled).await
}

/// Forward the upstream body to the client chunk by chunk.
///
/// A cancelled tunnel ends the client body with an error, so the client sees
/// an aborted transfer rather than a complete one.
async fn stream_body(
    parts: axum::http::response::Parts,
    upstream: Body,
    sink: ResponseSink,
    cancelled: CancellationToken,
) -> TunnelOutcome {
    let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(CHUNK_QUEUE);
    let client_body = futures_util::stream::unfold(Some((rx, cancelled)), |state| async move {
        let (mut rx, cancelled) = state?;
        tokio::select! {
            biased;
            _ = cancelled.cancelled() => {
                Some((Err(io::Error::other("tunnel cancelled")), None))
            }
            chunk = rx.recv() => chunk.map(|chunk| (chunk, Some((rx, cancelled)))),
        }
    });
    if !sink.send(Response::from_parts(parts, Body::from_stream(client_body))) {
        return Err(ProxyError::ClientClosed);
    }

    let mut upstream = upstream.into_data_stream();
    while let Some(chunk) = upstream.next().await {
        match chunk {
            Ok(bytes) => {
                if tx.send(Ok(bytes)).await.is_err() {
                    return Err(ProxyError::ClientClosed);
                }
            }
            Err(e) => {
                let message = e.to_string();
                let _ = tx.send(Err(io::Error::other(message.clone()))).await;
                return Err(ProxyError::Upstream(message));
            }
        }
    }
    Ok(())
}

fn upstream_request(
    request: Request<Body>,
    target: &Url,
    keep_upgrade: bool,
) -> Result<Request<Body>, ProxyError> {
    let uri: Uri = target
        .as_str()
        .parse()
        .map_err(|e| ProxyError::Upstream(format!("invalid target {target}: {e}")))?;
    let (parts, body) = request.into_parts();

    let mut builder = Request::builder().method(parts.method).uri(uri);
    for (name, value) in parts.headers.iter() {
        if name == header::HOST {
            continue;
        }
        let upgrade_header = name == header::UPGRADE || name == header::CONNECTION;
        if is_hop_by_hop(name) && !(keep_upgrade && upgrade_header) {
            continue;
        }
        builder = builder.header(name, value);
    }
    builder
        .body(body)
        .map_err(|e| ProxyError::Upstream(e.to_string()))
}

fn strip_hop_by_hop(headers: &mut axum::http::HeaderMap) {
    let names: Vec<_> = headers
        .keys()
        .filter(|name| is_hop_by_hop(name))
        .cloned()
        .collect();
    for name in names {
        headers.remove(&name);
    }
}

fn bad_gateway() -> Response<Body> {
    let mut response = Response::new(Body::from("Upstream request failed"));
    *response.status_mut() = StatusCode::BAD_GATEWAY;
    response
}

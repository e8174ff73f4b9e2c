//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Notify};

use content_gateway::media::{
    DeliveryEndpoint, ElementKind, FlowDirection, MediaElement, MediaEngine, MediaError,
    MediaEvent, StartAction,
};
use content_gateway::protocol::{ExchangeReply, HttpExchange};
use content_gateway::proxy::StreamingProxy;
use content_gateway::session::{ContentSession, SessionManager, SessionObserver};

/// Counters shared by the mock engine and everything it builds.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub processing_built: AtomicUsize,
    pub delivery_built: AtomicUsize,
    pub processing_released: AtomicUsize,
    pub delivery_released: AtomicUsize,
    pub start_actions: Mutex<Vec<StartAction>>,
    pub content_paths: Mutex<Vec<String>>,
}

impl EngineStats {
    pub fn built(&self) -> usize {
        self.processing_built.load(Ordering::SeqCst) + self.delivery_built.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.processing_released.load(Ordering::SeqCst)
            + self.delivery_released.load(Ordering::SeqCst)
    }
}

/// Holds the delivery build open until the test lets it finish.
#[derive(Debug, Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

/// Programmable media engine.
pub struct MockEngine {
    url: Mutex<Option<String>>,
    fail_processing: Mutex<Option<MediaError>>,
    gate: Option<Arc<Gate>>,
    events: broadcast::Sender<MediaEvent>,
    pub stats: Arc<EngineStats>,
}

impl MockEngine {
    pub fn new(url: &str) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            url: Mutex::new(Some(url.to_string())),
            fail_processing: Mutex::new(None),
            gate: None,
            events,
            stats: Arc::new(EngineStats::default()),
        }
    }

    pub fn with_gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Delivery endpoints report no URL.
    pub fn without_url(self) -> Self {
        *self.url.lock().unwrap() = None;
        self
    }

    pub fn failing(self, code: i32, description: &str) -> Self {
        *self.fail_processing.lock().unwrap() = Some(MediaError::new(code, description));
        self
    }

    /// An element built by the caller rather than the engine, as RTP
    /// sessions supply them.
    pub fn element(&self, kind: ElementKind) -> Arc<dyn MediaElement> {
        Arc::new(MockElement {
            kind,
            stats: Arc::clone(&self.stats),
        })
    }

    /// Emit an event on every delivery endpoint built so far.
    pub fn emit(&self, event: MediaEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    async fn build_processing_endpoint(
        &self,
        kind: ElementKind,
        content_path: &str,
    ) -> Result<Arc<dyn MediaElement>, MediaError> {
        if let Some(err) = self.fail_processing.lock().unwrap().clone() {
            return Err(err);
        }
        self.stats.content_paths.lock().unwrap().push(content_path.to_string());
        self.stats.processing_built.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockElement {
            kind,
            stats: Arc::clone(&self.stats),
        }))
    }

    async fn build_and_connect_delivery_endpoint(
        &self,
        _direction: FlowDirection,
        _elements: &[Arc<dyn MediaElement>],
    ) -> Result<Arc<dyn DeliveryEndpoint>, MediaError> {
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.stats.delivery_built.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockDelivery {
            url: self.url.lock().unwrap().clone(),
            events: self.events.clone(),
            stats: Arc::clone(&self.stats),
        }))
    }
}

#[derive(Debug)]
pub struct MockElement {
    kind: ElementKind,
    stats: Arc<EngineStats>,
}

#[async_trait]
impl MediaElement for MockElement {
    fn id(&self) -> &str {
        "mock-element"
    }

    fn kind(&self) -> ElementKind {
        self.kind
    }

    async fn start(&self, action: StartAction) -> Result<(), MediaError> {
        self.stats.start_actions.lock().unwrap().push(action);
        Ok(())
    }

    async fn release(&self) -> Result<(), MediaError> {
        self.stats.processing_released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockDelivery {
    url: Option<String>,
    events: broadcast::Sender<MediaEvent>,
    stats: Arc<EngineStats>,
}

#[async_trait]
impl DeliveryEndpoint for MockDelivery {
    fn id(&self) -> &str {
        "mock-delivery"
    }

    async fn url(&self) -> Result<Option<String>, MediaError> {
        Ok(self.url.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<MediaEvent> {
        self.events.subscribe()
    }

    async fn release(&self) -> Result<(), MediaError> {
        self.stats.delivery_released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every observer callback.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub started: AtomicUsize,
    pub terminations: Mutex<Vec<(i32, String)>>,
}

impl RecordingObserver {
    pub fn terminations(&self) -> Vec<(i32, String)> {
        self.terminations.lock().unwrap().clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn content_started(&self, _session: &ContentSession) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn terminated(&self, _session: &ContentSession, code: i32, message: &str) {
        self.terminations
            .lock()
            .unwrap()
            .push((code, message.to_string()));
    }
}

pub fn manager(engine: Arc<MockEngine>, observer: Arc<RecordingObserver>) -> SessionManager {
    SessionManager::with_observer(
        engine,
        StreamingProxy::new(Duration::from_secs(1)),
        Some(observer as Arc<dyn SessionObserver>),
    )
}

pub fn exchange(uri: &str) -> (HttpExchange, ExchangeReply) {
    HttpExchange::new(Request::builder().uri(uri).body(Body::empty()).unwrap())
}

/// Poll `check` until it holds or a second has passed.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Start an upstream that answers every request with an endless chunked
/// stream, one chunk every 20ms, until the connection is closed.
pub async fn start_streaming_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let head = "HTTP/1.1 200 OK\r\nContent-Type: video/webm\r\nTransfer-Encoding: chunked\r\n\r\n";
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                loop {
                    if socket.write_all(b"5\r\nchunk\r\n").await.is_err() {
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            });
        }
    });

    addr
}

/// Start an upstream that answers every request with `body` and closes.
pub async fn start_finite_upstream(body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

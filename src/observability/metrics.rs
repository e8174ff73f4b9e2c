//! Metrics collection and exposition.
//!
//! # Metrics
//! - `content_sessions_created_total` (counter): by session kind
//! - `content_sessions_terminated_total` (counter): by kind and outcome
//! - `content_sessions_active` (gauge): sessions not yet terminated
//! - `content_answers_total` (counter): by answer kind (redirect, tunnel, jsonrpc, error)
//! - `content_tunnels_total` (counter): by outcome (completed, failed, cancelled)
//! - `content_activation_duration_seconds` (histogram): request to answer

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::session::CODE_MEDIA_SESSION_TERMINATED;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_session_created(kind: &'static str) {
    ::metrics::counter!("content_sessions_created_total", "kind" => kind).increment(1);
    ::metrics::gauge!("content_sessions_active").increment(1.0);
}

pub fn record_session_terminated(kind: &'static str, code: i32) {
    let outcome = termination_outcome(code);
    ::metrics::counter!("content_sessions_terminated_total", "kind" => kind, "outcome" => outcome)
        .increment(1);
    ::metrics::gauge!("content_sessions_active").decrement(1.0);
}

pub fn record_answer(kind: &'static str) {
    ::metrics::counter!("content_answers_total", "kind" => kind).increment(1);
}

pub fn record_tunnel(outcome: &'static str) {
    ::metrics::counter!("content_tunnels_total", "outcome" => outcome).increment(1);
}

pub fn record_activation(kind: &'static str, started: Instant) {
    ::metrics::histogram!("content_activation_duration_seconds", "kind" => kind)
        .record(started.elapsed().as_secs_f64());
}

fn termination_outcome(code: i32) -> &'static str {
    if code == 0 || code == CODE_MEDIA_SESSION_TERMINATED {
        "normal"
    } else {
        "error"
    }
}

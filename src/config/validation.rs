//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: GatewayConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;
use crate::session::{DeliveryMode, SessionKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address {0:?}")]
    BindAddress(String),

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),

    #[error("invalid media origin {0:?}: must be an http(s) URL")]
    OriginUrl(String),

    #[error("connect timeout must be positive")]
    ConnectTimeout,

    #[error("no content handlers configured")]
    NoHandlers,

    #[error("handler {0}: path prefix must start with '/'")]
    PathPrefix(String),

    #[error("handler {0}: path prefix already used")]
    DuplicatePrefix(String),

    #[error("handler {0}: content root must not be empty")]
    ContentRoot(String),

    #[error("handler {0}: rtp sessions cannot be served from a content path")]
    UnsupportedKind(String),

    #[error("handler {0}: tunnels only reach plain http origins")]
    TunnelScheme(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }
    let tls_origin = match Url::parse(&config.media.origin_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url.scheme() == "https",
        _ => {
            errors.push(ValidationError::OriginUrl(config.media.origin_url.clone()));
            false
        }
    };
    if config.media.connect_timeout_secs == 0 {
        errors.push(ValidationError::ConnectTimeout);
    }

    if config.handlers.is_empty() {
        errors.push(ValidationError::NoHandlers);
    }
    let mut prefixes = HashSet::new();
    for handler in &config.handlers {
        if !handler.path_prefix.starts_with('/') {
            errors.push(ValidationError::PathPrefix(handler.name.clone()));
        }
        if !prefixes.insert(handler.path_prefix.trim_end_matches('/')) {
            errors.push(ValidationError::DuplicatePrefix(handler.name.clone()));
        }
        if handler.content_root.is_empty() {
            errors.push(ValidationError::ContentRoot(handler.name.clone()));
        }
        if handler.kind == SessionKind::Rtp {
            errors.push(ValidationError::UnsupportedKind(handler.name.clone()));
        }
        // JSON-RPC handlers hand the URL back instead of relaying it.
        if tls_origin
            && !handler.use_control_protocol
            && handler.delivery_mode() == DeliveryMode::Tunnel
        {
            errors.push(ValidationError::TunnelScheme(handler.name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

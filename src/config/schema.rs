//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from the config file.

use serde::{Deserialize, Serialize};

use crate::session::{DeliveryMode, SessionKind};

/// Root configuration for the content gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration.
    pub listener: ListenerConfig,

    /// Media origin the built-in engine resolves content against.
    pub media: MediaConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Content handlers, one per URL prefix.
    pub handlers: Vec<HandlerConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Media engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Base URL of the HTTP media origin.
    pub origin_url: String,

    /// Upstream connect timeout for tunnels, in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            origin_url: "http://127.0.0.1:8888/".to_string(),
            connect_timeout_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// A content handler mounted under a URL prefix.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HandlerConfig {
    /// Handler identifier for logging.
    pub name: String,

    /// Path prefix, e.g. "/player".
    pub path_prefix: String,

    /// Session variant created for each request.
    pub kind: SessionKind,

    /// Redirect the client to the delivery URL instead of tunneling.
    #[serde(default = "default_redirect")]
    pub redirect: bool,

    /// Requests are JSON-RPC control messages instead of plain content requests.
    #[serde(default)]
    pub use_control_protocol: bool,

    /// Prefix joined with the content id to form the content path.
    pub content_root: String,
}

fn default_redirect() -> bool {
    true
}

impl HandlerConfig {
    pub fn delivery_mode(&self) -> DeliveryMode {
        if self.redirect {
            DeliveryMode::Redirect
        } else {
            DeliveryMode::Tunnel
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [[handlers]]
            name = "videos"
            path_prefix = "/player"
            kind = "player"
            content_root = "videos"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.media.connect_timeout_secs, 5);
        assert_eq!(config.handlers.len(), 1);
        assert!(config.handlers[0].redirect);
        assert!(!config.handlers[0].use_control_protocol);
        assert_eq!(config.handlers[0].delivery_mode(), DeliveryMode::Redirect);
    }
}

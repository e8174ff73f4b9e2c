//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled content handlers
//! - Look up the handler for a request path
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) prefix scan (acceptable for typical handler counts)
//! - Longest prefix wins

use crate::config::HandlerConfig;
use crate::error::ContentError;
use crate::routing::matcher::PathPrefixMatcher;
use crate::session::{DeliveryMode, SessionKind};

/// A compiled content handler.
#[derive(Debug, Clone)]
pub struct ContentRoute {
    pub name: String,
    pub kind: SessionKind,
    pub redirect: bool,
    pub use_control_protocol: bool,
    content_root: String,
    matcher: PathPrefixMatcher,
}

impl ContentRoute {
    pub fn from_config(config: &HandlerConfig) -> Self {
        Self {
            name: config.name.clone(),
            kind: config.kind,
            redirect: config.redirect,
            use_control_protocol: config.use_control_protocol,
            content_root: config.content_root.trim_end_matches('/').to_string(),
            matcher: PathPrefixMatcher::new(config.path_prefix.as_str()),
        }
    }

    pub fn prefix(&self) -> &str {
        self.matcher.prefix()
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        if self.redirect {
            DeliveryMode::Redirect
        } else {
            DeliveryMode::Tunnel
        }
    }

    /// Content path handed to the media engine for `content_id`.
    ///
    /// Ids must stay below the content root: empty ids, backslashes and dot
    /// segments (plain or percent-encoded) are refused.
    pub fn content_path(&self, content_id: &str) -> Result<String, ContentError> {
        let content_id = content_id.trim_start_matches('/');
        if content_id.is_empty() {
            return Err(ContentError::BadRequest("missing content id".into()));
        }
        if content_id.contains('\\') || content_id.split('/').any(is_dot_segment) {
            return Err(ContentError::BadRequest(format!(
                "content id {content_id:?} leaves the content root"
            )));
        }
        Ok(format!("{}/{}", self.content_root, content_id))
    }
}

fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}

/// Immutable handler table.
#[derive(Debug, Default)]
pub struct ContentRouter {
    routes: Vec<ContentRoute>,
}

impl ContentRouter {
    pub fn new(handlers: &[HandlerConfig]) -> Self {
        let mut routes: Vec<_> = handlers.iter().map(ContentRoute::from_config).collect();
        routes.sort_by(|a, b| b.prefix().len().cmp(&a.prefix().len()));
        Self { routes }
    }

    /// Find the route for `path` and the content id that follows its prefix.
    pub fn resolve<'a>(&self, path: &'a str) -> Option<(&ContentRoute, &'a str)> {
        self.routes
            .iter()
            .find_map(|route| route.matcher.strip(path).map(|rest| (route, rest)))
    }

    pub fn routes(&self) -> &[ContentRoute] {
        &self.routes
    }
}

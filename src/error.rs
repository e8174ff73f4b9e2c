//! Error taxonomy for content sessions.
//!
//! # Categories
//! - Contract violations (1xxxx): the session owner misused the lifecycle API
//! - Backend failures (2xxxx): the media engine or the delivery URL let us down
//! - Control-protocol failures (3xxxx): the client sent something we cannot serve
//!
//! Every variant carries a stable numeric code so that logs, JSON-RPC error
//! answers and HTTP error statuses all agree on what went wrong.

use axum::http::StatusCode;
use thiserror::Error;

use crate::media::MediaError;
use crate::session::state::SessionState;

/// Lifecycle violation: activation attempted outside HANDLING.
pub const CODE_INVALID_TRANSITION: i32 = 10001;
/// Activation called with neither a content path nor media elements.
pub const CODE_MISSING_INPUT: i32 = 10002;
/// Activation called with both a content path and media elements.
pub const CODE_CONFLICTING_INPUT: i32 = 10003;
/// Delivery endpoint returned no usable URL.
pub const CODE_INVALID_URL: i32 = 20012;
/// Answering the initial request failed.
pub const CODE_ANSWER_FAILED: i32 = 20013;
/// Generic media engine failure.
pub const CODE_MEDIA_FAILURE: i32 = 20020;
/// Control request referenced a session that does not exist.
pub const CODE_UNKNOWN_SESSION: i32 = 30001;
/// Control request could not be understood.
pub const CODE_BAD_REQUEST: i32 = 30002;

/// Errors raised by the content session core.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("cannot start media exchange in state {state}; content session lifecycle violated")]
    InvalidLifecycleTransition { state: SessionState },

    #[error("cannot activate media without a content path or media elements")]
    MissingActivationInput,

    #[error("cannot activate media with both a content path and media elements")]
    ConflictingActivationInput,

    #[error("media server returned an empty delivery URL")]
    EmptyDeliveryUrl,

    #[error("media server returned an invalid delivery URL {url:?}: {reason}")]
    InvalidDeliveryUrl { url: String, reason: String },

    #[error("media server failure: {0}")]
    Media(#[from] MediaError),

    #[error("failed to answer initial request: {0}")]
    Answer(String),

    #[error("no content session with id {0}")]
    UnknownSession(String),

    #[error("malformed control request: {0}")]
    BadRequest(String),
}

impl ContentError {
    /// Stable numeric code for diagnostics and client-visible answers.
    pub fn code(&self) -> i32 {
        match self {
            ContentError::InvalidLifecycleTransition { .. } => CODE_INVALID_TRANSITION,
            ContentError::MissingActivationInput => CODE_MISSING_INPUT,
            ContentError::ConflictingActivationInput => CODE_CONFLICTING_INPUT,
            ContentError::EmptyDeliveryUrl | ContentError::InvalidDeliveryUrl { .. } => {
                CODE_INVALID_URL
            }
            ContentError::Media(e) => e.code,
            ContentError::Answer(_) => CODE_ANSWER_FAILED,
            ContentError::UnknownSession(_) => CODE_UNKNOWN_SESSION,
            ContentError::BadRequest(_) => CODE_BAD_REQUEST,
        }
    }

    /// True for programming errors in the session owner. These are never retried.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            ContentError::InvalidLifecycleTransition { .. }
                | ContentError::MissingActivationInput
                | ContentError::ConflictingActivationInput
                | ContentError::EmptyDeliveryUrl
                | ContentError::InvalidDeliveryUrl { .. }
        )
    }

}

/// Map an internal numeric code onto a standard HTTP status.
///
/// Codes that already are HTTP error statuses pass through unchanged.
pub fn http_status_for_code(code: i32) -> StatusCode {
    if (400..=599).contains(&code) {
        if let Ok(status) = StatusCode::from_u16(code as u16) {
            return status;
        }
    }
    match code / 10000 {
        1 => StatusCode::INTERNAL_SERVER_ERROR,
        2 => StatusCode::BAD_GATEWAY,
        3 => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

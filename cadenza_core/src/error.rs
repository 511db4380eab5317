use http::StatusCode;
use serde::Deserialize;
use std::borrow::Cow;
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Non-2xx response from the service, decoded from the error body
    /// where possible.
    #[error("bad request: status {status}: {message}")]
    BadRequest {
        status: StatusCode,
        message: String,
        reason: Option<String>,
    },

    #[error("authentication: {0}")]
    Authentication(Cow<'static, str>),

    #[error("timeout: no response within {0:?}")]
    Timeout(Duration),

    #[error("parse error: {source}")]
    Parse { source: BoxError, body: String },

    #[error("re-authentication needed: {0}")]
    ReAuthenticationNeeded(Cow<'static, str>),

    #[error("transport: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("build url error: {0}")]
    BuildUrl(#[from] url::ParseError),

    #[error("pagination: {0}")]
    Pagination(Cow<'static, str>),

    #[error("pagination limit reached: {0}")]
    PaginationLimit(Cow<'static, str>),

    #[error("scheduler: {0}")]
    Scheduler(Cow<'static, str>),
}

impl Error {
    #[inline]
    pub fn parse(source: impl Into<BoxError>, body: impl Into<String>) -> Error {
        Error::Parse {
            source: source.into(),
            body: body.into(),
        }
    }

    /// True when the error is a not-found response. Lookup endpoints that
    /// document a `None` result use this to recover locally.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::BadRequest { status, .. } if *status == StatusCode::NOT_FOUND)
    }

    /// Maps a non-2xx response to the error taxonomy.
    ///
    /// The body is expected to decode as `{status, message, reason?}`,
    /// optionally nested under an `"error"` envelope; anything else falls
    /// back to a raw preview so the status is never swallowed.
    pub fn from_response(status: StatusCode, body: &[u8]) -> Error {
        let wire = ErrorBody::decode(body);
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let msg = wire
                .map(|w| w.message)
                .unwrap_or_else(|| "invalid or expired credential".to_string());
            return Error::Authentication(msg.into());
        }
        match wire {
            Some(w) => Error::BadRequest {
                status,
                message: w.message,
                reason: w.reason,
            },
            None => Error::BadRequest {
                status,
                message: body_preview(body, 256),
                reason: None,
            },
        }
    }
}

/// Error body wire shape: `{status, message, reason?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

impl ErrorBody {
    pub fn decode(body: &[u8]) -> Option<ErrorBody> {
        if let Ok(w) = serde_json::from_slice::<ErrorBody>(body) {
            return Some(w);
        }
        serde_json::from_slice::<ErrorEnvelope>(body)
            .ok()
            .map(|e| e.error)
    }
}

pub(crate) fn body_preview(body: &[u8], max_chars: usize) -> String {
    crate::codec::truncate_lossy(body, max_chars)
}

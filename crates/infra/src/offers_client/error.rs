use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to the upstream offers service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OffersClientError {
    /// The refresh credential was refused, or a request was still rejected
    /// after re-authenticating.
    #[error("authentication with offers service failed: {0}")]
    Authentication(String),

    /// Non-success status other than the recoverable `401`.
    #[error("offers service returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Connection, timeout or other network failure.
    #[error("offers service unreachable: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("unexpected offers service response: {0}")]
    Decode(String),

    /// The client was closed.
    #[error("offers client is closed")]
    Closed,
}

impl OffersClientError {
    pub(crate) fn upstream(status: StatusCode, body: String) -> Self {
        Self::Upstream {
            status: status.as_u16(),
            body,
        }
    }

    pub(crate) fn transport(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }

    pub(crate) fn decode(err: reqwest::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

use thiserror::Error;

/// Failures talking to the NSO RESTCONF API.
#[derive(Debug, Error)]
pub enum NsoError {
    /// The argument was rejected before any request was sent.
    #[error("{0}")]
    InvalidArgument(String),

    /// Connection, timeout or body transfer failure.
    #[error("RESTCONF request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// NSO answered 404 for the requested path.
    #[error("Not found in NSO: {path}")]
    NotFound { path: String },

    /// NSO answered with any other non-success status.
    #[error("RESTCONF request to {path} failed with status {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    /// The response body was not the JSON shape we expected.
    #[error("Unexpected RESTCONF payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl NsoError {
    /// Request and status failures are the "expected" ones; anything else is
    /// reported to tool callers as unexpected.
    pub fn is_request_failure(&self) -> bool {
        matches!(
            self,
            NsoError::InvalidArgument(_)
                | NsoError::Request(_)
                | NsoError::NotFound { .. }
                | NsoError::Status { .. }
        )
    }
}

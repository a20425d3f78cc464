use thiserror::Error;

/// Errors returned by the license server client.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// The stream's environment does not map to a usable license server URL,
    /// or the HTTP client could not be built.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// An HTTP-level transport error occurred.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The license server answered with a non-success status.
    #[error("license server returned {status}: {body}")]
    Server { status: u16, body: String },

    /// Another request for the same stream is still outstanding.
    #[error("request already in progress for {0}")]
    DuplicateRequest(String),

    /// The server answered successfully but sent no data.
    #[error("empty response from license server")]
    EmptyResponse,

    /// The response body could not be decoded.
    #[error("invalid license response: {0}")]
    InvalidResponse(String),
}

impl LicenseError {
    /// Returns `true` if the failure is transient and a later attempt may
    /// succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::DuplicateRequest(_) => true,
            Self::Server { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Configuration(_) | Self::EmptyResponse | Self::InvalidResponse(_) => false,
        }
    }
}

use thiserror::Error;

/// Errors raised while decoding shared fairkey types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The content key identifier is not a valid URL.
    #[error("unparseable content key identifier '{identifier}': {reason}")]
    UnparseableIdentifier { identifier: String, reason: String },

    /// The content key identifier parsed but carries no host segment.
    #[error("content key identifier '{0}' has no host segment")]
    MissingHost(String),

    /// The stream catalog could not be decoded.
    #[error("catalog decode error: {0}")]
    Catalog(#[from] serde_json::Error),

    /// The stream catalog file could not be read.
    #[error("failed to read catalog {path}: {reason}")]
    CatalogFile { path: String, reason: String },

    /// A retry reason string was not recognised.
    #[error("unknown retry reason: {0}")]
    UnknownRetryReason(String),
}

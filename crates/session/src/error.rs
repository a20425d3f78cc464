use std::path::PathBuf;

use fairkey_core::CoreError;
use fairkey_license::LicenseError;
use thiserror::Error;

use crate::playback::PlaybackError;

/// Errors produced while answering a content key request.
///
/// Everything except [`KeyRequestError::UnparseableIdentifier`] and
/// [`KeyRequestError::PersistWriteFailed`] is delivered to the playback
/// engine as the request's failure.
#[derive(Debug, Error)]
pub enum KeyRequestError {
    /// The key request carried an identifier that is not a usable URL. The
    /// request is dropped without a response.
    #[error("{0}")]
    UnparseableIdentifier(#[source] CoreError),

    /// The application certificate could not be obtained.
    #[error("missing application certificate: {0}")]
    MissingApplicationCertificate(#[source] LicenseError),

    /// The license server did not return a CKC.
    #[error("no CKC returned by key security module: {0}")]
    NoCkcReturned(#[source] LicenseError),

    /// The playback engine could not produce a key exchange payload.
    #[error("playback engine error: {0}")]
    Playback(#[from] PlaybackError),

    /// Writing a persistable license to disk failed. Never fatal.
    #[error("failed to persist license to {}: {source}", .path.display())]
    PersistWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl KeyRequestError {
    /// Whether the failure came from a request that was already in flight
    /// for the same stream.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            Self::MissingApplicationCertificate(LicenseError::DuplicateRequest(_))
                | Self::NoCkcReturned(LicenseError::DuplicateRequest(_))
        )
    }
}

//! The playback engine seam.
//!
//! The handler never talks to a decryption engine directly. Everything it
//! needs from one goes through [`PlaybackSession`], which production code
//! implements over the platform's content key session and tests implement
//! with [`ScriptedSession`](crate::testing::ScriptedSession).

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::error::KeyRequestError;

/// Failures reported by the playback engine itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// The engine cannot produce a persistable payload in this session, e.g.
    /// while mirroring to an external display.
    #[error("persistable keys not supported: {0}")]
    PersistableUnsupported(String),

    /// The engine failed to produce a key exchange payload.
    #[error("key exchange payload failed: {0}")]
    KeyExchange(String),
}

/// A content key session owned by the playback engine.
///
/// Every method is keyed by the content key identifier of the request it
/// belongs to. For a given request the handler calls
/// [`produce_key_exchange_payload`](Self::produce_key_exchange_payload) at
/// most twice (persistable first, online on rejection) and then exactly one
/// of [`deliver_key_response`](Self::deliver_key_response) or
/// [`deliver_failure`](Self::deliver_failure).
#[async_trait]
pub trait PlaybackSession: Send + Sync {
    /// Whether the engine wants a persistable key for `identifier`.
    fn prefers_persistable(&self, _identifier: &str) -> bool {
        false
    }

    /// Produce an SPC from the application certificate and the raw
    /// identifier bytes.
    async fn produce_key_exchange_payload(
        &self,
        identifier: &str,
        certificate: &[u8],
        content_identifier: &[u8],
        persistable: bool,
    ) -> Result<Bytes, PlaybackError>;

    /// Turn a CKC obtained for a persistable request into the key blob that
    /// is stored on disk and delivered. The default keeps the CKC as is.
    async fn make_persistable_key(
        &self,
        _identifier: &str,
        ckc: Bytes,
    ) -> Result<Bytes, PlaybackError> {
        Ok(ckc)
    }

    /// Hand the CKC (or persistable key blob) to the engine.
    async fn deliver_key_response(&self, identifier: &str, key: Bytes);

    /// Report a terminal failure for the request.
    async fn deliver_failure(&self, identifier: &str, error: &KeyRequestError);

    /// Ask the engine to start a renewal for `identifier`. Called right
    /// before the handler re-enters the pipeline for it.
    async fn request_renewal(&self, _identifier: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    // Verify object safety.
    fn _assert_dyn_session(_: &dyn PlaybackSession) {}

    #[test]
    fn error_display() {
        let err = PlaybackError::PersistableUnsupported("airplay".into());
        assert_eq!(err.to_string(), "persistable keys not supported: airplay");
    }
}

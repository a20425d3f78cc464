//! Content key identifiers carried by key-request events.

use std::fmt;

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::CoreError;

/// Numeric asset id derived from a content key identifier.
///
/// Stable across processes: the first eight bytes of the SHA-256 digest of
/// the identifier string, read big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(u64);

impl AssetId {
    /// Derive the asset id for a raw identifier string.
    #[must_use]
    pub fn derive(identifier: &str) -> Self {
        let digest = Sha256::digest(identifier.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        Self(u64::from_be_bytes(prefix))
    }

    /// Return the numeric value.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A parsed content key identifier such as `skd://asset123`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKeyId {
    raw: String,
    host: String,
    asset_id: AssetId,
}

impl ContentKeyId {
    /// Parse an identifier. It must be an absolute URL with a host segment.
    pub fn parse(identifier: &str) -> Result<Self, CoreError> {
        let url = Url::parse(identifier).map_err(|e| CoreError::UnparseableIdentifier {
            identifier: identifier.to_owned(),
            reason: e.to_string(),
        })?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| CoreError::MissingHost(identifier.to_owned()))?
            .to_owned();

        Ok(Self {
            raw: identifier.to_owned(),
            host,
            asset_id: AssetId::derive(identifier),
        })
    }

    /// The identifier exactly as received.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Host segment of the identifier URL (`asset123` for `skd://asset123`).
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Numeric asset id used for pending-set membership.
    #[must_use]
    pub fn asset_id(&self) -> AssetId {
        self.asset_id
    }

    /// UTF-8 bytes handed to the playback engine as the content identifier.
    #[must_use]
    pub fn content_identifier(&self) -> &[u8] {
        self.raw.as_bytes()
    }
}

impl fmt::Display for ContentKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_skd_identifier() {
        let id = ContentKeyId::parse("skd://asset123").unwrap();
        assert_eq!(id.host(), "asset123");
        assert_eq!(id.as_str(), "skd://asset123");
        assert_eq!(id.content_identifier(), b"skd://asset123");
    }

    #[test]
    fn keeps_query_in_raw_identifier() {
        let id = ContentKeyId::parse("skd://drmtoday?assetId=abc&variantId=hd").unwrap();
        assert_eq!(id.host(), "drmtoday");
        assert_eq!(id.as_str(), "skd://drmtoday?assetId=abc&variantId=hd");
    }

    #[test]
    fn rejects_relative_identifier() {
        let err = ContentKeyId::parse("not a url").unwrap_err();
        assert!(matches!(err, CoreError::UnparseableIdentifier { .. }));
    }

    #[test]
    fn rejects_identifier_without_host() {
        let err = ContentKeyId::parse("skd:asset123").unwrap_err();
        assert!(matches!(err, CoreError::MissingHost(_)));
    }

    #[test]
    fn asset_id_is_stable_and_distinct() {
        let a = AssetId::derive("skd://asset123");
        assert_eq!(a, AssetId::derive("skd://asset123"));
        assert_ne!(a, AssetId::derive("skd://asset124"));
        assert_eq!(
            ContentKeyId::parse("skd://asset123").unwrap().asset_id(),
            a
        );
    }

    #[test]
    fn asset_id_display_is_hex() {
        let shown = AssetId::derive("skd://asset123").to_string();
        assert_eq!(shown.len(), 16);
        assert!(shown.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

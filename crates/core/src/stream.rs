//! Stream descriptors as supplied by the external asset catalog.
//!
//! A [`StreamDescriptor`] is read-only for the lifetime of the license
//! machinery: it is decoded once from the catalog and only ever inspected.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{PlaylistUrl, StreamName};

/// License server environment a stream is provisioned in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Testing,
    Staging,
    Production,
}

impl Environment {
    /// Parse the catalog's environment string. Unknown values yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "testing" => Some(Self::Testing),
            "staging" => Some(Self::Staging),
            "production" => Some(Self::Production),
            _ => None,
        }
    }

    /// Return the canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Testing => "testing",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    /// Subdomain prefix inserted in front of the license server host.
    #[must_use]
    pub fn subdomain(self) -> &'static str {
        match self {
            Self::Testing => "test.",
            Self::Staging => "staging.",
            Self::Production => "",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One protected (or clear) stream from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// The name of the stream.
    pub name: StreamName,

    /// The URL pointing to the HLS playlist.
    pub playlist_url: PlaylistUrl,

    /// Whether the stream is protected with FairPlay.
    pub is_protected: bool,

    /// Content key identifiers (`skd://...`) used by this stream.
    #[serde(default)]
    pub content_key_id_list: Option<Vec<String>>,

    #[serde(default)]
    pub variant_id: Option<String>,

    #[serde(default)]
    pub asset_id: Option<String>,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub session_id: Option<String>,

    #[serde(default)]
    pub merchant: Option<String>,

    /// Raw environment name; see [`StreamDescriptor::environment`].
    #[serde(rename = "environment", default)]
    pub environment_name: Option<String>,

    /// Minimum media bitrate required when downloading for offline use.
    #[serde(default)]
    pub minimum_download_bitrate: u64,
}

impl StreamDescriptor {
    /// Create a descriptor with the required fields; everything else empty.
    #[must_use]
    pub fn new(
        name: impl Into<StreamName>,
        playlist_url: impl Into<PlaylistUrl>,
        is_protected: bool,
    ) -> Self {
        Self {
            name: name.into(),
            playlist_url: playlist_url.into(),
            is_protected,
            content_key_id_list: None,
            variant_id: None,
            asset_id: None,
            user_id: None,
            session_id: None,
            merchant: None,
            environment_name: None,
            minimum_download_bitrate: 0,
        }
    }

    /// Set the content key identifier list.
    #[must_use]
    pub fn with_content_keys<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.content_key_id_list = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Set the merchant, user and session identifiers sent as custom data.
    #[must_use]
    pub fn with_drm_identity(
        mut self,
        merchant: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        self.merchant = Some(merchant.into());
        self.user_id = Some(user_id.into());
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the raw environment name.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment_name = Some(environment.into());
        self
    }

    /// Set the license server asset and variant identifiers.
    #[must_use]
    pub fn with_asset(mut self, asset_id: impl Into<String>, variant_id: impl Into<String>) -> Self {
        self.asset_id = Some(asset_id.into());
        self.variant_id = Some(variant_id.into());
        self
    }

    /// The parsed environment, or `None` when missing or unrecognised.
    #[must_use]
    pub fn environment(&self) -> Option<Environment> {
        self.environment_name.as_deref().and_then(Environment::parse)
    }

    /// Content key identifiers, empty when the catalog omitted them.
    #[must_use]
    pub fn content_keys(&self) -> &[String] {
        self.content_key_id_list.as_deref().unwrap_or_default()
    }

    /// Whether `identifier` is one of this stream's content keys.
    #[must_use]
    pub fn has_content_key(&self, identifier: &str) -> bool {
        self.content_keys().iter().any(|id| id == identifier)
    }

    /// Decode a JSON array of catalog records.
    pub fn list_from_json(json: &str) -> Result<Vec<Self>, CoreError> {
        Ok(serde_json::from_str(json)?)
    }
}

// Structural equality ignores the DRM identity and environment fields, and
// treats missing optional values as empty.
impl PartialEq for StreamDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.playlist_url == other.playlist_url
            && self.is_protected == other.is_protected
            && self.asset_id.as_deref().unwrap_or_default()
                == other.asset_id.as_deref().unwrap_or_default()
            && self.variant_id.as_deref().unwrap_or_default()
                == other.variant_id.as_deref().unwrap_or_default()
            && self.content_keys() == other.content_keys()
    }
}

impl Eq for StreamDescriptor {}

#[cfg(test)]
mod tests {
    use super::*;

    fn bunny() -> StreamDescriptor {
        StreamDescriptor::new("Bunny", "https://cdn.example.com/bunny.m3u8", true)
            .with_content_keys(["skd://asset123"])
            .with_environment("staging")
    }

    #[test]
    fn environment_parse_known_values() {
        assert_eq!(Environment::parse("testing"), Some(Environment::Testing));
        assert_eq!(Environment::parse("staging"), Some(Environment::Staging));
        assert_eq!(Environment::parse("production"), Some(Environment::Production));
        assert_eq!(Environment::parse("prod"), None);
        assert_eq!(Environment::parse(""), None);
    }

    #[test]
    fn environment_subdomains() {
        assert_eq!(Environment::Testing.subdomain(), "test.");
        assert_eq!(Environment::Staging.subdomain(), "staging.");
        assert_eq!(Environment::Production.subdomain(), "");
    }

    #[test]
    fn has_content_key() {
        let stream = bunny();
        assert!(stream.has_content_key("skd://asset123"));
        assert!(!stream.has_content_key("skd://other"));
        assert!(!StreamDescriptor::new("x", "y", false).has_content_key("skd://asset123"));
    }

    #[test]
    fn equality_treats_missing_values_as_empty() {
        let a = StreamDescriptor::new("A", "https://a/a.m3u8", true);
        let mut b = a.clone();
        b.asset_id = Some(String::new());
        b.content_key_id_list = Some(Vec::new());
        assert_eq!(a, b);
    }

    #[test]
    fn equality_ignores_drm_identity() {
        let a = bunny();
        let b = bunny().with_drm_identity("m", "u", "s").with_environment("production");
        assert_eq!(a, b);
    }

    #[test]
    fn equality_detects_key_list_order() {
        let a = bunny().with_content_keys(["skd://1", "skd://2"]);
        let b = bunny().with_content_keys(["skd://2", "skd://1"]);
        assert_ne!(a, b);
    }

    #[test]
    fn decodes_catalog_records() {
        let json = r#"[{
            "name": "Bunny",
            "playlist_url": "https://cdn.example.com/bunny.m3u8",
            "is_protected": true,
            "content_key_id_list": ["skd://asset123"],
            "merchant": "client_dev",
            "user_id": "rental1",
            "session_id": "p0",
            "environment": "staging",
            "minimum_download_bitrate": 265000
        }]"#;
        let streams = StreamDescriptor::list_from_json(json).unwrap();
        assert_eq!(streams.len(), 1);
        let stream = &streams[0];
        assert_eq!(stream.name.as_str(), "Bunny");
        assert_eq!(stream.environment(), Some(Environment::Staging));
        assert_eq!(stream.merchant.as_deref(), Some("client_dev"));
        assert_eq!(stream.minimum_download_bitrate, 265_000);
        assert!(stream.variant_id.is_none());
    }

    #[test]
    fn catalog_decode_error() {
        let err = StreamDescriptor::list_from_json("{not json").unwrap_err();
        assert!(matches!(err, CoreError::Catalog(_)));
    }
}

//! Read-only access to the stream catalog.

use std::path::Path;

use fairkey_core::{CoreError, StreamDescriptor};

/// Enumerates the streams known to the application.
pub trait Catalog: Send + Sync {
    /// Every stream in the catalog.
    fn streams(&self) -> Vec<StreamDescriptor>;

    /// The stream whose content key list contains `identifier`.
    fn find_by_content_key(&self, identifier: &str) -> Option<StreamDescriptor> {
        self.streams()
            .into_iter()
            .find(|s| s.has_content_key(identifier))
    }
}

/// A catalog fixed at construction time.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    streams: Vec<StreamDescriptor>,
}

impl StaticCatalog {
    /// Create a catalog from already decoded descriptors.
    pub fn new(streams: Vec<StreamDescriptor>) -> Self {
        Self { streams }
    }

    /// Decode a JSON array of stream records.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        StreamDescriptor::list_from_json(json).map(Self::new)
    }

    /// Read and decode a JSON catalog file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| CoreError::CatalogFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    /// Number of streams.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl Catalog for StaticCatalog {
    fn streams(&self) -> Vec<StreamDescriptor> {
        self.streams.clone()
    }

    fn find_by_content_key(&self, identifier: &str) -> Option<StreamDescriptor> {
        self.streams
            .iter()
            .find(|s| s.has_content_key(identifier))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const CATALOG: &str = r#"[
        {
            "name": "Bunny",
            "playlist_url": "https://cdn.example.com/bunny.m3u8",
            "is_protected": true,
            "content_key_id_list": ["skd://asset123"],
            "environment": "staging"
        },
        {
            "name": "Clear",
            "playlist_url": "https://cdn.example.com/clear.m3u8",
            "is_protected": false
        }
    ]"#;

    #[test]
    fn finds_stream_by_content_key() {
        let catalog = StaticCatalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.len(), 2);
        let stream = catalog.find_by_content_key("skd://asset123").unwrap();
        assert_eq!(stream.name.as_str(), "Bunny");
        assert!(catalog.find_by_content_key("skd://missing").is_none());
    }

    #[test]
    fn default_lookup_scans_streams() {
        struct Listed(Vec<StreamDescriptor>);
        impl Catalog for Listed {
            fn streams(&self) -> Vec<StreamDescriptor> {
                self.0.clone()
            }
        }

        let listed = Listed(StaticCatalog::from_json(CATALOG).unwrap().streams());
        let stream = listed.find_by_content_key("skd://asset123").unwrap();
        assert_eq!(stream.playlist_url.as_str(), "https://cdn.example.com/bunny.m3u8");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();
        let catalog = StaticCatalog::from_file(file.path()).unwrap();
        assert!(!catalog.is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = StaticCatalog::from_file("/nonexistent/catalog.json").unwrap_err();
        assert!(matches!(err, CoreError::CatalogFile { .. }));
    }
}

use std::path::{Path, PathBuf};

use fairkey_license::LicenseServerConfig;
use serde::{Deserialize, Serialize};

use crate::error::KeyRequestError;

/// Top-level fairkey configuration, loaded from a TOML file.
///
/// Every section is optional.
///
/// ```toml
/// [license]
/// timeout_secs = 10
/// base_url_override = "http://127.0.0.1:9000/license-server-fairplay"
///
/// [license.session_token]
/// type = "headers"
/// token_header = "x-dt-csl-token"
/// renewal_header = "x-dt-csl-renewal"
///
/// [storage]
/// documents_dir = "/var/lib/fairkey"
///
/// [keys]
/// prefer_persistable = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FairkeyConfig {
    /// License server client settings.
    #[serde(default)]
    pub license: LicenseServerConfig,
    /// Where persistable licenses are written.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Key request behaviour.
    #[serde(default)]
    pub keys: KeyRequestConfig,
}

impl FairkeyConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(toml: &str) -> Result<Self, KeyRequestError> {
        toml::from_str(toml).map_err(|e| KeyRequestError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, KeyRequestError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            KeyRequestError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    #[must_use]
    pub fn with_license(mut self, license: LicenseServerConfig) -> Self {
        self.license = license;
        self
    }

    #[must_use]
    pub fn with_documents_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage.documents_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_prefer_persistable(mut self, prefer: bool) -> Self {
        self.keys.prefer_persistable = prefer;
        self
    }

    #[must_use]
    pub fn with_renewal_enabled(mut self, enabled: bool) -> Self {
        self.keys.renewal_enabled = enabled;
        self
    }
}

/// Persisted license storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `<name><offline|online>.dat` files. Defaults to
    /// `./documents`.
    pub documents_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            documents_dir: PathBuf::from("./documents"),
        }
    }
}

/// Key request behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyRequestConfig {
    /// Request persistable keys for every content key. Defaults to `false`.
    pub prefer_persistable: bool,
    /// Schedule renewals when the license server advertises an interval.
    /// Defaults to `true`.
    pub renewal_enabled: bool,
}

impl Default for KeyRequestConfig {
    fn default() -> Self {
        Self {
            prefer_persistable: false,
            renewal_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use fairkey_license::SessionTokenChannel;

    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = FairkeyConfig::from_toml_str("").unwrap();
        assert_eq!(config.license.timeout_secs, 30);
        assert_eq!(config.storage.documents_dir, PathBuf::from("./documents"));
        assert!(!config.keys.prefer_persistable);
        assert!(config.keys.renewal_enabled);
    }

    #[test]
    fn parses_all_sections() {
        let toml = r#"
            [license]
            timeout_secs = 5
            auth_token = "upfront"
            base_url_override = "http://127.0.0.1:9000"
            echo_header = "x-csl"

            [license.session_token]
            type = "json_body"
            ckc_field = "ckc"
            token_field = "csl"
            renewal_field = "renew"

            [storage]
            documents_dir = "/var/lib/fairkey"

            [keys]
            prefer_persistable = true
            renewal_enabled = false
        "#;
        let config = FairkeyConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.license.timeout_secs, 5);
        assert_eq!(config.license.auth_token.as_deref(), Some("upfront"));
        assert_eq!(config.license.echo_header, "x-csl");
        assert!(matches!(
            config.license.session_token,
            SessionTokenChannel::JsonBody { .. }
        ));
        assert_eq!(
            config.storage.documents_dir,
            PathBuf::from("/var/lib/fairkey")
        );
        assert!(config.keys.prefer_persistable);
        assert!(!config.keys.renewal_enabled);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = FairkeyConfig::from_toml_str("[keys]\nprefer_persistable = true").unwrap();
        assert!(config.keys.prefer_persistable);
        assert!(config.keys.renewal_enabled);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = FairkeyConfig::from_toml_str("[keys\nprefer_persistable = 1").unwrap_err();
        assert!(matches!(err, KeyRequestError::Config(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[storage]\ndocuments_dir = \"/tmp/keys\"").unwrap();
        let config = FairkeyConfig::load(file.path()).unwrap();
        assert_eq!(config.storage.documents_dir, PathBuf::from("/tmp/keys"));

        let err = FairkeyConfig::load("/nonexistent/fairkey.toml").unwrap_err();
        assert!(matches!(err, KeyRequestError::Config(_)));
    }

    #[test]
    fn builders() {
        let config = FairkeyConfig::default()
            .with_documents_dir("/data")
            .with_prefer_persistable(true)
            .with_renewal_enabled(false)
            .with_license(LicenseServerConfig::default().with_timeout_secs(1));
        assert_eq!(config.storage.documents_dir, PathBuf::from("/data"));
        assert!(config.keys.prefer_persistable);
        assert!(!config.keys.renewal_enabled);
        assert_eq!(config.license.timeout_secs, 1);
    }
}

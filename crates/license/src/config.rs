use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the license server puts the rotating session token and the renewal
/// interval in a license response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionTokenChannel {
    /// Body is the base64 CKC; token and renewal seconds arrive as headers.
    Headers {
        token_header: String,
        renewal_header: String,
    },

    /// Body is a JSON object carrying the base64 CKC and the optional token
    /// and renewal members.
    JsonBody {
        ckc_field: String,
        token_field: String,
        renewal_field: String,
    },

    /// Body is the base64 CKC and no token is ever produced.
    Disabled,
}

impl Default for SessionTokenChannel {
    fn default() -> Self {
        Self::Headers {
            token_header: "x-dt-csl-token".into(),
            renewal_header: "x-dt-csl-renewal".into(),
        }
    }
}

/// Configuration for the [`LicenseServerClient`](crate::LicenseServerClient).
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseServerConfig {
    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Static upfront auth token sent as `x-dt-auth-token`. When absent the
    /// stream's merchant/user/session identifiers are sent as custom data.
    pub auth_token: Option<String>,

    /// Replaces the environment-derived base URL (`.../license-server-fairplay`).
    pub base_url_override: Option<String>,

    /// How the session token is returned by the server.
    pub session_token: SessionTokenChannel,

    /// Request header used to echo the latest session token back.
    pub echo_header: String,
}

impl Default for LicenseServerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            auth_token: None,
            base_url_override: None,
            session_token: SessionTokenChannel::default(),
            echo_header: "x-dt-csl-token".into(),
        }
    }
}

impl std::fmt::Debug for LicenseServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseServerConfig")
            .field("timeout_secs", &self.timeout_secs)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("base_url_override", &self.base_url_override)
            .field("session_token", &self.session_token)
            .field("echo_header", &self.echo_header)
            .finish()
    }
}

impl LicenseServerConfig {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Set the request timeout in seconds.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the static auth token.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Point every request at `base_url` instead of the environment host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url_override = Some(base_url.into());
        self
    }

    /// Set the session token channel.
    #[must_use]
    pub fn with_session_token(mut self, channel: SessionTokenChannel) -> Self {
        self.session_token = channel;
        self
    }

    /// Set the header used to echo the session token.
    #[must_use]
    pub fn with_echo_header(mut self, header: impl Into<String>) -> Self {
        self.echo_header = header.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = LicenseServerConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.auth_token.is_none());
        assert!(config.base_url_override.is_none());
        assert_eq!(config.echo_header, "x-dt-csl-token");
        assert!(matches!(
            config.session_token,
            SessionTokenChannel::Headers { .. }
        ));
    }

    #[test]
    fn builder_methods() {
        let config = LicenseServerConfig::default()
            .with_timeout_secs(5)
            .with_auth_token("upfront")
            .with_base_url("http://127.0.0.1:9000")
            .with_session_token(SessionTokenChannel::Disabled)
            .with_echo_header("x-csl");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.auth_token.as_deref(), Some("upfront"));
        assert_eq!(
            config.base_url_override.as_deref(),
            Some("http://127.0.0.1:9000")
        );
        assert_eq!(config.session_token, SessionTokenChannel::Disabled);
        assert_eq!(config.echo_header, "x-csl");
    }

    #[test]
    fn debug_redacts_auth_token() {
        let config = LicenseServerConfig::default().with_auth_token("super-secret-token");
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret-token"));
    }

    #[test]
    fn session_token_channel_serde() {
        let channel = SessionTokenChannel::JsonBody {
            ckc_field: "ckc".into(),
            token_field: "csl".into(),
            renewal_field: "renew".into(),
        };
        let json = serde_json::to_string(&channel).unwrap();
        assert!(json.contains("\"type\":\"json_body\""));
        let back: SessionTokenChannel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, channel);

        let disabled: SessionTokenChannel = serde_json::from_str(r#"{"type":"disabled"}"#).unwrap();
        assert_eq!(disabled, SessionTokenChannel::Disabled);
    }
}

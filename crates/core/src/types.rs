use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! newtype_string {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Return the inner string as a str slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(StreamName, "Human-readable name of a protected stream.");
newtype_string!(
    PlaylistUrl,
    "URL of a stream's HLS playlist. Doubles as the in-flight request key."
);

/// Rotating session credential returned by the license server.
///
/// `Debug` output is redacted; use [`SessionToken::as_str`] when the value
/// is actually needed on the wire.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a token string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Return the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionToken").field(&"[REDACTED]").finish()
    }
}

impl From<&str> for SessionToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display_and_deref() {
        let url = PlaylistUrl::new("https://cdn.example.com/a.m3u8");
        assert_eq!(url.to_string(), "https://cdn.example.com/a.m3u8");
        assert!(url.ends_with(".m3u8"));
    }

    #[test]
    fn newtype_serializes_transparently() {
        let name = StreamName::from("Big Buck Bunny");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"Big Buck Bunny\"");
    }

    #[test]
    fn session_token_debug_is_redacted() {
        let token = SessionToken::new("tok-secret-value");
        let debug = format!("{token:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("tok-secret-value"));
        assert_eq!(token.as_str(), "tok-secret-value");
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Reason the playback engine gives when asking whether to retry a key
/// request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryReason {
    /// The key response was not set soon enough.
    TimedOut,
    /// A response with an expired lease was set on the previous request.
    ReceivedResponseWithExpiredLease,
    /// An obsolete key response was set on the previous request.
    ReceivedObsoleteContentKey,
    /// Any reason this crate does not know about.
    Other(String),
}

impl RetryReason {
    /// Whether a key request failing for this reason should be restarted.
    #[must_use]
    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            Self::TimedOut | Self::ReceivedResponseWithExpiredLease | Self::ReceivedObsoleteContentKey
        )
    }

    /// Return a string representation of the reason.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::TimedOut => "timed_out",
            Self::ReceivedResponseWithExpiredLease => "received_response_with_expired_lease",
            Self::ReceivedObsoleteContentKey => "received_obsolete_content_key",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetryReason {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timed_out" => Ok(Self::TimedOut),
            "received_response_with_expired_lease" => Ok(Self::ReceivedResponseWithExpiredLease),
            "received_obsolete_content_key" => Ok(Self::ReceivedObsoleteContentKey),
            other if !other.is_empty() => Ok(Self::Other(other.to_owned())),
            _ => Err(CoreError::UnknownRetryReason(s.to_owned())),
        }
    }
}

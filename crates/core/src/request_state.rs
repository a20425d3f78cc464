//! Lifecycle states of a single content key request.
//!
//! A request moves strictly forward:
//! `Received -> ResolvingStream -> AwaitingCertificate ->
//! AwaitingKeyExchangePayload -> AwaitingLicense -> [Persisting] -> Responded`.
//! Any non-terminal state may jump straight to a failed `Responded`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a key request in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRequestState {
    Received,
    ResolvingStream,
    AwaitingCertificate,
    AwaitingKeyExchangePayload,
    AwaitingLicense,
    Persisting,
    Responded { success: bool },
}

impl KeyRequestState {
    /// Whether no further transitions are possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Responded { .. })
    }

    /// Check if moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use KeyRequestState::{
            AwaitingCertificate, AwaitingKeyExchangePayload, AwaitingLicense, Persisting,
            Received, ResolvingStream, Responded,
        };

        if self.is_terminal() {
            return false;
        }
        if next == (Responded { success: false }) {
            return true;
        }
        matches!(
            (self, next),
            (Received, ResolvingStream)
                | (ResolvingStream, AwaitingCertificate)
                | (AwaitingCertificate, AwaitingKeyExchangePayload)
                | (AwaitingKeyExchangePayload, AwaitingLicense)
                | (AwaitingLicense, Persisting | Responded { success: true })
                | (Persisting, Responded { success: true })
        )
    }

    /// Return a string representation of the state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::ResolvingStream => "resolving_stream",
            Self::AwaitingCertificate => "awaiting_certificate",
            Self::AwaitingKeyExchangePayload => "awaiting_key_exchange_payload",
            Self::AwaitingLicense => "awaiting_license",
            Self::Persisting => "persisting",
            Self::Responded { success: true } => "responded",
            Self::Responded { success: false } => "failed",
        }
    }
}

impl fmt::Display for KeyRequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

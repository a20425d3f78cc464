use std::time::Duration;

use fairkey_core::SessionToken;
use parking_lot::RwLock;

/// The latest session token and renewal interval, as of one moment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSnapshot {
    pub token: Option<SessionToken>,
    pub renewal_interval: Option<Duration>,
}

/// Process-wide rotating session token.
///
/// Shared by every stream. Each completed license exchange overwrites both
/// values, so concurrent exchanges resolve as last writer wins.
#[derive(Debug, Default)]
pub struct TokenState {
    inner: RwLock<TokenSnapshot>,
}

impl TokenState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the token and renewal interval with the values from the most
    /// recent license response.
    pub fn update(&self, token: Option<SessionToken>, renewal_interval: Option<Duration>) {
        let mut guard = self.inner.write();
        guard.token = token;
        guard.renewal_interval = renewal_interval;
    }

    /// Current values, for the next license request.
    pub fn snapshot(&self) -> TokenSnapshot {
        self.inner.read().clone()
    }
}

use fairkey_core::{ContentKeyId, KeyRequestState, RetryReason, StreamDescriptor};
use tracing::warn;

/// State carried by one content key request from arrival to response.
#[derive(Debug, Clone)]
pub struct KeyRequestContext {
    pub key_id: ContentKeyId,
    /// The catalog stream owning the key, if one was found.
    pub stream: Option<StreamDescriptor>,
    pub persistable: bool,
    /// Whether this request was started by a renewal timer.
    pub renewal: bool,
    /// Why the playback engine restarted this request, if it did.
    pub retry_reason: Option<RetryReason>,
    state: KeyRequestState,
}

impl KeyRequestContext {
    pub fn new(key_id: ContentKeyId) -> Self {
        Self {
            key_id,
            stream: None,
            persistable: false,
            renewal: false,
            retry_reason: None,
            state: KeyRequestState::Received,
        }
    }

    #[must_use]
    pub fn with_renewal(mut self, renewal: bool) -> Self {
        self.renewal = renewal;
        self
    }

    #[must_use]
    pub fn with_retry_reason(mut self, reason: Option<RetryReason>) -> Self {
        self.retry_reason = reason;
        self
    }

    pub fn state(&self) -> KeyRequestState {
        self.state
    }

    pub fn identifier(&self) -> &str {
        self.key_id.as_str()
    }

    /// Move to `next`. Illegal transitions are logged and ignored.
    pub fn advance(&mut self, next: KeyRequestState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            warn!(
                identifier = %self.key_id,
                from = %self.state,
                to = %next,
                "ignoring illegal key request transition"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> KeyRequestContext {
        KeyRequestContext::new(ContentKeyId::parse("skd://asset123").unwrap())
    }

    #[test]
    fn starts_received() {
        let ctx = context();
        assert_eq!(ctx.state(), KeyRequestState::Received);
        assert_eq!(ctx.identifier(), "skd://asset123");
        assert!(!ctx.renewal);
        assert!(ctx.stream.is_none());
    }

    #[test]
    fn advance_follows_legal_path() {
        let mut ctx = context();
        assert!(ctx.advance(KeyRequestState::ResolvingStream));
        assert!(ctx.advance(KeyRequestState::AwaitingCertificate));
        assert!(!ctx.advance(KeyRequestState::Persisting));
        assert_eq!(ctx.state(), KeyRequestState::AwaitingCertificate);
        assert!(ctx.advance(KeyRequestState::Responded { success: false }));
        assert!(ctx.state().is_terminal());
    }

    #[test]
    fn builders_record_origin() {
        let ctx = context()
            .with_renewal(true)
            .with_retry_reason(Some(RetryReason::TimedOut));
        assert!(ctx.renewal);
        assert_eq!(ctx.retry_reason, Some(RetryReason::TimedOut));
    }
}

//! The content key request state machine.
//!
//! Each request runs `Received -> ResolvingStream -> AwaitingCertificate ->
//! AwaitingKeyExchangePayload -> AwaitingLicense -> [Persisting] ->
//! Responded`. Requests are independent tasks; they share only the
//! certificate cache, the session token, the persisted key store and the
//! license server's in-flight guard.

use std::sync::{Arc, Weak};

use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use fairkey_core::{
    AssetId, ContentKeyId, KeyRequestState, RetryReason, StreamDescriptor, StreamName,
};
use fairkey_license::{LicenseError, LicenseServerClient, LicenseService};
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use crate::catalog::{Catalog, StaticCatalog};
use crate::certificate::CertificateCache;
use crate::config::{FairkeyConfig, KeyRequestConfig};
use crate::context::KeyRequestContext;
use crate::error::KeyRequestError;
use crate::playback::{PlaybackError, PlaybackSession};
use crate::renewal::RenewalScheduler;
use crate::store::PersistedKeyStore;
use crate::token::TokenState;

/// Answers content key requests from a [`PlaybackSession`].
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ContentKeyRequestHandler {
    inner: Arc<Inner>,
}

struct Inner {
    keys: KeyRequestConfig,
    catalog: Arc<dyn Catalog>,
    session: Arc<dyn PlaybackSession>,
    license: Arc<dyn LicenseService>,
    certificates: Arc<CertificateCache>,
    tokens: Arc<TokenState>,
    store: Arc<PersistedKeyStore>,
    pending_persistable: DashSet<AssetId>,
    stream_names: DashMap<AssetId, StreamName>,
    renewals: RenewalScheduler,
    tasks: TaskTracker,
}

impl ContentKeyRequestHandler {
    /// Start building a handler.
    pub fn builder() -> HandlerBuilder {
        HandlerBuilder::new()
    }

    /// Process one key request to completion.
    ///
    /// On any failure after the identifier has been parsed, the failure is
    /// delivered to the playback session before it is returned here. An
    /// unparseable identifier is dropped without a delivery.
    pub async fn handle_key_request(&self, identifier: &str) -> Result<(), KeyRequestError> {
        self.inner.process(identifier, false, None).await
    }

    /// Process a renewal of a key delivered earlier. Identical to
    /// [`handle_key_request`](Self::handle_key_request) apart from how the
    /// request is recorded.
    pub async fn handle_renewing_request(&self, identifier: &str) -> Result<(), KeyRequestError> {
        self.inner.process(identifier, true, None).await
    }

    /// Process a key request on its own task.
    pub fn spawn_key_request(&self, identifier: &str) -> JoinHandle<Result<(), KeyRequestError>> {
        self.inner.spawn_process(identifier.to_owned(), false, None)
    }

    /// Whether a request that failed for `reason` should be started again.
    pub fn should_retry(&self, reason: &RetryReason) -> bool {
        let retry = reason.should_retry();
        if !retry {
            warn!(reason = %reason, "not retrying key request");
        }
        retry
    }

    /// Restart the request for `identifier` if `reason` allows it. Returns
    /// whether a new attempt was started.
    pub fn retry_key_request(&self, identifier: &str, reason: RetryReason) -> bool {
        if !self.should_retry(&reason) {
            return false;
        }
        info!(identifier, reason = %reason, "retrying key request");
        drop(
            self.inner
                .spawn_process(identifier.to_owned(), false, Some(reason)),
        );
        true
    }

    /// Request persistable keys for every content key of `stream`.
    ///
    /// Each parsable identifier is marked pending-persistable and processed
    /// on its own task. Unparseable identifiers are skipped.
    pub fn preload_persistable_keys(
        &self,
        stream: &StreamDescriptor,
    ) -> Vec<JoinHandle<Result<(), KeyRequestError>>> {
        stream
            .content_keys()
            .iter()
            .filter_map(|identifier| match ContentKeyId::parse(identifier) {
                Ok(key_id) => Some(key_id),
                Err(e) => {
                    warn!(stream = %stream.name, error = %e, "skipping content key");
                    None
                }
            })
            .map(|key_id| {
                let asset_id = key_id.asset_id();
                self.inner.pending_persistable.insert(asset_id);
                self.inner.stream_names.insert(asset_id, stream.name.clone());
                self.inner.store.register(key_id.as_str(), stream.name.clone());
                debug!(identifier = %key_id, %asset_id, "preloading persistable key");
                self.inner.spawn_process(key_id.as_str().to_owned(), false, None)
            })
            .collect()
    }

    /// Record a failure the playback engine reports for a request it had
    /// already been answered for.
    pub fn on_request_failed(&self, identifier: &str, error: &dyn std::error::Error) {
        error!(identifier, error = %error, "key request failed in playback engine");
    }

    /// Cancel the pending renewal for `identifier`, e.g. when its session is
    /// torn down. Returns whether one was pending.
    pub fn cancel_renewal(&self, identifier: &str) -> bool {
        self.inner.renewals.cancel(identifier)
    }

    /// Cancel every pending renewal and wait for in-flight requests and
    /// renewals started through this handler to finish.
    ///
    /// No renewal is scheduled afterwards, including by requests that were
    /// still running when this was called.
    pub async fn shutdown(&self) {
        self.inner.tasks.close();
        self.inner.renewals.cancel_all();
        self.inner.tasks.wait().await;
        self.inner.renewals.cancel_all();
        info!("key request handler shutdown complete");
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.tasks.is_closed()
    }

    /// Whether a renewal is pending for `identifier`.
    pub fn is_renewal_scheduled(&self, identifier: &str) -> bool {
        self.inner.renewals.is_scheduled(identifier)
    }

    /// Whether the key for `identifier` is waiting to be delivered as a
    /// persistable key.
    pub fn is_pending_persistable(&self, identifier: &str) -> bool {
        self.inner
            .pending_persistable
            .contains(&AssetId::derive(identifier))
    }

    /// Name of the stream owning `identifier`, once it has been resolved.
    pub fn stream_name_for(&self, identifier: &str) -> Option<StreamName> {
        self.inner
            .stream_names
            .get(&AssetId::derive(identifier))
            .map(|name| name.value().clone())
    }

    pub fn certificates(&self) -> &CertificateCache {
        &self.inner.certificates
    }

    pub fn tokens(&self) -> &TokenState {
        &self.inner.tokens
    }

    pub fn store(&self) -> &PersistedKeyStore {
        &self.inner.store
    }
}

impl std::fmt::Debug for ContentKeyRequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentKeyRequestHandler")
            .field("keys", &self.inner.keys)
            .field("store", &self.inner.store.dir())
            .field("pending_persistable", &self.inner.pending_persistable.len())
            .field("renewals", &self.inner.renewals.len())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn spawn_process(
        self: &Arc<Self>,
        identifier: String,
        renewal: bool,
        retry_reason: Option<RetryReason>,
    ) -> JoinHandle<Result<(), KeyRequestError>> {
        let inner = Arc::clone(self);
        self.tasks
            .spawn(async move { inner.process(&identifier, renewal, retry_reason).await })
    }

    #[instrument(skip(self, retry_reason), fields(retry = ?retry_reason))]
    async fn process(
        self: &Arc<Self>,
        identifier: &str,
        renewal: bool,
        retry_reason: Option<RetryReason>,
    ) -> Result<(), KeyRequestError> {
        let key_id = ContentKeyId::parse(identifier).map_err(|e| {
            error!(error = %e, "dropping key request");
            KeyRequestError::UnparseableIdentifier(e)
        })?;
        let mut ctx = KeyRequestContext::new(key_id)
            .with_renewal(renewal)
            .with_retry_reason(retry_reason);

        match self.run(&mut ctx).await {
            Ok(key) => {
                ctx.advance(KeyRequestState::Responded { success: true });
                self.session.deliver_key_response(identifier, key).await;
                self.pending_persistable.remove(&ctx.key_id.asset_id());
                self.schedule_renewal(identifier);
                debug!(persistable = ctx.persistable, "key response delivered");
                Ok(())
            }
            Err(e) => {
                ctx.advance(KeyRequestState::Responded { success: false });
                if e.is_duplicate() {
                    warn!(error = %e, "key request overlapped an in-flight request");
                } else {
                    error!(error = %e, state = %ctx.state(), "key request failed");
                }
                self.session.deliver_failure(identifier, &e).await;
                Err(e)
            }
        }
    }

    async fn run(&self, ctx: &mut KeyRequestContext) -> Result<Bytes, KeyRequestError> {
        ctx.advance(KeyRequestState::ResolvingStream);
        ctx.stream = self.resolve_stream(&ctx.key_id);
        ctx.persistable = self.wants_persistable(&ctx.key_id);

        ctx.advance(KeyRequestState::AwaitingCertificate);
        let certificate = self
            .certificates
            .get_or_fetch(self.license.as_ref(), ctx.stream.as_ref(), None)
            .await
            .map_err(KeyRequestError::MissingApplicationCertificate)?;

        ctx.advance(KeyRequestState::AwaitingKeyExchangePayload);
        let spc = self.key_exchange_payload(ctx, &certificate).await?;

        ctx.advance(KeyRequestState::AwaitingLicense);
        let stream = ctx.stream.as_ref().ok_or_else(|| {
            KeyRequestError::NoCkcReturned(LicenseError::Configuration(format!(
                "no stream lists content key {}",
                ctx.key_id
            )))
        })?;
        let snapshot = self.tokens.snapshot();
        let license = self
            .license
            .fetch_license(stream, &spc, None, ctx.persistable, snapshot.token.as_ref())
            .await
            .map_err(KeyRequestError::NoCkcReturned)?;
        let stream_name = stream.name.clone();
        self.tokens
            .update(license.session_token, license.renewal_interval);

        if !ctx.persistable {
            return Ok(license.ckc);
        }

        ctx.advance(KeyRequestState::Persisting);
        let key = self
            .session
            .make_persistable_key(ctx.identifier(), license.ckc)
            .await?;
        match self.store.write(&stream_name, true, key.clone()).await {
            Ok(path) => debug!(path = %path.display(), "persistable key stored"),
            Err(e) => warn!(error = %e, "persistable key not stored"),
        }
        Ok(key)
    }

    fn resolve_stream(&self, key_id: &ContentKeyId) -> Option<StreamDescriptor> {
        let stream = self.catalog.find_by_content_key(key_id.as_str());
        match &stream {
            Some(stream) => {
                self.stream_names
                    .insert(key_id.asset_id(), stream.name.clone());
                self.store.register(key_id.as_str(), stream.name.clone());
                debug!(stream = %stream.name, asset_id = %key_id.asset_id(), "stream resolved");
            }
            None => warn!(identifier = %key_id, "no stream in catalog lists this content key"),
        }
        stream
    }

    fn wants_persistable(&self, key_id: &ContentKeyId) -> bool {
        self.keys.prefer_persistable
            || self.session.prefers_persistable(key_id.as_str())
            || self.pending_persistable.contains(&key_id.asset_id())
            || self.store.exists(key_id.as_str())
    }

    /// Ask the playback session for an SPC, falling back to an online key if
    /// it refuses a persistable one.
    async fn key_exchange_payload(
        &self,
        ctx: &mut KeyRequestContext,
        certificate: &[u8],
    ) -> Result<Bytes, KeyRequestError> {
        let identifier = ctx.key_id.as_str();
        let content_identifier = ctx.key_id.content_identifier();
        match self
            .session
            .produce_key_exchange_payload(identifier, certificate, content_identifier, ctx.persistable)
            .await
        {
            Ok(spc) => Ok(spc),
            Err(PlaybackError::PersistableUnsupported(reason)) if ctx.persistable => {
                warn!(%reason, "persistable key refused, falling back to online key");
                let spc = self
                    .session
                    .produce_key_exchange_payload(identifier, certificate, content_identifier, false)
                    .await?;
                ctx.persistable = false;
                Ok(spc)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn schedule_renewal(self: &Arc<Self>, identifier: &str) {
        if !self.keys.renewal_enabled || self.tasks.is_closed() {
            return;
        }
        let Some(interval) = self.tokens.snapshot().renewal_interval else {
            return;
        };
        if interval.is_zero() {
            return;
        }
        self.renewals.schedule(
            identifier,
            interval,
            renewal_task(Arc::downgrade(self), identifier.to_owned()),
        );
        // Shutdown may have cancelled everything between the check above and
        // the insert.
        if self.tasks.is_closed() {
            self.renewals.cancel(identifier);
        }
    }
}

fn renewal_task(inner: Weak<Inner>, identifier: String) -> BoxFuture<'static, ()> {
    async move {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if inner.tasks.is_closed() {
            debug!(identifier, "handler shut down, skipping renewal");
            return;
        }
        inner.session.request_renewal(&identifier).await;
        if let Err(e) = inner.process(&identifier, true, None).await {
            debug!(identifier, error = %e, "renewal did not produce a key");
        }
    }
    .boxed()
}

/// Fluent builder for [`ContentKeyRequestHandler`].
///
/// Only the playback session is required. Without an explicit license
/// service a [`LicenseServerClient`] is built from the configuration; the
/// certificate cache, token state and key store default to fresh instances.
#[derive(Default)]
pub struct HandlerBuilder {
    config: FairkeyConfig,
    catalog: Option<Arc<dyn Catalog>>,
    session: Option<Arc<dyn PlaybackSession>>,
    license: Option<Arc<dyn LicenseService>>,
    certificates: Option<Arc<CertificateCache>>,
    tokens: Option<Arc<TokenState>>,
    store: Option<Arc<PersistedKeyStore>>,
}

impl HandlerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn config(mut self, config: FairkeyConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    #[must_use]
    pub fn session(mut self, session: Arc<dyn PlaybackSession>) -> Self {
        self.session = Some(session);
        self
    }

    /// Use `license` instead of a client built from the configuration.
    #[must_use]
    pub fn license_service(mut self, license: Arc<dyn LicenseService>) -> Self {
        self.license = Some(license);
        self
    }

    /// Share a certificate cache with other handlers.
    #[must_use]
    pub fn certificates(mut self, certificates: Arc<CertificateCache>) -> Self {
        self.certificates = Some(certificates);
        self
    }

    /// Share token state with other handlers.
    #[must_use]
    pub fn tokens(mut self, tokens: Arc<TokenState>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<PersistedKeyStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the handler.
    pub fn build(self) -> Result<ContentKeyRequestHandler, KeyRequestError> {
        let session = self
            .session
            .ok_or_else(|| KeyRequestError::Config("playback session is required".into()))?;

        let license = match self.license {
            Some(license) => license,
            None => {
                let client = LicenseServerClient::new(self.config.license.clone())
                    .map_err(|e| KeyRequestError::Config(e.to_string()))?;
                Arc::new(client) as Arc<dyn LicenseService>
            }
        };

        let tasks = TaskTracker::new();
        let store = self.store.unwrap_or_else(|| {
            Arc::new(PersistedKeyStore::new(
                self.config.storage.documents_dir.clone(),
            ))
        });

        Ok(ContentKeyRequestHandler {
            inner: Arc::new(Inner {
                keys: self.config.keys,
                catalog: self
                    .catalog
                    .unwrap_or_else(|| Arc::new(StaticCatalog::default())),
                session,
                license,
                certificates: self.certificates.unwrap_or_default(),
                tokens: self.tokens.unwrap_or_default(),
                store,
                pending_persistable: DashSet::new(),
                stream_names: DashMap::new(),
                renewals: RenewalScheduler::with_tracker(tasks.clone()),
                tasks,
            }),
        })
    }
}

//! Test doubles for the playback engine and the license server.
//!
//! [`ScriptedSession`] fabricates key exchange payloads immediately and
//! records everything the handler delivers. [`FakeLicenseServer`] answers
//! certificate and license requests from memory while enforcing the same
//! one-request-per-stream rule as the real client.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use fairkey_core::{SessionToken, StreamDescriptor, StreamName};
use fairkey_license::{LicenseError, LicenseResponse, LicenseService, RequestDeduplicator};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::KeyRequestError;
use crate::playback::{PlaybackError, PlaybackSession};

/// One call to [`PlaybackSession::produce_key_exchange_payload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadCall {
    pub identifier: String,
    pub certificate: Bytes,
    pub content_identifier: Vec<u8>,
    pub persistable: bool,
}

/// A playback session that answers synchronously and records deliveries.
#[derive(Debug)]
pub struct ScriptedSession {
    prefers_persistable: bool,
    reject_persistable: bool,
    fail_payload: bool,
    payload_calls: Mutex<Vec<PayloadCall>>,
    responses: Mutex<Vec<(String, Bytes)>>,
    failures: Mutex<Vec<(String, String)>>,
    renewals: Mutex<Vec<String>>,
    deliveries: watch::Sender<usize>,
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self {
            prefers_persistable: false,
            reject_persistable: false,
            fail_payload: false,
            payload_calls: Mutex::new(Vec::new()),
            responses: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            renewals: Mutex::new(Vec::new()),
            deliveries: watch::channel(0).0,
        }
    }

    /// Ask for persistable keys for every identifier.
    #[must_use]
    pub fn prefers_persistable(mut self) -> Self {
        self.prefers_persistable = true;
        self
    }

    /// Refuse persistable payloads, as a mirrored session does.
    #[must_use]
    pub fn reject_persistable(mut self) -> Self {
        self.reject_persistable = true;
        self
    }

    /// Fail every payload request.
    #[must_use]
    pub fn fail_payload(mut self) -> Self {
        self.fail_payload = true;
        self
    }

    /// The payload an identifier is answered with.
    pub fn payload_for(identifier: &str) -> Bytes {
        Bytes::from(format!("spc:{identifier}"))
    }

    pub fn payload_calls(&self) -> Vec<PayloadCall> {
        self.payload_calls.lock().clone()
    }

    /// Delivered keys as `(identifier, key)`.
    pub fn responses(&self) -> Vec<(String, Bytes)> {
        self.responses.lock().clone()
    }

    /// Delivered failures as `(identifier, error message)`.
    pub fn failures(&self) -> Vec<(String, String)> {
        self.failures.lock().clone()
    }

    /// Identifiers for which a renewal was requested, in order.
    pub fn renewals(&self) -> Vec<String> {
        self.renewals.lock().clone()
    }

    /// Wait until at least `count` responses or failures have been delivered.
    pub async fn wait_for_deliveries(&self, count: usize) {
        let mut rx = self.deliveries.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|delivered| *delivered >= count).await;
    }

    fn delivered(&self) {
        self.deliveries.send_modify(|count| *count += 1);
    }
}

#[async_trait]
impl PlaybackSession for ScriptedSession {
    fn prefers_persistable(&self, _identifier: &str) -> bool {
        self.prefers_persistable
    }

    async fn produce_key_exchange_payload(
        &self,
        identifier: &str,
        certificate: &[u8],
        content_identifier: &[u8],
        persistable: bool,
    ) -> Result<Bytes, PlaybackError> {
        self.payload_calls.lock().push(PayloadCall {
            identifier: identifier.to_owned(),
            certificate: Bytes::copy_from_slice(certificate),
            content_identifier: content_identifier.to_vec(),
            persistable,
        });
        if self.fail_payload {
            return Err(PlaybackError::KeyExchange("scripted failure".into()));
        }
        if persistable && self.reject_persistable {
            return Err(PlaybackError::PersistableUnsupported(
                "external display attached".into(),
            ));
        }
        Ok(Self::payload_for(identifier))
    }

    async fn deliver_key_response(&self, identifier: &str, key: Bytes) {
        self.responses.lock().push((identifier.to_owned(), key));
        self.delivered();
    }

    async fn deliver_failure(&self, identifier: &str, error: &KeyRequestError) {
        self.failures
            .lock()
            .push((identifier.to_owned(), error.to_string()));
        self.delivered();
    }

    async fn request_renewal(&self, identifier: &str) {
        self.renewals.lock().push(identifier.to_owned());
    }
}

/// One license request seen by [`FakeLicenseServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseCall {
    pub stream: StreamName,
    pub spc: Bytes,
    pub offline: bool,
    pub csl_token: Option<SessionToken>,
}

/// An in-memory license server.
#[derive(Debug)]
pub struct FakeLicenseServer {
    certificate: Bytes,
    response: LicenseResponse,
    delay: Option<Duration>,
    certificate_failures: AtomicUsize,
    fail_licenses: AtomicBool,
    certificate_calls: AtomicUsize,
    license_calls: Mutex<Vec<LicenseCall>>,
    in_flight: RequestDeduplicator,
}

impl Default for FakeLicenseServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeLicenseServer {
    pub fn new() -> Self {
        Self {
            certificate: Bytes::from_static(b"fake-certificate"),
            response: LicenseResponse {
                ckc: Bytes::from_static(b"fake-ckc"),
                session_token: None,
                renewal_interval: None,
            },
            delay: None,
            certificate_failures: AtomicUsize::new(0),
            fail_licenses: AtomicBool::new(false),
            certificate_calls: AtomicUsize::new(0),
            license_calls: Mutex::new(Vec::new()),
            in_flight: RequestDeduplicator::new(),
        }
    }

    #[must_use]
    pub fn with_certificate(mut self, certificate: impl Into<Bytes>) -> Self {
        self.certificate = certificate.into();
        self
    }

    /// Answer every license request with `response`.
    #[must_use]
    pub fn with_license_response(mut self, response: LicenseResponse) -> Self {
        self.response = response;
        self
    }

    /// Hold every request in flight for `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer the next certificate request with a 500.
    #[must_use]
    pub fn fail_certificate_once(self) -> Self {
        self.certificate_failures.store(1, Ordering::SeqCst);
        self
    }

    /// Answer every license request with a 500.
    #[must_use]
    pub fn fail_licenses(self) -> Self {
        self.fail_licenses.store(true, Ordering::SeqCst);
        self
    }

    pub fn ckc(&self) -> Bytes {
        self.response.ckc.clone()
    }

    pub fn certificate_calls(&self) -> usize {
        self.certificate_calls.load(Ordering::SeqCst)
    }

    pub fn license_calls(&self) -> Vec<LicenseCall> {
        self.license_calls.lock().clone()
    }

    async fn hold(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn server_error() -> LicenseError {
        LicenseError::Server {
            status: 500,
            body: "scripted failure".into(),
        }
    }
}

#[async_trait]
impl LicenseService for FakeLicenseServer {
    async fn fetch_certificate(
        &self,
        stream: &StreamDescriptor,
        _token: Option<&str>,
    ) -> Result<Bytes, LicenseError> {
        let _guard = self
            .in_flight
            .acquire(&stream.playlist_url)
            .ok_or_else(|| LicenseError::DuplicateRequest(stream.playlist_url.to_string()))?;
        self.certificate_calls.fetch_add(1, Ordering::SeqCst);
        self.hold().await;

        let failing = self
            .certificate_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Self::server_error());
        }
        Ok(self.certificate.clone())
    }

    async fn fetch_license(
        &self,
        stream: &StreamDescriptor,
        spc: &[u8],
        _token: Option<&str>,
        offline: bool,
        csl_token: Option<&SessionToken>,
    ) -> Result<LicenseResponse, LicenseError> {
        let _guard = self
            .in_flight
            .acquire(&stream.playlist_url)
            .ok_or_else(|| LicenseError::DuplicateRequest(stream.playlist_url.to_string()))?;
        self.license_calls.lock().push(LicenseCall {
            stream: stream.name.clone(),
            spc: Bytes::copy_from_slice(spc),
            offline,
            csl_token: csl_token.cloned(),
        });
        self.hold().await;

        if self.fail_licenses.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }
        Ok(self.response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_session_records_calls() {
        let session = ScriptedSession::new().reject_persistable();
        let err = session
            .produce_key_exchange_payload("skd://a", b"cert", b"skd://a", true)
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::PersistableUnsupported(_)));

        let spc = session
            .produce_key_exchange_payload("skd://a", b"cert", b"skd://a", false)
            .await
            .unwrap();
        assert_eq!(spc, ScriptedSession::payload_for("skd://a"));
        assert_eq!(session.payload_calls().len(), 2);

        session
            .deliver_key_response("skd://a", Bytes::from_static(b"k"))
            .await;
        session.wait_for_deliveries(1).await;
        assert_eq!(session.responses().len(), 1);
    }

    #[tokio::test]
    async fn fake_server_rejects_overlapping_requests() {
        let server = FakeLicenseServer::new().with_delay(Duration::from_millis(20));
        let stream = StreamDescriptor::new("s", "https://cdn/s.m3u8", true);

        let (a, b) = tokio::join!(
            server.fetch_license(&stream, b"spc", None, false, None),
            server.fetch_license(&stream, b"spc", None, false, None)
        );
        assert!(a.is_ok());
        assert!(matches!(b, Err(LicenseError::DuplicateRequest(_))));
        assert_eq!(server.license_calls().len(), 1);
    }
}

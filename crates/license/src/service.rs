use async_trait::async_trait;
use bytes::Bytes;
use fairkey_core::{SessionToken, StreamDescriptor};

use crate::client::LicenseServerClient;
use crate::error::LicenseError;
use crate::response::LicenseResponse;

/// Object-safe view of a license server, for use behind
/// `Arc<dyn LicenseService>`.
///
/// [`LicenseServerClient`] is the production implementation; tests swap in
/// fakes that never touch the network.
#[async_trait]
pub trait LicenseService: Send + Sync {
    /// Fetch the application certificate for `stream`.
    async fn fetch_certificate(
        &self,
        stream: &StreamDescriptor,
        token: Option<&str>,
    ) -> Result<Bytes, LicenseError>;

    /// Exchange an SPC for a CKC.
    async fn fetch_license(
        &self,
        stream: &StreamDescriptor,
        spc: &[u8],
        token: Option<&str>,
        offline: bool,
        csl_token: Option<&SessionToken>,
    ) -> Result<LicenseResponse, LicenseError>;
}

#[async_trait]
impl LicenseService for LicenseServerClient {
    async fn fetch_certificate(
        &self,
        stream: &StreamDescriptor,
        token: Option<&str>,
    ) -> Result<Bytes, LicenseError> {
        LicenseServerClient::fetch_certificate(self, stream, token).await
    }

    async fn fetch_license(
        &self,
        stream: &StreamDescriptor,
        spc: &[u8],
        token: Option<&str>,
        offline: bool,
        csl_token: Option<&SessionToken>,
    ) -> Result<LicenseResponse, LicenseError> {
        LicenseServerClient::fetch_license(self, stream, spc, token, offline, csl_token).await
    }
}

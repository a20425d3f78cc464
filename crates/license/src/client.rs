use bytes::Bytes;
use fairkey_core::{SessionToken, StreamDescriptor};
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{Client, RequestBuilder, Url};
use tracing::{debug, instrument, warn};

use crate::config::LicenseServerConfig;
use crate::dedup::{InFlightGuard, RequestDeduplicator};
use crate::encoding::{custom_data, license_form_body};
use crate::endpoint::Endpoints;
use crate::error::LicenseError;
use crate::response::LicenseResponse;

const AUTH_TOKEN_HEADER: &str = "x-dt-auth-token";
const CUSTOM_DATA_HEADER: &str = "x-dt-custom-data";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// HTTP client for the FairPlay license server.
///
/// Stateless per call apart from the shared [`RequestDeduplicator`]: each
/// certificate or license request holds the stream's playlist URL for its
/// whole network round trip, so a concurrent request for the same stream
/// fails with [`LicenseError::DuplicateRequest`] instead of being sent.
pub struct LicenseServerClient {
    config: LicenseServerConfig,
    client: Client,
    in_flight: RequestDeduplicator,
}

impl LicenseServerClient {
    /// Create a client with a `reqwest::Client` built from `config`.
    pub fn new(config: LicenseServerConfig) -> Result<Self, LicenseError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LicenseError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(config, client))
    }

    /// Create a client around an existing `reqwest::Client`.
    pub fn with_client(config: LicenseServerConfig, client: Client) -> Self {
        Self {
            config,
            client,
            in_flight: RequestDeduplicator::new(),
        }
    }

    /// Share an existing deduplicator instead of the client's own.
    #[must_use]
    pub fn with_deduplicator(mut self, in_flight: RequestDeduplicator) -> Self {
        self.in_flight = in_flight;
        self
    }

    /// The deduplicator guarding this client's requests.
    pub fn deduplicator(&self) -> &RequestDeduplicator {
        &self.in_flight
    }

    /// The client configuration.
    pub fn config(&self) -> &LicenseServerConfig {
        &self.config
    }

    fn endpoints(&self, stream: &StreamDescriptor) -> Endpoints {
        Endpoints::resolve(
            stream.environment_name.as_deref(),
            self.config.base_url_override.as_deref(),
        )
    }

    fn parse_url(&self, url: &str, stream: &StreamDescriptor) -> Result<Url, LicenseError> {
        if url.is_empty() {
            return Err(LicenseError::Configuration(format!(
                "no license server for environment '{}' of stream '{}'",
                stream.environment_name.as_deref().unwrap_or_default(),
                stream.name
            )));
        }
        Url::parse(url).map_err(|e| LicenseError::Configuration(format!("invalid URL {url}: {e}")))
    }

    fn claim(&self, stream: &StreamDescriptor) -> Result<InFlightGuard, LicenseError> {
        self.in_flight.acquire(&stream.playlist_url).ok_or_else(|| {
            warn!(playlist = %stream.playlist_url, "license server request already in flight");
            LicenseError::DuplicateRequest(stream.playlist_url.to_string())
        })
    }

    /// Attach either the upfront auth token or the base64 custom data.
    fn apply_auth(
        &self,
        request: RequestBuilder,
        stream: &StreamDescriptor,
        token: Option<&str>,
    ) -> Result<RequestBuilder, LicenseError> {
        match token.or(self.config.auth_token.as_deref()) {
            Some(token) => Ok(request.header(AUTH_TOKEN_HEADER, token)),
            None => {
                let data = custom_data(stream).map_err(|e| {
                    LicenseError::Configuration(format!("failed to encode custom data: {e}"))
                })?;
                Ok(request.header(CUSTOM_DATA_HEADER, data))
            }
        }
    }

    async fn send(request: RequestBuilder) -> Result<(HeaderMap, Bytes), LicenseError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                warn!("license server request timed out");
            }
            LicenseError::Network(e)
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        debug!(
            status = status.as_u16(),
            body_len = body.len(),
            "license server responded"
        );

        if !status.is_success() {
            return Err(LicenseError::Server {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok((headers, body))
    }

    /// Fetch the application certificate for `stream`.
    #[instrument(skip(self, stream, token), fields(stream = %stream.name))]
    pub async fn fetch_certificate(
        &self,
        stream: &StreamDescriptor,
        token: Option<&str>,
    ) -> Result<Bytes, LicenseError> {
        let url = self.parse_url(&self.endpoints(stream).certificate, stream)?;
        let request = self.apply_auth(self.client.get(url.clone()), stream, token)?;
        let _guard = self.claim(stream)?;

        debug!(%url, "requesting application certificate");
        let (_, body) = Self::send(request).await?;
        if body.is_empty() {
            return Err(LicenseError::EmptyResponse);
        }
        debug!(len = body.len(), "received application certificate");
        Ok(body)
    }

    /// Exchange an SPC for a CKC.
    ///
    /// `offline` requests a persistable license. `csl_token` is the latest
    /// session token, echoed back in the configured header.
    #[instrument(skip(self, stream, spc, token, csl_token), fields(stream = %stream.name))]
    pub async fn fetch_license(
        &self,
        stream: &StreamDescriptor,
        spc: &[u8],
        token: Option<&str>,
        offline: bool,
        csl_token: Option<&SessionToken>,
    ) -> Result<LicenseResponse, LicenseError> {
        let mut url = self.parse_url(&self.endpoints(stream).license, stream)?;
        if offline {
            url.query_pairs_mut().append_pair("offline", "true");
        }

        let body = license_form_body(spc, offline);
        let mut request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body.clone());
        request = self.apply_auth(request, stream, token)?;
        if let Some(csl) = csl_token {
            request = request.header(self.config.echo_header.as_str(), csl.as_str());
        }
        let _guard = self.claim(stream)?;

        debug!(%url, spc_len = spc.len(), body_len = body.len(), "requesting license");
        let (headers, body) = Self::send(request).await?;
        let response = LicenseResponse::decode(&self.config.session_token, &headers, &body)?;
        debug!(
            ckc_len = response.ckc.len(),
            new_token = response.session_token.is_some(),
            renewal_secs = response.renewal_interval.map(|d| d.as_secs()),
            "received license"
        );
        Ok(response)
    }
}

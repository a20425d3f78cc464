use bytes::Bytes;
use fairkey_core::StreamDescriptor;
use fairkey_license::{LicenseError, LicenseService};
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

/// The application certificate, fetched at most once per process.
///
/// Concurrent first callers wait on the same fetch. A failed fetch leaves the
/// cache empty so a later request tries again. Once set, the certificate is
/// never refreshed.
#[derive(Debug, Default)]
pub struct CertificateCache {
    cell: OnceCell<Bytes>,
}

impl CertificateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached certificate, if one has been fetched.
    pub fn get(&self) -> Option<Bytes> {
        self.cell.get().cloned()
    }

    /// Return the cached certificate or fetch it through `service`.
    ///
    /// Without a resolved stream only the cached value can be returned.
    #[instrument(skip_all, fields(stream = stream.map(|s| s.name.as_str())))]
    pub async fn get_or_fetch(
        &self,
        service: &dyn LicenseService,
        stream: Option<&StreamDescriptor>,
        token: Option<&str>,
    ) -> Result<Bytes, LicenseError> {
        if let Some(certificate) = self.cell.get() {
            debug!("application certificate served from cache");
            return Ok(certificate.clone());
        }

        let certificate = self
            .cell
            .get_or_try_init(|| async {
                let stream = stream.ok_or_else(|| {
                    LicenseError::Configuration(
                        "no stream resolved for the application certificate".into(),
                    )
                })?;
                let certificate = service.fetch_certificate(stream, token).await?;
                if certificate.is_empty() {
                    return Err(LicenseError::EmptyResponse);
                }
                Ok::<_, LicenseError>(certificate)
            })
            .await?;
        Ok(certificate.clone())
    }
}

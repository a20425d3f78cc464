//! FairPlay license server client.
//!
//! Builds certificate and license (CKC) requests against the
//! environment-specific license server, encodes authentication as either an
//! upfront token or base64 custom data, and decodes responses including the
//! rotating session token.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use fairkey_core::StreamDescriptor;
//! use fairkey_license::{LicenseServerClient, LicenseServerConfig};
//!
//! # async fn run() -> Result<(), fairkey_license::LicenseError> {
//! let client = LicenseServerClient::new(LicenseServerConfig::default())?;
//! let stream = StreamDescriptor::new("Bunny", "https://cdn.example.com/bunny.m3u8", true)
//!     .with_drm_identity("client_dev", "rental1", "p0")
//!     .with_environment("staging");
//!
//! let certificate = client.fetch_certificate(&stream, None).await?;
//! # let spc = certificate.to_vec();
//! let license = client.fetch_license(&stream, &spc, None, false, None).await?;
//! println!("CKC is {} bytes", license.ckc.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod dedup;
pub mod encoding;
pub mod endpoint;
pub mod error;
pub mod response;
pub mod service;

pub use client::LicenseServerClient;
pub use config::{LicenseServerConfig, SessionTokenChannel};
pub use dedup::{InFlightGuard, RequestDeduplicator};
pub use endpoint::{Endpoints, certificate_url, license_url};
pub use error::LicenseError;
pub use response::LicenseResponse;
pub use service::LicenseService;

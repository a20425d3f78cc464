//! Content key request lifecycle.
//!
//! [`ContentKeyRequestHandler`] receives key requests from a
//! [`PlaybackSession`], resolves each to its catalog stream, obtains the
//! application certificate (once per process), asks the playback engine for
//! a key exchange payload, trades it for a CKC at the license server, stores
//! persistable keys on disk and schedules renewals.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use fairkey_session::testing::ScriptedSession;
//! use fairkey_session::{ContentKeyRequestHandler, FairkeyConfig, StaticCatalog};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FairkeyConfig::load("fairkey.toml")?;
//! let catalog = StaticCatalog::from_file("streams.json")?;
//!
//! let handler = ContentKeyRequestHandler::builder()
//!     .config(config)
//!     .catalog(Arc::new(catalog))
//!     .session(Arc::new(ScriptedSession::new()))
//!     .build()?;
//!
//! handler.handle_key_request("skd://asset123").await?;
//! handler.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod certificate;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod playback;
pub mod renewal;
pub mod store;
pub mod testing;
pub mod token;

pub use catalog::{Catalog, StaticCatalog};
pub use certificate::CertificateCache;
pub use config::{FairkeyConfig, KeyRequestConfig, StorageConfig};
pub use context::KeyRequestContext;
pub use error::KeyRequestError;
pub use handler::{ContentKeyRequestHandler, HandlerBuilder};
pub use playback::{PlaybackError, PlaybackSession};
pub use renewal::RenewalScheduler;
pub use store::PersistedKeyStore;
pub use token::{TokenSnapshot, TokenState};

//! License server URL selection.
//!
//! Environments map onto `lic.<subdomain>drmtoday.com`. An unknown
//! environment yields an empty string, which callers must treat as a
//! configuration error.

use fairkey_core::Environment;

const CERTIFICATE_PATH: &str = "cert/";

fn base_url(environment: &str) -> Option<String> {
    Environment::parse(environment).map(|env| {
        format!(
            "https://lic.{}drmtoday.com/license-server-fairplay",
            env.subdomain()
        )
    })
}

/// Application certificate URL for `environment`, or `""` if unknown.
pub fn certificate_url(environment: &str) -> String {
    base_url(environment)
        .map(|base| format!("{base}/{CERTIFICATE_PATH}"))
        .unwrap_or_default()
}

/// License (CKC) URL for `environment`, or `""` if unknown.
pub fn license_url(environment: &str) -> String {
    base_url(environment)
        .map(|base| format!("{base}/"))
        .unwrap_or_default()
}

/// Resolved certificate and license URLs for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub certificate: String,
    pub license: String,
}

impl Endpoints {
    /// Resolve URLs from an environment name, or from an override base URL
    /// when one is configured.
    pub fn resolve(environment: Option<&str>, base_url_override: Option<&str>) -> Self {
        if let Some(base) = base_url_override {
            let base = base.trim_end_matches('/');
            return Self {
                certificate: format!("{base}/{CERTIFICATE_PATH}"),
                license: format!("{base}/"),
            };
        }
        let environment = environment.unwrap_or_default();
        Self {
            certificate: certificate_url(environment),
            license: license_url(environment),
        }
    }
}

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use fairkey_core::SessionToken;
use reqwest::header::HeaderMap;

use crate::config::SessionTokenChannel;
use crate::error::LicenseError;

/// Decoded license server answer to an SPC.
#[derive(Debug, Clone)]
pub struct LicenseResponse {
    /// Key material (CKC) for the playback engine.
    pub ckc: Bytes,

    /// Replacement session token, if the server issued one.
    pub session_token: Option<SessionToken>,

    /// How long until the license should be renewed.
    pub renewal_interval: Option<Duration>,
}

impl LicenseResponse {
    /// Decode a successful license response according to `channel`.
    pub fn decode(
        channel: &SessionTokenChannel,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Self, LicenseError> {
        match channel {
            SessionTokenChannel::Headers {
                token_header,
                renewal_header,
            } => Ok(Self {
                ckc: decode_ckc(body)?,
                session_token: header_str(headers, token_header).map(SessionToken::new),
                renewal_interval: header_str(headers, renewal_header)
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs),
            }),
            SessionTokenChannel::JsonBody {
                ckc_field,
                token_field,
                renewal_field,
            } => {
                let json: serde_json::Value = serde_json::from_slice(body)
                    .map_err(|e| LicenseError::InvalidResponse(format!("not JSON: {e}")))?;
                let ckc = json
                    .get(ckc_field)
                    .and_then(serde_json::Value::as_str)
                    .ok_or_else(|| {
                        LicenseError::InvalidResponse(format!("missing '{ckc_field}' member"))
                    })?;
                Ok(Self {
                    ckc: decode_ckc(ckc.as_bytes())?,
                    session_token: json
                        .get(token_field)
                        .and_then(serde_json::Value::as_str)
                        .filter(|t| !t.is_empty())
                        .map(SessionToken::new),
                    renewal_interval: json
                        .get(renewal_field)
                        .and_then(json_seconds)
                        .map(Duration::from_secs),
                })
            }
            SessionTokenChannel::Disabled => Ok(Self {
                ckc: decode_ckc(body)?,
                session_token: None,
                renewal_interval: None,
            }),
        }
    }
}

/// The license body is base64 text; the CKC is what it decodes to.
fn decode_ckc(body: &[u8]) -> Result<Bytes, LicenseError> {
    let text = body.trim_ascii();
    if text.is_empty() {
        return Err(LicenseError::EmptyResponse);
    }
    STANDARD
        .decode(text)
        .map(Bytes::from)
        .map_err(|e| LicenseError::InvalidResponse(format!("CKC is not base64: {e}")))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn json_seconds(value: &serde_json::Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

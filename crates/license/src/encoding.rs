//! Request body and header encodings used by the license server protocol.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use fairkey_core::StreamDescriptor;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;

/// Characters escaped in the `spc` form value: everything except ASCII
/// alphanumerics, the RFC 3986 unreserved marks, and `:?=&+`.
///
/// Base64 `+` is therefore sent literally, and a strict form decoder reads it
/// as a space; the license server is expected to decode the value as raw
/// percent-encoding. `/` is escaped as `%2F`.
const SPC_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b':')
    .remove(b'?')
    .remove(b'=')
    .remove(b'&')
    .remove(b'+');

/// Percent-encode a base64 SPC for the form body.
pub fn encode_spc_value(base64: &str) -> String {
    utf8_percent_encode(base64, SPC_ENCODE_SET).to_string()
}

/// Build the URL-form-encoded license request body.
pub fn license_form_body(spc: &[u8], offline: bool) -> String {
    let mut body = format!("spc={}", encode_spc_value(&STANDARD.encode(spc)));
    if offline {
        body.push_str("&offline=true");
    }
    body
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomData<'a> {
    merchant: Option<&'a str>,
    user_id: Option<&'a str>,
    session_id: Option<&'a str>,
}

/// Base64 JSON `{merchant, userId, sessionId}` for the `x-dt-custom-data`
/// header.
pub fn custom_data(stream: &StreamDescriptor) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(&CustomData {
        merchant: stream.merchant.as_deref(),
        user_id: stream.user_id.as_deref(),
        session_id: stream.session_id.as_deref(),
    })?;
    Ok(STANDARD.encode(json))
}

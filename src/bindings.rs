//! HTTP-Redirect encoding of outbound requests and HTTP-POST decoding of the
//! inbound `SAMLResponse` field.

use base64::{prelude::BASE64_STANDARD, Engine};
use deflate::deflate_bytes;

use crate::{utils::decode_xml_base64, SamlError};

/// Raw DEFLATE then base64.
pub fn encode_request(xml: &str) -> String {
    BASE64_STANDARD.encode(deflate_bytes(xml.as_bytes()))
}

/// `base` with a `SAMLRequest` query parameter carrying `xml`, and
/// `RelayState` appended verbatim when given and non-empty.
pub fn redirect_url(base: &str, xml: &str, relay_state: Option<&str>) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    let mut url = format!(
        "{base}{separator}SAMLRequest={}",
        urlencoding::encode(&encode_request(xml))
    );
    if let Some(relay_state) = relay_state.filter(|r| !r.is_empty()) {
        url.push_str("&RelayState=");
        url.push_str(relay_state);
    }
    url
}

/// Decode the base64 `SAMLResponse` POST field into raw response bytes.
/// The decoded document must be UTF-8.
pub fn decode_response(saml_response: &str) -> Result<Vec<u8>, SamlError> {
    let raw = decode_xml_base64(saml_response).map_err(|_| SamlError::InvalidEncoding)?;
    if std::str::from_utf8(&raw).is_err() {
        return Err(SamlError::InvalidEncoding);
    }
    Ok(raw)
}

use base64::{prelude::BASE64_STANDARD, Engine};
use rand::distributions::{Alphanumeric, DistString};

/// Length of the random part of generated request identifiers.
pub const ID_TOKEN_LEN: usize = 32;

pub fn random_string(len: usize) -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), len)
}

/// `prefix` followed by a fresh random token. Callers must pass a prefix that
/// starts with a letter or `_` so the result is a valid `xs:ID`.
pub fn request_id(prefix: &str) -> String {
    format!("{prefix}{}", random_string(ID_TOKEN_LEN))
}

/// Base64 embedded in XML is often wrapped; strip whitespace before decoding.
pub fn decode_xml_base64(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let stripped = input.replace([' ', '\n', '\r', '\t'], "");
    BASE64_STANDARD.decode(stripped)
}

/// Re-armor a bare base64 certificate body as PEM, 64 columns per line.
pub fn certificate_pem(body: &str) -> String {
    let stripped: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for line in stripped.as_bytes().chunks(64) {
        // base64 is ASCII, so every chunk boundary is a char boundary
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

use roxmltree::Node;
use time::{macros::format_description, OffsetDateTime, PrimitiveDateTime};
use tracing::debug;

use crate::{
    signature::{reject, SignatureBlock},
    xml::{self, NS_ASSERTION, NS_PROTOCOL},
    ValidationError, STATUS_SUCCESS,
};

/// One `saml:Attribute` of the attribute statement, values in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionAttribute {
    pub name: String,
    pub values: Vec<String>,
}

/// An assertion that passed every check of [`ResponseValidator::validate`].
///
/// Only the validator can construct one, so holding a value is proof that
/// the time window, digest, signature and status were all verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAssertion {
    id: Option<String>,
    issuer: Option<String>,
    name_id: String,
    not_before: OffsetDateTime,
    not_on_or_after: OffsetDateTime,
    attributes: Vec<AssertionAttribute>,
}

impl ValidatedAssertion {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    pub fn name_id(&self) -> &str {
        &self.name_id
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    pub fn not_on_or_after(&self) -> OffsetDateTime {
        self.not_on_or_after
    }

    pub fn attributes(&self) -> &[AssertionAttribute] {
        &self.attributes
    }

    #[cfg(test)]
    pub(crate) fn for_tests(name_id: &str, attributes: Vec<AssertionAttribute>) -> Self {
        ValidatedAssertion {
            id: None,
            issuer: None,
            name_id: name_id.to_string(),
            not_before: OffsetDateTime::UNIX_EPOCH,
            not_on_or_after: OffsetDateTime::UNIX_EPOCH,
            attributes,
        }
    }
}

/// Validates inbound `samlp:Response` documents.
///
/// Without trusted certificates the signature is checked against the
/// certificate embedded in the response itself; callers that need to pin the
/// IdP must either configure [`trusted_certificates`](Self::trusted_certificates)
/// or compare the certificate themselves.
#[derive(Debug, Default, Clone)]
pub struct ResponseValidator {
    trusted_certificates: Vec<Vec<u8>>,
}

impl ResponseValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// DER-encoded certificates the embedded signing certificate must match.
    pub fn trusted_certificates(self, certificates: Vec<Vec<u8>>) -> Self {
        ResponseValidator {
            trusted_certificates: certificates,
        }
    }

    pub fn validate(
        &self,
        input: &[u8],
        now: OffsetDateTime,
    ) -> Result<ValidatedAssertion, ValidationError> {
        let input = std::str::from_utf8(input)
            .map_err(|_| reject(ValidationError::MalformedXml, "response is not UTF-8"))?;
        let document = xml::parse(input)
            .map_err(|_| reject(ValidationError::MalformedXml, "response is not well-formed XML"))?;

        let response = document.root_element();
        if !response.has_tag_name((NS_PROTOCOL, "Response")) {
            return Err(reject(
                ValidationError::MalformedXml,
                "root element is not samlp:Response",
            ));
        }
        let assertion = xml::single_child(response, NS_ASSERTION, "Assertion").ok_or_else(|| {
            reject(
                ValidationError::MalformedXml,
                "response must carry exactly one assertion",
            )
        })?;

        let (not_before, not_on_or_after) = check_conditions(assertion, now)?;

        let signature = SignatureBlock::find(assertion).ok_or_else(|| {
            reject(ValidationError::DigestMismatch, "assertion carries no usable signature")
        })?;
        signature.verify_digest(assertion)?;
        signature.verify_signature(&self.trusted_certificates)?;

        check_status(response)?;

        let name_id = xml::descend(assertion, NS_ASSERTION, &["Subject", "NameID"])
            .map(xml::text)
            .ok_or_else(|| reject(ValidationError::MalformedXml, "assertion has no subject NameID"))?;

        let validated = ValidatedAssertion {
            id: assertion.attribute("ID").map(str::to_string),
            issuer: xml::child(assertion, NS_ASSERTION, "Issuer").map(xml::text),
            name_id,
            not_before,
            not_on_or_after,
            attributes: attribute_statement(assertion),
        };
        debug!(
            assertion_id = validated.id.as_deref().unwrap_or_default(),
            attributes = validated.attributes.len(),
            "validated SAML assertion"
        );
        Ok(validated)
    }
}

/// Validate with the embedded-certificate trust model.
pub fn validate_response(
    input: &[u8],
    now: OffsetDateTime,
) -> Result<ValidatedAssertion, ValidationError> {
    ResponseValidator::new().validate(input, now)
}

/// Parse a `Conditions` timestamp. Only `YYYY-MM-DDThh:mm:ss.fffZ` is accepted.
pub fn parse_condition_instant(value: &str) -> Option<OffsetDateTime> {
    let format =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");
    PrimitiveDateTime::parse(value, format)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

fn check_conditions(
    assertion: Node,
    now: OffsetDateTime,
) -> Result<(OffsetDateTime, OffsetDateTime), ValidationError> {
    let conditions = xml::single_child(assertion, NS_ASSERTION, "Conditions").ok_or_else(|| {
        reject(ValidationError::ExpiredOrNotYetValid, "assertion has no Conditions")
    })?;

    let bound = |name: &str| {
        conditions
            .attribute(name)
            .and_then(parse_condition_instant)
            .ok_or_else(|| {
                reject(
                    ValidationError::ExpiredOrNotYetValid,
                    "missing or unparsable validity bound",
                )
            })
    };
    let not_before = bound("NotBefore")?;
    let not_on_or_after = bound("NotOnOrAfter")?;

    if not_before < now && now < not_on_or_after {
        Ok((not_before, not_on_or_after))
    } else {
        Err(reject(
            ValidationError::ExpiredOrNotYetValid,
            "current time is outside the assertion validity window",
        ))
    }
}

fn check_status(response: Node) -> Result<(), ValidationError> {
    let status = xml::descend(response, NS_PROTOCOL, &["Status", "StatusCode"])
        .and_then(|code| code.attribute("Value"));
    if status == Some(STATUS_SUCCESS) {
        Ok(())
    } else {
        Err(reject(ValidationError::IdpStatusError, "status code is not success"))
    }
}

fn attribute_statement(assertion: Node) -> Vec<AssertionAttribute> {
    xml::children(assertion, NS_ASSERTION, "AttributeStatement")
        .flat_map(|statement| xml::children(statement, NS_ASSERTION, "Attribute"))
        .filter_map(|attribute| {
            let name = attribute.attribute("Name")?;
            let values = xml::children(attribute, NS_ASSERTION, "AttributeValue")
                .map(xml::text)
                .collect();
            Some(AssertionAttribute {
                name: name.to_string(),
                values,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn parses_millisecond_instants_only() {
        assert_eq!(
            parse_condition_instant("2025-01-08T16:31:18.814Z"),
            Some(datetime!(2025-01-08 16:31:18.814 UTC))
        );
        assert_eq!(parse_condition_instant("2025-01-08T16:31:18Z"), None);
        assert_eq!(parse_condition_instant("2025-01-08T16:31:18.814+01:00"), None);
        assert_eq!(parse_condition_instant("2025-01-08T16:31:18.8140Z"), None);
    }

    #[test]
    fn rejects_non_response_root() {
        let err = validate_response(b"<Assertion/>", datetime!(2025-01-01 0:00 UTC)).unwrap_err();
        assert_eq!(err, ValidationError::MalformedXml);
    }

    #[test]
    fn rejects_garbage() {
        let now = datetime!(2025-01-01 0:00 UTC);
        assert_eq!(
            validate_response(b"not xml", now).unwrap_err(),
            ValidationError::MalformedXml
        );
        assert_eq!(
            validate_response(&[0xff, 0xfe, 0x00], now).unwrap_err(),
            ValidationError::MalformedXml
        );
    }

    #[test]
    fn rejects_response_without_assertion() {
        let input = format!(
            r#"<samlp:Response xmlns:samlp="{NS_PROTOCOL}"><samlp:Status><samlp:StatusCode Value="{STATUS_SUCCESS}"/></samlp:Status></samlp:Response>"#
        );
        let err = validate_response(input.as_bytes(), datetime!(2025-01-01 0:00 UTC)).unwrap_err();
        assert_eq!(err, ValidationError::MalformedXml);
    }

    #[test]
    fn rejects_two_assertions() {
        let input = format!(
            r#"<samlp:Response xmlns:samlp="{NS_PROTOCOL}" xmlns:saml="{NS_ASSERTION}"><saml:Assertion/><saml:Assertion/></samlp:Response>"#
        );
        let err = validate_response(input.as_bytes(), datetime!(2025-01-01 0:00 UTC)).unwrap_err();
        assert_eq!(err, ValidationError::MalformedXml);
    }

    #[test]
    fn unsigned_assertion_in_window_fails_digest_step() {
        let input = format!(
            r#"<samlp:Response xmlns:samlp="{NS_PROTOCOL}" xmlns:saml="{NS_ASSERTION}"><saml:Assertion><saml:Conditions NotBefore="2024-12-31T00:00:00.000Z" NotOnOrAfter="2025-01-02T00:00:00.000Z"/></saml:Assertion></samlp:Response>"#
        );
        let err = validate_response(input.as_bytes(), datetime!(2025-01-01 0:00 UTC)).unwrap_err();
        assert_eq!(err, ValidationError::DigestMismatch);
    }

    const SIGNED: &str = include_str!("../static/signed_response.xml");
    const IDP_CERT: &str = include_str!("../static/idp_cert.pem");
    const OTHER_CERT: &str = include_str!("../static/other_cert.pem");

    fn in_window() -> OffsetDateTime {
        datetime!(2025-01-08 16:40 UTC)
    }

    fn der(pem: &str) -> Vec<u8> {
        openssl::x509::X509::from_pem(pem.as_bytes())
            .unwrap()
            .to_der()
            .unwrap()
    }

    fn pem_body(pem: &str) -> String {
        pem.lines().filter(|l| !l.starts_with("-----")).collect()
    }

    #[test]
    fn accepts_signed_response() {
        let assertion = validate_response(SIGNED.as_bytes(), in_window()).unwrap();
        assert_eq!(assertion.name_id(), "alice@example.com");
        assert_eq!(assertion.id(), Some("_a75adf55-01d7-40cc-929f-dbd8372ebdfc"));
        assert_eq!(assertion.issuer(), Some("https://idp.example.com/saml"));
        assert_eq!(assertion.not_before(), datetime!(2025-01-08 16:26:18.814 UTC));
        assert_eq!(assertion.not_on_or_after(), datetime!(2025-01-08 17:31:18.814 UTC));

        let groups = assertion
            .attributes()
            .iter()
            .find(|a| a.name.ends_with("/groups"))
            .unwrap();
        assert_eq!(groups.values, ["GRP-Admins", "GRP-Sales-Team"]);
        assert_eq!(assertion.attributes().len(), 7);
    }

    #[test]
    fn window_bounds_are_exclusive() {
        let validate = |now| validate_response(SIGNED.as_bytes(), now);
        assert_eq!(
            validate(datetime!(2025-01-08 16:26:18.814 UTC)).unwrap_err(),
            ValidationError::ExpiredOrNotYetValid
        );
        assert!(validate(datetime!(2025-01-08 16:26:18.815 UTC)).is_ok());
        assert!(validate(datetime!(2025-01-08 17:31:18.813 UTC)).is_ok());
        assert_eq!(
            validate(datetime!(2025-01-08 17:31:18.814 UTC)).unwrap_err(),
            ValidationError::ExpiredOrNotYetValid
        );
        assert_eq!(
            validate(datetime!(2026-01-01 0:00 UTC)).unwrap_err(),
            ValidationError::ExpiredOrNotYetValid
        );
    }

    #[test]
    fn window_is_checked_before_signature() {
        let tampered = SIGNED.replace(
            "alice@example.com</saml:NameID>",
            "mallory@example.com</saml:NameID>",
        );
        let err = validate_response(tampered.as_bytes(), datetime!(2024-01-01 0:00 UTC)).unwrap_err();
        assert_eq!(err, ValidationError::ExpiredOrNotYetValid);
    }

    #[test]
    fn tampered_assertion_fails_digest() {
        let tampered = SIGNED.replace(
            "alice@example.com</saml:NameID>",
            "mallory@example.com</saml:NameID>",
        );
        let err = validate_response(tampered.as_bytes(), in_window()).unwrap_err();
        assert_eq!(err, ValidationError::DigestMismatch);

        let tampered = SIGNED.replace("GRP-Sales-Team", "GRP-Domain-Admins");
        let err = validate_response(tampered.as_bytes(), in_window()).unwrap_err();
        assert_eq!(err, ValidationError::DigestMismatch);
    }

    #[test]
    fn reference_must_point_at_assertion() {
        let tampered = SIGNED.replace(
            r##"URI="#_a75adf55-01d7-40cc-929f-dbd8372ebdfc""##,
            r##"URI="#_other""##,
        );
        let err = validate_response(tampered.as_bytes(), in_window()).unwrap_err();
        assert_eq!(err, ValidationError::DigestMismatch);
    }

    #[test]
    fn tampered_signed_info_fails_signature() {
        let tampered = SIGNED.replace(
            "http://www.w3.org/2001/04/xmlenc#sha256",
            "http://www.w3.org/2001/04/xmlenc#sha512",
        );
        let err = validate_response(tampered.as_bytes(), in_window()).unwrap_err();
        assert_eq!(err, ValidationError::SignatureInvalid);
    }

    #[test]
    fn swapped_certificate_fails_signature() {
        let start = SIGNED.find("<ds:X509Certificate>").unwrap() + "<ds:X509Certificate>".len();
        let end = SIGNED.find("</ds:X509Certificate>").unwrap();
        let swapped = format!("{}{}{}", &SIGNED[..start], pem_body(OTHER_CERT), &SIGNED[end..]);
        let err = validate_response(swapped.as_bytes(), in_window()).unwrap_err();
        assert_eq!(err, ValidationError::SignatureInvalid);
    }

    #[test]
    fn trusted_certificates_pin_the_signer() {
        let pinned = ResponseValidator::new().trusted_certificates(vec![der(IDP_CERT)]);
        assert!(pinned.validate(SIGNED.as_bytes(), in_window()).is_ok());

        let other = ResponseValidator::new().trusted_certificates(vec![der(OTHER_CERT)]);
        assert_eq!(
            other.validate(SIGNED.as_bytes(), in_window()).unwrap_err(),
            ValidationError::SignatureInvalid
        );
    }

    #[test]
    fn non_success_status_is_reported_after_signature() {
        let failed = SIGNED.replace(
            "urn:oasis:names:tc:SAML:2.0:status:Success",
            "urn:oasis:names:tc:SAML:2.0:status:Responder",
        );
        let err = validate_response(failed.as_bytes(), in_window()).unwrap_err();
        assert_eq!(err, ValidationError::IdpStatusError);
    }

    #[test]
    fn duplicated_assertion_is_malformed() {
        let start = SIGNED.find("<saml:Assertion").unwrap();
        let end = SIGNED.find("</saml:Assertion>").unwrap() + "</saml:Assertion>".len();
        let mut wrapped = SIGNED.to_string();
        wrapped.insert_str(end, &SIGNED[start..end]);
        let err = validate_response(wrapped.as_bytes(), in_window()).unwrap_err();
        assert_eq!(err, ValidationError::MalformedXml);
    }

    #[test]
    fn missing_conditions_is_outside_window() {
        let input = format!(
            r#"<samlp:Response xmlns:samlp="{NS_PROTOCOL}" xmlns:saml="{NS_ASSERTION}"><saml:Assertion/></samlp:Response>"#
        );
        let err = validate_response(input.as_bytes(), datetime!(2025-01-01 0:00 UTC)).unwrap_err();
        assert_eq!(err, ValidationError::ExpiredOrNotYetValid);
    }
}

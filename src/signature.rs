//! Enveloped XML-DSig checks for a signed assertion: reference digest over the
//! canonical assertion, then RSA-SHA256 over the canonical `SignedInfo`.

use openssl::{
    hash::{hash, MessageDigest},
    memcmp,
    pkey::Id,
    sign::Verifier,
    x509::X509,
};
use roxmltree::Node;
use tracing::warn;

use crate::{
    c14n::ExclusiveCanonicalizer,
    utils::{certificate_pem, decode_xml_base64},
    xml::{self, NS_EXCLUSIVE_C14N, NS_XMLDSIG},
    ValidationError,
};

/// The pieces of a `ds:Signature` element used for verification.
#[derive(Debug, Clone, Copy)]
pub struct SignatureBlock<'a, 'input> {
    pub signature: Node<'a, 'input>,
    pub signed_info: Node<'a, 'input>,
    pub reference: Node<'a, 'input>,
}

impl<'a, 'input> SignatureBlock<'a, 'input> {
    /// Locate the single enveloped signature directly under `parent`.
    pub fn find(parent: Node<'a, 'input>) -> Option<Self> {
        let signature = xml::single_child(parent, NS_XMLDSIG, "Signature")?;
        let signed_info = xml::single_child(signature, NS_XMLDSIG, "SignedInfo")?;
        let reference = xml::single_child(signed_info, NS_XMLDSIG, "Reference")?;
        Some(SignatureBlock {
            signature,
            signed_info,
            reference,
        })
    }

    pub fn reference_uri(&self) -> Option<&'a str> {
        self.reference.attribute("URI")
    }

    pub fn canonicalization_algorithm(&self) -> Option<&'a str> {
        xml::child(self.signed_info, NS_XMLDSIG, "CanonicalizationMethod")
            .and_then(|method| method.attribute("Algorithm"))
    }

    fn digest_value(&self) -> Option<Vec<u8>> {
        let value = xml::child(self.reference, NS_XMLDSIG, "DigestValue")?;
        decode_xml_base64(&xml::text(value)).ok()
    }

    fn signature_value(&self) -> Option<Vec<u8>> {
        let value = xml::child(self.signature, NS_XMLDSIG, "SignatureValue")?;
        decode_xml_base64(&xml::text(value)).ok()
    }

    /// Base64 body of the embedded `KeyInfo/X509Data/X509Certificate`.
    pub fn certificate(&self) -> Option<String> {
        xml::descend(
            self.signature,
            NS_XMLDSIG,
            &["KeyInfo", "X509Data", "X509Certificate"],
        )
        .map(xml::text)
    }

    /// `PrefixList` of the exclusive canonicalization transform on the reference.
    fn reference_prefixes(&self) -> Option<&'a str> {
        xml::descend(self.reference, NS_XMLDSIG, &["Transforms"])?
            .children()
            .filter(|t| t.is_element() && t.has_tag_name((NS_XMLDSIG, "Transform")))
            .find(|t| t.attribute("Algorithm") == Some(NS_EXCLUSIVE_C14N))
            .and_then(inclusive_namespaces)
    }

    fn signed_info_prefixes(&self) -> Option<&'a str> {
        xml::child(self.signed_info, NS_XMLDSIG, "CanonicalizationMethod")
            .and_then(inclusive_namespaces)
    }

    /// Check the reference digest against the canonical form of `signed`, with
    /// this signature element removed.
    pub fn verify_digest(&self, signed: Node<'_, '_>) -> Result<(), ValidationError> {
        if let Some(uri) = self.reference_uri().filter(|uri| !uri.is_empty()) {
            let expected = signed.attribute("ID").map(|id| format!("#{id}"));
            if expected.as_deref() != Some(uri) {
                return Err(reject(
                    ValidationError::DigestMismatch,
                    "reference does not point at the signed element",
                ));
            }
        }

        let expected = self.digest_value().ok_or_else(|| {
            reject(ValidationError::DigestMismatch, "missing or undecodable DigestValue")
        })?;

        let mut canonicalizer = ExclusiveCanonicalizer::new().exclude(self.signature.id());
        if let Some(prefixes) = self.reference_prefixes() {
            canonicalizer = canonicalizer.inclusive_prefixes(prefixes);
        }
        let canonical = canonicalizer.canonicalize(signed);

        let computed = hash(MessageDigest::sha256(), canonical.as_bytes())
            .map_err(|_| reject(ValidationError::DigestMismatch, "digest computation failed"))?;

        if computed.len() != expected.len() || !memcmp::eq(&computed, &expected) {
            return Err(reject(
                ValidationError::DigestMismatch,
                "computed digest differs from DigestValue",
            ));
        }
        Ok(())
    }

    /// Verify `SignatureValue` over the canonical `SignedInfo` with the key of
    /// the embedded certificate. When `trusted` is non-empty the embedded
    /// certificate must be one of those DER blobs.
    pub fn verify_signature(&self, trusted: &[Vec<u8>]) -> Result<(), ValidationError> {
        if let Some(algorithm) = self.canonicalization_algorithm() {
            if algorithm != NS_EXCLUSIVE_C14N {
                return Err(reject(
                    ValidationError::SignatureInvalid,
                    "unsupported SignedInfo canonicalization",
                ));
            }
        }

        let mut canonicalizer = ExclusiveCanonicalizer::new();
        if let Some(prefixes) = self.signed_info_prefixes() {
            canonicalizer = canonicalizer.inclusive_prefixes(prefixes);
        }
        let canonical = canonicalizer.canonicalize(self.signed_info);

        let signature = self.signature_value().ok_or_else(|| {
            reject(ValidationError::SignatureInvalid, "missing or undecodable SignatureValue")
        })?;
        let certificate = self.certificate().ok_or_else(|| {
            reject(ValidationError::SignatureInvalid, "missing X509Certificate")
        })?;

        let cert = X509::from_pem(certificate_pem(&certificate).as_bytes())
            .map_err(|_| reject(ValidationError::SignatureInvalid, "unparsable certificate"))?;

        if !trusted.is_empty() {
            let der = cert
                .to_der()
                .map_err(|_| reject(ValidationError::SignatureInvalid, "unencodable certificate"))?;
            if !trusted.iter().any(|t| *t == der) {
                return Err(reject(
                    ValidationError::SignatureInvalid,
                    "certificate is not in the trusted set",
                ));
            }
        }

        let key = cert
            .public_key()
            .map_err(|_| reject(ValidationError::SignatureInvalid, "unusable public key"))?;
        if key.id() != Id::RSA {
            return Err(reject(ValidationError::SignatureInvalid, "public key is not RSA"));
        }

        let valid = Verifier::new(MessageDigest::sha256(), &key)
            .and_then(|mut verifier| {
                verifier.update(canonical.as_bytes())?;
                verifier.verify(&signature)
            })
            .unwrap_or(false);

        if valid {
            Ok(())
        } else {
            Err(reject(
                ValidationError::SignatureInvalid,
                "SignatureValue does not verify",
            ))
        }
    }
}

fn inclusive_namespaces<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    xml::child(node, NS_EXCLUSIVE_C14N, "InclusiveNamespaces")
        .and_then(|n| n.attribute("PrefixList"))
}

pub(crate) fn reject(kind: ValidationError, reason: &str) -> ValidationError {
    warn!(error = %kind, reason, "rejecting SAML response");
    kind
}

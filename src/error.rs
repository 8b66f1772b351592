use thiserror::Error;

/// Reasons an inbound `Response` is rejected.
///
/// Each variant is terminal for the message it was raised on. The messages are
/// deliberately short: they end up in logs, never in front of the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ValidationError {
    #[error("malformed SAML response")]
    MalformedXml,
    #[error("assertion is expired or not yet valid")]
    ExpiredOrNotYetValid,
    #[error("assertion digest does not match")]
    DigestMismatch,
    #[error("assertion signature is invalid")]
    SignatureInvalid,
    #[error("identity provider returned a non-success status")]
    IdpStatusError,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SamlError {
    /// The posted `SAMLResponse` was not valid base64 or not UTF-8.
    #[error("invalid SAML message encoding")]
    InvalidEncoding,
    /// Missing or invalid service-provider configuration.
    #[error("SAML configuration error: {0}")]
    Config(String),
    /// Uniform caller-facing failure; the cause is kept as the error source.
    #[error("SAML authentication failed")]
    Authentication(#[source] ValidationError),
}

impl SamlError {
    pub fn validation_kind(&self) -> Option<ValidationError> {
        match self {
            SamlError::Authentication(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl From<ValidationError> for SamlError {
    fn from(e: ValidationError) -> Self {
        SamlError::Authentication(e)
    }
}

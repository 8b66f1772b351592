use std::{fmt::Display, str::FromStr};

use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    bindings::encode_request,
    utils::request_id,
    xml::{NS_ASSERTION, NS_PROTOCOL},
    DATE_TIME_FORMAT, DEFAULT_ID_PREFIX,
};

#[derive(Serialize)]
#[serde(rename = "samlp:AuthnRequest")]
struct AuthnRequest {
    #[serde(rename = "@xmlns:samlp")]
    xmlns_samlp: &'static str,
    #[serde(rename = "@xmlns:saml")]
    xmlns_saml: &'static str,
    #[serde(rename = "@ID")]
    id: String,
    #[serde(rename = "@Version")]
    version: &'static str,
    #[serde(rename = "@IssueInstant")]
    issue_instant: String,
    #[serde(rename = "@Destination", skip_serializing_if = "Option::is_none")]
    destination: Option<String>,
    #[serde(rename = "@ProtocolBinding")]
    protocol_binding: String,
    #[serde(rename = "@AssertionConsumerServiceURL")]
    assertion_consumer_service_url: String,
    #[serde(rename = "saml:Issuer")]
    issuer: Issuer,
    #[serde(rename = "samlp:NameIDPolicy", skip_serializing_if = "Option::is_none")]
    name_id_policy: Option<NameIdPolicy>,
    #[serde(rename = "saml:Subject", skip_serializing_if = "Option::is_none")]
    subject: Option<Subject>,
}

#[derive(Serialize)]
pub(crate) struct Issuer {
    #[serde(rename = "$text")]
    pub(crate) content: String,
}

#[derive(Serialize)]
struct NameIdPolicy {
    #[serde(rename = "@Format")]
    format: String,
    #[serde(rename = "@AllowCreate")]
    allow_create: bool,
}

#[derive(Serialize)]
struct Subject {
    #[serde(rename = "saml:NameID")]
    name_id: NameId,
}

#[derive(Serialize)]
pub(crate) struct NameId {
    #[serde(rename = "@Format", skip_serializing_if = "Option::is_none")]
    pub(crate) format: Option<String>,
    #[serde(rename = "$text")]
    pub(crate) content: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolBinding {
    #[default]
    Post,
    Redirect,
}

impl Display for ProtocolBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ProtocolBinding::Post => write!(f, "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST"),
            ProtocolBinding::Redirect => {
                write!(f, "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect")
            }
        }
    }
}

impl FromStr for ProtocolBinding {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" => Ok(ProtocolBinding::Post),
            "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" => Ok(ProtocolBinding::Redirect),
            _ => Err(()),
        }
    }
}

#[derive(Default)]
pub struct AuthnRequestBuilder {
    id: Option<String>,
    issue_instant: Option<OffsetDateTime>,
    issuer: Option<String>,
    destination: Option<String>,
    protocol_binding: ProtocolBinding,
    consumer_url: Option<String>,
    name_format: Option<String>,
    deny_create: bool,
    subject: Option<String>,
}

impl AuthnRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(self, id: &str) -> Self {
        AuthnRequestBuilder {
            id: Some(id.into()),
            ..self
        }
    }

    pub fn auto_id(self) -> Self {
        self.auto_id_with_prefix(DEFAULT_ID_PREFIX)
    }

    pub fn auto_id_with_prefix(self, prefix: &str) -> Self {
        AuthnRequestBuilder {
            id: Some(request_id(prefix)),
            ..self
        }
    }

    pub fn issue_instant(self, instant: OffsetDateTime) -> Self {
        AuthnRequestBuilder {
            issue_instant: Some(instant),
            ..self
        }
    }

    pub fn issued_now(self) -> Self {
        AuthnRequestBuilder {
            issue_instant: Some(OffsetDateTime::now_utc()),
            ..self
        }
    }

    pub fn issuer(self, issuer: &str) -> Self {
        AuthnRequestBuilder {
            issuer: Some(issuer.into()),
            ..self
        }
    }

    pub fn destination(self, destination: &str) -> Self {
        AuthnRequestBuilder {
            destination: Some(destination.into()),
            ..self
        }
    }

    pub fn protocol_binding(self, binding: ProtocolBinding) -> Self {
        AuthnRequestBuilder {
            protocol_binding: binding,
            ..self
        }
    }

    pub fn consumer_url(self, url: &str) -> Self {
        AuthnRequestBuilder {
            consumer_url: Some(url.into()),
            ..self
        }
    }

    pub fn name_format(self, format: &str) -> Self {
        AuthnRequestBuilder {
            name_format: Some(format.into()),
            ..self
        }
    }

    pub fn allow_create(self, allow: bool) -> Self {
        AuthnRequestBuilder {
            deny_create: !allow,
            ..self
        }
    }

    pub fn subject(self, subject: &str) -> Self {
        AuthnRequestBuilder {
            subject: Some(subject.into()),
            ..self
        }
    }

    pub fn build(self) -> String {
        let req = AuthnRequest {
            xmlns_samlp: NS_PROTOCOL,
            xmlns_saml: NS_ASSERTION,
            id: self.id.expect("ID is required"),
            version: "2.0",
            issue_instant: self
                .issue_instant
                .expect("IssueInstant is required")
                .format(&DATE_TIME_FORMAT)
                .expect("Infallible formatting"),
            destination: self.destination,
            protocol_binding: self.protocol_binding.to_string(),
            assertion_consumer_service_url: self.consumer_url.expect("Consumer URL is required"),
            issuer: Issuer {
                content: self.issuer.expect("Issuer is required"),
            },
            name_id_policy: self.name_format.clone().map(|format| NameIdPolicy {
                format,
                allow_create: !self.deny_create,
            }),
            subject: self.subject.map(|subject| Subject {
                name_id: NameId {
                    format: self.name_format,
                    content: subject,
                },
            }),
        };
        debug!(request_id = %req.id, "built AuthnRequest");
        quick_xml::se::to_string(&req).expect("Infallible serialization")
    }

    /// Raw DEFLATE then base64, ready for the `SAMLRequest` query parameter.
    pub fn build_and_encode(self) -> String {
        encode_request(&self.build())
    }
}

/// AuthnRequest with a fresh ID issued now, for the given SP and ACS URL.
pub fn build_authn_request(entity_id: &str, acs_url: &str, id_prefix: &str) -> String {
    AuthnRequestBuilder::new()
        .auto_id_with_prefix(id_prefix)
        .issued_now()
        .issuer(entity_id)
        .consumer_url(acs_url)
        .build()
}

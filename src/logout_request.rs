use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    authn_request::{Issuer, NameId},
    bindings::encode_request,
    utils::request_id,
    xml::{NS_ASSERTION, NS_PROTOCOL},
    DATE_TIME_FORMAT, DEFAULT_ID_PREFIX,
};

#[derive(Serialize)]
#[serde(rename = "samlp:LogoutRequest")]
struct LogoutRequest {
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
    #[serde(rename = "saml:Issuer")]
    issuer: Issuer,
    #[serde(rename = "saml:NameID")]
    name_id: NameId,
}

/// Builds a `samlp:LogoutRequest` for the subject of an earlier login.
#[derive(Default)]
pub struct LogoutRequestBuilder {
    id: Option<String>,
    issue_instant: Option<OffsetDateTime>,
    issuer: Option<String>,
    destination: Option<String>,
    name_format: Option<String>,
    subject: Option<String>,
}

impl LogoutRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(self, id: &str) -> Self {
        LogoutRequestBuilder {
            id: Some(id.into()),
            ..self
        }
    }

    pub fn auto_id(self) -> Self {
        self.auto_id_with_prefix(DEFAULT_ID_PREFIX)
    }

    pub fn auto_id_with_prefix(self, prefix: &str) -> Self {
        LogoutRequestBuilder {
            id: Some(request_id(prefix)),
            ..self
        }
    }

    pub fn issue_instant(self, instant: OffsetDateTime) -> Self {
        LogoutRequestBuilder {
            issue_instant: Some(instant),
            ..self
        }
    }

    pub fn issued_now(self) -> Self {
        LogoutRequestBuilder {
            issue_instant: Some(OffsetDateTime::now_utc()),
            ..self
        }
    }

    pub fn issuer(self, issuer: &str) -> Self {
        LogoutRequestBuilder {
            issuer: Some(issuer.into()),
            ..self
        }
    }

    pub fn destination(self, destination: &str) -> Self {
        LogoutRequestBuilder {
            destination: Some(destination.into()),
            ..self
        }
    }

    pub fn name_format(self, format: &str) -> Self {
        LogoutRequestBuilder {
            name_format: Some(format.into()),
            ..self
        }
    }

    /// NameID of the session being terminated, as received at login.
    pub fn subject(self, name_id: &str) -> Self {
        LogoutRequestBuilder {
            subject: Some(name_id.into()),
            ..self
        }
    }

    pub fn build(self) -> String {
        let req = LogoutRequest {
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
            issuer: Issuer {
                content: self.issuer.expect("Issuer is required"),
            },
            name_id: NameId {
                format: self.name_format,
                content: self.subject.expect("Subject is required"),
            },
        };
        debug!(request_id = %req.id, "built LogoutRequest");
        quick_xml::se::to_string(&req).expect("Infallible serialization")
    }

    pub fn build_and_encode(self) -> String {
        encode_request(&self.build())
    }
}

pub fn build_logout_request(entity_id: &str, subject_name_id: &str, id_prefix: &str) -> String {
    LogoutRequestBuilder::new()
        .auto_id_with_prefix(id_prefix)
        .issued_now()
        .issuer(entity_id)
        .subject(subject_name_id)
        .build()
}

#[cfg(test)]
mod tests {
    use roxmltree::Document;

    use crate::xml;

    use super::*;

    #[test]
    fn logout_request_round_trip() {
        let xml = build_logout_request("sp1", "alice@example.com", "id");
        let doc = Document::parse(&xml).unwrap();
        let root = doc.root_element();
        assert!(root.has_tag_name((NS_PROTOCOL, "LogoutRequest")));
        assert_eq!(root.attribute("Version"), Some("2.0"));
        assert!(root.attribute("ID").unwrap().starts_with("id"));
        assert!(root.attribute("IssueInstant").is_some());
        assert_eq!(root.attribute("AssertionConsumerServiceURL"), None);

        let issuer = xml::child(root, NS_ASSERTION, "Issuer").unwrap();
        let name_id = xml::child(root, NS_ASSERTION, "NameID").unwrap();
        assert_eq!(xml::text(issuer), "sp1");
        assert_eq!(xml::text(name_id), "alice@example.com");
        assert_eq!(name_id.attribute("Format"), None);
    }

    #[test]
    fn escapes_subject_text() {
        let xml = LogoutRequestBuilder::new()
            .id("_logout")
            .issued_now()
            .issuer("sp1")
            .destination("https://idp.example.com/slo")
            .name_format(crate::NAME_ID_FORMAT_EMAIL_ADDRESS)
            .subject("a<b>&c")
            .build();
        let doc = Document::parse(&xml).unwrap();
        let root = doc.root_element();
        assert_eq!(root.attribute("Destination"), Some("https://idp.example.com/slo"));
        let name_id = xml::child(root, NS_ASSERTION, "NameID").unwrap();
        assert_eq!(xml::text(name_id), "a<b>&c");
        assert_eq!(
            name_id.attribute("Format"),
            Some(crate::NAME_ID_FORMAT_EMAIL_ADDRESS)
        );
    }
}

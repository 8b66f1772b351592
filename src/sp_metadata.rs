use serde::Serialize;

use crate::{
    authn_request::ProtocolBinding,
    xml::{NS_METADATA, NS_PROTOCOL},
};

#[derive(Serialize)]
#[serde(rename = "md:EntityDescriptor")]
struct EntityDescriptor {
    #[serde(rename = "@xmlns:md")]
    xmlns_md: &'static str,
    #[serde(rename = "@entityID")]
    entity_id: String,
    #[serde(rename = "md:SPSSODescriptor")]
    sp_sso_descriptor: SPSSODescriptor,
}

#[derive(Serialize)]
struct SPSSODescriptor {
    #[serde(rename = "@AuthnRequestsSigned")]
    authn_requests_signed: bool,
    #[serde(rename = "@WantAssertionsSigned")]
    want_assertions_signed: bool,
    #[serde(rename = "@protocolSupportEnumeration")]
    protocol_support_enumeration: &'static str,
    #[serde(rename = "md:NameIDFormat")]
    name_id_format: NameIdFormat,
    #[serde(rename = "md:AssertionConsumerService")]
    assertion_consumer_service: AssertionConsumerService,
}

#[derive(Serialize)]
struct NameIdFormat {
    #[serde(rename = "$text")]
    content: String,
}

#[derive(Serialize)]
struct AssertionConsumerService {
    #[serde(rename = "@Binding")]
    binding: String,
    #[serde(rename = "@Location")]
    location: String,
    #[serde(rename = "@index")]
    index: u32,
}

#[derive(Default)]
pub struct SpMetadataBuilder {
    entity_id: Option<String>,
    acs_url: Option<String>,
    name_id_format: Option<String>,
}

impl SpMetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity_id(self, entity_id: &str) -> Self {
        Self {
            entity_id: Some(entity_id.into()),
            ..self
        }
    }

    pub fn acs_url(self, acs_url: &str) -> Self {
        Self {
            acs_url: Some(acs_url.into()),
            ..self
        }
    }

    pub fn name_id_format(self, name_id_format: &str) -> Self {
        Self {
            name_id_format: Some(name_id_format.into()),
            ..self
        }
    }

    pub fn build(self) -> String {
        let metadata = EntityDescriptor {
            xmlns_md: NS_METADATA,
            entity_id: self.entity_id.expect("entity_id is required"),
            sp_sso_descriptor: SPSSODescriptor {
                authn_requests_signed: false,
                want_assertions_signed: true,
                protocol_support_enumeration: NS_PROTOCOL,
                name_id_format: NameIdFormat {
                    content: self.name_id_format.expect("name_id_format is required"),
                },
                assertion_consumer_service: AssertionConsumerService {
                    binding: ProtocolBinding::Post.to_string(),
                    location: self.acs_url.expect("acs_url is required"),
                    index: 0,
                },
            },
        };
        quick_xml::se::to_string(&metadata).expect("Infallible serialization")
    }
}

mod attributes;
mod authn_request;
mod bindings;
pub mod c14n;
mod config;
mod error;
mod logout_request;
mod response;
mod service_provider;
mod signature;
mod sp_metadata;
mod utils;
mod xml;

pub use attributes::{
    claim_property, extract, normalize_group, ClaimField, UserAttributes, CLAIMS,
};
pub use authn_request::{build_authn_request, AuthnRequestBuilder, ProtocolBinding};
pub use bindings::{decode_response, encode_request, redirect_url};
pub use config::ServiceProviderConfig;
pub use error::{SamlError, ValidationError};
pub use logout_request::{build_logout_request, LogoutRequestBuilder};
pub use response::{
    parse_condition_instant, validate_response, AssertionAttribute, ResponseValidator,
    ValidatedAssertion,
};
pub use service_provider::ServiceProvider;
pub use sp_metadata::SpMetadataBuilder;
use time::format_description::well_known::iso8601::{self, TimePrecision};

pub const NAME_ID_FORMAT_EMAIL_ADDRESS: &str =
    "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress";

pub const STATUS_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";

/// Prefix of generated request IDs unless configured otherwise.
pub const DEFAULT_ID_PREFIX: &str = "id";

// xs:dateTime isn't actually ISO8601, because implementors often don't support higher precisions.
pub const DATE_TIME_FORMAT: iso8601::Iso8601<
    {
        iso8601::Config::DEFAULT
            .set_time_precision(TimePrecision::Second {
                decimal_digits: None,
            })
            .encode()
    },
> = iso8601::Iso8601;

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::{
    attributes::{extract, UserAttributes},
    authn_request::AuthnRequestBuilder,
    bindings::{decode_response, redirect_url},
    config::ServiceProviderConfig,
    logout_request::LogoutRequestBuilder,
    response::ResponseValidator,
    sp_metadata::SpMetadataBuilder,
    SamlError, NAME_ID_FORMAT_EMAIL_ADDRESS,
};

/// Entry points of a SAML service provider: send users to the IdP, accept the
/// posted response, and describe itself through metadata.
///
/// Session handling and HTTP are left to the caller.
#[derive(Debug, Clone)]
pub struct ServiceProvider {
    config: ServiceProviderConfig,
    validator: ResponseValidator,
}

impl ServiceProvider {
    pub fn new(config: ServiceProviderConfig) -> Result<Self, SamlError> {
        config.validate()?;
        let validator =
            ResponseValidator::new().trusted_certificates(config.trusted_certificates.clone());
        Ok(Self { config, validator })
    }

    pub fn config(&self) -> &ServiceProviderConfig {
        &self.config
    }

    /// IdP URL that starts a login with a fresh AuthnRequest.
    pub fn login_redirect_url(&self, relay_state: Option<&str>) -> String {
        let xml = AuthnRequestBuilder::new()
            .auto_id_with_prefix(&self.config.id_prefix)
            .issued_now()
            .issuer(&self.config.entity_id)
            .destination(&self.config.idp_url)
            .consumer_url(&self.config.acs_url)
            .build();
        redirect_url(&self.config.idp_url, &xml, relay_state)
    }

    /// IdP URL that ends the session of `name_id`.
    pub fn logout_redirect_url(&self, name_id: &str, relay_state: Option<&str>) -> String {
        let xml = LogoutRequestBuilder::new()
            .auto_id_with_prefix(&self.config.id_prefix)
            .issued_now()
            .issuer(&self.config.entity_id)
            .destination(&self.config.idp_url)
            .subject(name_id)
            .build();
        redirect_url(&self.config.idp_url, &xml, relay_state)
    }

    /// Validate the base64 `SAMLResponse` POST field and extract the user.
    ///
    /// Every validation failure surfaces as [`SamlError::Authentication`];
    /// the kind is available through [`SamlError::validation_kind`] for logs.
    pub fn authenticate(
        &self,
        saml_response: &str,
        now: OffsetDateTime,
    ) -> Result<UserAttributes, SamlError> {
        let raw = decode_response(saml_response).inspect_err(|_| {
            warn!("SAMLResponse is not valid base64 encoded UTF-8");
        })?;
        let assertion = self.validator.validate(&raw, now)?;
        let user = extract(&assertion);
        info!(
            name_id = %user.name_id,
            groups = user.groups.len(),
            "SAML login succeeded"
        );
        Ok(user)
    }

    /// Where to send the user after login: the RelayState when it is a local
    /// path, else the configured login URL, else `/`.
    pub fn post_login_target<'a>(&'a self, relay_state: Option<&'a str>) -> &'a str {
        match relay_state {
            Some(target) if is_local_path(target) => target,
            Some(target) => {
                debug!(relay_state = target, "ignoring non-local RelayState");
                self.default_target()
            }
            None => self.default_target(),
        }
    }

    fn default_target(&self) -> &str {
        self.config.login_url.as_deref().unwrap_or("/")
    }

    pub fn metadata(&self) -> String {
        SpMetadataBuilder::new()
            .entity_id(&self.config.entity_id)
            .acs_url(&self.config.acs_url)
            .name_id_format(NAME_ID_FORMAT_EMAIL_ADDRESS)
            .build()
    }
}

/// Browsers strip tab, CR and LF from URLs, so `/\t/host` would become `//host`.
fn is_local_path(target: &str) -> bool {
    target.starts_with('/')
        && !target.starts_with("//")
        && !target.contains('\\')
        && !target.chars().any(|c| c.is_ascii_control())
}

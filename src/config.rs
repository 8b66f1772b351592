use serde::{Deserialize, Deserializer};

use crate::{utils::decode_xml_base64, SamlError, DEFAULT_ID_PREFIX};

/// Service provider settings.
///
/// Required fields are constructor parameters. Use
/// [`from_env()`](ServiceProviderConfig::from_env) for convention-based setup,
/// or [`new()`](ServiceProviderConfig::new) with `with_*` methods. The struct
/// also deserializes from any serde format; call
/// [`validate()`](ServiceProviderConfig::validate) afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceProviderConfig {
    pub(crate) entity_id: String,
    pub(crate) idp_url: String,
    pub(crate) acs_url: String,
    #[serde(default)]
    pub(crate) login_url: Option<String>,
    #[serde(default = "default_id_prefix")]
    pub(crate) id_prefix: String,
    #[serde(default, deserialize_with = "base64_certificates")]
    pub(crate) trusted_certificates: Vec<Vec<u8>>,
}

fn default_id_prefix() -> String {
    DEFAULT_ID_PREFIX.to_string()
}

fn base64_certificates<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<String>::deserialize(deserializer)?
        .iter()
        .map(|cert| decode_xml_base64(cert).map_err(serde::de::Error::custom))
        .collect()
}

impl ServiceProviderConfig {
    #[must_use]
    pub fn new(
        entity_id: impl Into<String>,
        idp_url: impl Into<String>,
        acs_url: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            idp_url: idp_url.into(),
            acs_url: acs_url.into(),
            login_url: None,
            id_prefix: default_id_prefix(),
            trusted_certificates: Vec::new(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `SAML_ENTITY_ID`: this SP's entity ID, sent as `Issuer`
    /// - `SAML_IDP_URL`: IdP single sign-on endpoint
    /// - `SAML_ACS_URL`: assertion consumer service URL of this SP
    ///
    /// # Optional env vars
    /// - `SAML_LOGIN_URL`: where to send users after login when no RelayState is given
    /// - `SAML_ID_PREFIX`: prefix of generated request IDs (default `id`)
    /// - `SAML_TRUSTED_CERTIFICATES`: comma-separated base64 DER IdP certificates
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Config`] if a required variable is missing or empty,
    /// or a certificate is not valid base64.
    pub fn from_env() -> Result<Self, SamlError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Same as [`from_env()`](Self::from_env) with a custom variable reader.
    pub fn from_reader<F>(reader: F) -> Result<Self, SamlError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let required = |key: &str| {
            reader(key).map_err(|_| SamlError::Config(format!("{key} is required")))
        };
        let mut config = Self::new(
            required("SAML_ENTITY_ID")?,
            required("SAML_IDP_URL")?,
            required("SAML_ACS_URL")?,
        );

        if let Ok(url) = reader("SAML_LOGIN_URL") {
            config = config.with_login_url(url);
        }
        if let Ok(prefix) = reader("SAML_ID_PREFIX") {
            config = config.with_id_prefix(prefix);
        }
        if let Ok(certificates) = reader("SAML_TRUSTED_CERTIFICATES") {
            let certificates = certificates
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(|c| {
                    decode_xml_base64(c).map_err(|e| {
                        SamlError::Config(format!("SAML_TRUSTED_CERTIFICATES: {e}"))
                    })
                })
                .collect::<Result<_, _>>()?;
            config = config.with_trusted_certificates(certificates);
        }

        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_login_url(mut self, url: impl Into<String>) -> Self {
        self.login_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    /// DER-encoded IdP certificates; when non-empty, only these may sign.
    #[must_use]
    pub fn with_trusted_certificates(mut self, certificates: Vec<Vec<u8>>) -> Self {
        self.trusted_certificates = certificates;
        self
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn idp_url(&self) -> &str {
        &self.idp_url
    }

    pub fn acs_url(&self) -> &str {
        &self.acs_url
    }

    pub fn login_url(&self) -> Option<&str> {
        self.login_url.as_deref()
    }

    pub fn id_prefix(&self) -> &str {
        &self.id_prefix
    }

    pub fn trusted_certificates(&self) -> &[Vec<u8>] {
        &self.trusted_certificates
    }

    /// Required fields must be non-empty and the ID prefix must keep request
    /// IDs valid `xs:ID` values.
    pub fn validate(&self) -> Result<(), SamlError> {
        for (key, value) in [
            ("entity_id", &self.entity_id),
            ("idp_url", &self.idp_url),
            ("acs_url", &self.acs_url),
        ] {
            if value.trim().is_empty() {
                return Err(SamlError::Config(format!("{key} must not be empty")));
            }
        }
        if !self
            .id_prefix
            .starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
        {
            return Err(SamlError::Config(
                "id_prefix must start with a letter or underscore".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, env::VarError};

    use super::*;

    fn reader(vars: &[(&str, &str)]) -> impl Fn(&str) -> Result<String, VarError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned().ok_or(VarError::NotPresent)
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("SAML_ENTITY_ID", "https://sp.example.com/saml"),
        ("SAML_IDP_URL", "https://idp.example.com/sso"),
        ("SAML_ACS_URL", "https://sp.example.com/saml/acs"),
    ];

    #[test]
    fn reads_required_and_defaults() {
        let config = ServiceProviderConfig::from_reader(reader(REQUIRED)).unwrap();
        assert_eq!(config.entity_id(), "https://sp.example.com/saml");
        assert_eq!(config.idp_url(), "https://idp.example.com/sso");
        assert_eq!(config.acs_url(), "https://sp.example.com/saml/acs");
        assert_eq!(config.id_prefix(), "id");
        assert_eq!(config.login_url(), None);
        assert!(config.trusted_certificates().is_empty());
    }

    #[test]
    fn reads_optional_vars() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("SAML_LOGIN_URL", "/home"),
            ("SAML_ID_PREFIX", "_sp"),
            ("SAML_TRUSTED_CERTIFICATES", "aGVsbG8=, d29ybGQ="),
        ]);
        let config = ServiceProviderConfig::from_reader(reader(&vars)).unwrap();
        assert_eq!(config.login_url(), Some("/home"));
        assert_eq!(config.id_prefix(), "_sp");
        assert_eq!(
            config.trusted_certificates(),
            [b"hello".to_vec(), b"world".to_vec()]
        );
    }

    #[test]
    fn missing_or_empty_required_var_is_config_error() {
        let err = ServiceProviderConfig::from_reader(reader(&REQUIRED[..2])).unwrap_err();
        assert!(matches!(err, SamlError::Config(ref msg) if msg.contains("SAML_ACS_URL")));

        let mut vars = REQUIRED.to_vec();
        vars[0] = ("SAML_ENTITY_ID", " ");
        let err = ServiceProviderConfig::from_reader(reader(&vars)).unwrap_err();
        assert!(matches!(err, SamlError::Config(_)));
    }

    #[test]
    fn rejects_invalid_prefix_and_certificates() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("SAML_ID_PREFIX", "1abc"));
        assert!(ServiceProviderConfig::from_reader(reader(&vars)).is_err());

        let mut vars = REQUIRED.to_vec();
        vars.push(("SAML_TRUSTED_CERTIFICATES", "not base64!"));
        assert!(ServiceProviderConfig::from_reader(reader(&vars)).is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ServiceProviderConfig = serde_json::from_str(
            r#"{
                "entity_id": "sp1",
                "idp_url": "https://idp.example.com/sso",
                "acs_url": "https://sp.example.com/acs",
                "trusted_certificates": ["aGVsbG8="]
            }"#,
        )
        .unwrap();
        assert_eq!(
            config,
            ServiceProviderConfig::new(
                "sp1",
                "https://idp.example.com/sso",
                "https://sp.example.com/acs"
            )
            .with_trusted_certificates(vec![b"hello".to_vec()])
        );
        assert!(config.validate().is_ok());
    }
}

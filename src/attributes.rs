use std::collections::{BTreeMap, BTreeSet};

use crate::response::ValidatedAssertion;

/// Fields of [`UserAttributes`] that are filled from a well-known claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimField {
    Name,
    GivenName,
    Surname,
    DisplayName,
    EmailAddress,
    Groups,
}

/// Claim URIs recognized by [`extract`]. Dispatch uses the last path segment,
/// so equivalent claims issued under another base URI land in the same field.
pub const CLAIMS: &[(ClaimField, &str)] = &[
    (
        ClaimField::Name,
        "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/name",
    ),
    (
        ClaimField::GivenName,
        "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/givenname",
    ),
    (
        ClaimField::Surname,
        "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/surname",
    ),
    (
        ClaimField::DisplayName,
        "http://schemas.microsoft.com/identity/claims/displayname",
    ),
    (
        ClaimField::EmailAddress,
        "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress",
    ),
    (
        ClaimField::Groups,
        "http://schemas.microsoft.com/ws/2008/06/identity/claims/groups",
    ),
];

impl ClaimField {
    pub fn claim_uri(self) -> &'static str {
        CLAIMS
            .iter()
            .find(|(field, _)| *field == self)
            .map_or("", |(_, uri)| *uri)
    }

    /// The field whose claim URI ends in `property`.
    pub fn from_property(property: &str) -> Option<Self> {
        CLAIMS
            .iter()
            .find(|(_, uri)| claim_property(uri) == property)
            .map(|(field, _)| *field)
    }
}

/// Normalized identity attributes of an authenticated user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAttributes {
    pub name_id: String,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub given_name: Option<String>,
    pub surname: Option<String>,
    pub email_address: Option<String>,
    pub groups: BTreeSet<String>,
    pub extra_fields: BTreeMap<String, String>,
}

/// Last `/`-separated segment of a claim URI.
pub fn claim_property(claim_uri: &str) -> &str {
    claim_uri.rsplit('/').next().unwrap_or(claim_uri)
}

/// `GRP-Finance-Admins` becomes `ROLE_Finance_Admins`.
pub fn normalize_group(group: &str) -> String {
    let group = group.strip_prefix("GRP-").unwrap_or(group);
    format!("ROLE_{}", group.replace('-', "_"))
}

pub fn extract(assertion: &ValidatedAssertion) -> UserAttributes {
    let mut user = UserAttributes {
        name_id: assertion.name_id().to_string(),
        ..UserAttributes::default()
    };

    for attribute in assertion.attributes() {
        let property = claim_property(&attribute.name);
        // a claim without AttributeValue still counts as present
        let first = attribute.values.first().cloned().unwrap_or_default();
        match ClaimField::from_property(property) {
            Some(ClaimField::Groups) => user
                .groups
                .extend(attribute.values.iter().map(|g| normalize_group(g))),
            Some(ClaimField::Name) => user.name = Some(first),
            Some(ClaimField::GivenName) => user.given_name = Some(first),
            Some(ClaimField::Surname) => user.surname = Some(first),
            Some(ClaimField::DisplayName) => user.display_name = Some(first),
            Some(ClaimField::EmailAddress) => user.email_address = Some(first),
            None => {
                user.extra_fields.insert(property.to_string(), first);
            }
        }
    }

    user
}

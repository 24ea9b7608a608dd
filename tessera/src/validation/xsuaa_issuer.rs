use async_trait::async_trait;
use url::Url;

use crate::{
    error::{self, ConstructionError},
    jwt::{Token, HEADER_JWKS_URL},
};

use super::{Validate, ValidationResult};

/// Checks XSUAA trust via the `jku` header instead of the `iss` claim
///
/// XSUAA access tokens name the key set that can verify them in the `jku`
/// header; the token is trusted when that URL lies under the configured UAA
/// domain and points at a `token_keys` endpoint without query or fragment.
#[derive(Clone, Debug)]
pub struct XsuaaIssuerValidator {
    uaa_domain: String,
}

impl XsuaaIssuerValidator {
    /// Constructs a validator trusting the given UAA domain
    ///
    /// # Errors
    ///
    /// Returns an error if the domain is blank.
    pub fn new(uaa_domain: impl Into<String>) -> Result<Self, ConstructionError> {
        let uaa_domain = uaa_domain.into().trim().to_ascii_lowercase();
        if uaa_domain.is_empty() {
            return Err(error::construction("XSUAA issuer validator requires the UAA domain"));
        }
        Ok(Self { uaa_domain })
    }

    fn matches_uaa_domain(&self, jku: &Url) -> bool {
        jku.host_str()
            .is_some_and(|host| host.ends_with(&self.uaa_domain))
    }

    fn matches_token_keys_endpoint(jku: &Url) -> bool {
        jku.path().ends_with("token_keys") && jku.query().is_none() && jku.fragment().is_none()
    }
}

#[async_trait]
impl Validate for XsuaaIssuerValidator {
    async fn validate(&self, token: &Token) -> ValidationResult {
        let jku = match token.header_param(HEADER_JWKS_URL) {
            Some(jku) if !jku.trim().is_empty() => jku,
            _ => {
                return ValidationResult::invalid(
                    "Issuer validation can not be performed because Jwt token does not contain 'jku' header parameter.",
                )
            }
        };

        let jku_url = match Url::parse(jku) {
            Ok(url) => url,
            Err(_) => {
                return ValidationResult::invalid(
                    "Issuer validation can not be performed because Jwt token does not contain a valid uri as 'jku' header parameter.",
                )
            }
        };

        if !self.matches_uaa_domain(&jku_url) {
            return ValidationResult::invalid(format!(
                "Issuer is not trusted because 'jku' '{jku}' does not match uaa domain '{}' of the identity service.",
                self.uaa_domain
            ));
        }

        if !Self::matches_token_keys_endpoint(&jku_url) {
            return ValidationResult::invalid(format!(
                "Jwt token does not contain a valid 'jku' header parameter: '{jku}'."
            ));
        }

        ValidationResult::Valid
    }
}

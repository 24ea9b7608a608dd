use async_trait::async_trait;
use url::Url;

use crate::{
    error::{self, ConstructionError},
    jwt::Token,
};

use super::{Validate, ValidationResult};

/// Checks that the `iss` claim names a trusted identity provider
///
/// The issuer must be an absolute `http(s)` URI without query or fragment
/// whose host equals one of the trusted domains or is a sub-domain of one
/// (`a.b.com` matches the domain `b.com`; `evilb.com` does not).
#[derive(Clone, Debug)]
pub struct IssuerValidator {
    domains: Vec<String>,
}

impl IssuerValidator {
    /// Trusts issuers under the host of the given identity provider URL
    ///
    /// # Errors
    ///
    /// Returns an error if the URL has no host.
    pub fn from_url(url: &Url) -> Result<Self, ConstructionError> {
        let host = url
            .host_str()
            .ok_or_else(|| error::construction("issuer validator requires a URL with a host"))?;
        Self::from_domains([host.to_owned()])
    }

    /// Trusts issuers under any of the given domains
    ///
    /// # Errors
    ///
    /// Returns an error if the list is empty or contains only blank entries.
    pub fn from_domains<I>(domains: I) -> Result<Self, ConstructionError>
    where
        I: IntoIterator<Item = String>,
    {
        let domains: Vec<String> = domains
            .into_iter()
            .map(|domain| domain.trim().to_ascii_lowercase())
            .filter(|domain| !domain.is_empty())
            .collect();

        if domains.is_empty() {
            return Err(error::construction(
                "issuer validator requires at least one trusted domain",
            ));
        }

        Ok(Self { domains })
    }

    fn matches_any_domain(&self, host: &str) -> bool {
        self.domains
            .iter()
            .any(|domain| host == domain || host.ends_with(&format!(".{domain}")))
    }
}

#[async_trait]
impl Validate for IssuerValidator {
    async fn validate(&self, token: &Token) -> ValidationResult {
        let issuer = match token.issuer() {
            Some(issuer) if !issuer.trim().is_empty() => issuer,
            _ => {
                return ValidationResult::invalid(
                    "Issuer validation can not be performed because Jwt token does not contain 'iss' claim.",
                )
            }
        };

        // a bare host without a scheme is a real historical footgun; it gets
        // its own message
        if !issuer.starts_with("http") {
            return ValidationResult::invalid(format!(
                "Issuer is not trusted because 'iss' claim '{issuer}' does not provide a valid URI (missing http scheme)."
            ));
        }

        let issuer_url = match Url::parse(issuer) {
            Ok(url) => url,
            Err(e) => {
                return ValidationResult::invalid(format!(
                    "Issuer is not trusted because 'iss' claim '{issuer}' does not provide a valid URI: {e}."
                ))
            }
        };

        if issuer_url.query().is_some() || issuer_url.fragment().is_some() {
            return ValidationResult::invalid(format!(
                "Issuer is not trusted because 'iss' '{issuer}' must not contain a query or fragment component."
            ));
        }

        let trusted = issuer_url
            .host_str()
            .is_some_and(|host| self.matches_any_domain(host));
        if !trusted {
            return ValidationResult::invalid(format!(
                "Issuer is not trusted because 'iss' '{issuer}' does not match one of these domains '{:?}' of the identity provider.",
                self.domains
            ));
        }

        ValidationResult::Valid
    }
}

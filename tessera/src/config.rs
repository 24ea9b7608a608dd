//! Identity service configuration
//!
//! The configuration is immutable once built and compared by value; the
//! chain cache relies on that to reuse one built validator chain per
//! distinct configuration.

use std::collections::BTreeMap;

use tessera_client::ClientIdentity;
use url::Url;

use crate::error::{self, ConstructionError};

/// The identity service families, with distinct trust-resolution rules
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// XSUAA: trust is anchored on the `jku` token header
    Xsuaa,
    /// IAS: trust is anchored on the `iss` claim plus OIDC discovery
    Ias,
}

/// Property name of the UAA domain trusted for XSUAA `jku` headers
pub const PROPERTY_UAA_DOMAIN: &str = "uaadomain";
/// Property name of the application id (`xsappname`)
pub const PROPERTY_APP_ID: &str = "xsappname";
/// Property name of the fallback PEM-encoded verification key
pub const PROPERTY_VERIFICATION_KEY: &str = "verificationkey";
/// Property name of the tenant id sent as key-fetch context
pub const PROPERTY_TENANT_ID: &str = "tenantid";

/// The configuration of one bound identity service instance
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OAuth2ServiceConfiguration {
    service: ServiceKind,
    client_identity: ClientIdentity,
    url: Url,
    legacy_mode: bool,
    properties: BTreeMap<String, String>,
}

impl OAuth2ServiceConfiguration {
    /// Starts building a configuration
    #[must_use]
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    /// The identity service family
    #[must_use]
    pub fn service(&self) -> ServiceKind {
        self.service
    }

    /// The client identity bound to this instance
    #[must_use]
    pub fn client_identity(&self) -> &ClientIdentity {
        &self.client_identity
    }

    /// The OAuth2 client id
    #[must_use]
    pub fn client_id(&self) -> &str {
        self.client_identity.client_id()
    }

    /// The base URL of the identity service
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether this instance runs against a legacy on-premise broker
    #[must_use]
    pub fn is_legacy_mode(&self) -> bool {
        self.legacy_mode
    }

    /// A free-form property, when present
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Whether the given property is present
    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// The UAA domain trusted for `jku` headers (XSUAA)
    #[must_use]
    pub fn uaa_domain(&self) -> Option<&str> {
        self.property(PROPERTY_UAA_DOMAIN)
    }

    /// The application id (`xsappname`), when bound
    #[must_use]
    pub fn app_id(&self) -> Option<&str> {
        self.property(PROPERTY_APP_ID)
    }

    /// The fallback PEM-encoded verification key, when configured
    #[must_use]
    pub fn verification_key(&self) -> Option<&str> {
        self.property(PROPERTY_VERIFICATION_KEY)
    }

    /// The tenant id sent as key-fetch context, when configured
    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.property(PROPERTY_TENANT_ID)
    }
}

/// Builds an [`OAuth2ServiceConfiguration`]
#[derive(Debug, Default)]
#[must_use]
pub struct ConfigurationBuilder {
    service: Option<ServiceKind>,
    client_identity: Option<ClientIdentity>,
    url: Option<Url>,
    legacy_mode: bool,
    properties: BTreeMap<String, String>,
}

impl ConfigurationBuilder {
    /// Sets the identity service family (required)
    pub fn service(mut self, service: ServiceKind) -> Self {
        self.service = Some(service);
        self
    }

    /// Sets the client identity (required)
    pub fn client_identity(mut self, client_identity: ClientIdentity) -> Self {
        self.client_identity = Some(client_identity);
        self
    }

    /// Sets a client id and secret identity (required unless
    /// [`client_identity`][Self::client_identity] is used)
    pub fn credentials(self, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        self.client_identity(ClientIdentity::from_credentials(client_id, client_secret))
    }

    /// Sets the base URL of the identity service (required)
    pub fn url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Marks the instance as bound to a legacy on-premise broker
    pub fn legacy_mode(mut self, legacy_mode: bool) -> Self {
        self.legacy_mode = legacy_mode;
        self
    }

    /// Adds a free-form property
    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Builds the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the service kind, client identity, or URL is
    /// missing, or if the client id is blank.
    pub fn build(self) -> Result<OAuth2ServiceConfiguration, ConstructionError> {
        let service = self
            .service
            .ok_or_else(|| error::construction("configuration requires a service kind"))?;
        let client_identity = self
            .client_identity
            .ok_or_else(|| error::construction("configuration requires a client identity"))?;
        if client_identity.client_id().trim().is_empty() {
            return Err(error::construction("configuration requires a non-empty client id"));
        }
        let url = self
            .url
            .ok_or_else(|| error::construction("configuration requires the service base URL"))?;

        Ok(OAuth2ServiceConfiguration {
            service,
            client_identity,
            url,
            legacy_mode: self.legacy_mode,
            properties: self.properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_complete_configuration() {
        let configuration = OAuth2ServiceConfiguration::builder()
            .service(ServiceKind::Xsuaa)
            .credentials("client", "secret")
            .url(Url::parse("https://paas.auth.example.com").unwrap())
            .property(PROPERTY_UAA_DOMAIN, "auth.example.com")
            .property(PROPERTY_APP_ID, "myapp!t1")
            .build()
            .unwrap();

        assert_eq!(configuration.service(), ServiceKind::Xsuaa);
        assert_eq!(configuration.client_id(), "client");
        assert_eq!(configuration.uaa_domain(), Some("auth.example.com"));
        assert_eq!(configuration.app_id(), Some("myapp!t1"));
        assert!(!configuration.is_legacy_mode());
        assert!(configuration.verification_key().is_none());
    }

    #[test]
    fn missing_url_fails_fast() {
        let err = OAuth2ServiceConfiguration::builder()
            .service(ServiceKind::Ias)
            .credentials("client", "secret")
            .build()
            .unwrap_err();
        assert!(err.reason().contains("base URL"));
    }

    #[test]
    fn blank_client_id_fails_fast() {
        let err = OAuth2ServiceConfiguration::builder()
            .service(ServiceKind::Ias)
            .credentials("  ", "secret")
            .url(Url::parse("https://tenant.accounts.example.com").unwrap())
            .build()
            .unwrap_err();
        assert!(err.reason().contains("client id"));
    }

    #[test]
    fn equal_configurations_compare_and_hash_equal() {
        let build = || {
            OAuth2ServiceConfiguration::builder()
                .service(ServiceKind::Xsuaa)
                .credentials("client", "secret")
                .url(Url::parse("https://paas.auth.example.com").unwrap())
                .property(PROPERTY_UAA_DOMAIN, "auth.example.com")
                .build()
                .unwrap()
        };

        assert_eq!(build(), build());

        let mut set = std::collections::HashSet::new();
        set.insert(build());
        set.insert(build());
        assert_eq!(set.len(), 1);
    }
}

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tessera_client::http::{HttpExchange, ReqwestExchange};

use crate::{
    cache::CacheConfiguration,
    config::{OAuth2ServiceConfiguration, ServiceKind},
    discovery::DiscoveryCache,
    error::{self, ConstructionError},
    key_cache::SigningKeyCache,
};

use super::{
    AudienceValidator, IssuerValidator, SignatureValidator, TimestampValidator, Validate,
    ValidationListener, ValidatorChain, XsuaaIssuerValidator,
};

/// Assembles a [`ValidatorChain`] for one identity service configuration
///
/// The default chain is: timestamp validator, issuer validator (by service
/// kind; none in legacy mode), signature validator, audience validator,
/// followed by any caller-supplied validators. Every knob has a sensible
/// default; injection points exist for the HTTP transport, the caches, the
/// audience validator, and listeners.
#[must_use]
pub struct ValidatorChainBuilder {
    configuration: OAuth2ServiceConfiguration,
    other_configuration: Option<OAuth2ServiceConfiguration>,
    custom_validators: Vec<Arc<dyn Validate>>,
    custom_audience_validator: Option<Arc<dyn Validate>>,
    listeners: Vec<Arc<dyn ValidationListener>>,
    exchange: Option<Arc<dyn HttpExchange>>,
    key_cache: Option<Arc<SigningKeyCache>>,
    discovery_cache: Option<Arc<DiscoveryCache>>,
    cache_configuration: Option<CacheConfiguration>,
}

impl ValidatorChainBuilder {
    /// Starts a builder for the given configuration
    pub fn for_configuration(configuration: OAuth2ServiceConfiguration) -> Self {
        Self {
            configuration,
            other_configuration: None,
            custom_validators: Vec::new(),
            custom_audience_validator: None,
            listeners: Vec::new(),
            exchange: None,
            key_cache: None,
            discovery_cache: None,
            cache_configuration: None,
        }
    }

    /// Appends a custom validator after the default ones
    pub fn with_validator(mut self, validator: Arc<dyn Validate>) -> Self {
        self.custom_validators.push(validator);
        self
    }

    /// Replaces the default audience validator
    pub fn with_audience_validator(mut self, validator: Arc<dyn Validate>) -> Self {
        self.custom_audience_validator = Some(validator);
        self
    }

    /// Registers a listener on the built chain
    pub fn with_listener(mut self, listener: Arc<dyn ValidationListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Injects the HTTP transport used by lazily created default caches
    pub fn with_http_exchange(mut self, exchange: Arc<dyn HttpExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    /// Injects a signing-key cache, e.g. one shared across chains
    pub fn with_key_cache(mut self, key_cache: Arc<SigningKeyCache>) -> Self {
        self.key_cache = Some(key_cache);
        self
    }

    /// Injects a discovery cache
    pub fn with_discovery_cache(mut self, discovery_cache: Arc<DiscoveryCache>) -> Self {
        self.discovery_cache = Some(discovery_cache);
        self
    }

    /// Applies bounds to the signing-key cache (floor rules apply)
    pub fn with_cache_configuration(mut self, cache_configuration: CacheConfiguration) -> Self {
        self.cache_configuration = Some(cache_configuration);
        self
    }

    /// Registers a second service instance whose client should be trusted too
    ///
    /// Supports applications bound to two instances of the same identity
    /// service, e.g. the application plan and the broker plan. Passing the
    /// builder's own configuration again is ignored.
    pub fn configure_another_instance(
        mut self,
        other_configuration: Option<OAuth2ServiceConfiguration>,
    ) -> Self {
        self.other_configuration =
            other_configuration.filter(|other| *other != self.configuration);
        self
    }

    /// Builds the chain
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is unusable for its service
    /// kind (e.g. an XSUAA configuration without the `uaadomain` property)
    /// or the default transport cannot be constructed.
    pub fn build(self) -> Result<ValidatorChain, ConstructionError> {
        let mut validators: Vec<Arc<dyn Validate>> = Vec::new();

        validators.push(Arc::new(TimestampValidator::new()));

        match self.configuration.service() {
            ServiceKind::Xsuaa => {
                if !self.configuration.is_legacy_mode() {
                    let uaa_domain = self.configuration.uaa_domain().ok_or_else(|| {
                        error::construction(
                            "an XSUAA configuration requires the 'uaadomain' property",
                        )
                    })?;
                    validators.push(Arc::new(XsuaaIssuerValidator::new(uaa_domain)?));
                }
            }
            ServiceKind::Ias => {
                validators.push(Arc::new(IssuerValidator::from_url(self.configuration.url())?));
            }
        }

        let exchange: Arc<dyn HttpExchange> = match self.exchange {
            Some(exchange) => exchange,
            None => Arc::new(ReqwestExchange::new().map_err(|e| {
                error::construction(format!("default HTTP transport could not be built: {e}"))
            })?),
        };

        let key_cache = self.key_cache.unwrap_or_else(|| {
            Arc::new(SigningKeyCache::new(exchange.clone()).with_context(
                Some(self.configuration.client_id().to_owned()),
                self.configuration.tenant_id().map(ToOwned::to_owned),
            ))
        });
        if let Some(cache_configuration) = self.cache_configuration {
            key_cache.set_configuration(cache_configuration);
        }

        let discovery_cache = self
            .discovery_cache
            .unwrap_or_else(|| Arc::new(DiscoveryCache::new(exchange.clone())));

        validators.push(Arc::new(SignatureValidator::new(
            self.configuration.clone(),
            key_cache,
            discovery_cache,
        )));

        let audience_validator: Arc<dyn Validate> = match self.custom_audience_validator {
            Some(validator) => validator,
            None => {
                let mut validator = AudienceValidator::new(self.configuration.client_id())?;
                if let Some(app_id) = self.configuration.app_id() {
                    validator = validator.trust_client_id(app_id)?;
                }
                if let Some(other) = &self.other_configuration {
                    validator = validator.trust_client_id(other.client_id())?;
                    if let Some(app_id) = other.app_id() {
                        validator = validator.trust_client_id(app_id)?;
                    }
                }
                Arc::new(validator)
            }
        };
        validators.push(audience_validator);

        validators.extend(self.custom_validators);

        let chain = ValidatorChain::new(validators);
        for listener in self.listeners {
            chain.register_listener(listener);
        }

        Ok(chain)
    }
}

impl fmt::Debug for ValidatorChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorChainBuilder")
            .field("configuration", &self.configuration)
            .field("custom_validators", &self.custom_validators.len())
            .finish_non_exhaustive()
    }
}

/// Reuses one built chain per distinct configuration
///
/// Owned explicitly by the embedding application (created at startup, passed
/// where needed); there is no hidden process-wide state. Entries are never
/// evicted; concurrent insertion is safe, the first built chain for a
/// configuration wins. Purely an optimization: building a fresh chain per
/// request would be correct, just wasteful.
#[derive(Default)]
pub struct ChainCache {
    chains: DashMap<OAuth2ServiceConfiguration, Arc<ValidatorChain>>,
}

impl ChainCache {
    /// Constructs an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the chain for `configuration`, building it on first use
    ///
    /// The `customize` hook is applied to the builder only when a chain is
    /// actually built.
    ///
    /// # Errors
    ///
    /// Returns an error if building the chain fails.
    pub fn get_or_build<F>(
        &self,
        configuration: &OAuth2ServiceConfiguration,
        customize: F,
    ) -> Result<Arc<ValidatorChain>, ConstructionError>
    where
        F: FnOnce(ValidatorChainBuilder) -> ValidatorChainBuilder,
    {
        if let Some(chain) = self.chains.get(configuration) {
            return Ok(chain.clone());
        }

        let chain = Arc::new(
            customize(ValidatorChainBuilder::for_configuration(configuration.clone())).build()?,
        );

        // two threads may have built concurrently; the first insert wins
        Ok(self
            .chains
            .entry(configuration.clone())
            .or_insert(chain)
            .value()
            .clone())
    }

    /// The number of cached chains
    #[must_use]
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Whether no chain has been built yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

impl fmt::Debug for ChainCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainCache")
            .field("chains", &self.chains.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tessera_clock::{Clock, DurationSecs, System};

    use crate::{
        jwt::Token,
        test::{
            ias_configuration, xsuaa_configuration, xsuaa_configuration_with, StubExchange,
            TestKey,
        },
        validation::ValidationResult,
    };

    use super::*;

    fn stub_with_keys(key: &TestKey) -> Arc<StubExchange> {
        Arc::new(StubExchange::answering(200, key.jwks_json(&["key-1"])))
    }

    fn future_exp() -> u64 {
        System.now().0 + 300
    }

    #[test]
    fn the_default_xsuaa_chain_has_four_validators() {
        let chain = ValidatorChainBuilder::for_configuration(xsuaa_configuration())
            .with_http_exchange(Arc::new(StubExchange::answering(200, "{}")))
            .build()
            .unwrap();
        assert_eq!(chain.len(), 4);
    }

    #[test]
    fn legacy_mode_skips_the_issuer_validator() {
        let configuration = xsuaa_configuration_with(|builder| builder.legacy_mode(true));
        let chain = ValidatorChainBuilder::for_configuration(configuration)
            .with_http_exchange(Arc::new(StubExchange::answering(200, "{}")))
            .build()
            .unwrap();
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn an_ias_chain_uses_the_generic_issuer_validator() {
        let chain = ValidatorChainBuilder::for_configuration(ias_configuration())
            .with_http_exchange(Arc::new(StubExchange::answering(200, "{}")))
            .build()
            .unwrap();
        assert_eq!(chain.len(), 4);
    }

    #[test]
    fn an_xsuaa_configuration_without_uaadomain_fails_to_build() {
        let configuration = crate::config::OAuth2ServiceConfiguration::builder()
            .service(ServiceKind::Xsuaa)
            .credentials("my-client", "secret")
            .url(url::Url::parse("https://paas.auth.example.com").unwrap())
            .build()
            .unwrap();

        let err = ValidatorChainBuilder::for_configuration(configuration)
            .with_http_exchange(Arc::new(StubExchange::answering(200, "{}")))
            .build()
            .unwrap_err();
        assert!(err.reason().contains("uaadomain"));
    }

    #[test]
    fn cache_configuration_is_applied_to_the_key_cache() {
        let key_cache = Arc::new(SigningKeyCache::new(Arc::new(StubExchange::answering(
            200, "{}",
        ))));
        ValidatorChainBuilder::for_configuration(xsuaa_configuration())
            .with_http_exchange(Arc::new(StubExchange::answering(200, "{}")))
            .with_key_cache(key_cache.clone())
            .with_cache_configuration(CacheConfiguration::new(DurationSecs(1200), 2000))
            .build()
            .unwrap();

        assert_eq!(key_cache.configuration().ttl, DurationSecs(1200));
        assert_eq!(key_cache.configuration().max_entries, 2000);
    }

    #[tokio::test]
    async fn a_custom_validator_runs_after_the_defaults() {
        struct RejectEverything;

        #[async_trait]
        impl super::super::Validate for RejectEverything {
            async fn validate(&self, _token: &Token) -> ValidationResult {
                ValidationResult::invalid("custom check failed")
            }
        }

        let key = TestKey::generate().unwrap();
        let chain = ValidatorChainBuilder::for_configuration(xsuaa_configuration())
            .with_http_exchange(stub_with_keys(&key))
            .with_validator(Arc::new(RejectEverything))
            .build()
            .unwrap();

        let token = key.sign_token(
            serde_json::json!({
                "alg": "RS256",
                "jku": "https://tenant.auth.example.com/token_keys",
                "kid": "key-1"
            }),
            serde_json::json!({
                "iss": "https://tenant.auth.example.com",
                "aud": ["my-client"],
                "exp": future_exp()
            }),
        );

        let result = chain.validate(&token).await;
        assert_eq!(result.reason(), Some("custom check failed"));
    }

    #[tokio::test]
    async fn end_to_end_a_well_formed_xsuaa_token_is_valid() {
        let key = TestKey::generate().unwrap();
        let exchange = stub_with_keys(&key);
        let chain = ValidatorChainBuilder::for_configuration(xsuaa_configuration())
            .with_http_exchange(exchange.clone())
            .build()
            .unwrap();

        let token = key.sign_token(
            serde_json::json!({
                "alg": "RS256",
                "jku": "https://sub.auth.example.com/token_keys",
                "kid": "key-1"
            }),
            serde_json::json!({
                "aud": ["my-client"],
                "exp": future_exp()
            }),
        );

        let result = chain.validate(&token).await;
        assert_eq!(result, ValidationResult::Valid);
        assert_eq!(exchange.gets(), 1);
    }

    #[tokio::test]
    async fn end_to_end_an_evil_jku_never_reaches_the_signature_validator() {
        let key = TestKey::generate().unwrap();
        let exchange = stub_with_keys(&key);
        let chain = ValidatorChainBuilder::for_configuration(xsuaa_configuration())
            .with_http_exchange(exchange.clone())
            .build()
            .unwrap();

        let token = key.sign_token(
            serde_json::json!({
                "alg": "RS256",
                "jku": "https://auth.example.com.evil.example.org/token_keys",
                "kid": "key-1"
            }),
            serde_json::json!({
                "aud": ["my-client"],
                "exp": future_exp()
            }),
        );

        let result = chain.validate(&token).await;
        assert!(result.is_erroneous());
        assert!(result.reason().unwrap().contains("does not match uaa domain"));
        // short-circuited before any key was fetched
        assert_eq!(exchange.gets(), 0);
    }

    #[tokio::test]
    async fn another_instance_widens_the_trusted_client_ids() {
        let key = TestKey::generate().unwrap();
        let exchange = stub_with_keys(&key);
        let other = xsuaa_configuration_with(|builder| builder.credentials("broker-client", "s2"));

        let chain = ValidatorChainBuilder::for_configuration(xsuaa_configuration())
            .with_http_exchange(exchange)
            .configure_another_instance(Some(other))
            .build()
            .unwrap();

        let token = key.sign_token(
            serde_json::json!({
                "alg": "RS256",
                "jku": "https://sub.auth.example.com/token_keys",
                "kid": "key-1"
            }),
            serde_json::json!({
                "aud": ["broker-client"],
                "exp": future_exp()
            }),
        );

        assert!(chain.validate(&token).await.is_valid());
    }

    #[test]
    fn the_chain_cache_reuses_chains_per_configuration() {
        let cache = ChainCache::new();
        let exchange: Arc<StubExchange> = Arc::new(StubExchange::answering(200, "{}"));

        let first = cache
            .get_or_build(&xsuaa_configuration(), |builder| {
                builder.with_http_exchange(exchange.clone())
            })
            .unwrap();
        let second = cache
            .get_or_build(&xsuaa_configuration(), |builder| {
                builder.with_http_exchange(exchange.clone())
            })
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        let other = cache
            .get_or_build(&ias_configuration(), |builder| {
                builder.with_http_exchange(exchange.clone())
            })
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(cache.len(), 2);
    }
}

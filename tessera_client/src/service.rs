//! OAuth2 token acquisition against an identity service token endpoint
//!
//! One method per grant type. Every method substitutes the tenant subdomain
//! into the endpoint, merges caller-supplied parameters without letting them
//! override the mandatory fields, and consults the response cache unless
//! caching is disabled globally or for the request.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tessera_clock::{Clock, System};
use url::Url;

use crate::{
    cache::{CacheKey, TokenCacheConfiguration, TokenResponseCache},
    error::ServiceError,
    http::HttpExchange,
    identity::ClientIdentity,
    response::OAuth2TokenResponse,
    uri::replace_subdomain,
};

// parameter and grant names, exactly as they appear on the wire
const GRANT_TYPE: &str = "grant_type";
const CLIENT_ID: &str = "client_id";
const CLIENT_SECRET: &str = "client_secret";
const REFRESH_TOKEN: &str = "refresh_token";
const USERNAME: &str = "username";
const PASSWORD: &str = "password";
const ASSERTION: &str = "assertion";

/// The `scope` request parameter
pub const SCOPE: &str = "scope";

pub(crate) const GRANT_TYPE_CLIENT_CREDENTIALS: &str = "client_credentials";
pub(crate) const GRANT_TYPE_REFRESH_TOKEN: &str = "refresh_token";
pub(crate) const GRANT_TYPE_PASSWORD: &str = "password";
pub(crate) const GRANT_TYPE_JWT_BEARER: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
pub(crate) const GRANT_TYPE_USER_TOKEN: &str = "user_token";

/// Executes OAuth2 grant requests and caches their responses
pub struct OAuth2TokenService<C = System> {
    exchange: Arc<dyn HttpExchange>,
    cache: TokenResponseCache,
    cache_configuration: TokenCacheConfiguration,
    clock: C,
}

impl<C> fmt::Debug for OAuth2TokenService<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2TokenService")
            .field("cache_configuration", &self.cache_configuration)
            .finish_non_exhaustive()
    }
}

impl OAuth2TokenService<System> {
    /// Constructs a service with the default cache configuration
    pub fn new(exchange: Arc<dyn HttpExchange>) -> Self {
        Self::with_cache_configuration(exchange, TokenCacheConfiguration::default())
    }

    /// Constructs a service with an explicit cache configuration
    pub fn with_cache_configuration(
        exchange: Arc<dyn HttpExchange>,
        cache_configuration: TokenCacheConfiguration,
    ) -> Self {
        Self::with_clock(exchange, cache_configuration, System)
    }
}

impl<C: Clock> OAuth2TokenService<C> {
    /// Constructs a service with an explicit clock
    pub fn with_clock(
        exchange: Arc<dyn HttpExchange>,
        cache_configuration: TokenCacheConfiguration,
        clock: C,
    ) -> Self {
        if cache_configuration.disabled {
            tracing::debug!("configured token service with cache disabled");
        } else {
            tracing::debug!(?cache_configuration, "configured token service");
        }
        Self {
            exchange,
            cache: TokenResponseCache::new(cache_configuration),
            cache_configuration,
            clock,
        }
    }

    /// The active cache configuration
    #[must_use]
    pub fn cache_configuration(&self) -> TokenCacheConfiguration {
        self.cache_configuration
    }

    /// Drops all cached token responses
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Requests a token via the `client_credentials` grant
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the service answers non-2xx,
    /// or the response body is not a usable token response.
    pub async fn client_credentials_token(
        &self,
        token_endpoint: &Url,
        identity: &ClientIdentity,
        subdomain: Option<&str>,
        optional_parameters: Option<&BTreeMap<String, String>>,
        disable_cache: bool,
    ) -> Result<OAuth2TokenResponse, ServiceError> {
        let params = RequestParameters::for_grant(GRANT_TYPE_CLIENT_CREDENTIALS)
            .with_client_identity(identity)
            .with_optional(optional_parameters)
            .build();

        self.get_or_request(token_endpoint, Vec::new(), params, subdomain, disable_cache)
            .await
    }

    /// Requests a token via the `refresh_token` grant
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the service answers non-2xx,
    /// or the response body is not a usable token response.
    pub async fn refresh_token_grant(
        &self,
        token_endpoint: &Url,
        identity: &ClientIdentity,
        refresh_token: &str,
        subdomain: Option<&str>,
        disable_cache: bool,
    ) -> Result<OAuth2TokenResponse, ServiceError> {
        let params = RequestParameters::for_grant(GRANT_TYPE_REFRESH_TOKEN)
            .with_client_identity(identity)
            .with(REFRESH_TOKEN, refresh_token)
            .build();

        self.get_or_request(token_endpoint, Vec::new(), params, subdomain, disable_cache)
            .await
    }

    /// Requests a token via the resource-owner `password` grant
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the service answers non-2xx,
    /// or the response body is not a usable token response.
    pub async fn password_token(
        &self,
        token_endpoint: &Url,
        identity: &ClientIdentity,
        username: &str,
        password: &str,
        subdomain: Option<&str>,
        optional_parameters: Option<&BTreeMap<String, String>>,
        disable_cache: bool,
    ) -> Result<OAuth2TokenResponse, ServiceError> {
        let params = RequestParameters::for_grant(GRANT_TYPE_PASSWORD)
            .with_client_identity(identity)
            .with(USERNAME, username)
            .with(PASSWORD, password)
            .with_optional(optional_parameters)
            .build();

        self.get_or_request(token_endpoint, Vec::new(), params, subdomain, disable_cache)
            .await
    }

    /// Exchanges a bearer token via the JWT bearer token grant
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the service answers non-2xx,
    /// or the response body is not a usable token response.
    pub async fn jwt_bearer_token(
        &self,
        token_endpoint: &Url,
        identity: &ClientIdentity,
        bearer_token: &str,
        subdomain: Option<&str>,
        optional_parameters: Option<&BTreeMap<String, String>>,
        disable_cache: bool,
    ) -> Result<OAuth2TokenResponse, ServiceError> {
        let params = RequestParameters::for_grant(GRANT_TYPE_JWT_BEARER)
            .with_client_identity(identity)
            .with(ASSERTION, bearer_token)
            .with_optional(optional_parameters)
            .build();

        self.get_or_request(token_endpoint, Vec::new(), params, subdomain, disable_cache)
            .await
    }

    /// Exchanges a user token via the `user_token` grant
    ///
    /// The presented token travels as a bearer `Authorization` header and the
    /// request carries only the client id; the answer contains a refresh
    /// token to be redeemed via [`refresh_token_grant`][Self::refresh_token_grant].
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the service answers non-2xx,
    /// or the response body is not a usable token response.
    #[deprecated(note = "the 'user_token' grant is superseded by the JWT bearer token grant")]
    pub async fn user_token(
        &self,
        token_endpoint: &Url,
        identity: &ClientIdentity,
        token: &str,
        subdomain: Option<&str>,
        optional_parameters: Option<&BTreeMap<String, String>>,
    ) -> Result<OAuth2TokenResponse, ServiceError> {
        let params = RequestParameters::for_grant(GRANT_TYPE_USER_TOKEN)
            .with(CLIENT_ID, identity.client_id())
            .with_optional(optional_parameters)
            .build();

        let headers = vec![("Authorization".to_owned(), format!("Bearer {token}"))];

        self.get_or_request(token_endpoint, headers, params, subdomain, false)
            .await
    }

    async fn get_or_request(
        &self,
        token_endpoint: &Url,
        headers: Vec<(String, String)>,
        params: BTreeMap<String, String>,
        subdomain: Option<&str>,
        disable_cache: bool,
    ) -> Result<OAuth2TokenResponse, ServiceError> {
        let endpoint = replace_subdomain(token_endpoint, subdomain);

        if self.cache_configuration.disabled || disable_cache {
            return self.request_token(&endpoint, &headers, &params).await;
        }

        let key = CacheKey {
            endpoint: endpoint.clone(),
            headers,
            params,
        };

        if let Some(cached) = self.cache.lookup(&key, self.clock.now()) {
            tracing::debug!(token.endpoint = %endpoint, "token was found in cache");
            return Ok(cached);
        }

        tracing::debug!(token.endpoint = %endpoint, "token not found in cache, requesting a new one");
        let response = self
            .request_token(&key.endpoint, &key.headers, &key.params)
            .await?;
        self.cache.insert(key, response.clone(), self.clock.now());
        Ok(response)
    }

    async fn request_token(
        &self,
        endpoint: &Url,
        headers: &[(String, String)],
        params: &BTreeMap<String, String>,
    ) -> Result<OAuth2TokenResponse, ServiceError> {
        let response = self.exchange.post_form(endpoint, headers, params).await?;

        if !response.is_success() {
            return Err(ServiceError::error_response(
                response.status,
                endpoint.clone(),
                response.body,
            ));
        }

        OAuth2TokenResponse::from_body(&response.body, endpoint, &self.clock)
    }
}

/// Assembles token request parameters
///
/// Mandatory fields always win: optional parameters are merged with
/// insert-if-absent semantics, so a caller cannot override the grant type or
/// the client credentials.
#[derive(Debug, Default)]
struct RequestParameters {
    parameters: BTreeMap<String, String>,
}

impl RequestParameters {
    fn for_grant(grant_type: &str) -> Self {
        let mut this = Self::default();
        this.parameters
            .insert(GRANT_TYPE.to_owned(), grant_type.to_owned());
        this
    }

    fn with_client_identity(mut self, identity: &ClientIdentity) -> Self {
        self.parameters
            .insert(CLIENT_ID.to_owned(), identity.client_id().to_owned());
        if let Some(secret) = identity.client_secret() {
            self.parameters
                .insert(CLIENT_SECRET.to_owned(), secret.to_owned());
        }
        self
    }

    fn with(mut self, name: &str, value: &str) -> Self {
        self.parameters.insert(name.to_owned(), value.to_owned());
        self
    }

    fn with_optional(mut self, optional: Option<&BTreeMap<String, String>>) -> Self {
        if let Some(optional) = optional {
            for (name, value) in optional {
                self.parameters
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        self
    }

    fn build(self) -> BTreeMap<String, String> {
        self.parameters
    }
}

#[cfg(test)]
mod tests {
    use crate::test::{SharedClock, StubExchange};

    use super::*;

    fn endpoint() -> Url {
        Url::parse("https://paas.auth.example.com/oauth/token").unwrap()
    }

    fn identity() -> ClientIdentity {
        ClientIdentity::from_credentials("my-client", "my-secret")
    }

    fn token_body(token: &str, expires_in: u64) -> String {
        format!(r#"{{"access_token": "{token}", "expires_in": {expires_in}}}"#)
    }

    #[tokio::test]
    async fn sends_mandatory_client_credentials_parameters() {
        let exchange = Arc::new(StubExchange::answering(200, token_body("t1", 600)));
        let service = OAuth2TokenService::new(exchange.clone());

        let response = service
            .client_credentials_token(&endpoint(), &identity(), None, None, false)
            .await
            .unwrap();
        assert_eq!(response.access_token(), "t1");

        let (url, _, params) = exchange.last_post().unwrap();
        assert_eq!(url, endpoint());
        assert_eq!(params.get(GRANT_TYPE).unwrap(), "client_credentials");
        assert_eq!(params.get(CLIENT_ID).unwrap(), "my-client");
        assert_eq!(params.get(CLIENT_SECRET).unwrap(), "my-secret");
    }

    #[tokio::test]
    async fn optional_parameters_cannot_override_mandatory_fields() {
        let exchange = Arc::new(StubExchange::answering(200, token_body("t1", 600)));
        let service = OAuth2TokenService::new(exchange.clone());

        let mut optional = BTreeMap::new();
        optional.insert(GRANT_TYPE.to_owned(), "password".to_owned());
        optional.insert(CLIENT_ID.to_owned(), "evil-client".to_owned());
        optional.insert("custom".to_owned(), "value".to_owned());

        service
            .client_credentials_token(&endpoint(), &identity(), None, Some(&optional), false)
            .await
            .unwrap();

        let (_, _, params) = exchange.last_post().unwrap();
        assert_eq!(params.get(GRANT_TYPE).unwrap(), "client_credentials");
        assert_eq!(params.get(CLIENT_ID).unwrap(), "my-client");
        assert_eq!(params.get("custom").unwrap(), "value");
    }

    #[tokio::test]
    async fn certificate_identity_sends_no_secret() {
        let exchange = Arc::new(StubExchange::answering(200, token_body("t1", 600)));
        let service = OAuth2TokenService::new(exchange.clone());
        let identity = ClientIdentity::from_certificate("cert-client", "CERT", "KEY");

        service
            .client_credentials_token(&endpoint(), &identity, None, None, false)
            .await
            .unwrap();

        let (_, _, params) = exchange.last_post().unwrap();
        assert_eq!(params.get(CLIENT_ID).unwrap(), "cert-client");
        assert!(!params.contains_key(CLIENT_SECRET));
    }

    #[tokio::test]
    async fn substitutes_the_tenant_subdomain() {
        let exchange = Arc::new(StubExchange::answering(200, token_body("t1", 600)));
        let service = OAuth2TokenService::new(exchange.clone());

        service
            .client_credentials_token(&endpoint(), &identity(), Some("tenant"), None, false)
            .await
            .unwrap();

        let (url, _, _) = exchange.last_post().unwrap();
        assert_eq!(url.as_str(), "https://tenant.auth.example.com/oauth/token");
    }

    #[tokio::test]
    async fn second_identical_request_is_served_from_cache() {
        let exchange = Arc::new(StubExchange::answering(200, token_body("t1", 600)));
        let service = OAuth2TokenService::new(exchange.clone());

        for _ in 0..2 {
            let response = service
                .client_credentials_token(&endpoint(), &identity(), None, None, false)
                .await
                .unwrap();
            assert_eq!(response.access_token(), "t1");
        }

        assert_eq!(exchange.posts(), 1);
    }

    #[tokio::test]
    async fn disable_cache_bypasses_the_cache() {
        let exchange = Arc::new(StubExchange::answering(200, token_body("t1", 600)));
        let service = OAuth2TokenService::new(exchange.clone());

        for _ in 0..2 {
            service
                .client_credentials_token(&endpoint(), &identity(), None, None, true)
                .await
                .unwrap();
        }

        assert_eq!(exchange.posts(), 2);
    }

    #[tokio::test]
    async fn refresh_ahead_triggers_exactly_one_refetch() {
        let exchange = Arc::new(StubExchange::answering(200, token_body("t1", 100)));
        let clock = SharedClock::default();
        let service = OAuth2TokenService::with_clock(
            exchange.clone(),
            TokenCacheConfiguration::default(),
            clock.clone(),
        );

        service
            .client_credentials_token(&endpoint(), &identity(), None, None, false)
            .await
            .unwrap();
        assert_eq!(exchange.posts(), 1);

        // expiry at t=100, delta 30s: at t=80 the cached token is stale
        clock.set(80);
        service
            .client_credentials_token(&endpoint(), &identity(), None, None, false)
            .await
            .unwrap();
        assert_eq!(exchange.posts(), 2);

        service
            .client_credentials_token(&endpoint(), &identity(), None, None, false)
            .await
            .unwrap();
        assert_eq!(exchange.posts(), 2);
    }

    #[tokio::test]
    async fn non_2xx_yields_a_typed_error() {
        let exchange = Arc::new(StubExchange::answering(401, "{\"error\":\"unauthorized\"}"));
        let service = OAuth2TokenService::new(exchange);

        let err = service
            .client_credentials_token(&endpoint(), &identity(), None, None, false)
            .await
            .unwrap_err();

        match err {
            ServiceError::ErrorResponse { status, url, body } => {
                assert_eq!(status, 401);
                assert_eq!(url, endpoint());
                assert!(body.contains("unauthorized"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn user_token_grant_sends_bearer_header_and_no_secret() {
        let exchange = Arc::new(StubExchange::answering(
            200,
            r#"{"access_token": "t", "expires_in": 600, "refresh_token": "rt"}"#,
        ));
        let service = OAuth2TokenService::new(exchange.clone());

        #[allow(deprecated)]
        let response = service
            .user_token(&endpoint(), &identity(), "user.jwt.value", None, None)
            .await
            .unwrap();
        assert_eq!(response.refresh_token(), Some("rt"));

        let (_, headers, params) = exchange.last_post().unwrap();
        assert!(headers
            .iter()
            .any(|(name, value)| name == "Authorization" && value == "Bearer user.jwt.value"));
        assert_eq!(params.get(GRANT_TYPE).unwrap(), "user_token");
        assert_eq!(params.get(CLIENT_ID).unwrap(), "my-client");
        assert!(!params.contains_key(CLIENT_SECRET));
    }

    #[tokio::test]
    async fn globally_disabled_cache_always_requests() {
        let exchange = Arc::new(StubExchange::answering(200, token_body("t1", 600)));
        let service = OAuth2TokenService::with_cache_configuration(
            exchange.clone(),
            TokenCacheConfiguration::cache_disabled(),
        );

        for _ in 0..3 {
            service
                .client_credentials_token(&endpoint(), &identity(), None, None, false)
                .await
                .unwrap();
        }

        assert_eq!(exchange.posts(), 3);
    }

    #[tokio::test]
    async fn clear_cache_forgets_cached_responses() {
        let exchange = Arc::new(StubExchange::answering(200, token_body("t1", 600)));
        let service = OAuth2TokenService::new(exchange.clone());

        service
            .client_credentials_token(&endpoint(), &identity(), None, None, false)
            .await
            .unwrap();
        service.clear_cache();
        service
            .client_credentials_token(&endpoint(), &identity(), None, None, false)
            .await
            .unwrap();

        assert_eq!(exchange.posts(), 2);
    }
}

//! Fluent, per-grant request builders layered on the token service
//!
//! Each flow validates its own required fields before executing and wraps
//! service failures into a [`FlowError`] that names the grant.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tessera_clock::{Clock, System};
use thiserror::Error;
use url::Url;

use crate::{
    error::ServiceError,
    identity::ClientIdentity,
    response::OAuth2TokenResponse,
    service::{
        OAuth2TokenService, GRANT_TYPE_CLIENT_CREDENTIALS, GRANT_TYPE_JWT_BEARER,
        GRANT_TYPE_REFRESH_TOKEN, GRANT_TYPE_USER_TOKEN, SCOPE,
    },
};

/// The scope a user token must carry to be exchangeable via the user token flow
pub const UAA_USER_SCOPE: &str = "uaa.user";

/// Derives the well-known endpoints of an XSUAA identity service from its base URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XsuaaEndpoints {
    base: Url,
}

impl XsuaaEndpoints {
    /// Constructs the endpoint provider for the given base URL
    #[must_use]
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    /// The token endpoint (`/oauth/token`)
    #[must_use]
    pub fn token_endpoint(&self) -> Url {
        self.expand("/oauth/token")
    }

    /// The authorize endpoint (`/oauth/authorize`)
    #[must_use]
    pub fn authorize_endpoint(&self) -> Url {
        self.expand("/oauth/authorize")
    }

    /// The key set endpoint (`/token_keys`)
    #[must_use]
    pub fn jwks_endpoint(&self) -> Url {
        self.expand("/token_keys")
    }

    fn expand(&self, suffix: &str) -> Url {
        let mut url = self.base.clone();
        let path = format!("{}{}", self.base.path().trim_end_matches('/'), suffix);
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);
        url
    }
}

/// An error executing a token flow
#[derive(Debug, Error)]
pub enum FlowError {
    /// The token service reported a failure
    #[error("error requesting token with grant_type '{grant}': {source}")]
    Service {
        /// The grant the flow was executing
        grant: &'static str,
        /// The underlying service failure
        #[source]
        source: ServiceError,
    },

    /// A required field of the flow was not set or not acceptable
    #[error("token flow request is not valid: {0}")]
    InvalidRequest(String),

    /// The token exchange did not yield the refresh token the flow needs
    #[error("token exchange did not yield a refresh token")]
    MissingRefreshToken,
}

impl FlowError {
    fn service(grant: &'static str, source: ServiceError) -> Self {
        Self::Service { grant, source }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}

/// Access to the per-grant token flow builders
#[derive(Debug)]
pub struct TokenFlows<C = System> {
    service: Arc<OAuth2TokenService<C>>,
    endpoints: XsuaaEndpoints,
    identity: ClientIdentity,
}

impl<C: Clock> TokenFlows<C> {
    /// Constructs the flow factory
    pub fn new(
        service: Arc<OAuth2TokenService<C>>,
        endpoints: XsuaaEndpoints,
        identity: ClientIdentity,
    ) -> Self {
        Self {
            service,
            endpoints,
            identity,
        }
    }

    /// Starts a client credentials flow
    pub fn client_credentials_flow(&self) -> ClientCredentialsFlow<'_, C> {
        ClientCredentialsFlow {
            flows: self,
            subdomain: None,
            optional_parameters: BTreeMap::new(),
            scopes: Vec::new(),
            disable_cache: false,
        }
    }

    /// Starts a refresh token flow
    pub fn refresh_token_flow(&self) -> RefreshTokenFlow<'_, C> {
        RefreshTokenFlow {
            flows: self,
            refresh_token: None,
            subdomain: None,
            disable_cache: false,
        }
    }

    /// Starts a JWT bearer token flow
    pub fn jwt_bearer_flow(&self) -> JwtBearerFlow<'_, C> {
        JwtBearerFlow {
            flows: self,
            bearer_token: None,
            subdomain: None,
            optional_parameters: BTreeMap::new(),
            scopes: Vec::new(),
            disable_cache: false,
        }
    }

    /// Starts a user token flow
    ///
    /// Historical flow: the presented token must carry the `uaa.user` scope;
    /// the exchange yields a refresh token that is redeemed via the refresh
    /// flow for the final response.
    pub fn user_token_flow(&self) -> UserTokenFlow<'_, C> {
        UserTokenFlow {
            flows: self,
            token: None,
            subdomain: None,
            optional_parameters: BTreeMap::new(),
            disable_cache: false,
        }
    }
}

/// Requests a technical-user token via the client credentials grant
#[derive(Debug)]
#[must_use]
pub struct ClientCredentialsFlow<'a, C> {
    flows: &'a TokenFlows<C>,
    subdomain: Option<String>,
    optional_parameters: BTreeMap<String, String>,
    scopes: Vec<String>,
    disable_cache: bool,
}

impl<C: Clock> ClientCredentialsFlow<'_, C> {
    /// Requests the token for the given tenant subdomain
    pub fn subdomain(mut self, subdomain: impl Into<String>) -> Self {
        self.subdomain = Some(subdomain.into());
        self
    }

    /// Adds an additional request parameter
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.optional_parameters.insert(name.into(), value.into());
        self
    }

    /// Restricts the requested token to the given scopes
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Skips the response cache for this execution
    pub fn disable_cache(mut self, disable_cache: bool) -> Self {
        self.disable_cache = disable_cache;
        self
    }

    /// Executes the flow
    ///
    /// # Errors
    ///
    /// Returns an error if the token service fails.
    pub async fn execute(mut self) -> Result<OAuth2TokenResponse, FlowError> {
        if !self.scopes.is_empty() {
            self.optional_parameters
                .insert(SCOPE.to_owned(), self.scopes.join(" "));
        }

        self.flows
            .service
            .client_credentials_token(
                &self.flows.endpoints.token_endpoint(),
                &self.flows.identity,
                self.subdomain.as_deref(),
                Some(&self.optional_parameters),
                self.disable_cache,
            )
            .await
            .map_err(|e| FlowError::service(GRANT_TYPE_CLIENT_CREDENTIALS, e))
    }
}

/// Redeems a refresh token for a fresh access token
#[derive(Debug)]
#[must_use]
pub struct RefreshTokenFlow<'a, C> {
    flows: &'a TokenFlows<C>,
    refresh_token: Option<String>,
    subdomain: Option<String>,
    disable_cache: bool,
}

impl<C: Clock> RefreshTokenFlow<'_, C> {
    /// The refresh token to redeem (required)
    pub fn refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Requests the token for the given tenant subdomain
    pub fn subdomain(mut self, subdomain: impl Into<String>) -> Self {
        self.subdomain = Some(subdomain.into());
        self
    }

    /// Skips the response cache for this execution
    pub fn disable_cache(mut self, disable_cache: bool) -> Self {
        self.disable_cache = disable_cache;
        self
    }

    /// Executes the flow
    ///
    /// # Errors
    ///
    /// Returns an error if no refresh token was set or the token service
    /// fails.
    pub async fn execute(self) -> Result<OAuth2TokenResponse, FlowError> {
        let refresh_token = self.refresh_token.ok_or_else(|| {
            FlowError::invalid_request(
                "refresh token not set; call refresh_token() before executing the flow",
            )
        })?;

        self.flows
            .service
            .refresh_token_grant(
                &self.flows.endpoints.token_endpoint(),
                &self.flows.identity,
                &refresh_token,
                self.subdomain.as_deref(),
                self.disable_cache,
            )
            .await
            .map_err(|e| FlowError::service(GRANT_TYPE_REFRESH_TOKEN, e))
    }
}

/// Exchanges a user's token for a new token via the JWT bearer grant
#[derive(Debug)]
#[must_use]
pub struct JwtBearerFlow<'a, C> {
    flows: &'a TokenFlows<C>,
    bearer_token: Option<String>,
    subdomain: Option<String>,
    optional_parameters: BTreeMap<String, String>,
    scopes: Vec<String>,
    disable_cache: bool,
}

impl<C: Clock> JwtBearerFlow<'_, C> {
    /// The token to exchange (required)
    pub fn bearer_token(mut self, bearer_token: impl Into<String>) -> Self {
        self.bearer_token = Some(bearer_token.into());
        self
    }

    /// Requests the token for the given tenant subdomain
    pub fn subdomain(mut self, subdomain: impl Into<String>) -> Self {
        self.subdomain = Some(subdomain.into());
        self
    }

    /// Adds an additional request parameter
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.optional_parameters.insert(name.into(), value.into());
        self
    }

    /// Restricts the exchanged token to the given scopes
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Skips the response cache for this execution
    pub fn disable_cache(mut self, disable_cache: bool) -> Self {
        self.disable_cache = disable_cache;
        self
    }

    /// Executes the flow
    ///
    /// # Errors
    ///
    /// Returns an error if no bearer token was set or the token service
    /// fails.
    pub async fn execute(mut self) -> Result<OAuth2TokenResponse, FlowError> {
        let bearer_token = self.bearer_token.ok_or_else(|| {
            FlowError::invalid_request(
                "bearer token not set; call bearer_token() before executing the flow",
            )
        })?;

        if !self.scopes.is_empty() {
            self.optional_parameters
                .insert(SCOPE.to_owned(), self.scopes.join(" "));
        }

        self.flows
            .service
            .jwt_bearer_token(
                &self.flows.endpoints.token_endpoint(),
                &self.flows.identity,
                &bearer_token,
                self.subdomain.as_deref(),
                Some(&self.optional_parameters),
                self.disable_cache,
            )
            .await
            .map_err(|e| FlowError::service(GRANT_TYPE_JWT_BEARER, e))
    }
}

/// Exchanges a user's token via the historical `user_token` grant
#[derive(Debug)]
#[must_use]
pub struct UserTokenFlow<'a, C> {
    flows: &'a TokenFlows<C>,
    token: Option<String>,
    subdomain: Option<String>,
    optional_parameters: BTreeMap<String, String>,
    disable_cache: bool,
}

impl<C: Clock> UserTokenFlow<'_, C> {
    /// The token to exchange (required); must carry the `uaa.user` scope
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Requests the token for the given tenant subdomain
    pub fn subdomain(mut self, subdomain: impl Into<String>) -> Self {
        self.subdomain = Some(subdomain.into());
        self
    }

    /// Adds an additional request parameter
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.optional_parameters.insert(name.into(), value.into());
        self
    }

    /// Skips the response cache for the final refresh execution
    pub fn disable_cache(mut self, disable_cache: bool) -> Self {
        self.disable_cache = disable_cache;
        self
    }

    /// Executes the flow
    ///
    /// # Errors
    ///
    /// Returns an error if no token was set, the token lacks the `uaa.user`
    /// scope, the exchange yields no refresh token, or the token service
    /// fails.
    pub async fn execute(self) -> Result<OAuth2TokenResponse, FlowError> {
        let token = self.token.ok_or_else(|| {
            FlowError::invalid_request("user token not set; call token() before executing the flow")
        })?;

        if !token_scopes(&token).iter().any(|s| s == UAA_USER_SCOPE) {
            return Err(FlowError::invalid_request(format!(
                "the token to be exchanged must include the '{UAA_USER_SCOPE}' scope"
            )));
        }

        #[allow(deprecated)]
        let exchanged = self
            .flows
            .service
            .user_token(
                &self.flows.endpoints.token_endpoint(),
                &self.flows.identity,
                &token,
                self.subdomain.as_deref(),
                Some(&self.optional_parameters),
            )
            .await
            .map_err(|e| FlowError::service(GRANT_TYPE_USER_TOKEN, e))?;

        let refresh_token = exchanged
            .refresh_token()
            .ok_or(FlowError::MissingRefreshToken)?;

        self.flows
            .service
            .refresh_token_grant(
                &self.flows.endpoints.token_endpoint(),
                &self.flows.identity,
                refresh_token,
                self.subdomain.as_deref(),
                self.disable_cache,
            )
            .await
            .map_err(|e| FlowError::service(GRANT_TYPE_REFRESH_TOKEN, e))
    }
}

/// Reads the `scope` claim of an encoded JWT without validating it
///
/// Used only to fail fast before sending an exchange request the identity
/// service would reject anyway; trust decisions never rely on this.
fn token_scopes(raw: &str) -> Vec<String> {
    let mut segments = raw.split('.');
    let payload = match (segments.next(), segments.next()) {
        (Some(_), Some(payload)) => payload,
        _ => return Vec::new(),
    };

    let Ok(bytes) = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) else {
        return Vec::new();
    };
    let Ok(claims) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
        return Vec::new();
    };

    match claims.get("scope") {
        Some(serde_json::Value::Array(scopes)) => scopes
            .iter()
            .filter_map(|s| s.as_str().map(ToOwned::to_owned))
            .collect(),
        Some(serde_json::Value::String(scope)) => vec![scope.clone()],
        _ => Vec::new(),
    }
}

//! The HTTP transport boundary
//!
//! The caches and the token service never talk to the network directly; they
//! go through [`HttpExchange`], so embedding applications can supply their own
//! transport (custom TLS setup, proxies, test stubs). [`ReqwestExchange`] is
//! the default implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use url::Url;

use crate::error::ServiceError;

/// A response as seen by this crate: status code and body
///
/// Non-2xx responses are returned as values here; the caller decides whether
/// a given status is an error for its request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    /// The HTTP status code
    pub status: u16,
    /// The response body
    pub body: String,
}

impl HttpResponse {
    /// Whether the status code signals success (2xx)
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs HTTP requests on behalf of the caches and the token service
#[async_trait]
pub trait HttpExchange: Send + Sync {
    /// Performs a GET request with the given headers
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be sent or the response
    /// could not be read. A non-2xx status is not an error at this layer.
    async fn get(&self, url: &Url, headers: &[(String, String)])
        -> Result<HttpResponse, ServiceError>;

    /// Performs a POST request with a URL-encoded form body
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be sent or the response
    /// could not be read. A non-2xx status is not an error at this layer.
    async fn post_form(
        &self,
        url: &Url,
        headers: &[(String, String)],
        params: &BTreeMap<String, String>,
    ) -> Result<HttpResponse, ServiceError>;
}

/// The default transport, backed by [`reqwest`]
#[derive(Clone, Debug)]
pub struct ReqwestExchange {
    client: reqwest::Client,
}

impl ReqwestExchange {
    /// Constructs a transport with a dedicated client
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying TLS backend cannot be initialized.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tessera_client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl From<reqwest::Client> for ReqwestExchange {
    fn from(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpExchange for ReqwestExchange {
    async fn get(
        &self,
        url: &Url,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, ServiceError> {
        let mut request = self.client.get(url.clone());
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::transport(url.clone(), e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::transport(url.clone(), e))?;

        tracing::debug!(http.url = %url, http.status_code = status, "GET completed");

        Ok(HttpResponse { status, body })
    }

    async fn post_form(
        &self,
        url: &Url,
        headers: &[(String, String)],
        params: &BTreeMap<String, String>,
    ) -> Result<HttpResponse, ServiceError> {
        let mut request = self.client.post(url.clone()).form(params);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::transport(url.clone(), e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::transport(url.clone(), e))?;

        tracing::debug!(http.url = %url, http.status_code = status, "POST completed");

        Ok(HttpResponse { status, body })
    }
}

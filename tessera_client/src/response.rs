use serde::Deserialize;
use tessera_clock::{Clock, DurationSecs, UnixTime};
use url::Url;

use crate::error::ServiceError;

/// A successful answer from the OAuth2 token endpoint
///
/// The absolute expiry instant is fixed at receipt time from `expires_in`,
/// so cache lookups can reason about remaining lifetime without re-reading
/// the token itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuth2TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: DurationSecs,
    expired_at: UnixTime,
}

#[derive(Debug, Deserialize)]
struct TokenResponseDto {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

impl OAuth2TokenResponse {
    /// Parses a token endpoint response body
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not JSON, if `access_token` is absent
    /// or empty, or if `expires_in` is absent or not convertible to a number
    /// of seconds. There is no silent default for a missing lifetime.
    pub fn from_body<C: Clock>(body: &str, url: &Url, clock: &C) -> Result<Self, ServiceError> {
        let dto: TokenResponseDto = serde_json::from_str(body).map_err(|e| {
            ServiceError::invalid_response(url.clone(), format!("token response is not valid JSON: {e}"))
        })?;

        let access_token = dto
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                ServiceError::invalid_response(url.clone(), "token response does not contain 'access_token'")
            })?;

        // 'expires_in' arrives as a JSON number from most servers, but some
        // tenants answer with a numeric string
        let expires_in = match &dto.expires_in {
            Some(serde_json::Value::Number(n)) => n.as_u64(),
            Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| {
            ServiceError::invalid_response(
                url.clone(),
                "token response does not contain a numeric 'expires_in'",
            )
        })?;

        let expires_in = DurationSecs(expires_in);

        Ok(Self {
            access_token,
            refresh_token: dto.refresh_token,
            token_type: dto.token_type,
            expires_in,
            expired_at: clock.now() + expires_in,
        })
    }

    /// The issued access token
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// The refresh token, when the grant yields one
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// The token type as reported by the service (usually `bearer`)
    #[must_use]
    pub fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    /// The lifetime the service granted the token
    #[must_use]
    pub fn expires_in(&self) -> DurationSecs {
        self.expires_in
    }

    /// The absolute instant at which the token expires
    #[must_use]
    pub fn expired_at(&self) -> UnixTime {
        self.expired_at
    }
}

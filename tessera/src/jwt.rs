//! The read-only view of an encoded bearer token
//!
//! Parsing only splits and decodes the token; nothing here is trusted until
//! the validator chain has accepted it. An adversary controls every byte of
//! the header and payload.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};
use tessera_clock::UnixTime;

use crate::error::{self, TokenParseError};

/// The `jku` header naming the key set URL that can verify the token
pub const HEADER_JWKS_URL: &str = "jku";
/// The `kid` header selecting a key within the key set
pub const HEADER_KEY_ID: &str = "kid";
/// The `alg` header naming the signature algorithm
pub const HEADER_ALGORITHM: &str = "alg";

/// The `iss` claim
pub const CLAIM_ISSUER: &str = "iss";
/// The `aud` claim
pub const CLAIM_AUDIENCE: &str = "aud";
/// The `scope` claim carried by XSUAA access tokens
pub const CLAIM_SCOPE: &str = "scope";

/// A parsed, unvalidated bearer token
///
/// Invariant: the raw value splits into exactly three dot-separated
/// segments; anything else fails [`Token::parse`] before a validator runs.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    raw: String,
    header: Map<String, Value>,
    claims: Map<String, Value>,
}

impl Token {
    /// Parses an encoded `header.payload.signature` token
    ///
    /// # Errors
    ///
    /// Returns an error if the token does not have exactly three segments or
    /// if the header or payload is not base64url-encoded JSON.
    pub fn parse(raw: impl Into<String>) -> Result<Self, TokenParseError> {
        let raw = raw.into();

        let mut segments = raw.split('.');
        let (header_segment, payload_segment) =
            match (segments.next(), segments.next(), segments.next(), segments.next()) {
                (Some(header), Some(payload), Some(_signature), None) => (header, payload),
                _ => return Err(error::malformed_token().into()),
            };

        let header_raw =
            decode_base64url(header_segment).map_err(error::malformed_token_header)?;
        let header: Map<String, Value> =
            serde_json::from_slice(&header_raw).map_err(error::malformed_token_header)?;

        let payload_raw =
            decode_base64url(payload_segment).map_err(error::malformed_token_payload)?;
        let claims: Map<String, Value> =
            serde_json::from_slice(&payload_raw).map_err(error::malformed_token_payload)?;

        Ok(Self { raw, header, claims })
    }

    /// The raw encoded value
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// A header parameter as a string, when present
    #[must_use]
    pub fn header_param(&self, name: &str) -> Option<&str> {
        self.header.get(name).and_then(Value::as_str)
    }

    /// Whether the header carries the given parameter
    #[must_use]
    pub fn has_header_param(&self, name: &str) -> bool {
        self.header.contains_key(name)
    }

    /// A claim in its raw JSON form, when present
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// A claim as a string, when present
    #[must_use]
    pub fn claim_as_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    /// A claim as a list of strings
    ///
    /// A single string claim yields a one-element list; anything else yields
    /// an empty list.
    #[must_use]
    pub fn string_list_claim(&self, name: &str) -> Vec<String> {
        match self.claims.get(name) {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(ToOwned::to_owned))
                .collect(),
            Some(Value::String(value)) => vec![value.clone()],
            _ => Vec::new(),
        }
    }

    /// The audiences the token was issued for
    #[must_use]
    pub fn audiences(&self) -> Vec<String> {
        self.string_list_claim(CLAIM_AUDIENCE)
    }

    /// The scopes granted to the token
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        self.string_list_claim(CLAIM_SCOPE)
    }

    /// The `iss` claim, when present
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.claim_as_str(CLAIM_ISSUER)
    }

    /// The expiration instant (`exp`), when present
    #[must_use]
    pub fn expiration(&self) -> Option<UnixTime> {
        self.numeric_claim("exp")
    }

    /// The not-before instant (`nbf`), when present
    #[must_use]
    pub fn not_before(&self) -> Option<UnixTime> {
        self.numeric_claim("nbf")
    }

    /// The issued-at instant (`iat`), when present
    #[must_use]
    pub fn issued_at(&self) -> Option<UnixTime> {
        self.numeric_claim("iat")
    }

    fn numeric_claim(&self, name: &str) -> Option<UnixTime> {
        self.claims.get(name).and_then(Value::as_u64).map(UnixTime)
    }
}

impl FromStr for Token {
    type Err = TokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// The signature segment is elided so a logged token cannot be replayed.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("header", &self.header)
            .field("claims", &self.claims)
            .field("signature", &"…")
            .finish()
    }
}

/// Decodes a base64url segment, with or without trailing padding
pub(crate) fn decode_base64url(segment: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(segment.trim_end_matches('='))
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    fn encode(value: &serde_json::Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
    }

    fn token(header: serde_json::Value, claims: serde_json::Value) -> Token {
        Token::parse(format!("{}.{}.c2lnbmF0dXJl", encode(&header), encode(&claims))).unwrap()
    }

    #[test]
    fn exposes_headers_and_claims() {
        let token = token(
            serde_json::json!({"alg": "RS256", "jku": "https://auth.example.com/token_keys", "kid": "key-1"}),
            serde_json::json!({
                "iss": "https://auth.example.com",
                "aud": ["client-a", "client-b"],
                "scope": ["app.read"],
                "exp": 1700000000u64,
                "nbf": 1600000000u64
            }),
        );

        assert_eq!(token.header_param(HEADER_ALGORITHM), Some("RS256"));
        assert_eq!(
            token.header_param(HEADER_JWKS_URL),
            Some("https://auth.example.com/token_keys")
        );
        assert_eq!(token.header_param(HEADER_KEY_ID), Some("key-1"));
        assert_eq!(token.issuer(), Some("https://auth.example.com"));
        assert_eq!(token.audiences(), vec!["client-a", "client-b"]);
        assert_eq!(token.scopes(), vec!["app.read"]);
        assert_eq!(token.expiration(), Some(UnixTime(1_700_000_000)));
        assert_eq!(token.not_before(), Some(UnixTime(1_600_000_000)));
    }

    #[test]
    fn a_single_string_audience_is_a_one_element_list() {
        let token = token(
            serde_json::json!({"alg": "RS256"}),
            serde_json::json!({"aud": "only-client"}),
        );
        assert_eq!(token.audiences(), vec!["only-client"]);
    }

    #[test]
    fn two_segments_fail_to_parse() {
        let err = Token::parse("eyJhbGciOiJSUzI1NiJ9.eyJzdWIiOiJ0In0").unwrap_err();
        assert!(matches!(err, TokenParseError::MalformedToken(_)));
    }

    #[test]
    fn four_segments_fail_to_parse() {
        let err = Token::parse("a.b.c.d").unwrap_err();
        assert!(matches!(err, TokenParseError::MalformedToken(_)));
    }

    #[test]
    fn non_json_header_fails_to_parse() {
        let payload = encode(&serde_json::json!({"sub": "t"}));
        let err = Token::parse(format!("bm90anNvbg.{payload}.sig")).unwrap_err();
        assert!(matches!(err, TokenParseError::MalformedHeader(_)));
    }

    #[test]
    fn padded_segments_are_accepted() -> Result<()> {
        // a header whose base64 form carries trailing '=' padding
        let header = base64::engine::general_purpose::URL_SAFE
            .encode(serde_json::to_vec(&serde_json::json!({"alg": "RS256", "kid": "a"}))?);
        assert!(header.ends_with('='));

        let payload = encode(&serde_json::json!({"sub": "t"}));
        let token = Token::parse(format!("{header}.{payload}.sig"))?;
        assert_eq!(token.header_param(HEADER_ALGORITHM), Some("RS256"));
        assert_eq!(token.header_param(HEADER_KEY_ID), Some("a"));
        Ok(())
    }

    #[test]
    fn debug_elides_the_signature() {
        let token = token(
            serde_json::json!({"alg": "RS256"}),
            serde_json::json!({"sub": "t"}),
        );
        assert!(!format!("{token:?}").contains("c2lnbmF0dXJl"));
    }
}

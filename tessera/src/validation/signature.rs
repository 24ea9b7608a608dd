use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::{
    config::{OAuth2ServiceConfiguration, ServiceKind},
    discovery::{discovery_uri, DiscoveryCache},
    jwa::{SignatureAlgorithm, VerificationKey},
    jwk::{DEFAULT_KEY_ID, LEGACY_KEY_ID},
    jwt::{decode_base64url, Token, HEADER_ALGORITHM, HEADER_JWKS_URL, HEADER_KEY_ID},
    key_cache::SigningKeyCache,
};

use super::{Validate, ValidationResult};

/// Checks that the token was signed by the trustworthy identity service
///
/// Resolves the key set URI for the token, obtains the public key through
/// the signing-key cache, and verifies the signature over the encoded
/// `header.payload`. Trust in the key set URI itself is established by the
/// issuer validators running earlier in the chain; this validator only uses
/// the value.
///
/// Every failure, including infrastructure failures while fetching keys, is
/// converted into an [`Invalid`][ValidationResult::Invalid] result; this
/// validator never raises an error out of `validate`.
#[derive(Clone, Debug)]
pub struct SignatureValidator {
    configuration: OAuth2ServiceConfiguration,
    keys: Arc<SigningKeyCache>,
    discovery: Arc<DiscoveryCache>,
}

impl SignatureValidator {
    /// Constructs a validator over the given caches
    #[must_use]
    pub fn new(
        configuration: OAuth2ServiceConfiguration,
        keys: Arc<SigningKeyCache>,
        discovery: Arc<DiscoveryCache>,
    ) -> Self {
        Self {
            configuration,
            keys,
            discovery,
        }
    }

    fn signature_algorithm(token: &Token) -> Result<SignatureAlgorithm, String> {
        match token.header_param(HEADER_ALGORITHM) {
            Some(alg) => SignatureAlgorithm::from_value(alg).ok_or_else(|| {
                format!("Jwt token with signature algorithm '{alg}' is not supported.")
            }),
            None => Ok(SignatureAlgorithm::RS256),
        }
    }

    fn key_id(&self, token: &Token) -> String {
        if self.configuration.is_legacy_mode() {
            return LEGACY_KEY_ID.to_owned();
        }
        if let Some(kid) = token.header_param(HEADER_KEY_ID) {
            return kid.to_owned();
        }
        // historical default for identity providers that publish unnamed keys
        DEFAULT_KEY_ID.to_owned()
    }

    async fn jwks_uri(&self, token: &Token) -> Result<Url, String> {
        if self.configuration.is_legacy_mode() {
            // legacy broker tokens have no better trust anchor than the
            // configured service URL
            let base = self.configuration.url();
            let mut url = base.clone();
            url.set_path(&format!("{}/token_keys", base.path().trim_end_matches('/')));
            return Ok(url);
        }

        if self.configuration.service() == ServiceKind::Xsuaa {
            if let Some(jku) = token.header_param(HEADER_JWKS_URL) {
                // trust in 'jku' was established by the XSUAA issuer validator
                return Url::parse(jku).map_err(|e| {
                    format!("Jwt token does not provide a valid 'jku' header parameter: {e}.")
                });
            }
        }

        if self.configuration.service() != ServiceKind::Xsuaa {
            if let Some(issuer) = token.issuer() {
                // 'iss' was already validated; resolve its key set via discovery
                let discovery = discovery_uri(issuer).map_err(|e| {
                    format!("Jwt token does not provide a valid 'iss' claim: {e}.")
                })?;

                match self.discovery.get_or_fetch(&discovery).await {
                    Ok(endpoints) => {
                        if let Some(jwks_uri) = endpoints.jwks_uri {
                            return Ok(jwks_uri);
                        }
                    }
                    Err(e) => {
                        return Err(format!("Error occurred during jwks uri determination: {e}."))
                    }
                }
            }
        }

        Err(
            "Token signature can not be validated as the jwks uri can not be determined: \
             token provides neither a 'jku' header nor an 'iss' claim."
                .to_owned(),
        )
    }

    async fn resolve_key(
        &self,
        algorithm: SignatureAlgorithm,
        key_id: &str,
        jwks_uri: &Url,
    ) -> Result<VerificationKey, String> {
        let failure = match self.keys.get_public_key(algorithm, key_id, jwks_uri).await {
            Ok(Some(key)) => return Ok(key),
            Ok(None) => format!(
                "There is no JSON Web Key with id '{key_id}' and type '{algorithm}' to prove the identity of the Jwt."
            ),
            Err(e) => format!("Error retrieving JSON Web Keys from the identity service: {e}."),
        };

        // the configuration may carry a PEM public key as a last resort
        match self.configuration.verification_key() {
            Some(pem) => VerificationKey::from_pem(pem).map_err(|e| {
                format!("{failure} Fallback with the configured 'verificationkey' was not successful: {e}.")
            }),
            None => Err(failure),
        }
    }
}

#[async_trait]
impl Validate for SignatureValidator {
    async fn validate(&self, token: &Token) -> ValidationResult {
        let algorithm = match Self::signature_algorithm(token) {
            Ok(algorithm) => algorithm,
            Err(reason) => return ValidationResult::invalid(reason),
        };

        let jwks_uri = match self.jwks_uri(token).await {
            Ok(jwks_uri) => jwks_uri,
            Err(reason) => return ValidationResult::invalid(reason),
        };

        let key_id = self.key_id(token);
        let key = match self.resolve_key(algorithm, &key_id, &jwks_uri).await {
            Ok(key) => key,
            Err(reason) => return ValidationResult::invalid(reason),
        };

        verify_token_signature(token.raw(), algorithm, &key)
    }
}

/// Verifies the signature segment over the encoded `header.payload` bytes
fn verify_token_signature(
    raw: &str,
    algorithm: SignatureAlgorithm,
    key: &VerificationKey,
) -> ValidationResult {
    let segments: Vec<&str> = raw.split('.').collect();
    if segments.len() != 3 {
        return ValidationResult::invalid(
            "Jwt token does not consist of 'header'.'payload'.'signature'.",
        );
    }

    let message_len = segments[0].len() + 1 + segments[1].len();
    let message = &raw[..message_len];

    let signature = match decode_base64url(segments[2]) {
        Ok(signature) => signature,
        Err(e) => {
            return ValidationResult::invalid(format!(
                "Error occurred during Json Web Signature validation: {e}."
            ))
        }
    };

    match key.verify(algorithm, message.as_bytes(), &signature) {
        Ok(()) => ValidationResult::Valid,
        Err(_) => ValidationResult::invalid(
            "Signature of Jwt Token is not valid: the identity provided by the JSON Web Token Key can not be verified.",
        ),
    }
}

//! JSON Web Keys as published at an identity service's key set endpoint
//!
//! Key sets deserialize leniently: entries that are not usable RSA signing
//! keys are skipped with a warning rather than failing the whole document,
//! since identity services routinely publish encryption keys or algorithms
//! this crate does not verify.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

use crate::jwa::{SignatureAlgorithm, VerificationKey};

/// The key id assumed when a token or a published key carries none
pub const DEFAULT_KEY_ID: &str = "default-kid";

/// The sentinel key id used for tokens issued by a legacy-mode broker
pub const LEGACY_KEY_ID: &str = "legacy-token-key";

/// A single verification key published by the identity service
#[derive(Clone, Debug)]
pub struct JsonWebKey {
    key_id: Option<String>,
    algorithm: SignatureAlgorithm,
    key: VerificationKey,
}

impl JsonWebKey {
    /// The key id, or [`DEFAULT_KEY_ID`] when the service published none
    #[must_use]
    pub fn key_id(&self) -> &str {
        self.key_id.as_deref().unwrap_or(DEFAULT_KEY_ID)
    }

    /// The algorithm this key verifies
    #[must_use]
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// The verification key material
    #[must_use]
    pub fn verification_key(&self) -> &VerificationKey {
        &self.key
    }
}

#[derive(Debug, Deserialize)]
struct JwkDto {
    #[serde(default)]
    kid: Option<String>,
    #[serde(default, rename = "use")]
    usage: Option<String>,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    kty: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

impl TryFrom<JwkDto> for JsonWebKey {
    type Error = String;

    fn try_from(dto: JwkDto) -> Result<Self, Self::Error> {
        match dto.kty.as_deref() {
            Some("RSA") => {}
            Some(other) => return Err(format!("unsupported key type '{other}'")),
            None => return Err("missing key type".to_owned()),
        }

        if let Some(usage) = &dto.usage {
            if usage != "sig" {
                return Err(format!("unusable key usage '{usage}'"));
            }
        }

        let algorithm = match &dto.alg {
            Some(alg) => SignatureAlgorithm::from_value(alg)
                .ok_or_else(|| format!("unsupported algorithm '{alg}'"))?,
            None => SignatureAlgorithm::RS256,
        };

        let modulus = decode_component(dto.n.as_deref(), "n")?;
        let exponent = decode_component(dto.e.as_deref(), "e")?;
        let key = VerificationKey::from_components(modulus, exponent)
            .map_err(|e| format!("unusable key material: {e}"))?;

        Ok(Self {
            key_id: dto.kid,
            algorithm,
            key,
        })
    }
}

fn decode_component(component: Option<&str>, name: &str) -> Result<Vec<u8>, String> {
    let component = component.ok_or_else(|| format!("missing '{name}' component"))?;
    URL_SAFE_NO_PAD
        .decode(component.trim_end_matches('='))
        .map_err(|e| format!("'{name}' component is not base64url: {e}"))
}

/// The parsed answer of a key set (JWKS) endpoint
#[derive(Clone, Debug, Default)]
pub struct JsonWebKeySet {
    keys: Vec<JsonWebKey>,
}

impl JsonWebKeySet {
    /// The usable keys of the set
    #[must_use]
    pub fn keys(&self) -> &[JsonWebKey] {
        &self.keys
    }

    /// Whether the set contains no usable key
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<'de> Deserialize<'de> for JsonWebKeySet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Dto {
            #[serde(default)]
            keys: Vec<serde_json::Value>,
        }

        let dto = Dto::deserialize(deserializer)?;
        let keys = dto
            .keys
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| {
                let kid = value.get("kid").and_then(|v| v.as_str()).map(ToOwned::to_owned);
                match serde_json::from_value::<JwkDto>(value)
                    .map_err(|e| e.to_string())
                    .and_then(JsonWebKey::try_from)
                {
                    Ok(key) => Some(key),
                    Err(reason) => {
                        tracing::warn!(jwks.idx = index, jwk.kid = ?kid, %reason, "ignoring unusable JSON Web Key");
                        None
                    }
                }
            })
            .collect();

        Ok(Self { keys })
    }
}

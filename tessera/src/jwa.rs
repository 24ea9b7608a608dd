//! Signature algorithms and the verification keys that back them

use std::fmt;

use crate::error::{self, KeyRejected, SignatureMismatch};

/// Token signature algorithms supported for verification
///
/// This list may be expanded in the future.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SignatureAlgorithm {
    /// RSA using SHA-256 and PKCS 1.5 padding
    RS256,
}

impl SignatureAlgorithm {
    /// Resolves an `alg` header value to a supported algorithm
    #[must_use]
    pub fn from_value(value: &str) -> Option<Self> {
        match value {
            "RS256" => Some(Self::RS256),
            _ => None,
        }
    }

    /// The `alg` header value for this algorithm
    #[must_use]
    pub const fn value(self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
        }
    }

    fn verification_params(self) -> &'static ring::signature::RsaParameters {
        match self {
            Self::RS256 => &ring::signature::RSA_PKCS1_2048_8192_SHA256,
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

/// An RSA public key used to verify token signatures
#[derive(Clone, PartialEq, Eq)]
pub struct VerificationKey {
    modulus: Vec<u8>,
    exponent: Vec<u8>,
}

impl VerificationKey {
    /// Constructs a key from its raw modulus and exponent
    ///
    /// # Errors
    ///
    /// Returns an error if either component is empty.
    pub fn from_components(modulus: Vec<u8>, exponent: Vec<u8>) -> Result<Self, KeyRejected> {
        if modulus.is_empty() || exponent.is_empty() {
            return Err(error::key_rejected("key modulus and exponent must be non-empty"));
        }
        Ok(Self { modulus, exponent })
    }

    /// Imports an RSA public key from a PEM document
    ///
    /// A bare base64 body without the `BEGIN PUBLIC KEY` armor, as handed out
    /// in some service bindings, is accepted as well.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM is not a valid RSA public key.
    pub fn from_pem(pem: &str) -> Result<Self, KeyRejected> {
        let trimmed = pem.trim();
        let armored;
        let pem = if trimmed.contains("-----BEGIN") {
            trimmed
        } else {
            armored = format!("-----BEGIN PUBLIC KEY-----\n{trimmed}\n-----END PUBLIC KEY-----\n");
            &armored
        };

        let rsa = openssl::rsa::Rsa::public_key_from_pem(pem.as_bytes())
            .map_err(error::key_rejected)?;
        Self::from_components(rsa.n().to_vec(), rsa.e().to_vec())
    }

    /// Verifies `signature` over `data` with this key
    ///
    /// # Errors
    ///
    /// Returns an error if the signature does not match. Every verification
    /// failure, including malformed key material, surfaces as a mismatch.
    pub fn verify(
        &self,
        alg: SignatureAlgorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), SignatureMismatch> {
        let pk = ring::signature::RsaPublicKeyComponents {
            n: self.modulus.as_slice(),
            e: self.exponent.as_slice(),
        };

        pk.verify(alg.verification_params(), data, signature)
            .map_err(|_| error::signature_mismatch())
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("modulus_bits", &(self.modulus.len() * 8))
            .finish_non_exhaustive()
    }
}

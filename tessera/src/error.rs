//! Common errors

#![allow(missing_copy_implementations)]

use std::error::Error as StdError;

use thiserror::Error;

/// The token cannot be split into header, payload, and signature sections
#[derive(Clone, Copy, Debug, Error)]
#[error("token does not consist of 'header'.'payload'.'signature'")]
pub struct MalformedToken {
    _p: (),
}

pub(crate) fn malformed_token() -> MalformedToken {
    MalformedToken { _p: () }
}

/// The token header section is malformed
#[derive(Debug, Error)]
#[error("malformed token header")]
pub struct MalformedTokenHeader {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn malformed_token_header(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> MalformedTokenHeader {
    MalformedTokenHeader {
        source: source.into(),
    }
}

/// The token payload section is malformed
#[derive(Debug, Error)]
#[error("malformed token payload")]
pub struct MalformedTokenPayload {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn malformed_token_payload(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> MalformedTokenPayload {
    MalformedTokenPayload {
        source: source.into(),
    }
}

/// An error occurring while parsing an encoded token
#[derive(Debug, Error)]
pub enum TokenParseError {
    /// The token has no discernible header, payload, and signature
    #[error(transparent)]
    MalformedToken(#[from] MalformedToken),

    /// The token header is malformed
    #[error(transparent)]
    MalformedHeader(#[from] MalformedTokenHeader),

    /// The token payload is malformed
    #[error(transparent)]
    MalformedPayload(#[from] MalformedTokenPayload),
}

/// The signature did not match
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("signature mismatch")]
pub struct SignatureMismatch {
    _p: (),
}

pub(crate) const fn signature_mismatch() -> SignatureMismatch {
    SignatureMismatch { _p: () }
}

/// The key was rejected
#[derive(Debug, Error)]
#[error("key rejected")]
pub struct KeyRejected {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn key_rejected(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> KeyRejected {
    KeyRejected {
        source: source.into(),
    }
}

/// A validator, chain, or configuration was constructed with invalid arguments
///
/// Construction-time misuse fails fast through this type rather than
/// surfacing at first use.
#[derive(Debug, Error)]
#[error("invalid construction: {reason}")]
pub struct ConstructionError {
    reason: String,
}

impl ConstructionError {
    /// What was wrong with the construction arguments
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

pub(crate) fn construction(reason: impl Into<String>) -> ConstructionError {
    ConstructionError {
        reason: reason.into(),
    }
}

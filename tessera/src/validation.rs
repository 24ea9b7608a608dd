//! The token validation pipeline
//!
//! A token is trusted only after an ordered chain of validators has accepted
//! it. Expected trust failures are values ([`ValidationResult::Invalid`]);
//! they never propagate as errors out of a validator.

use async_trait::async_trait;

use crate::jwt::Token;

mod audience;
mod builder;
mod chain;
mod issuer;
mod result;
mod signature;
mod timestamp;
mod xsuaa_issuer;

pub use audience::AudienceValidator;
pub use builder::{ChainCache, ValidatorChainBuilder};
pub use chain::ValidatorChain;
pub use issuer::IssuerValidator;
pub use result::ValidationResult;
pub use signature::SignatureValidator;
pub use timestamp::TimestampValidator;
pub use xsuaa_issuer::XsuaaIssuerValidator;

/// The capability every validator provides
///
/// Validation is async because signature verification may need to fetch the
/// issuer's keys; check-only validators return immediately.
#[async_trait]
pub trait Validate: Send + Sync {
    /// Decides whether the token passes this check
    async fn validate(&self, token: &Token) -> ValidationResult;
}

/// Observes the outcome of chain validations
///
/// Listeners registered on a chain are notified once per `validate` call,
/// with the failing result on error.
pub trait ValidationListener: Send + Sync {
    /// Called when the chain accepted a token
    fn on_validation_success(&self) {}

    /// Called when the chain rejected a token
    fn on_validation_error(&self, result: &ValidationResult) {
        let _ = result;
    }
}

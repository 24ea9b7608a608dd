use async_trait::async_trait;
use tessera_clock::{Clock, System};

use crate::jwt::Token;

use super::{Validate, ValidationResult};

/// Checks the token's `exp`, `nbf`, and `iat` claims against the clock
///
/// Expiry is enforced with zero tolerance: a token whose `exp` equals the
/// current second is already rejected. Missing timestamp claims are
/// accepted; a token without `exp` simply never expires here.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimestampValidator<C = System> {
    clock: C,
}

impl TimestampValidator {
    /// Constructs a validator on the system clock
    #[must_use]
    pub fn new() -> Self {
        Self { clock: System }
    }
}

impl<C: Clock> TimestampValidator<C> {
    /// Constructs a validator on the given clock; used by tests
    #[must_use]
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl<C: Clock + Send + Sync> Validate for TimestampValidator<C> {
    async fn validate(&self, token: &Token) -> ValidationResult {
        let now = self.clock.now();

        if let Some(expiration) = token.expiration() {
            if now >= expiration {
                return ValidationResult::invalid(format!(
                    "Jwt expired at {} (epoch seconds), time now: {}",
                    expiration.0, now.0
                ));
            }
        }

        if let Some(not_before) = token.not_before() {
            if now < not_before {
                return ValidationResult::invalid(format!(
                    "Jwt cannot be accepted before {} (epoch seconds), time now: {}",
                    not_before.0, now.0
                ));
            }
        }

        if let Some(issued_at) = token.issued_at() {
            if issued_at > now {
                return ValidationResult::invalid(format!(
                    "Jwt claims to be issued at {} (epoch seconds), which is in the future, time now: {}",
                    issued_at.0, now.0
                ));
            }
        }

        ValidationResult::Valid
    }
}

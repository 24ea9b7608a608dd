use std::fmt;
use std::sync::{Arc, Mutex};

use crate::jwt::Token;

use super::{Validate, ValidationListener, ValidationResult};

/// Runs validators strictly in order, short-circuiting on the first failure
///
/// Later validators rely on earlier ones having already established trust of
/// the values they consume (the signature validator uses the `jku` header
/// the issuer validator vetted), so the order is a contract, not a detail.
///
/// The validator list is immutable after construction; listeners may be
/// registered and removed at any time, by pointer identity, duplicates
/// ignored.
pub struct ValidatorChain {
    validators: Vec<Arc<dyn Validate>>,
    listeners: Mutex<Vec<Arc<dyn ValidationListener>>>,
}

impl ValidatorChain {
    /// Constructs a chain over the given validators
    #[must_use]
    pub fn new(validators: Vec<Arc<dyn Validate>>) -> Self {
        Self {
            validators,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// The number of validators in the chain
    #[must_use]
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Whether the chain holds no validator at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Decides whether the token is trusted
    ///
    /// The first `Invalid` result ends the run and is returned as the
    /// chain's result; no later validator is invoked. An empty chain is
    /// itself a failure, so a mis-built chain cannot silently accept
    /// everything.
    pub async fn validate(&self, token: &Token) -> ValidationResult {
        if self.validators.is_empty() {
            let result =
                ValidationResult::invalid("Validator chain must contain at least one validator.");
            self.notify_error(&result);
            return result;
        }

        for validator in &self.validators {
            let result = validator.validate(token).await;
            if result.is_erroneous() {
                tracing::debug!(reason = result.reason().unwrap_or(""), "token validation failed");
                self.notify_error(&result);
                return result;
            }
        }

        self.notify_success();
        ValidationResult::Valid
    }

    /// Registers a listener; a listener already registered is not added twice
    pub fn register_listener(&self, listener: Arc<dyn ValidationListener>) {
        let mut listeners = self.listeners.lock().expect("listener set poisoned");
        if !listeners.iter().any(|known| Arc::ptr_eq(known, &listener)) {
            listeners.push(listener);
        }
    }

    /// Removes a previously registered listener
    pub fn remove_listener(&self, listener: &Arc<dyn ValidationListener>) {
        let mut listeners = self.listeners.lock().expect("listener set poisoned");
        listeners.retain(|known| !Arc::ptr_eq(known, listener));
    }

    fn notify_error(&self, result: &ValidationResult) {
        let listeners = self.snapshot_listeners();
        for listener in listeners {
            listener.on_validation_error(result);
        }
    }

    fn notify_success(&self) {
        let listeners = self.snapshot_listeners();
        for listener in listeners {
            listener.on_validation_success();
        }
    }

    fn snapshot_listeners(&self) -> Vec<Arc<dyn ValidationListener>> {
        self.listeners.lock().expect("listener set poisoned").clone()
    }
}

impl fmt::Debug for ValidatorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorChain")
            .field("validators", &self.validators.len())
            .finish_non_exhaustive()
    }
}

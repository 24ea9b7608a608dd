use async_trait::async_trait;

use crate::{
    error::{self, ConstructionError},
    jwt::Token,
};

use super::{Validate, ValidationResult};

/// Checks that the token was issued for one of the configured client ids
///
/// CF UAA derives token audiences from scopes; namespaced entries keep only
/// the part before the first `.`. Broker-plan clones (client ids containing
/// `!b`) are additionally matched via the `|<client id>` audience suffix
/// convention.
#[derive(Clone, Debug)]
pub struct AudienceValidator {
    client_ids: Vec<String>,
}

impl AudienceValidator {
    /// Constructs a validator trusting the given client id
    ///
    /// # Errors
    ///
    /// Returns an error if the client id is blank.
    pub fn new(client_id: impl Into<String>) -> Result<Self, ConstructionError> {
        Self {
            client_ids: Vec::new(),
        }
        .trust_client_id(client_id)
    }

    /// Additionally trusts the given client id
    ///
    /// Duplicates are ignored; insertion order is retained.
    ///
    /// # Errors
    ///
    /// Returns an error if the client id is blank.
    pub fn trust_client_id(mut self, client_id: impl Into<String>) -> Result<Self, ConstructionError> {
        let client_id = client_id.into();
        if client_id.trim().is_empty() {
            return Err(error::construction("audience validator requires a client id"));
        }
        if !self.client_ids.contains(&client_id) {
            tracing::debug!(%client_id, "configured audience validator with client id");
            self.client_ids.push(client_id);
        }
        Ok(self)
    }

    fn matches_directly(&self, audiences: &[String]) -> bool {
        self.client_ids
            .iter()
            .any(|client_id| audiences.iter().any(|audience| audience == client_id))
    }

    fn matches_broker_clone(&self, audiences: &[String]) -> bool {
        self.client_ids
            .iter()
            .filter(|client_id| client_id.contains("!b"))
            .any(|client_id| {
                audiences.iter().any(|audience| {
                    audience.contains('|') && audience.ends_with(&format!("|{client_id}"))
                })
            })
    }
}

#[async_trait]
impl Validate for AudienceValidator {
    async fn validate(&self, token: &Token) -> ValidationResult {
        let audiences = extract_audiences(token);

        if self.matches_directly(&audiences) || self.matches_broker_clone(&audiences) {
            return ValidationResult::Valid;
        }

        ValidationResult::invalid(format!(
            "Jwt token with audience {:?} is not issued for these client ids: {:?}.",
            audiences, self.client_ids
        ))
    }
}

/// Collects the audiences the token may be matched against
///
/// Audience entries containing a `.` keep only the prefix before the first
/// dot (trimmed; empty results dropped). When the `aud` claim yields
/// nothing, audiences are derived from the namespaced entries of the
/// `scope` claim the same way. Both rules are legacy CF UAA conventions and
/// are preserved exactly, including their order-dependence for client ids
/// that themselves contain dots.
fn extract_audiences(token: &Token) -> Vec<String> {
    let mut audiences = Vec::new();

    for audience in token.audiences() {
        let audience = match audience.find('.') {
            Some(dot) => audience[..dot].trim().to_owned(),
            None => audience,
        };
        if !audience.is_empty() && !audiences.contains(&audience) {
            audiences.push(audience);
        }
    }

    if audiences.is_empty() {
        for scope in token.scopes() {
            if let Some(dot) = scope.find('.') {
                let derived = scope[..dot].trim().to_owned();
                if !derived.is_empty() && !audiences.contains(&derived) {
                    audiences.push(derived);
                }
            }
        }
    }

    audiences
}

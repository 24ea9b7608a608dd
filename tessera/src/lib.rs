//! Decides whether a bearer token presented to a service can be trusted
//!
//! A token is trusted when it was issued by a trustworthy identity service
//! (XSUAA or IAS), is unexpired, intact, and intended for this application.
//! The decision runs through an ordered [`ValidatorChain`]: timestamps
//! first, then issuer trust, then the cryptographic signature (backed by a
//! signing-key cache and, for IAS, an OIDC discovery cache), then the
//! audience.
//!
//! Expected trust failures are values, never errors: `validate` always
//! resolves to a [`ValidationResult`] whose reason can be audit-logged.
//! Infrastructure failures (network, malformed responses) are typed errors
//! where the caller can act on them, and are folded into `Invalid` results
//! inside the signature validator, where a trust decision must still come
//! out.
//!
//! # Example
//!
//! ```no_run
//! use tessera::{
//!     config::{OAuth2ServiceConfiguration, ServiceKind, PROPERTY_UAA_DOMAIN},
//!     validation::ValidatorChainBuilder,
//!     Token,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let configuration = OAuth2ServiceConfiguration::builder()
//!     .service(ServiceKind::Xsuaa)
//!     .credentials("clientid", "clientsecret")
//!     .url("https://paas.authentication.sap.hana.ondemand.com".parse()?)
//!     .property(PROPERTY_UAA_DOMAIN, "authentication.sap.hana.ondemand.com")
//!     .build()?;
//!
//! let chain = ValidatorChainBuilder::for_configuration(configuration).build()?;
//!
//! let token = Token::parse("eyJhbGciOiJSUzI1NiJ9.eyJzdWIiOiJ1c2VyIn0.c2ln")?;
//! let result = chain.validate(&token).await;
//! if result.is_erroneous() {
//!     tracing::warn!(reason = result.reason(), "token rejected");
//! }
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod jwa;
pub mod jwk;
pub mod jwt;
pub mod key_cache;
pub mod validation;


#[doc(inline)]
pub use config::{OAuth2ServiceConfiguration, ServiceKind};
#[doc(inline)]
pub use jwt::Token;
#[doc(inline)]
pub use validation::{
    Validate, ValidationListener, ValidationResult, ValidatorChain, ValidatorChainBuilder,
};

pub use tessera_client::ClientIdentity;

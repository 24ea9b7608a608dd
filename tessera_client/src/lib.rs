//! OAuth2 token acquisition for applications calling downstream services
//!
//! This crate is the client plane of the `tessera` family: it obtains tokens
//! from an identity service on the application's behalf and caches them until
//! shortly before they expire. The sibling `tessera` crate consumes the
//! transport abstraction defined here for its signing-key and discovery
//! retrieval.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tessera_client::{
//!     flows::{TokenFlows, XsuaaEndpoints},
//!     http::ReqwestExchange,
//!     ClientIdentity, OAuth2TokenService,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let exchange = Arc::new(ReqwestExchange::new()?);
//! let service = Arc::new(OAuth2TokenService::new(exchange));
//!
//! let flows = TokenFlows::new(
//!     service,
//!     XsuaaEndpoints::new("https://paas.authentication.sap.hana.ondemand.com".parse()?),
//!     ClientIdentity::from_credentials("clientid", "clientsecret"),
//! );
//!
//! let response = flows.client_credentials_flow().execute().await?;
//! tracing::info!(expires_in = response.expires_in().0, "obtained token");
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
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod cache;
pub mod error;
pub mod flows;
pub mod http;
mod identity;
mod response;
pub mod service;
mod uri;

#[cfg(test)]
pub(crate) mod test;

pub use cache::TokenCacheConfiguration;
pub use error::ServiceError;
pub use identity::ClientIdentity;
pub use response::OAuth2TokenResponse;
pub use service::OAuth2TokenService;
pub use uri::replace_subdomain;

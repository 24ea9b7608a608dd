//! Common errors raised by the OAuth2 client plane

use std::error::Error as StdError;

use thiserror::Error;
use url::Url;

/// An error encountered while exchanging messages with the identity service
///
/// Trust decisions never surface as this type; it covers infrastructure
/// failures only (unreachable endpoints, unexpected status codes, response
/// bodies that do not have the promised shape).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The identity service answered with a non-2xx status code
    #[error("request to '{url}' failed with status {status}: {body}")]
    ErrorResponse {
        /// The HTTP status code of the response
        status: u16,
        /// The request URI
        url: Url,
        /// The response body as received
        body: String,
    },

    /// The request could not be sent or the response could not be read
    #[error("error sending request to '{url}'")]
    Transport {
        /// The request URI
        url: Url,
        /// The underlying transport failure
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    /// The response was received but did not have the expected shape
    #[error("unexpected response from '{url}': {message}")]
    InvalidResponse {
        /// The request URI
        url: Url,
        /// What was wrong with the response
        message: String,
    },
}

impl ServiceError {
    /// A non-2xx answer from the identity service
    pub fn error_response(status: u16, url: Url, body: impl Into<String>) -> Self {
        Self::ErrorResponse {
            status,
            url,
            body: body.into(),
        }
    }

    /// A transport-level failure while talking to `url`
    pub fn transport(url: Url, source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self::Transport {
            url,
            source: source.into(),
        }
    }

    /// A response body that does not have the promised shape
    pub fn invalid_response(url: Url, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            url,
            message: message.into(),
        }
    }

    /// The status code of the response, if the service answered at all
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ErrorResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The request URI associated with this failure
    #[must_use]
    pub fn url(&self) -> &Url {
        match self {
            Self::ErrorResponse { url, .. }
            | Self::Transport { url, .. }
            | Self::InvalidResponse { url, .. } => url,
        }
    }
}

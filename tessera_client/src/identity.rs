use std::fmt;

/// The identity this application presents when acting as an OAuth2 client
///
/// Certificate-based identities authenticate at the transport layer (mTLS),
/// so token requests made with them never carry a `client_secret` parameter.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum ClientIdentity {
    /// A client id and secret pair
    Credentials {
        /// The OAuth2 client id
        client_id: String,
        /// The OAuth2 client secret
        client_secret: String,
    },
    /// An X.509 certificate identity
    Certificate {
        /// The OAuth2 client id
        client_id: String,
        /// The PEM-encoded certificate chain
        certificate: String,
        /// The PEM-encoded private key
        key: String,
    },
}

impl ClientIdentity {
    /// Constructs a secret-based identity
    pub fn from_credentials(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::Credentials {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Constructs a certificate-based identity
    pub fn from_certificate(
        client_id: impl Into<String>,
        certificate: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::Certificate {
            client_id: client_id.into(),
            certificate: certificate.into(),
            key: key.into(),
        }
    }

    /// The OAuth2 client id
    #[must_use]
    pub fn client_id(&self) -> &str {
        match self {
            Self::Credentials { client_id, .. } | Self::Certificate { client_id, .. } => client_id,
        }
    }

    /// The client secret, when this is a secret-based identity
    #[must_use]
    pub fn client_secret(&self) -> Option<&str> {
        match self {
            Self::Credentials { client_secret, .. } => Some(client_secret),
            Self::Certificate { .. } => None,
        }
    }

    /// Whether this identity authenticates with an X.509 certificate
    #[must_use]
    pub fn is_certificate_based(&self) -> bool {
        matches!(self, Self::Certificate { .. })
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credentials { client_id, .. } => f
                .debug_struct("Credentials")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
            Self::Certificate { client_id, .. } => f
                .debug_struct("Certificate")
                .field("client_id", client_id)
                .field("certificate", &"<redacted>")
                .field("key", &"<redacted>")
                .finish(),
        }
    }
}

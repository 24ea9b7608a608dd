use std::fmt;

/// The outcome of a trust decision
///
/// Exactly one of the two variants; the reason is present and non-empty iff
/// the token was rejected. Expected trust failures are always expressed as
/// this type, never as an error or a panic, so callers can inspect the
/// reason for audit logging.
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub enum ValidationResult {
    /// The token satisfied every check
    Valid,
    /// The token was rejected
    Invalid {
        /// A human-readable description of what failed
        reason: String,
    },
}

impl ValidationResult {
    /// Constructs a rejection with the given reason
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    /// Whether the token was accepted
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Whether the token was rejected
    #[must_use]
    pub fn is_erroneous(&self) -> bool {
        !self.is_valid()
    }

    /// The rejection reason, when the token was rejected
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Valid => None,
            Self::Invalid { reason } => Some(reason),
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => f.write_str("valid"),
            Self::Invalid { reason } => write!(f, "invalid: {reason}"),
        }
    }
}

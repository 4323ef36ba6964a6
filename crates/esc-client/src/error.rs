//! Error types for the client write path

use esc_negotiation::PolicyError;

/// Client error
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connection, DNS, TLS or timeout failure below HTTP
    #[error("transport error: {0}")]
    Transport(String),

    /// Server answered with an error status
    #[error("server rejected request ({status}): {reason}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Server-provided reason, or the raw body
        reason: String,
    },

    /// Bulk request accepted but some items failed
    #[error("bulk request rejected {failed} of {total} items: {reason}")]
    BulkRejected {
        /// Failed items
        failed: usize,
        /// Items sent
        total: usize,
        /// Reason of the first failed item
        reason: String,
    },

    /// Response did not have the expected shape
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Unknown or malformed write-path option
    #[error("invalid client option: {0}")]
    InvalidOption(String),

    /// Negotiation option rejected
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

impl ClientError {
    /// HTTP status, when the server answered
    #[inline]
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the failure happened before any server answered
    #[inline]
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_carries_status() {
        let err = ClientError::Rejected {
            status: 406,
            reason: "Content-Type header is not supported".to_string(),
        };
        assert_eq!(err.status(), Some(406));
        assert!(err.to_string().contains("406"));
        assert!(!err.is_transport());
    }

    #[test]
    fn policy_error_is_transparent() {
        let err: ClientError = PolicyError::UnsupportedOverride("text/csv".to_string()).into();
        assert!(err.to_string().contains("text/csv"));
        assert_eq!(err.status(), None);
    }
}

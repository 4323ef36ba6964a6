//! Error types for content-type negotiation
//!
//! Two families:
//! - [`NegotiationFault`]: raised by header rewriters, always contained by the shim
//! - [`PolicyError`]: rejected configuration options

/// Fault raised while computing effective headers
///
/// Never crosses the [`NegotiationShim`](crate::NegotiationShim) boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationFault {
    /// No server epoch was detected and fallback is disabled
    #[error("server epoch could not be detected and content-type fallback is disabled")]
    EpochUndetected,

    /// Header value carries the versioning marker but cannot be parsed
    #[error("malformed media type `{value}`: {reason}")]
    MalformedMediaType {
        /// Offending header value
        value: String,
        /// What was wrong with it
        reason: String,
    },

    /// The rewriter panicked
    #[error("header rewrite panicked: {0}")]
    RewritePanicked(String),
}

impl NegotiationFault {
    /// Create a malformed media type fault
    #[inline]
    pub fn malformed(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedMediaType {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Invalid negotiation option
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// Override is not one of the recognised media-type literals
    #[error("unsupported content_type override `{0}` (expected `application/json` or `application/x-ndjson`)")]
    UnsupportedOverride(String),

    /// Boolean option could not be parsed
    #[error("invalid boolean `{value}` for option `{key}`")]
    InvalidFlag {
        /// Option name
        key: String,
        /// Raw value
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_display() {
        let fault = NegotiationFault::malformed("application/vnd.elasticsearch+json; compatible-with=x", "bad version");
        assert!(fault.to_string().contains("compatible-with=x"));
        assert!(NegotiationFault::EpochUndetected.to_string().contains("fallback"));
    }

    #[test]
    fn policy_error_display() {
        let err = PolicyError::UnsupportedOverride("text/plain".to_string());
        assert!(err.to_string().contains("text/plain"));
    }
}

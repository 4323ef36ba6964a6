//! Negotiation shim
//!
//! Resolves the effective `Content-Type`/`Accept` pair for one outgoing
//! request. Precedence is fixed: override > detection > fallback > hard
//! failure, where a hard failure degrades to "headers unchanged".
//!
//! The shim never returns an error and never panics into its caller.

use crate::epoch::{carries_marker, ServerEpoch};
use crate::error::NegotiationFault;
use crate::headers::Headers;
use crate::policy::{ContentTypePolicy, OverrideMediaType};
use crate::rewrite::{EpochRewriter, HeaderRewriter, RewriteContext};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

const ACCEPT_DEFAULT: &str = "application/json";

/// Header negotiation for outgoing requests
#[derive(Debug, Clone, Default)]
pub struct NegotiationShim<R = EpochRewriter> {
    rewriter: R,
}

impl NegotiationShim<EpochRewriter> {
    /// Shim with the default epoch rewriter
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: HeaderRewriter> NegotiationShim<R> {
    /// Shim with a custom rewriter
    #[inline]
    #[must_use]
    pub fn with_rewriter(rewriter: R) -> Self {
        Self { rewriter }
    }

    /// Resolve the headers that will actually be transmitted
    ///
    /// # Arguments
    /// * `headers` - Headers the client intends to send (may be absent)
    /// * `policy` - Active content-type policy
    /// * `detected` - Epoch of the target server, if known
    #[must_use]
    pub fn resolve(
        &self,
        headers: Option<&Headers>,
        policy: &ContentTypePolicy,
        detected: Option<ServerEpoch>,
    ) -> Headers {
        let headers = headers.cloned().unwrap_or_default();

        if let Some(forced) = policy.content_type_override {
            return apply_override(headers, forced);
        }

        let Some(content_type) = headers.content_type() else {
            return headers;
        };
        if !carries_marker(content_type) {
            return headers;
        }

        let ctx = RewriteContext {
            detected,
            fallback_enabled: policy.fallback_enabled,
        };
        match self.delegate(&headers, &ctx) {
            Ok(rewritten) => rewritten,
            Err(fault) => {
                tracing::warn!(
                    %fault,
                    content_type,
                    detected = ?detected,
                    "content-type negotiation failed, sending headers unchanged"
                );
                headers
            }
        }
    }

    fn delegate(&self, headers: &Headers, ctx: &RewriteContext) -> Result<Headers, NegotiationFault> {
        panic::catch_unwind(AssertUnwindSafe(|| self.rewriter.rewrite(headers, ctx)))
            .unwrap_or_else(|payload| Err(NegotiationFault::RewritePanicked(panic_message(payload.as_ref()))))
    }
}

fn apply_override(mut headers: Headers, forced: OverrideMediaType) -> Headers {
    headers.set_content_type(forced.as_str());
    for key in headers.accept_keys() {
        let versioned = headers.get(&key).is_some_and(carries_marker);
        if versioned {
            headers.insert(key, ACCEPT_DEFAULT);
        }
    }
    headers
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

//! Epoch-specific header rewriting
//!
//! A [`HeaderRewriter`] is only ever handed headers whose content type carries
//! the versioning marker. It may fail on shapes it does not recognise; the
//! shim contains those faults.

use crate::epoch::{carries_marker, plain, MediaType, ServerEpoch};
use crate::error::NegotiationFault;
use crate::headers::Headers;

/// Signal available to the rewriter for one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteContext {
    /// Epoch of the target server, when it could be detected
    pub detected: Option<ServerEpoch>,
    /// Whether an undetected epoch may be downgraded to a plain media type
    pub fallback_enabled: bool,
}

/// Rewrites versioned headers for a concrete server epoch
pub trait HeaderRewriter: Send + Sync {
    /// Produce the final headers
    ///
    /// # Errors
    /// Any [`NegotiationFault`]; callers must not let it escape.
    fn rewrite(&self, headers: &Headers, ctx: &RewriteContext) -> Result<Headers, NegotiationFault>;
}

impl<F> HeaderRewriter for F
where
    F: Fn(&Headers, &RewriteContext) -> Result<Headers, NegotiationFault> + Send + Sync,
{
    fn rewrite(&self, headers: &Headers, ctx: &RewriteContext) -> Result<Headers, NegotiationFault> {
        self(headers, ctx)
    }
}

/// Default rewriter: target the detected epoch's convention
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochRewriter;

#[derive(Debug, Clone, Copy)]
enum Target {
    Epoch(ServerEpoch),
    SafeDefault,
}

impl Target {
    fn render(self, subtype: &str) -> String {
        match self {
            Self::Epoch(epoch) => epoch.convention(subtype),
            Self::SafeDefault => plain(subtype),
        }
    }
}

impl HeaderRewriter for EpochRewriter {
    fn rewrite(&self, headers: &Headers, ctx: &RewriteContext) -> Result<Headers, NegotiationFault> {
        let target = match (ctx.detected, ctx.fallback_enabled) {
            (Some(epoch), _) => Target::Epoch(epoch),
            (None, true) => Target::SafeDefault,
            (None, false) => return Err(NegotiationFault::EpochUndetected),
        };

        // Only the first content-type key is negotiated; every accept key is.
        let mut keys: Vec<String> = headers.content_type_key().map(str::to_string).into_iter().collect();
        keys.extend(headers.accept_keys());

        let mut rewritten = headers.clone();
        for key in keys {
            let Some(value) = headers.get(&key) else { continue };
            if !carries_marker(value) {
                continue;
            }
            let media = MediaType::parse(value)?;
            let subtype = media
                .subtype()
                .ok_or_else(|| NegotiationFault::malformed(value, "no application/* subtype"))?;
            rewritten.insert(key.as_str(), target.render(subtype));
        }

        if matches!(target, Target::SafeDefault) {
            tracing::warn!(
                content_type = ?rewritten.content_type(),
                "server epoch undetected, downgrading to plain media type"
            );
        } else {
            tracing::debug!(content_type = ?rewritten.content_type(), "rewrote versioned headers");
        }

        Ok(rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn v9_bulk() -> Headers {
        Headers::from([
            ("Content-Type", "application/vnd.elasticsearch+x-ndjson; compatible-with=9"),
            ("Accept", "application/vnd.elasticsearch+json; compatible-with=9"),
            ("User-Agent", "esc"),
        ])
    }

    #[test]
    fn rewrites_for_oldest_epoch() {
        let ctx = RewriteContext {
            detected: Some(ServerEpoch::V7),
            fallback_enabled: false,
        };
        let out = EpochRewriter.rewrite(&v9_bulk(), &ctx).unwrap();
        assert_eq!(out.get("Content-Type"), Some("application/x-ndjson"));
        assert_eq!(out.get("Accept"), Some("application/json"));
        assert_eq!(out.get("User-Agent"), Some("esc"));
    }

    #[test]
    fn rewrites_for_middle_epoch() {
        let ctx = RewriteContext {
            detected: Some(ServerEpoch::V8),
            fallback_enabled: false,
        };
        let out = EpochRewriter.rewrite(&v9_bulk(), &ctx).unwrap();
        assert_eq!(
            out.get("Content-Type"),
            Some("application/vnd.elasticsearch+x-ndjson; compatible-with=8")
        );
        assert_eq!(
            out.get("Accept"),
            Some("application/vnd.elasticsearch+json; compatible-with=8")
        );
    }

    #[test]
    fn undetected_without_fallback_faults() {
        let err = EpochRewriter.rewrite(&v9_bulk(), &RewriteContext::default()).unwrap_err();
        assert_eq!(err, NegotiationFault::EpochUndetected);
    }

    #[test]
    fn undetected_with_fallback_downgrades() {
        let ctx = RewriteContext {
            detected: None,
            fallback_enabled: true,
        };
        let out = EpochRewriter.rewrite(&v9_bulk(), &ctx).unwrap();
        assert_eq!(out.get("Content-Type"), Some("application/x-ndjson"));
        assert_eq!(out.get("Accept"), Some("application/json"));
    }

    #[test]
    fn only_first_content_type_key_is_touched() {
        let headers = Headers::from([
            ("content-type", "application/vnd.elasticsearch+json; compatible-with=9"),
            ("Content_Type", "application/vnd.elasticsearch+json; compatible-with=9"),
        ]);
        let ctx = RewriteContext {
            detected: Some(ServerEpoch::V7),
            fallback_enabled: false,
        };
        let out = EpochRewriter.rewrite(&headers, &ctx).unwrap();
        assert_eq!(out.get("content-type"), Some("application/json"));
        assert_eq!(
            out.get("Content_Type"),
            Some("application/vnd.elasticsearch+json; compatible-with=9")
        );
    }

    #[test]
    fn malformed_marker_faults() {
        let headers = Headers::from([("Content-Type", "application/vnd.elasticsearch+json; compatible-with=nine")]);
        let ctx = RewriteContext {
            detected: Some(ServerEpoch::V8),
            fallback_enabled: true,
        };
        assert!(matches!(
            EpochRewriter.rewrite(&headers, &ctx),
            Err(NegotiationFault::MalformedMediaType { .. })
        ));
    }
}

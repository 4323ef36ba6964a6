//! Content-type policy: the two operator knobs the shim reads
//!
//! The policy is an immutable value threaded through each call; there is no
//! process-wide settings object.

use crate::error::PolicyError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Option key for the explicit content-type override
pub const CONTENT_TYPE_OPTION: &str = "content_type";

/// Option key for the fallback flag
pub const FALLBACK_OPTION: &str = "content_type_fallback";

/// Media-type literals an operator may force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverrideMediaType {
    /// `application/json`
    #[serde(rename = "application/json")]
    Json,
    /// `application/x-ndjson`
    #[serde(rename = "application/x-ndjson")]
    NdJson,
}

impl OverrideMediaType {
    /// Header value
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::NdJson => "application/x-ndjson",
        }
    }
}

impl fmt::Display for OverrideMediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverrideMediaType {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "application/json" => Ok(Self::Json),
            "application/x-ndjson" => Ok(Self::NdJson),
            _ => Err(PolicyError::UnsupportedOverride(s.to_string())),
        }
    }
}

/// Negotiation configuration consulted once per outgoing request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTypePolicy {
    /// Forced content type; wins over any detection
    #[serde(default, rename = "content_type", skip_serializing_if = "Option::is_none")]
    pub content_type_override: Option<OverrideMediaType>,
    /// Downgrade to a plain media type (with a warning) when detection fails
    #[serde(default, rename = "content_type_fallback")]
    pub fallback_enabled: bool,
}

impl ContentTypePolicy {
    /// Auto-detect, no fallback
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With an explicit override
    #[inline]
    #[must_use]
    pub fn with_override(mut self, media: OverrideMediaType) -> Self {
        self.content_type_override = Some(media);
        self
    }

    /// With the fallback flag
    #[inline]
    #[must_use]
    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    /// Whether the operator set an override
    #[inline]
    #[must_use]
    pub fn has_override(&self) -> bool {
        self.content_type_override.is_some()
    }

    /// Build from a free-form option mapping
    ///
    /// Reads [`CONTENT_TYPE_OPTION`] and [`FALLBACK_OPTION`]; other keys are
    /// ignored.
    ///
    /// # Errors
    /// `PolicyError` when either option has an unrecognised value.
    pub fn from_options(options: &IndexMap<String, String>) -> Result<Self, PolicyError> {
        let content_type_override = options
            .get(CONTENT_TYPE_OPTION)
            .map(|raw| raw.parse::<OverrideMediaType>())
            .transpose()?;

        let fallback_enabled = match options.get(FALLBACK_OPTION) {
            None => false,
            Some(raw) => parse_flag(FALLBACK_OPTION, raw)?,
        };

        Ok(Self {
            content_type_override,
            fallback_enabled,
        })
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, PolicyError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(PolicyError::InvalidFlag {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(entries: &[(&str, &str)]) -> IndexMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn defaults_to_auto_detect() {
        let policy = ContentTypePolicy::from_options(&IndexMap::new()).unwrap();
        assert_eq!(policy, ContentTypePolicy::default());
        assert!(!policy.has_override());
        assert!(!policy.fallback_enabled);
    }

    #[test]
    fn reads_both_options() {
        let policy = ContentTypePolicy::from_options(&options(&[
            ("content_type", "application/x-ndjson"),
            ("content_type_fallback", "TRUE"),
            ("write_mode", "bulk"),
        ]))
        .unwrap();
        assert_eq!(policy.content_type_override, Some(OverrideMediaType::NdJson));
        assert!(policy.fallback_enabled);
    }

    #[test]
    fn rejects_unknown_override() {
        let err = ContentTypePolicy::from_options(&options(&[(
            "content_type",
            "application/vnd.elasticsearch+json; compatible-with=9",
        )]))
        .unwrap_err();
        assert!(matches!(err, PolicyError::UnsupportedOverride(_)));
    }

    #[test]
    fn rejects_bad_flag() {
        let err = ContentTypePolicy::from_options(&options(&[("content_type_fallback", "maybe")])).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidFlag { .. }));
    }

    #[test]
    fn serde_uses_option_names() {
        let policy = ContentTypePolicy::new()
            .with_override(OverrideMediaType::Json)
            .with_fallback(true);
        let json = serde_json::to_value(policy).unwrap();
        assert_eq!(json["content_type"], "application/json");
        assert_eq!(json["content_type_fallback"], true);
    }
}

//! Server epochs and their content-type conventions
//!
//! Each major server generation expects a different `Content-Type`/`Accept`
//! shape:
//! - `V7`: plain `application/json` / `application/x-ndjson`
//! - `V8`, `V9`: vendor types carrying `compatible-with=<major>`

use crate::error::NegotiationFault;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marker parameter that identifies the versioned (vendor) convention
pub const COMPATIBLE_WITH_MARKER: &str = "compatible-with=";

const VENDOR_PREFIX: &str = "application/vnd.elasticsearch+";
const APPLICATION_PREFIX: &str = "application/";

/// Major server protocol generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerEpoch {
    /// Oldest generation (E1)
    V7,
    /// Middle generation (E2)
    V8,
    /// Newest generation (E3)
    V9,
}

impl ServerEpoch {
    /// All epochs, oldest first
    pub const ALL: [Self; 3] = [Self::V7, Self::V8, Self::V9];

    /// Major version number
    #[inline]
    #[must_use]
    pub const fn major(self) -> u8 {
        match self {
            Self::V7 => 7,
            Self::V8 => 8,
            Self::V9 => 9,
        }
    }

    /// Newest known epoch
    #[inline]
    #[must_use]
    pub const fn newest() -> Self {
        Self::V9
    }

    /// Short positional label (`E1`..`E3`)
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::V7 => "E1",
            Self::V8 => "E2",
            Self::V9 => "E3",
        }
    }

    /// Whether this is one of the two oldest epochs
    #[inline]
    #[must_use]
    pub const fn is_legacy(self) -> bool {
        !matches!(self, Self::V9)
    }

    /// Epoch for a major version number
    #[must_use]
    pub fn from_major(major: u64) -> Option<Self> {
        match major {
            7 => Some(Self::V7),
            8 => Some(Self::V8),
            9 => Some(Self::V9),
            _ => None,
        }
    }

    /// Epoch from a server version string such as `8.13.4` or `9.0.0-SNAPSHOT`
    #[must_use]
    pub fn from_version(version: &str) -> Option<Self> {
        version
            .trim()
            .split('.')
            .next()
            .and_then(|major| major.parse::<u64>().ok())
            .and_then(Self::from_major)
    }

    /// Media type this epoch expects for the given subtype (`json`, `x-ndjson`)
    #[must_use]
    pub fn convention(self, subtype: &str) -> String {
        match self {
            Self::V7 => plain(subtype),
            Self::V8 | Self::V9 => versioned(subtype, self.major()),
        }
    }

    /// Whether a server of this epoch accepts the media type
    ///
    /// Plain types are accepted everywhere. Versioned types are accepted for
    /// the current and the previous major only; `V7` knows no versioned types.
    #[must_use]
    pub fn accepts(self, media: &MediaType) -> bool {
        match media {
            MediaType::Plain { .. } => true,
            MediaType::Versioned { compatible_with, .. } => match self {
                Self::V7 => false,
                Self::V8 | Self::V9 => {
                    *compatible_with == self.major() || compatible_with.checked_add(1) == Some(self.major())
                }
            },
            MediaType::Other(_) => false,
        }
    }
}

impl fmt::Display for ServerEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.major())
    }
}

impl FromStr for ServerEpoch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "7" | "v7" | "e1" => Ok(Self::V7),
            "8" | "v8" | "e2" => Ok(Self::V8),
            "9" | "v9" | "e3" => Ok(Self::V9),
            other => Err(format!("unknown server epoch `{other}` (expected 7, 8 or 9)")),
        }
    }
}

/// Plain media type for a subtype
#[inline]
#[must_use]
pub fn plain(subtype: &str) -> String {
    format!("{APPLICATION_PREFIX}{subtype}")
}

/// Versioned vendor media type for a subtype
#[inline]
#[must_use]
pub fn versioned(subtype: &str, major: u8) -> String {
    format!("{VENDOR_PREFIX}{subtype}; {COMPATIBLE_WITH_MARKER}{major}")
}

/// Whether a header value carries the versioning marker
#[inline]
#[must_use]
pub fn carries_marker(value: &str) -> bool {
    value.to_ascii_lowercase().contains(COMPATIBLE_WITH_MARKER)
}

/// Parsed media type, reduced to what negotiation cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaType {
    /// `application/<subtype>` without a versioning parameter
    Plain {
        /// `json`, `x-ndjson`, ...
        subtype: String,
    },
    /// Media type carrying `compatible-with=<N>`
    Versioned {
        /// `json`, `x-ndjson`, ...
        subtype: String,
        /// Requested compatibility major
        compatible_with: u8,
    },
    /// Anything else
    Other(String),
}

impl MediaType {
    /// Parse a header value
    ///
    /// # Errors
    /// `MalformedMediaType` when the value carries the marker but the version
    /// or the essence cannot be understood.
    pub fn parse(value: &str) -> Result<Self, NegotiationFault> {
        let lowered = value.trim().to_ascii_lowercase();
        let mut parts = lowered.split(';').map(str::trim);
        let essence = parts.next().unwrap_or_default();

        let compatible_with = parts
            .find_map(|param| param.strip_prefix(COMPATIBLE_WITH_MARKER))
            .map(|raw| {
                raw.trim_matches('"')
                    .parse::<u8>()
                    .map_err(|_| NegotiationFault::malformed(value, format!("invalid compatibility version `{raw}`")))
            })
            .transpose()?;

        let subtype = essence
            .strip_prefix(VENDOR_PREFIX)
            .or_else(|| essence.strip_prefix(APPLICATION_PREFIX))
            .filter(|subtype| !subtype.is_empty());

        match (subtype, compatible_with) {
            (Some(subtype), Some(compatible_with)) => Ok(Self::Versioned {
                subtype: subtype.to_string(),
                compatible_with,
            }),
            (None, Some(_)) => Err(NegotiationFault::malformed(value, "versioned value without an application/* essence")),
            (Some(subtype), None) if !essence.starts_with(VENDOR_PREFIX) => Ok(Self::Plain {
                subtype: subtype.to_string(),
            }),
            _ => Ok(Self::Other(lowered)),
        }
    }

    /// Subtype, when the media type is an `application/*` type
    #[must_use]
    pub fn subtype(&self) -> Option<&str> {
        match self {
            Self::Plain { subtype } | Self::Versioned { subtype, .. } => Some(subtype),
            Self::Other(_) => None,
        }
    }
}

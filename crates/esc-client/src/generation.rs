//! Client library generations and the headers each one intends to send

use esc_negotiation::{plain, versioned, Headers, ServerEpoch, ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Major generation of the client library whose conventions are emulated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientGeneration {
    /// Sends plain media types
    V7,
    /// Sends `compatible-with=8`
    V8,
    /// Sends `compatible-with=9`
    #[default]
    V9,
}

impl ClientGeneration {
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

    /// Whether this is the newest generation
    #[inline]
    #[must_use]
    pub fn is_newest(self) -> bool {
        self.major() == ServerEpoch::newest().major()
    }

    fn media(self, subtype: &str) -> String {
        match self {
            Self::V7 => plain(subtype),
            Self::V8 | Self::V9 => versioned(subtype, self.major()),
        }
    }

    /// Intended headers for JSON requests
    #[must_use]
    pub fn json_headers(self) -> Headers {
        Headers::new()
            .with(CONTENT_TYPE, self.media("json"))
            .with(ACCEPT, self.media("json"))
    }

    /// Intended headers for bulk (newline-delimited) requests
    #[must_use]
    pub fn bulk_headers(self) -> Headers {
        Headers::new()
            .with(CONTENT_TYPE, self.media("x-ndjson"))
            .with(ACCEPT, self.media("json"))
    }

    /// Headers for body-less probes; identical across generations
    #[must_use]
    pub fn probe_headers(self) -> Headers {
        Headers::new().with(ACCEPT, plain("json"))
    }
}

impl fmt::Display for ClientGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.major())
    }
}

impl FromStr for ClientGeneration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "7" | "v7" => Ok(Self::V7),
            "8" | "v8" => Ok(Self::V8),
            "9" | "v9" => Ok(Self::V9),
            other => Err(format!("unknown client generation `{other}` (expected 7, 8 or 9)")),
        }
    }
}

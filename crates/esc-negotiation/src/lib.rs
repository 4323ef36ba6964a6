//! ESC Negotiation
//!
//! Content-type negotiation for clients talking to several major server
//! generations at once.
//!
//! # Core Concepts
//!
//! - [`ServerEpoch`]: major protocol generation (`v7`, `v8`, `v9`)
//! - [`ContentTypePolicy`]: the operator's override and fallback knobs
//! - [`HeaderRewriter`]: epoch-specific rewrite of versioned headers
//! - [`NegotiationShim`]: resolves the headers actually sent, never fails
//!
//! # Example
//!
//! ```rust
//! use esc_negotiation::{ContentTypePolicy, Headers, NegotiationShim, OverrideMediaType};
//!
//! let shim = NegotiationShim::new();
//! let policy = ContentTypePolicy::new().with_override(OverrideMediaType::Json);
//! let intended = Headers::from([(
//!     "Content-Type",
//!     "application/vnd.elasticsearch+json; compatible-with=9",
//! )]);
//!
//! let sent = shim.resolve(Some(&intended), &policy, None);
//! assert_eq!(sent.content_type(), Some("application/json"));
//! ```

#![warn(unreachable_pub)]

mod epoch;
mod error;
mod headers;
mod policy;
mod rewrite;
mod shim;

pub use epoch::{carries_marker, plain, versioned, MediaType, ServerEpoch, COMPATIBLE_WITH_MARKER};
pub use error::{NegotiationFault, PolicyError};
pub use headers::{is_accept_key, is_content_type_key, Headers, ACCEPT, CONTENT_TYPE};
pub use policy::{ContentTypePolicy, OverrideMediaType, CONTENT_TYPE_OPTION, FALLBACK_OPTION};
pub use rewrite::{EpochRewriter, HeaderRewriter, RewriteContext};
pub use shim::NegotiationShim;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! ESC Client
//!
//! The write path that owns a [`ContentTypePolicy`](esc_negotiation::ContentTypePolicy)
//! and consults the negotiation shim once per outgoing request.
//!
//! # Example
//!
//! ```rust,ignore
//! use esc_client::{ClientSettings, EsClient, HttpTransport};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let transport = Arc::new(HttpTransport::new("http://localhost:9208", Duration::from_secs(10))?);
//! let client = EsClient::connect(transport, ClientSettings::new()).await;
//! client.bulk_index("logs", &[serde_json::json!({"message": "hello"})]).await?;
//! ```

#![warn(unreachable_pub)]

mod client;
mod error;
mod generation;
mod transport;

pub use client::{ClientSettings, EsClient, ServerInfo, WriteMode, GENERATION_OPTION, WRITE_MODE_OPTION};
pub use error::ClientError;
pub use generation::ClientGeneration;
pub use transport::{HttpTransport, Method, OutgoingRequest, Transport, TransportResponse};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

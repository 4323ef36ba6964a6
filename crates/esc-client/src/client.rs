//! The client write path
//!
//! Every outgoing request passes through the negotiation shim exactly once,
//! immediately before it is handed to the transport. The shim sees headers
//! only; bodies are built here and never altered afterwards.

use crate::error::ClientError;
use crate::generation::ClientGeneration;
use crate::transport::{Method, OutgoingRequest, Transport, TransportResponse};
use esc_negotiation::{
    ContentTypePolicy, Headers, NegotiationShim, ServerEpoch, CONTENT_TYPE_OPTION, FALLBACK_OPTION,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Option key selecting the emulated client generation
pub const GENERATION_OPTION: &str = "client_generation";

/// Option key selecting bulk or direct-index writes
pub const WRITE_MODE_OPTION: &str = "write_mode";

/// How documents are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// One `_bulk` request per write call
    #[default]
    Bulk,
    /// One `_doc` request per document
    Index,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bulk => "bulk",
            Self::Index => "index",
        })
    }
}

impl FromStr for WriteMode {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bulk" => Ok(Self::Bulk),
            "index" | "direct" => Ok(Self::Index),
            other => Err(ClientError::InvalidOption(format!(
                "{WRITE_MODE_OPTION} `{other}` (expected bulk or index)"
            ))),
        }
    }
}

/// Write-path configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Emulated client generation
    pub generation: ClientGeneration,
    /// Negotiation policy
    pub policy: ContentTypePolicy,
    /// Bulk or direct-index writes
    pub write_mode: WriteMode,
}

impl ClientSettings {
    /// Default settings: newest generation, auto-detect, bulk
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With generation
    #[inline]
    #[must_use]
    pub fn with_generation(mut self, generation: ClientGeneration) -> Self {
        self.generation = generation;
        self
    }

    /// With policy
    #[inline]
    #[must_use]
    pub fn with_policy(mut self, policy: ContentTypePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// With write mode
    #[inline]
    #[must_use]
    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    /// Layer option overrides on top of these settings
    ///
    /// # Errors
    /// `ClientError::InvalidOption` or `ClientError::Policy` on bad values.
    pub fn apply_options(self, options: &IndexMap<String, String>) -> Result<Self, ClientError> {
        let generation = match options.get(GENERATION_OPTION) {
            Some(raw) => raw.parse::<ClientGeneration>().map_err(ClientError::InvalidOption)?,
            None => self.generation,
        };
        let write_mode = match options.get(WRITE_MODE_OPTION) {
            Some(raw) => raw.parse::<WriteMode>()?,
            None => self.write_mode,
        };

        let parsed = ContentTypePolicy::from_options(options)?;
        let policy = ContentTypePolicy {
            content_type_override: if options.contains_key(CONTENT_TYPE_OPTION) {
                parsed.content_type_override
            } else {
                self.policy.content_type_override
            },
            fallback_enabled: if options.contains_key(FALLBACK_OPTION) {
                parsed.fallback_enabled
            } else {
                self.policy.fallback_enabled
            },
        };

        Ok(Self {
            generation,
            policy,
            write_mode,
        })
    }
}

/// Result of a version probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Raw version number
    pub version: String,
    /// Epoch derived from the version
    pub epoch: Option<ServerEpoch>,
    /// Cluster name, if reported
    pub cluster_name: Option<String>,
}

/// Client for one server endpoint
pub struct EsClient {
    transport: Arc<dyn Transport>,
    settings: ClientSettings,
    shim: NegotiationShim,
    detected: Option<ServerEpoch>,
}

impl fmt::Debug for EsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EsClient")
            .field("endpoint", &self.transport.endpoint())
            .field("settings", &self.settings)
            .field("detected", &self.detected)
            .finish_non_exhaustive()
    }
}

impl EsClient {
    /// Client without epoch detection
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, settings: ClientSettings) -> Self {
        Self {
            transport,
            settings,
            shim: NegotiationShim::new(),
            detected: None,
        }
    }

    /// Client that probes the server version unless an override is set
    ///
    /// A failed probe is logged; detection then stays empty and negotiation
    /// falls back according to the policy.
    pub async fn connect(transport: Arc<dyn Transport>, settings: ClientSettings) -> Self {
        let mut client = Self::new(transport, settings);
        if !settings.policy.has_override() {
            client.detect().await;
        }
        client
    }

    /// Probe the server version and remember its epoch
    pub async fn detect(&mut self) -> Option<ServerEpoch> {
        match self.info().await {
            Ok(info) => {
                if info.epoch.is_none() {
                    tracing::warn!(version = %info.version, "server version maps to no known epoch");
                }
                self.detected = info.epoch;
            }
            Err(err) => {
                tracing::warn!(endpoint = %self.transport.endpoint(), error = %err, "version probe failed");
                self.detected = None;
            }
        }
        self.detected
    }

    /// Detected server epoch
    #[inline]
    #[must_use]
    pub fn detected(&self) -> Option<ServerEpoch> {
        self.detected
    }

    /// Active settings
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Endpoint description
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> String {
        self.transport.endpoint()
    }

    /// Headers that would be transmitted for the intended ones
    #[must_use]
    pub fn negotiate(&self, intended: &Headers) -> Headers {
        self.shim.resolve(Some(intended), &self.settings.policy, self.detected)
    }

    async fn execute(
        &self,
        method: Method,
        path: String,
        intended: Headers,
        body: Option<String>,
    ) -> Result<TransportResponse, ClientError> {
        let headers = self.negotiate(&intended);
        tracing::debug!(%method, %path, content_type = ?headers.content_type(), "negotiated request");

        let mut request = OutgoingRequest::new(method, path).with_headers(headers);
        request.body = body;
        self.transport.send(request).await
    }

    async fn execute_ok(
        &self,
        method: Method,
        path: String,
        intended: Headers,
        body: Option<String>,
    ) -> Result<TransportResponse, ClientError> {
        let response = self.execute(method, path, intended, body).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(ClientError::Rejected {
                status: response.status,
                reason: response.error_reason(),
            })
        }
    }

    /// Liveness check: cluster health is green or yellow
    ///
    /// # Errors
    /// `ClientError::Transport` when the endpoint is unreachable.
    pub async fn ping(&self) -> Result<bool, ClientError> {
        let response = self
            .execute(
                Method::Get,
                "/_cluster/health".to_string(),
                self.settings.generation.probe_headers(),
                None,
            )
            .await?;
        let status = response.body["status"].as_str().unwrap_or_default();
        Ok(response.is_success() && matches!(status, "green" | "yellow"))
    }

    /// Server version probe
    ///
    /// # Errors
    /// Transport failures, error statuses, or a body without `version.number`.
    pub async fn info(&self) -> Result<ServerInfo, ClientError> {
        let response = self
            .execute_ok(Method::Get, "/".to_string(), self.settings.generation.probe_headers(), None)
            .await?;
        let version = response.body["version"]["number"]
            .as_str()
            .ok_or_else(|| ClientError::UnexpectedResponse("missing version.number".to_string()))?
            .to_string();
        Ok(ServerInfo {
            epoch: ServerEpoch::from_version(&version),
            cluster_name: response.body["cluster_name"].as_str().map(str::to_string),
            version,
        })
    }

    /// Index one document through the document API
    ///
    /// # Errors
    /// Transport failures or a rejected request.
    pub async fn index_document(&self, index: &str, document: &Value) -> Result<(), ClientError> {
        self.execute_ok(
            Method::Post,
            format!("/{index}/_doc"),
            self.settings.generation.json_headers(),
            Some(document.to_string()),
        )
        .await?;
        Ok(())
    }

    /// Index documents in one bulk request
    ///
    /// # Errors
    /// Transport failures, a rejected request, or item-level failures.
    pub async fn bulk_index(&self, index: &str, documents: &[Value]) -> Result<usize, ClientError> {
        if documents.is_empty() {
            return Ok(0);
        }

        let action = json!({ "index": { "_index": index } }).to_string();
        let mut body = String::new();
        for document in documents {
            body.push_str(&action);
            body.push('\n');
            body.push_str(&document.to_string());
            body.push('\n');
        }

        let response = self
            .execute_ok(
                Method::Post,
                "/_bulk".to_string(),
                self.settings.generation.bulk_headers(),
                Some(body),
            )
            .await?;

        if response.body["errors"].as_bool().unwrap_or(false) {
            let items = response.body["items"].as_array().cloned().unwrap_or_default();
            let failures: Vec<&Value> = items
                .iter()
                .filter_map(|item| item.as_object().and_then(|op| op.values().next()))
                .filter(|op| !op["error"].is_null())
                .collect();
            let reason = failures
                .first()
                .map(|op| {
                    op["error"]["reason"]
                        .as_str()
                        .map_or_else(|| op["error"].to_string(), str::to_string)
                })
                .unwrap_or_else(|| "unknown item failure".to_string());
            return Err(ClientError::BulkRejected {
                failed: failures.len().max(1),
                total: documents.len(),
                reason,
            });
        }

        Ok(documents.len())
    }

    /// Write documents using the configured write mode
    ///
    /// # Errors
    /// The first failing request.
    pub async fn write(&self, index: &str, documents: &[Value]) -> Result<usize, ClientError> {
        match self.settings.write_mode {
            WriteMode::Bulk => self.bulk_index(index, documents).await,
            WriteMode::Index => {
                for document in documents {
                    self.index_document(index, document).await?;
                }
                Ok(documents.len())
            }
        }
    }

    /// Document count for an index pattern; a missing index counts as zero
    ///
    /// # Errors
    /// Transport failures or error statuses other than 404.
    pub async fn count(&self, index_pattern: &str) -> Result<u64, ClientError> {
        let response = self
            .execute(
                Method::Get,
                format!("/{index_pattern}/_count"),
                self.settings.generation.probe_headers(),
                None,
            )
            .await?;
        match response.status {
            404 => Ok(0),
            _ if response.is_success() => response.body["count"]
                .as_u64()
                .ok_or_else(|| ClientError::UnexpectedResponse("missing count".to_string())),
            status => Err(ClientError::Rejected {
                status,
                reason: response.error_reason(),
            }),
        }
    }

    /// Delete every index matching the pattern; missing indices are fine
    ///
    /// # Errors
    /// Transport failures or error statuses other than 404.
    pub async fn delete_indices(&self, index_pattern: &str) -> Result<(), ClientError> {
        let response = self
            .execute(
                Method::Delete,
                format!("/{index_pattern}"),
                self.settings.generation.probe_headers(),
                None,
            )
            .await?;
        if response.is_success() || response.status == 404 {
            Ok(())
        } else {
            Err(ClientError::Rejected {
                status: response.status,
                reason: response.error_reason(),
            })
        }
    }
}

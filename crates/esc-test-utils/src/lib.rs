//! Testing utilities for the ESC workspace
//!
//! An in-memory server that enforces each epoch's media-type acceptance,
//! plus fixtures for wiring it into the harness.

#![allow(missing_docs)]

use async_trait::async_trait;
use esc_client::{ClientError, Method, OutgoingRequest, Transport, TransportResponse};
use esc_harness::{HarnessConfig, Timings, TransportFactory};
use esc_negotiation::{Headers, MediaType, ServerEpoch, ACCEPT};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Version string reported for each epoch
pub fn version_for(epoch: ServerEpoch) -> &'static str {
    match epoch {
        ServerEpoch::V7 => "7.17.22",
        ServerEpoch::V8 => "8.15.3",
        ServerEpoch::V9 => "9.0.2",
    }
}

#[derive(Debug, Default)]
struct ClusterState {
    indices: BTreeMap<String, u64>,
    requests: Vec<OutgoingRequest>,
    health_probes: u32,
    lost_documents: u64,
}

/// In-memory server for one epoch
#[derive(Debug)]
pub struct FakeCluster {
    epoch: ServerEpoch,
    healthy_after: Option<u32>,
    version_probe: bool,
    lose_documents: u64,
    latency: Option<Duration>,
    state: Mutex<ClusterState>,
}

impl FakeCluster {
    pub fn new(epoch: ServerEpoch) -> Self {
        Self {
            epoch,
            healthy_after: Some(0),
            version_probe: true,
            lose_documents: 0,
            latency: None,
            state: Mutex::new(ClusterState::default()),
        }
    }

    /// Health endpoint never answers
    pub fn never_healthy(mut self) -> Self {
        self.healthy_after = None;
        self
    }

    /// Health endpoint answers from the `n`-th probe on (zero-based)
    pub fn healthy_after(mut self, probes: u32) -> Self {
        self.healthy_after = Some(probes);
        self
    }

    /// `GET /` fails, so the client cannot detect the epoch
    pub fn without_version_probe(mut self) -> Self {
        self.version_probe = false;
        self
    }

    /// Acknowledge but drop the first `n` documents written
    pub fn losing_documents(mut self, n: u64) -> Self {
        self.lose_documents = n;
        self
    }

    /// Delay every response
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn epoch(&self) -> ServerEpoch {
        self.epoch
    }

    /// Every request received, in order
    pub fn requests(&self) -> Vec<OutgoingRequest> {
        self.state.lock().requests.clone()
    }

    /// Requests to a path
    pub fn requests_to(&self, path: &str) -> Vec<OutgoingRequest> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }

    /// Stored document count for an exact index name
    pub fn document_count(&self, index: &str) -> u64 {
        self.state.lock().indices.get(index).copied().unwrap_or(0)
    }

    /// Names of existing indices
    pub fn index_names(&self) -> Vec<String> {
        self.state.lock().indices.keys().cloned().collect()
    }

    pub fn health_probes(&self) -> u32 {
        self.state.lock().health_probes
    }

    /// Rejection for the first header this epoch does not accept
    fn check_headers(&self, headers: &Headers, has_body: bool) -> Option<TransportResponse> {
        let content_type = headers.content_type();
        if has_body {
            let Some(value) = content_type else {
                return Some(error_response(406, "Content-Type header is missing"));
            };
            if !self.accepts(value) {
                return Some(error_response(
                    406,
                    &format!("Content-Type header [{value}] is not supported"),
                ));
            }
        }
        for key in headers.accept_keys() {
            if let Some(value) = headers.get(&key) {
                if !self.accepts(value) {
                    return Some(error_response(
                        406,
                        &format!("Accept header [{value}] is not supported"),
                    ));
                }
            }
        }
        None
    }

    fn accepts(&self, value: &str) -> bool {
        MediaType::parse(value).is_ok_and(|media| self.epoch.accepts(&media))
    }

    fn store(&self, index: &str, documents: u64) {
        let mut state = self.state.lock();
        let lost = documents.min(self.lose_documents.saturating_sub(state.lost_documents));
        state.lost_documents += lost;
        *state.indices.entry(index.to_string()).or_insert(0) += documents - lost;
    }

    fn handle(&self, request: &OutgoingRequest) -> Result<TransportResponse, ClientError> {
        let path = request.path.split('?').next().unwrap_or_default();
        let segments: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();

        if let Some(rejection) = self.check_headers(&request.headers, request.body.is_some()) {
            return Ok(rejection);
        }

        match (request.method, segments.as_slice()) {
            (Method::Get, []) => {
                if !self.version_probe {
                    return Ok(error_response(503, "version endpoint disabled"));
                }
                Ok(TransportResponse::new(
                    200,
                    json!({
                        "name": format!("fake-{}", self.epoch),
                        "cluster_name": "compat-fleet",
                        "version": {"number": version_for(self.epoch)},
                    }),
                ))
            }
            (Method::Get, ["_cluster", "health"]) => {
                let mut state = self.state.lock();
                let probe = state.health_probes;
                state.health_probes += 1;
                match self.healthy_after {
                    Some(after) if probe >= after => {
                        Ok(TransportResponse::new(200, json!({"status": "green"})))
                    }
                    _ => Err(ClientError::Transport("connection refused".to_string())),
                }
            }
            (Method::Post, ["_bulk"]) => Ok(self.bulk(request.body.as_deref().unwrap_or_default())),
            (Method::Post | Method::Put, [index, "_doc"]) => {
                self.store(index, 1);
                Ok(TransportResponse::new(201, json!({"_index": index, "result": "created"})))
            }
            (Method::Get, [pattern, "_count"]) => Ok(self.count(pattern)),
            (Method::Delete, [pattern]) => {
                if pattern.contains('*') && self.epoch != ServerEpoch::V7 {
                    return Ok(error_response(
                        400,
                        "Wildcard expressions or all indices are not allowed",
                    ));
                }
                let matcher = pattern_regex(pattern);
                let mut state = self.state.lock();
                let before = state.indices.len();
                state.indices.retain(|name, _| !matcher.is_match(name));
                if before == state.indices.len() && !pattern.contains('*') {
                    return Ok(error_response(404, &format!("no such index [{pattern}]")));
                }
                Ok(TransportResponse::new(200, json!({"acknowledged": true})))
            }
            _ => Ok(error_response(400, &format!("no handler for {} {path}", request.method))),
        }
    }

    fn bulk(&self, body: &str) -> TransportResponse {
        let lines: Vec<&str> = body.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut items = Vec::new();
        for pair in lines.chunks(2) {
            let action: Value = serde_json::from_str(pair[0]).unwrap_or(Value::Null);
            let index = action["index"]["_index"].as_str().unwrap_or("default").to_string();
            if pair.len() == 2 {
                self.store(&index, 1);
                items.push(json!({"index": {"_index": index, "status": 201}}));
            } else {
                items.push(json!({"index": {"_index": index, "status": 400,
                    "error": {"type": "action_request_validation_exception", "reason": "missing source"}}}));
            }
        }
        let errors = items.iter().any(|i| i["index"]["status"] != 201);
        TransportResponse::new(200, json!({"errors": errors, "items": items}))
    }

    fn count(&self, pattern: &str) -> TransportResponse {
        let matcher = pattern_regex(pattern);
        let state = self.state.lock();
        let matching: Vec<u64> = state
            .indices
            .iter()
            .filter(|(name, _)| matcher.is_match(name))
            .map(|(_, count)| *count)
            .collect();
        if matching.is_empty() && !pattern.contains('*') {
            return error_response(404, &format!("no such index [{pattern}]"));
        }
        TransportResponse::new(200, json!({"count": matching.iter().sum::<u64>()}))
    }
}

#[async_trait]
impl Transport for FakeCluster {
    async fn send(&self, request: OutgoingRequest) -> Result<TransportResponse, ClientError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.state.lock().requests.push(request.clone());
        self.handle(&request)
    }

    fn endpoint(&self) -> String {
        format!("fake://{}", self.epoch)
    }
}

fn error_response(status: u16, reason: &str) -> TransportResponse {
    TransportResponse::new(status, json!({"error": {"reason": reason}, "status": status}))
}

fn pattern_regex(pattern: &str) -> regex::Regex {
    let escaped: Vec<String> = pattern.split('*').map(regex::escape).collect();
    regex::Regex::new(&format!("^{}$", escaped.join(".*"))).unwrap()
}

/// One fake server per epoch, handed to the harness as its transport factory
#[derive(Debug, Clone)]
pub struct FakeFleet {
    clusters: BTreeMap<ServerEpoch, Arc<FakeCluster>>,
}

impl FakeFleet {
    /// Default fake server for every epoch
    pub fn new() -> Self {
        Self::with(|cluster| cluster)
    }

    /// Customize each epoch's server
    pub fn with(customize: impl Fn(FakeCluster) -> FakeCluster) -> Self {
        let clusters = ServerEpoch::ALL
            .iter()
            .map(|epoch| (*epoch, Arc::new(customize(FakeCluster::new(*epoch)))))
            .collect();
        Self { clusters }
    }

    /// Replace one epoch's server
    pub fn replace(mut self, cluster: FakeCluster) -> Self {
        self.clusters.insert(cluster.epoch(), Arc::new(cluster));
        self
    }

    pub fn cluster(&self, epoch: ServerEpoch) -> Arc<FakeCluster> {
        Arc::clone(&self.clusters[&epoch])
    }
}

impl Default for FakeFleet {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportFactory for FakeFleet {
    fn transport(&self, epoch: ServerEpoch, _endpoint: &str) -> Result<Arc<dyn Transport>, ClientError> {
        self.clusters
            .get(&epoch)
            .map(|c| Arc::clone(c) as Arc<dyn Transport>)
            .ok_or_else(|| ClientError::Transport(format!("no fake server for {epoch}")))
    }
}

/// Harness config with production timings and cleanup disabled
pub fn fake_config() -> HarnessConfig {
    HarnessConfig::new()
        .with_cleanup(false)
        .with_index_prefix("compat-test")
        .with_timings(Timings::default())
}

/// Accept header value a request carried, if any
pub fn accept_of(request: &OutgoingRequest) -> Option<String> {
    request.headers.get(ACCEPT).map(str::to_string)
}

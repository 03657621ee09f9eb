//! Async HTTP client for the session server
//!
//! Every operation is a single request/decode step. Failures are classified
//! once (unreachable, server error, unparseable body) and returned to the
//! caller; nothing is retried here.

use std::time::Duration;

use glam::Vec3;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;

use super::error::ClientError;
use super::snapshot::SessionSnapshot;
use crate::settings::Settings;

/// Session server endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Health,
    Start,
    Update,
    Track,
    State,
    Reset,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Health => "/health",
            Endpoint::Start => "/start",
            Endpoint::Update => "/update",
            Endpoint::Track => "/track",
            Endpoint::State => "/state",
            Endpoint::Reset => "/reset",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Endpoint::Health | Endpoint::Track | Endpoint::State => Method::GET,
            Endpoint::Start | Endpoint::Update | Endpoint::Reset => Method::POST,
        }
    }
}

#[derive(Debug, Serialize)]
struct StartRequest {
    collision_threshold: f32,
}

#[derive(Debug, Serialize)]
struct PositionUpdate {
    position: [f32; 3],
}

#[derive(Debug, Serialize)]
struct PositionsUpdate {
    positions: Vec<[f32; 3]>,
}

/// Session server client
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct SessionClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl SessionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Request(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ClientError> {
        Self::new(&settings.server_url, settings.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, endpoint: Endpoint) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, endpoint.path());
        self.http.request(endpoint.method(), url)
    }

    /// `GET /health`; any failure is just `false`
    pub async fn health_check(&self) -> bool {
        match self.request(Endpoint::Health).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                log::debug!("Health check returned {}", resp.status());
                false
            }
            Err(e) => {
                log::debug!("Health check failed: {e}");
                false
            }
        }
    }

    /// `POST /start`, returns the initial state including the track
    pub async fn start_session(
        &self,
        collision_threshold: f32,
    ) -> Result<SessionSnapshot, ClientError> {
        let body = StartRequest { collision_threshold };
        self.exchange(Endpoint::Start, self.request(Endpoint::Start).json(&body))
            .await
    }

    /// `POST /update` with a single probe sample
    pub async fn push_position(&self, position: Vec3) -> Result<SessionSnapshot, ClientError> {
        let body = PositionUpdate {
            position: position.to_array(),
        };
        self.exchange(Endpoint::Update, self.request(Endpoint::Update).json(&body))
            .await
    }

    /// `POST /update` with every sample of a multi-point probe
    pub async fn push_positions(
        &self,
        positions: &[Vec3],
    ) -> Result<SessionSnapshot, ClientError> {
        if positions.is_empty() {
            log::debug!("No probe samples, sending origin");
            return self.push_position(Vec3::ZERO).await;
        }
        let body = PositionsUpdate {
            positions: positions.iter().map(|p| p.to_array()).collect(),
        };
        self.exchange(Endpoint::Update, self.request(Endpoint::Update).json(&body))
            .await
    }

    /// `GET /track`
    pub async fn fetch_track(&self) -> Result<SessionSnapshot, ClientError> {
        self.exchange(Endpoint::Track, self.request(Endpoint::Track))
            .await
    }

    /// `GET /state`
    pub async fn fetch_state(&self) -> Result<SessionSnapshot, ClientError> {
        self.exchange(Endpoint::State, self.request(Endpoint::State))
            .await
    }

    /// `POST /reset`
    pub async fn reset(&self) -> Result<SessionSnapshot, ClientError> {
        self.exchange(Endpoint::Reset, self.request(Endpoint::Reset))
            .await
    }

    async fn exchange(
        &self,
        endpoint: Endpoint,
        request: RequestBuilder,
    ) -> Result<SessionSnapshot, ClientError> {
        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(self.timeout.as_secs_f32())
            } else {
                ClientError::Unparseable(format!("cannot read body: {e}"))
            }
        })?;

        let result = decode_response(status, &bytes);
        match &result {
            Ok(_) => log::debug!("{} {} -> {status}", endpoint.method(), endpoint.path()),
            Err(e) => log::warn!("{} {} failed: {e}", endpoint.method(), endpoint.path()),
        }
        result
    }

    fn classify(&self, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout(self.timeout.as_secs_f32())
        } else if e.is_connect() || e.is_request() {
            ClientError::Unreachable(e.to_string())
        } else {
            ClientError::Request(e.to_string())
        }
    }
}

/// Turn a finished response into a snapshot or a classified error
fn decode_response(status: StatusCode, body: &[u8]) -> Result<SessionSnapshot, ClientError> {
    if !status.is_success() {
        let excerpt = String::from_utf8_lossy(body);
        return Err(ClientError::server(status.as_u16(), &excerpt));
    }

    let text = std::str::from_utf8(body)
        .map_err(|_| ClientError::Unparseable("body is not UTF-8".to_string()))?;
    if !text.trim_start().starts_with('{') {
        let preview: String = text.trim().chars().take(40).collect();
        return Err(ClientError::Unparseable(format!(
            "expected a JSON object, got {preview:?}"
        )));
    }
    Ok(SessionSnapshot::decode(text))
}

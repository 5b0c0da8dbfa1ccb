use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::StageTimeout;
use crate::error::CollaboratorError;
use crate::models::Detection;
use crate::service::contract::{
    DetectRequest, DetectResponse, GroupRequest, GroupResponse, VisualizeRequest,
    VisualizeResponse,
};
use crate::service::{DetectStage, GroupStage, VisualizeStage};

/// JSON-over-HTTP connection to one stage service.
#[derive(Debug, Clone)]
pub struct HttpStage {
    client: reqwest::Client,
    base_url: String,
    health_timeout: Duration,
}

impl HttpStage {
    /// `timeout` bounds every stage call; liveness probes use `health` instead.
    pub fn new(base_url: &str, timeout: StageTimeout, health: StageTimeout) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout.connect())
            .timeout(timeout.total())
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            health_timeout: health.total(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<Req, Resp>(&self, path: &str, request: &Req) -> Result<Resp, CollaboratorError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(CollaboratorError::Unavailable(format!(
                "HTTP {} from {url}",
                response.status()
            )));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| CollaboratorError::Unavailable(format!("invalid response from {url}: {e}")))
    }

    pub async fn healthy(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("health check of {url} failed: {e}");
                false
            }
        }
    }
}

fn transport_error(e: reqwest::Error) -> CollaboratorError {
    if e.is_timeout() {
        CollaboratorError::Unavailable(format!("timed out: {e}"))
    } else {
        CollaboratorError::Unavailable(e.to_string())
    }
}

pub struct HttpDetect(pub HttpStage);

impl DetectStage for HttpDetect {
    async fn detect(&self, request: DetectRequest) -> Result<Vec<Detection>, CollaboratorError> {
        self.0
            .post::<_, DetectResponse>("detect", &request)
            .await?
            .into_result()
    }

    async fn healthy(&self) -> bool {
        self.0.healthy().await
    }
}

pub struct HttpGroup(pub HttpStage);

impl GroupStage for HttpGroup {
    async fn group(&self, request: GroupRequest) -> Result<Vec<Detection>, CollaboratorError> {
        self.0
            .post::<_, GroupResponse>("group", &request)
            .await?
            .into_result()
    }

    async fn healthy(&self) -> bool {
        self.0.healthy().await
    }
}

pub struct HttpVisualize(pub HttpStage);

impl VisualizeStage for HttpVisualize {
    async fn visualize(&self, request: VisualizeRequest) -> Result<String, CollaboratorError> {
        self.0
            .post::<_, VisualizeResponse>("visualize", &request)
            .await?
            .into_result()
    }

    async fn healthy(&self) -> bool {
        self.0.healthy().await
    }
}

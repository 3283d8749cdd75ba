//! HTTP Control System
//!
//! `ControlSystem` implementation that talks JSON to the controlled system's
//! HTTP API:
//!
//! - `POST {base}/commands/{name}` returns a [`CommandOutcome`]
//! - `GET {base}/status` returns a [`SystemStatus`]
//! - `GET {base}/metrics` returns a [`DetailedMetrics`]

use std::time::Duration;

use async_trait::async_trait;
use control_relay_core::{
    CommandOutcome, ControlSystem, CoreError, CoreResult, DetailedMetrics, SystemStatus,
};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Default control API base URL.
pub const DEFAULT_CONTROL_API_URL: &str = "http://127.0.0.1:8080/api";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Control system reached over HTTP.
pub struct HttpControlSystem {
    client: reqwest::Client,
    base_url: String,
}

impl HttpControlSystem {
    pub fn new(base_url: impl Into<String>) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CoreError::control(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> CoreResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::control(format!(
                "Control API returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| CoreError::control(format!("Invalid control API response: {}", e)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> CoreResult<T> {
        let url = self.url(path);
        debug!(url = %url, "[ControlSystem] GET");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::control(format!("Control API unreachable: {}", e)))?;
        Self::read_json(response).await
    }
}

#[async_trait]
impl ControlSystem for HttpControlSystem {
    async fn execute_command(&self, name: &str) -> CoreResult<CommandOutcome> {
        let url = self.url(&format!("commands/{}", name));
        debug!(url = %url, command = name, "[ControlSystem] POST");
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "command": name }))
            .send()
            .await
            .map_err(|e| CoreError::control(format!("Control API unreachable: {}", e)))?;
        Self::read_json(response).await
    }

    async fn get_system_status(&self) -> CoreResult<SystemStatus> {
        self.get("status").await
    }

    async fn get_detailed_metrics(&self) -> CoreResult<DetailedMetrics> {
        self.get("metrics").await
    }
}

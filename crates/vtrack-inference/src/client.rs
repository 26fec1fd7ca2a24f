//! Inference service HTTP client.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{InferenceError, InferenceResult};
use crate::types::HealthResponse;

/// Configuration for the inference client.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Base URL of the inference service
    pub base_url: String,
    /// Per-request timeout; none by default since propagation is unbounded
    pub timeout: Option<Duration>,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Health check attempts while connecting
    pub connect_retries: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: None,
            connect_timeout: Duration::from_secs(10),
            connect_retries: 5,
        }
    }
}

impl InferenceConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("INFERENCE_SERVICE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            timeout: std::env::var("INFERENCE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
            connect_timeout: std::env::var("INFERENCE_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            connect_retries: std::env::var("INFERENCE_CONNECT_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.connect_retries),
        }
    }
}

/// Thin JSON-over-HTTP client shared by the detector and tracker adapters.
pub struct InferenceClient {
    http: Client,
    config: InferenceConfig,
}

impl InferenceClient {
    /// Create a new client.
    pub fn new(config: InferenceConfig) -> InferenceResult<Self> {
        let mut builder = Client::builder().connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(InferenceError::Network)?;

        Ok(Self { http, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Check if the service is healthy.
    pub async fn health_check(&self) -> InferenceResult<bool> {
        match self.http.get(self.url("/health")).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Inference service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Inference service health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Poll health with exponential backoff until healthy or out of attempts.
    pub async fn wait_until_healthy(&self) -> InferenceResult<()> {
        let attempts = self.config.connect_retries.max(1);
        for attempt in 0..attempts {
            if self.health_check().await? {
                info!(url = %self.config.base_url, "Inference service is healthy");
                return Ok(());
            }
            if attempt + 1 < attempts {
                let delay = Duration::from_millis(500 * 2u64.pow(attempt.min(6)));
                warn!(
                    "Inference service not ready (attempt {}/{}), retrying in {:?}",
                    attempt + 1,
                    attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
        Err(InferenceError::ServiceUnavailable(format!(
            "{} did not become healthy after {} attempts",
            self.config.base_url, attempts
        )))
    }

    /// POST a JSON body and decode a JSON reply.
    pub async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> InferenceResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.url(path);
        debug!("POST {}", url);
        let response = self.http.post(&url).json(body).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// POST without a body and hand back the raw response for streaming.
    pub async fn post_stream(&self, path: &str) -> InferenceResult<Response> {
        let url = self.url(path);
        debug!("POST (stream) {}", url);
        let response = self.http.post(&url).send().await?;
        check_status(response).await
    }

    pub async fn delete(&self, path: &str) -> InferenceResult<()> {
        let url = self.url(path);
        debug!("DELETE {}", url);
        let response = self.http.delete(&url).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> InferenceResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() && status.as_u16() == 503 {
        return Err(InferenceError::ServiceUnavailable(body));
    }
    Err(InferenceError::RequestFailed(format!(
        "inference service returned {}: {}",
        status, body
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> InferenceConfig {
        InferenceConfig {
            base_url: server.uri(),
            connect_retries: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = InferenceConfig::default();
        assert_eq!(config.base_url, "http://localhost:8001");
        assert!(config.timeout.is_none());
    }

    #[tokio::test]
    async fn test_health_check_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
            .mount(&server)
            .await;

        let client = InferenceClient::new(config_for(&server)).unwrap();
        assert!(client.health_check().await.unwrap());
        client.wait_until_healthy().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_until_healthy_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = InferenceClient::new(config_for(&server)).unwrap();
        let err = client.wait_until_healthy().await.unwrap_err();
        assert!(matches!(err, InferenceError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_post_json_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ground"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad prompt"))
            .mount(&server)
            .await;

        let client = InferenceClient::new(config_for(&server)).unwrap();
        let result: InferenceResult<HealthResponse> = client.post_json("/ground", &serde_json::json!({})).await;
        match result {
            Err(InferenceError::RequestFailed(msg)) => assert!(msg.contains("bad prompt")),
            other => panic!("unexpected: {:?}", other.map(|h| h.status)),
        }
    }
}

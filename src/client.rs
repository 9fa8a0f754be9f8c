use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::record::{RecordError, ResponseRecord};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("HTTP {status} client error: {message}")]
    Http4xx { status: u16, message: String },

    #[error("HTTP {status} server error: {message}")]
    Http5xx { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid response: {0}")]
    Record(#[from] RecordError),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ClientError {
    /// True when the server answered but the body could not be turned into a record.
    pub fn is_parse(&self) -> bool {
        matches!(self, ClientError::Parse(_) | ClientError::Record(_))
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_connect() {
            ClientError::Connection(e.to_string())
        } else if e.is_timeout() {
            ClientError::Timeout(e.to_string())
        } else if e.is_decode() {
            ClientError::Parse(e.to_string())
        } else {
            ClientError::Other(e.to_string())
        }
    }
}

// Request body for /api/generate
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub stream: bool,
    pub keep_alive: u64,
}

impl GenerateRequest {
    pub fn new(model: &str, prompt: &str) -> Self {
        Self {
            model: model.to_string(),
            prompt: Some(prompt.to_string()),
            stream: false,
            keep_alive: 0,
        }
    }

    /// A prompt-less request with `keep_alive = 0`, which makes the server evict the model.
    pub fn unload(model: &str) -> Self {
        Self {
            model: model.to_string(),
            prompt: None,
            stream: false,
            keep_alive: 0,
        }
    }
}

/// Non-streaming /api/generate response. Durations are in nanoseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub model: String,
    pub created_at: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done_reason: Option<String>,
    pub total_duration: u64,
    pub load_duration: u64,
    pub prompt_eval_count: u64,
    pub prompt_eval_duration: u64,
    pub eval_count: u64,
    pub eval_duration: u64,
}

#[derive(Debug, Clone, Serialize)]
struct ShowRequest<'a> {
    model: &'a str,
    verbose: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct VersionResponse {
    version: String,
}

// Shared by /api/tags and /api/ps
#[derive(Debug, Clone, Deserialize)]
struct ModelsResponse {
    models: Vec<Model>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Model {
    pub name: String,
}

/// Configuration for creating an Ollama client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the Ollama server, e.g. `http://localhost:11434`
    pub base_url: String,
    /// Per-request timeout; `None` keeps the transport default (no timeout)
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    /// Creates a client for the Ollama HTTP API.
    ///
    /// No retries are performed by any method: every failure is returned to the caller.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ollama_bench::client::{ClientConfig, OllamaClient};
    ///
    /// let client = OllamaClient::new(ClientConfig {
    ///     base_url: "http://localhost:11434".to_string(),
    ///     timeout: None,
    /// })
    /// .unwrap();
    /// ```
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let mut builder = Client::builder().tcp_keepalive(Duration::from_secs(60));
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ClientError::Other(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get_version(&self) -> Result<String, ClientError> {
        let version: VersionResponse = self.get_json("/api/version").await?;
        Ok(version.version)
    }

    /// Names of every model available locally on the server.
    pub async fn get_models(&self) -> Result<Vec<String>, ClientError> {
        let models: ModelsResponse = self.get_json("/api/tags").await?;
        Ok(models.models.into_iter().map(|m| m.name).collect())
    }

    /// Names of the models currently loaded into memory.
    pub async fn running_models(&self) -> Result<Vec<String>, ClientError> {
        let models: ModelsResponse = self.get_json("/api/ps").await?;
        Ok(models.models.into_iter().map(|m| m.name).collect())
    }

    /// Evicts every running model and returns the names that were unloaded.
    pub async fn unload_models(&self) -> Result<Vec<String>, ClientError> {
        let running = self.running_models().await?;
        if !running.is_empty() {
            log::debug!("Stopping these models on Ollama server: {:?}", running);
            for model in &running {
                let url = format!("{}/api/generate", self.base_url);
                let req = self.client.post(&url).json(&GenerateRequest::unload(model));
                self.send(req).await?;
            }
        }
        log::info!("No models running on Ollama server");
        Ok(running)
    }

    /// Looks up a single model via /api/show. A 404 means the model does not exist.
    pub async fn show_model(&self, model: &str) -> Result<bool, ClientError> {
        let url = format!("{}/api/show", self.base_url);
        let req = self.client.post(&url).json(&ShowRequest {
            model,
            verbose: false,
        });

        match self.send(req).await {
            Ok(_) => Ok(true),
            Err(ClientError::Http4xx { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Sends one non-streaming generation request and converts the response into a record.
    pub async fn generate(&self, model: &str, prompt: &str) -> Result<ResponseRecord, ClientError> {
        let url = format!("{}/api/generate", self.base_url);
        let req = self.client.post(&url).json(&GenerateRequest::new(model, prompt));
        let response = self.send(req).await?;
        let body: GenerateResponse = Self::parse_body(response).await?;
        Ok(ResponseRecord::new(body, prompt)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.send(self.client.get(&url)).await?;
        Self::parse_body(response).await
    }

    async fn parse_body<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let text = response.text().await.map_err(ClientError::from_reqwest)?;
        serde_json::from_str(&text).map_err(|e| ClientError::Parse(e.to_string()))
    }

    /// Sends a request and maps transport failures and non-2xx statuses to `ClientError`.
    async fn send(&self, req: RequestBuilder) -> Result<Response, ClientError> {
        let response = req.send().await.map_err(ClientError::from_reqwest)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let status_code = status.as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());

        if status.is_client_error() {
            Err(ClientError::Http4xx {
                status: status_code,
                message,
            })
        } else if status.is_server_error() {
            Err(ClientError::Http5xx {
                status: status_code,
                message,
            })
        } else {
            Err(ClientError::Other(format!("HTTP {}: {}", status_code, message)))
        }
    }
}

//! Prediction API HTTP client.

use std::fmt;
use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use roofpaint_models::UploadedImage;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use crate::error::{MlError, MlResult};
use crate::types::{Download, ModelRef, Prediction, PredictionRequest, PredictionStatus, UploadedFile};

/// Default prediction API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.replicate.com/v1";

/// Longest synchronous wait the API honours on create.
const MAX_PREFER_WAIT_SECS: u64 = 60;

/// Longest provider error detail kept in error messages.
const MAX_ERROR_DETAIL_CHARS: usize = 512;

/// Configuration for the prediction client.
#[derive(Clone)]
pub struct ProviderConfig {
    /// API base URL without trailing slash
    pub api_base: String,
    /// Bearer token forwarded to the provider
    pub api_token: String,
    /// Upper bound for each remote call, including polling
    pub timeout: Duration,
    /// Delay between status polls
    pub poll_interval: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_base", &self.api_base)
            .field("api_token", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Create a config with default timings.
    pub fn new(api_base: impl Into<String>, api_token: impl Into<String>) -> MlResult<Self> {
        let api_base = api_base.into().trim().trim_end_matches('/').to_string();
        let api_token = api_token.into().trim().to_string();

        if api_token.is_empty() {
            return Err(MlError::configuration("REPLICATE_API_TOKEN cannot be empty"));
        }

        Url::parse(&api_base).map_err(|e| {
            MlError::configuration(format!("Invalid API base URL '{}': {}", api_base, e))
        })?;

        Ok(Self {
            api_base,
            api_token,
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(1000),
            connect_timeout: Duration::from_secs(10),
        })
    }

    /// Create config from environment variables.
    ///
    /// A missing token is fatal: the service cannot do anything without it.
    pub fn from_env() -> MlResult<Self> {
        let api_token = std::env::var("REPLICATE_API_TOKEN")
            .map_err(|_| MlError::configuration("REPLICATE_API_TOKEN must be set"))?;
        let api_base = std::env::var("REPLICATE_API_BASE")
            .unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

        let timeout = Duration::from_secs(
            std::env::var("INFERENCE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
        );
        let poll_interval = Duration::from_millis(
            std::env::var("POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
        );

        Ok(Self::new(api_base, api_token)?
            .with_timeout(timeout)
            .with_poll_interval(poll_interval))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Client for a Replicate-compatible prediction API.
#[derive(Clone)]
pub struct ReplicateClient {
    http: Client,
    config: ProviderConfig,
}

impl ReplicateClient {
    /// Create a new client.
    pub fn new(config: ProviderConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("roofpaint-ml-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(MlError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> MlResult<Self> {
        Self::new(ProviderConfig::from_env()?)
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Run a prediction to completion and return the URLs in its output.
    ///
    /// The whole call, including polling, is bounded by the configured timeout.
    /// A prediction abandoned before reaching a terminal status (timeout or the
    /// caller dropping this future) is canceled on the provider side.
    pub async fn run<I>(&self, model: &ModelRef, input: &I) -> MlResult<Vec<String>>
    where
        I: Serialize + Sync,
    {
        let deadline = Instant::now() + self.config.timeout;

        let prediction = self.create_prediction(model, input).await?;
        let prediction = self.wait_for(prediction, deadline).await?;

        if prediction.status != PredictionStatus::Succeeded {
            return Err(MlError::PredictionFailed {
                status: prediction.status.to_string(),
                detail: prediction.error_detail(),
            });
        }

        let urls = prediction.output_urls();
        debug!(
            model = %model,
            prediction_id = prediction.id.as_deref().unwrap_or("-"),
            outputs = urls.len(),
            "Prediction succeeded"
        );
        Ok(urls)
    }

    /// Upload a file to the provider's file store and return its URL.
    pub async fn upload_file(&self, image: &UploadedImage) -> MlResult<String> {
        let url = format!("{}/files", self.config.api_base);

        let part = Part::stream_with_length(image.bytes().clone(), image.len() as u64)
            .file_name(image.filename().to_string())
            .mime_str(image.mime_type())?;
        let form = Form::new().part("content", part);

        debug!(filename = image.filename(), bytes = image.len(), "Uploading source image");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .multipart(form)
            .send()
            .await?;
        let file: UploadedFile = Self::parse_json(Self::checked(response).await?).await?;
        Ok(file.urls.get)
    }

    /// Probe the encoded size of a remote object with a `HEAD` request.
    pub async fn content_length(&self, url: &str) -> MlResult<Option<u64>> {
        let response = self.authorize(self.http.head(url), url).send().await?;
        let response = Self::checked(response).await?;

        Ok(response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok()))
    }

    /// Download a remote object.
    pub async fn download(&self, url: &str) -> MlResult<Download> {
        let response = self.authorize(self.http.get(url), url).send().await?;
        let response = Self::checked(response).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;

        if bytes.is_empty() {
            return Err(MlError::invalid_response(format!("Empty download from {}", url)));
        }

        Ok(Download {
            bytes,
            content_type,
        })
    }

    fn predictions_endpoint(&self, model: &ModelRef) -> String {
        match model.version {
            Some(_) => format!("{}/predictions", self.config.api_base),
            None => format!(
                "{}/models/{}/{}/predictions",
                self.config.api_base, model.owner, model.name
            ),
        }
    }

    async fn create_prediction<I>(&self, model: &ModelRef, input: &I) -> MlResult<Prediction>
    where
        I: Serialize + Sync,
    {
        let url = self.predictions_endpoint(model);
        let body = PredictionRequest {
            version: model.version.as_deref(),
            input,
        };
        let wait = prefer_wait_secs(self.config.timeout);

        debug!(model = %model, wait_secs = wait, "Creating prediction at {}", url);

        let mut request = self.http.post(&url).bearer_auth(&self.config.api_token);
        if wait > 0 {
            request = request.header("Prefer", format!("wait={}", wait));
        }
        let response = request.json(&body).send().await?;

        Self::parse_json(Self::checked(response).await?).await
    }

    async fn get_prediction(&self, url: &str) -> MlResult<Prediction> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await?;

        Self::parse_json(Self::checked(response).await?).await
    }

    /// Poll until the prediction reaches a terminal status or the deadline passes.
    async fn wait_for(&self, mut prediction: Prediction, deadline: Instant) -> MlResult<Prediction> {
        if prediction.status.is_terminal() {
            return Ok(prediction);
        }

        let cancel_url = prediction.urls.cancel.clone();
        let cancel_on_exit = scopeguard::guard(cancel_url, |cancel_url| {
            if let Some(url) = cancel_url {
                self.spawn_cancel(url);
            }
        });

        loop {
            let poll_url = prediction
                .urls
                .get
                .clone()
                .ok_or_else(|| MlError::invalid_response("Prediction missing poll URL"))?;

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    prediction_id = prediction.id.as_deref().unwrap_or("-"),
                    status = %prediction.status,
                    "Prediction did not finish in time"
                );
                return Err(MlError::Timeout(self.config.timeout));
            }

            tokio::time::sleep(self.config.poll_interval.min(deadline - now)).await;

            let polled = tokio::time::timeout_at(deadline, self.get_prediction(&poll_url)).await;
            prediction = match polled {
                Ok(polled) => polled?,
                Err(_) => {
                    warn!(
                        prediction_id = prediction.id.as_deref().unwrap_or("-"),
                        "Status poll still pending at deadline"
                    );
                    return Err(MlError::Timeout(self.config.timeout));
                }
            };
            debug!(
                prediction_id = prediction.id.as_deref().unwrap_or("-"),
                status = %prediction.status,
                "Polled prediction"
            );

            if prediction.status.is_terminal() {
                scopeguard::ScopeGuard::into_inner(cancel_on_exit);
                return Ok(prediction);
            }
        }
    }

    /// Cancel an abandoned prediction so it stops consuming remote compute.
    fn spawn_cancel(&self, cancel_url: String) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let http = self.http.clone();
        let token = self.config.api_token.clone();

        handle.spawn(async move {
            match http.post(&cancel_url).bearer_auth(&token).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("Canceled abandoned prediction");
                }
                Ok(response) => {
                    warn!(status = %response.status(), "Failed to cancel prediction");
                }
                Err(e) => {
                    warn!("Failed to cancel prediction: {}", e);
                }
            }
        });
    }

    /// Attach the bearer token only for requests to the provider's own API.
    fn authorize(&self, request: RequestBuilder, url: &str) -> RequestBuilder {
        if self.is_provider_url(url) {
            request.bearer_auth(&self.config.api_token)
        } else {
            request
        }
    }

    /// Same origin as `api_base` and a path at or below its path.
    fn is_provider_url(&self, url: &str) -> bool {
        let (Ok(base), Ok(target)) = (Url::parse(&self.config.api_base), Url::parse(url)) else {
            return false;
        };
        if base.origin() != target.origin() {
            return false;
        }

        let prefix = base.path().trim_end_matches('/');
        target.path() == prefix || target.path().starts_with(&format!("{}/", prefix))
    }

    async fn checked(response: Response) -> MlResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(MlError::RequestFailed {
            status,
            detail: error_detail(&body),
        })
    }

    async fn parse_json<T: DeserializeOwned>(response: Response) -> MlResult<T> {
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| MlError::invalid_response(format!("Malformed response body: {}", e)))
    }
}

/// Synchronous wait requested on create: half the transport timeout, capped.
///
/// Zero means the header is omitted and the provider answers immediately.
fn prefer_wait_secs(timeout: Duration) -> u64 {
    (timeout / 2).as_secs().min(MAX_PREFER_WAIT_SECS)
}

/// Extract a readable message from a provider error body.
fn error_detail(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "error", "title"] {
            if let Some(detail) = value.get(key).and_then(Value::as_str) {
                return detail.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_DETAIL_CHARS).collect()
    }
}

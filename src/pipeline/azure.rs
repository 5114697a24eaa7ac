//! Azure AI Document Intelligence client for the layout stage.
//!
//! The REST flow is two-phase: `POST …:analyze` with the raw document bytes
//! returns `202 Accepted` and an `Operation-Location` URL, which is then
//! polled until the operation reports `succeeded` or `failed`. The service
//! bounds processing time on its side, so by default the client polls
//! without a deadline; `layout_max_wait_secs` adds one.

use crate::config::PipelineConfig;
use crate::error::Pdf2TexError;
use crate::pipeline::layout::{LayoutAnalyzer, LayoutError, LayoutResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const OPERATION_LOCATION: &str = "operation-location";

/// Document Intelligence `analyze` client.
#[derive(Clone)]
pub struct DocumentIntelligenceClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model_id: String,
    api_version: String,
    poll_interval: Duration,
    max_wait: Option<Duration>,
}

impl std::fmt::Debug for DocumentIntelligenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentIntelligenceClient")
            .field("endpoint", &self.endpoint)
            .field("model_id", &self.model_id)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl DocumentIntelligenceClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model_id: defaults.layout_model_id,
            api_version: defaults.layout_api_version,
            poll_interval: Duration::from_millis(defaults.layout_poll_interval_ms),
            max_wait: None,
        }
    }

    /// Build a client from the endpoint/key/model settings in `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, Pdf2TexError> {
        let (endpoint, key) = match (&config.layout_endpoint, &config.layout_api_key) {
            (Some(e), Some(k)) if !e.trim().is_empty() && !k.trim().is_empty() => (e, k),
            _ => {
                return Err(Pdf2TexError::LayoutServiceNotConfigured {
                    hint: "Set DOC_INTELLIGENCE_ENDPOINT and DOC_INTELLIGENCE_KEY, \
                           or pass --layout-endpoint/--layout-key."
                        .to_string(),
                })
            }
        };

        let mut client = Self::new(endpoint.clone(), key.clone());
        client.model_id = config.layout_model_id.clone();
        client.api_version = config.layout_api_version.clone();
        client.poll_interval = Duration::from_millis(config.layout_poll_interval_ms);
        client.max_wait = config.layout_max_wait_secs.map(Duration::from_secs);
        Ok(client)
    }

    /// `{endpoint}/documentintelligence/documentModels/{model}:analyze?api-version=…`
    pub fn analyze_url(&self) -> String {
        format!(
            "{}/documentintelligence/documentModels/{}:analyze?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.model_id,
            self.api_version
        )
    }

    async fn submit(&self, document: &[u8], content_type: &str) -> Result<String, LayoutError> {
        let url = self.analyze_url();
        debug!("Submitting {} bytes to {}", document.len(), url);

        let response = self
            .http
            .post(&url)
            .header(KEY_HEADER, &self.api_key)
            .header(CONTENT_TYPE, content_type)
            .body(document.to_vec())
            .send()
            .await
            .map_err(|e| LayoutError::Request {
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        response
            .headers()
            .get(OPERATION_LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| LayoutError::Malformed {
                detail: format!("HTTP {status} without an Operation-Location header"),
            })
    }

    async fn poll(&self, operation: &str) -> Result<LayoutResult, LayoutError> {
        let started = Instant::now();
        loop {
            let response = self
                .http
                .get(operation)
                .header(KEY_HEADER, &self.api_key)
                .send()
                .await
                .map_err(|e| LayoutError::Request {
                    detail: e.to_string(),
                })?;

            let status = response.status();
            let wait = retry_after(response.headers()).unwrap_or(self.poll_interval);
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_status(status, body));
            }

            let body = response.text().await.map_err(|e| LayoutError::Request {
                detail: e.to_string(),
            })?;
            if let Some(result) = parse_operation(&body)? {
                info!("Layout analysis finished in {:?}", started.elapsed());
                return Ok(result);
            }

            if let Some(limit) = self.max_wait {
                if started.elapsed() + wait > limit {
                    return Err(LayoutError::TimedOut {
                        secs: limit.as_secs(),
                    });
                }
            }
            debug!("Layout analysis still running; polling again in {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }
}

#[async_trait]
impl LayoutAnalyzer for DocumentIntelligenceClient {
    async fn analyze(
        &self,
        document: &[u8],
        content_type: &str,
    ) -> Result<LayoutResult, LayoutError> {
        let operation = self.submit(document, content_type).await?;
        self.poll(&operation).await
    }
}

/// Map a non-success HTTP status to a [`LayoutError`].
pub(crate) fn classify_status(status: StatusCode, body: String) -> LayoutError {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        body.chars().take(500).collect()
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LayoutError::Auth {
            status: status.as_u16(),
            detail,
        },
        StatusCode::TOO_MANY_REQUESTS => LayoutError::Quota { detail },
        _ => LayoutError::Request {
            detail: format!("HTTP {}: {}", status.as_u16(), detail),
        },
    }
}

/// `Retry-After` in whole seconds, if the service sent one.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationStatus {
    status: String,
    #[serde(default)]
    analyze_result: Option<LayoutResult>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Decode one poll response: `Ok(None)` while the analysis is still running.
fn parse_operation(body: &str) -> Result<Option<LayoutResult>, LayoutError> {
    let op: OperationStatus = serde_json::from_str(body).map_err(|e| LayoutError::Malformed {
        detail: e.to_string(),
    })?;

    match op.status.to_ascii_lowercase().as_str() {
        "notstarted" | "running" => Ok(None),
        "succeeded" => op
            .analyze_result
            .map(Some)
            .ok_or_else(|| LayoutError::Malformed {
                detail: "operation succeeded without an analyzeResult".into(),
            }),
        "failed" | "canceled" => Err(LayoutError::Analysis {
            detail: op
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| op.status.clone()),
        }),
        other => Err(LayoutError::Malformed {
            detail: format!("unknown operation status '{other}'"),
        }),
    }
}

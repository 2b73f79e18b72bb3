//! Remote scoring service contract and its HTTP/JSON client.
//!
//! Endpoints (relative to the configured base URL):
//! - `POST /predict/match` `{features, model_version}` → `{probability}`
//! - `POST /predict/batch` `{pairs: [{entity1_id, entity2_id, features}], model_version}`
//!   → `{predictions: [{probability}, ...]}`, index-aligned with the request
//! - `POST /train` `{training_data, model_config, model_version}` → `{accuracy, ...}`
//! - `POST /evaluate` `{test_data, model_version}` → `{metrics}`
//! - `GET /health` → `{status, ...}`
//!
//! Every call but health carries `X-API-Key` when a key is configured. Each
//! call is bounded by a timeout; the engine never retries.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::ScorerConfig;
use crate::entity::EntityId;
use crate::error::ScoringError;

use super::features::FeatureVector;

const API_KEY_HEADER: &str = "X-API-Key";
const MAX_ERROR_BODY: usize = 512;

/// One pair in a batch prediction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPair {
    pub entity1_id: EntityId,
    pub entity2_id: EntityId,
    pub features: FeatureVector,
}

/// Administrative training call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub training_data: serde_json::Value,
    pub model_config: serde_json::Value,
    pub model_version: String,
}

/// Training result reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingOutcome {
    #[serde(default)]
    pub accuracy: Option<f64>,
    /// Any other fields the service returned.
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// Administrative evaluation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub test_data: serde_json::Value,
    pub model_version: String,
}

/// Evaluation result reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    #[serde(default)]
    pub metrics: serde_json::Value,
}

/// What the engine needs from a scoring service.
#[async_trait]
pub trait ScoringBackend: Send + Sync {
    /// Match probability for one feature vector.
    async fn predict(&self, features: &FeatureVector, model_version: &str) -> Result<f64, ScoringError>;

    /// Probabilities for many pairs, index-aligned with `pairs`.
    async fn predict_batch(
        &self,
        pairs: &[BatchPair],
        model_version: &str,
    ) -> Result<Vec<f64>, ScoringError>;

    async fn train(&self, request: &TrainingRequest) -> Result<TrainingOutcome, ScoringError>;

    async fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationOutcome, ScoringError>;

    /// Service-reported status string.
    async fn health(&self) -> Result<String, ScoringError>;
}

#[derive(Serialize)]
struct PredictBody<'a> {
    features: &'a FeatureVector,
    model_version: &'a str,
}

#[derive(Deserialize)]
struct PredictReply {
    probability: f64,
}

#[derive(Serialize)]
struct BatchBody<'a> {
    pairs: &'a [BatchPair],
    model_version: &'a str,
}

#[derive(Deserialize)]
struct BatchReply {
    predictions: Vec<PredictReply>,
}

#[derive(Deserialize)]
struct HealthReply {
    #[serde(default)]
    status: Option<String>,
}

/// Check a backend probability: finite values are clamped into [0, 1].
pub(crate) fn checked_probability(p: f64) -> Result<f64, ScoringError> {
    if p.is_finite() {
        Ok(p.clamp(0.0, 1.0))
    } else {
        Err(ScoringError::Decode {
            message: format!("probability is not finite: {p}"),
        })
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

fn transport_error(e: &reqwest::Error, endpoint: &str, limit: Duration) -> ScoringError {
    if e.is_timeout() {
        ScoringError::Timeout {
            endpoint: endpoint.to_string(),
            duration_ms: limit.as_millis() as u64,
        }
    } else {
        ScoringError::Connection {
            message: format!("{endpoint}: {e}"),
        }
    }
}

/// reqwest-backed [`ScoringBackend`].
#[derive(Debug, Clone)]
pub struct HttpScoringBackend {
    client: reqwest::Client,
    cfg: ScorerConfig,
}

impl HttpScoringBackend {
    pub fn new(cfg: ScorerConfig) -> Result<Self, ScoringError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ScoringError::Connection {
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client, cfg })
    }

    #[must_use]
    pub const fn config(&self) -> &ScorerConfig {
        &self.cfg
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.cfg.base_url.trim_end_matches('/'))
    }

    fn with_key(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.cfg.api_key.as_deref() {
            Some(key) if !key.is_empty() => req.header(API_KEY_HEADER, key),
            _ => req,
        }
    }

    /// Send, check status and decode, all under one deadline.
    async fn call<T, F>(&self, endpoint: &str, limit: Duration, send: F) -> Result<T, ScoringError>
    where
        T: DeserializeOwned + Send,
        F: Future<Output = Result<reqwest::Response, reqwest::Error>> + Send,
    {
        let exchange = async {
            let response = send.await.map_err(|e| transport_error(&e, endpoint, limit))?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ScoringError::Status {
                    code: status.as_u16(),
                    body: truncate(body),
                });
            }
            response
                .json::<T>()
                .await
                .map_err(|e| ScoringError::Decode {
                    message: format!("{endpoint}: {e}"),
                })
        };

        tokio::time::timeout(limit, exchange)
            .await
            .map_err(|_| ScoringError::Timeout {
                endpoint: endpoint.to_string(),
                duration_ms: limit.as_millis() as u64,
            })?
    }

    async fn post<B, T>(&self, path: &str, body: &B, limit: Duration) -> Result<T, ScoringError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned + Send,
    {
        let req = self.with_key(self.client.post(self.url(path))).json(body);
        self.call(path, limit, req.send()).await
    }
}

#[async_trait]
impl ScoringBackend for HttpScoringBackend {
    async fn predict(&self, features: &FeatureVector, model_version: &str) -> Result<f64, ScoringError> {
        let body = PredictBody {
            features,
            model_version,
        };
        let reply: PredictReply = self
            .post("/predict/match", &body, self.cfg.predict_timeout())
            .await?;
        checked_probability(reply.probability)
    }

    async fn predict_batch(
        &self,
        pairs: &[BatchPair],
        model_version: &str,
    ) -> Result<Vec<f64>, ScoringError> {
        let body = BatchBody {
            pairs,
            model_version,
        };
        let reply: BatchReply = self
            .post("/predict/batch", &body, self.cfg.batch_timeout())
            .await?;
        if reply.predictions.len() != pairs.len() {
            return Err(ScoringError::Misaligned {
                expected: pairs.len(),
                actual: reply.predictions.len(),
            });
        }
        reply
            .predictions
            .into_iter()
            .map(|p| checked_probability(p.probability))
            .collect()
    }

    async fn train(&self, request: &TrainingRequest) -> Result<TrainingOutcome, ScoringError> {
        self.post("/train", request, self.cfg.batch_timeout()).await
    }

    async fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationOutcome, ScoringError> {
        self.post("/evaluate", request, self.cfg.batch_timeout()).await
    }

    async fn health(&self) -> Result<String, ScoringError> {
        let req = self.client.get(self.url("/health"));
        let reply: HealthReply = self
            .call("/health", self.cfg.health_timeout(), req.send())
            .await?;
        Ok(reply.status.unwrap_or_else(|| "unknown".to_string()))
    }
}

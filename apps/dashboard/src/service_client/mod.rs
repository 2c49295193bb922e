/// Analysis service client: the single point of entry for all calls to the
/// remote analysis backend (status, results, history, candidate mutation,
/// notifications).
///
/// Nothing else in the dashboard talks HTTP to the backend. Engine code depends
/// on the `AnalysisService` trait so tests can substitute an in-memory fake.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::candidate::{CandidateStatus, ResultsPayload};
use crate::models::job::{HistoryEntry, JobStatusReport};
use crate::models::notification::{MarkReadRequest, Notification};

#[cfg(test)]
pub mod fake;

const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Service unavailable after {retries} retries")]
    Unavailable { retries: u32 },

    #[error("Invalid service URL '{0}'")]
    InvalidUrl(String),
}

/// The remote collaborators the dashboard engine consumes.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn job_status(&self, job_id: &str) -> Result<JobStatusReport, ServiceError>;

    async fn results(&self, job_id: &str) -> Result<ResultsPayload, ServiceError>;

    async fn history(&self) -> Result<Vec<HistoryEntry>, ServiceError>;

    async fn update_candidate_status(
        &self,
        job_id: &str,
        filename: &str,
        status: &CandidateStatus,
    ) -> Result<(), ServiceError>;

    async fn notifications(&self, limit: usize) -> Result<Vec<Notification>, ServiceError>;

    async fn mark_notifications_read(&self, ids: Option<Vec<i64>>) -> Result<(), ServiceError>;
}

#[derive(Debug, Serialize)]
struct StatusUpdateBody<'a> {
    status: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    detail: String,
}

/// HTTP implementation of `AnalysisService` on top of the backend's `/api` routes.
#[derive(Clone)]
pub struct HttpAnalysisClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpAnalysisClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ServiceError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url,
            token,
        })
    }

    /// Base URL with `segments` appended, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// GET with retries on 429 and 5xx, exponential backoff between attempts.
    /// Only used for idempotent reads.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ServiceError> {
        let path = url.path().to_string();
        let mut last_error: Option<ServiceError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // 250ms, 500ms
                let delay = Duration::from_millis(250 * (1 << (attempt - 1)));
                warn!(
                    "GET {} attempt {} failed, retrying after {}ms...",
                    path,
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self.request(Method::GET, url.clone()).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(ServiceError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Analysis API returned {} for {}: {}", status, path, body);
                last_error = Some(ServiceError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                return Err(api_error(status.as_u16(), response.text().await.unwrap_or_default()));
            }

            let body = response.text().await?;
            debug!("GET {} succeeded ({} bytes)", path, body.len());
            return serde_json::from_str(&body).map_err(ServiceError::Parse);
        }

        Err(last_error.unwrap_or(ServiceError::Unavailable {
            retries: MAX_RETRIES,
        }))
    }

    /// Single-shot write. Mutations are never retried.
    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<(), ServiceError> {
        let path = url.path().to_string();
        let response = self.request(method, url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status.as_u16(), response.text().await.unwrap_or_default()));
        }
        debug!("{} {} succeeded", status, path);
        Ok(())
    }
}

/// Builds an `Api` error, preferring the backend's `{"detail": ...}` message when present.
fn api_error(status: u16, body: String) -> ServiceError {
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|e| e.detail)
        .unwrap_or(body);
    ServiceError::Api { status, message }
}

#[async_trait]
impl AnalysisService for HttpAnalysisClient {
    async fn job_status(&self, job_id: &str) -> Result<JobStatusReport, ServiceError> {
        self.get_json(self.endpoint(&["status", job_id])).await
    }

    async fn results(&self, job_id: &str) -> Result<ResultsPayload, ServiceError> {
        self.get_json(self.endpoint(&["results", job_id])).await
    }

    async fn history(&self) -> Result<Vec<HistoryEntry>, ServiceError> {
        self.get_json(self.endpoint(&["history"])).await
    }

    async fn update_candidate_status(
        &self,
        job_id: &str,
        filename: &str,
        status: &CandidateStatus,
    ) -> Result<(), ServiceError> {
        let url = self.endpoint(&["results", job_id, filename, "status"]);
        self.send_json(
            Method::PUT,
            url,
            &StatusUpdateBody {
                status: status.as_str(),
            },
        )
        .await
    }

    async fn notifications(&self, limit: usize) -> Result<Vec<Notification>, ServiceError> {
        let mut url = self.endpoint(&["notifications"]);
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        self.get_json(url).await
    }

    async fn mark_notifications_read(&self, ids: Option<Vec<i64>>) -> Result<(), ServiceError> {
        self.send_json(
            Method::POST,
            self.endpoint(&["notifications", "read"]),
            &MarkReadRequest { ids },
        )
            .await
    }
}

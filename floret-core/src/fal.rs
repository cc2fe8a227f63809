//! Client for fal's queue API: submit a job, poll its status, then read the result.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::{debug, info};

use crate::{GenerationError, InferenceBackend, InferencePayload};

pub const DEFAULT_QUEUE_URL: &str = "https://queue.fal.run";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Deserialize, Debug)]
struct QueueSubmission {
    request_id: String,
    status_url: String,
    response_url: String,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum QueueState {
    InQueue,
    InProgress,
    Completed,
}

#[derive(Deserialize, Debug)]
struct QueueStatus {
    status: String,
    #[serde(default)]
    queue_position: Option<u64>,
}

pub struct FalQueueClient {
    client: Client,
    queue_url: String,
    api_key: String,
    poll_interval: Duration,
}

impl FalQueueClient {
    pub fn new(client: Client, queue_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(AUTHORIZATION, format!("Key {}", self.api_key))
    }

    async fn submit(
        &self,
        model: &str,
        payload: &InferencePayload,
    ) -> Result<QueueSubmission, GenerationError> {
        let url = format!("{}/{}", self.queue_url, model.trim_start_matches('/'));
        debug!("fal submit POST {}", url);
        let response = self
            .authorized(self.client.post(&url))
            .json(payload)
            .send()
            .await?;
        let body = success_body(response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn wait_for_completion(&self, submission: &QueueSubmission) -> Result<(), GenerationError> {
        loop {
            let response = self
                .authorized(self.client.get(&submission.status_url))
                .send()
                .await?;
            let body = success_body(response).await?;
            let status: QueueStatus = serde_json::from_str(&body)?;
            let state = serde_plain::from_str::<QueueState>(&status.status).map_err(|_| {
                GenerationError::MalformedResult(format!("unknown queue status '{}'", status.status))
            })?;

            match state {
                QueueState::Completed => return Ok(()),
                QueueState::InQueue | QueueState::InProgress => {
                    debug!(
                        request_id = %submission.request_id,
                        status = %status.status,
                        queue_position = ?status.queue_position,
                        "waiting on fal queue"
                    );
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

#[async_trait]
impl InferenceBackend for FalQueueClient {
    async fn submit_and_wait(
        &self,
        model: &str,
        payload: &InferencePayload,
    ) -> Result<serde_json::Value, GenerationError> {
        let submission = self.submit(model, payload).await?;
        info!(request_id = %submission.request_id, model, "fal request queued");

        self.wait_for_completion(&submission).await?;

        let response = self
            .authorized(self.client.get(&submission.response_url))
            .send()
            .await?;
        let body = success_body(response).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Reads the body of a 2xx response, or turns anything else into [`GenerationError::Inference`].
async fn success_body(response: Response) -> Result<String, GenerationError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(GenerationError::Inference {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

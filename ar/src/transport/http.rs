//! Network transport
//!
//! Submits runs with a JSON POST and follows each run's Server-Sent Events
//! channel. The channel is never reopened: a broken connection ends the
//! subscription with a single failure delivery.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use reqwest_eventsource::{Event, EventSource, retry};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{EventSink, RunTicket, RunTransport, TransportError, content_type_for, millis};
use crate::config::ApiConfig;
use crate::domain::{RunRequest, RunStatus, UploadedFile};
use crate::events::StreamEvent;

/// HTTP + SSE transport
pub struct HttpTransport {
    base_url: String,
    api_key: Option<String>,
    http: Client,
    request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    run_id: String,
    #[serde(default)]
    status: Option<String>,
}

impl HttpTransport {
    /// Create a transport with default timeouts and no credentials
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        Self::from_config(&ApiConfig::default(), base_url.into())
    }

    /// Create a transport from API configuration and a resolved base URL
    pub fn from_config(config: &ApiConfig, base_url: String) -> Result<Self, TransportError> {
        debug!(%base_url, timeout_ms = config.timeout_ms, "HttpTransport::from_config: called");
        // No overall client timeout: it would cut long-lived event streams
        let http = Client::builder()
            .connect_timeout(millis(config.connect_timeout_ms))
            .build()
            .map_err(TransportError::Network)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.get_api_key(),
            http,
            request_timeout: millis(config.timeout_ms),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn runs_url(&self) -> String {
        format!("{}/runs", self.base_url)
    }

    fn stream_url(&self, run_id: &str) -> String {
        format!("{}/runs/{}/stream", self.base_url, run_id)
    }

    fn files_url(&self) -> String {
        format!("{}/files", self.base_url)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Turn a non-success response into an API error
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        debug!(%status, "check_status: API error");
        Err(TransportError::ApiError { status, message })
    }
}

#[async_trait]
impl RunTransport for HttpTransport {
    async fn submit(&self, request: &RunRequest, sink: EventSink) -> Result<RunTicket, TransportError> {
        debug!(agent_id = %request.agent_id, subscription = %sink.subscription(), "submit: called");

        let response = self
            .authorize(self.http.post(self.runs_url()))
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let body = response.text().await?;
        let submitted: SubmitResponse = serde_json::from_str(&body)
            .map_err(|e| TransportError::InvalidResponse(format!("submission response: {}", e)))?;
        let status = submitted
            .status
            .as_deref()
            .and_then(|s| s.parse::<RunStatus>().ok())
            .unwrap_or(RunStatus::Running);
        info!(run_id = %submitted.run_id, %status, "submit: run created");

        let stream_request = self
            .authorize(self.http.get(self.stream_url(&submitted.run_id)))
            .header("Accept", "text/event-stream");
        let mut es = EventSource::new(stream_request).map_err(|e| TransportError::Stream(e.to_string()))?;
        es.set_retry_policy(Box::new(retry::Never));

        tokio::spawn(pump_events(es, sink, submitted.run_id.clone()));

        Ok(RunTicket {
            run_id: submitted.run_id,
            status,
        })
    }

    async fn upload(&self, path: &Path) -> Result<UploadedFile, TransportError> {
        debug!(?path, "upload: called");
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(name)
            .mime_str(content_type_for(path))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .authorize(self.http.post(self.files_url()))
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let body = response.text().await?;
        let uploaded: UploadedFile = serde_json::from_str(&body)
            .map_err(|e| TransportError::InvalidResponse(format!("upload response: {}", e)))?;
        info!(file_id = %uploaded.file_id, size = uploaded.size, "upload: complete");
        Ok(uploaded)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Forward SSE messages into the sink until a terminal item or cancellation
async fn pump_events(mut es: EventSource, sink: EventSink, run_id: String) {
    debug!(%run_id, subscription = %sink.subscription(), "pump_events: called");
    let mut cancellation = sink.cancellation();

    loop {
        let next = tokio::select! {
            _ = cancellation.cancelled() => {
                debug!(%run_id, "pump_events: cancelled");
                break;
            }
            next = es.next() => next,
        };

        match next {
            Some(Ok(Event::Open)) => {
                debug!(%run_id, "pump_events: Event::Open");
            }
            Some(Ok(Event::Message(msg))) => {
                debug!(%run_id, event = %msg.event, "pump_events: received Event::Message");
                let event = match serde_json::from_str::<StreamEvent>(&msg.data) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(%run_id, error = %e, data = %msg.data, "pump_events: dropping malformed message");
                        continue;
                    }
                };
                let terminal = event.is_terminal();
                if !sink.emit(event).await {
                    debug!(%run_id, "pump_events: consumer gone");
                    break;
                }
                if terminal {
                    debug!(%run_id, "pump_events: terminal event, closing");
                    break;
                }
            }
            Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => {
                debug!(%run_id, "pump_events: stream ended before terminal event");
                sink.fail(TransportError::StreamClosed).await;
                break;
            }
            Some(Err(e)) => {
                warn!(%run_id, error = %e, "pump_events: stream error");
                sink.fail(TransportError::Stream(e.to_string())).await;
                break;
            }
        }
    }

    es.close();
}

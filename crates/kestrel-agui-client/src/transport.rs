//! Transport session: one run request, one lazy event stream.

use crate::error::{ClientError, ProtocolViolation, TransportError};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use kestrel_protocol_ag_ui::{Event, RunAgentInput};
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

/// The event sequence of one open run: finite, single-consumer, pull-based,
/// not restartable. Consumption suspends at each event boundary.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event, ClientError>> + Send>>;

/// Issues one run request against the remote endpoint and exposes the
/// response as a lazy event sequence.
///
/// Exactly one run is open per returned stream. Transport failures surface
/// as [`TransportError`] before any event is yielded (or mid-stream if the
/// connection drops); this layer never retries.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Open a run and return its event stream.
    async fn open(&self, input: &RunAgentInput) -> Result<EventStream, TransportError>;
}

/// Configuration for [`HttpAgentTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Run endpoint URL.
    pub endpoint: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Connect timeout. The streamed body itself has no overall deadline.
    pub connect_timeout: Duration,
}

impl TransportConfig {
    /// Create a config for the given endpoint with a 30s connect timeout.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Set the bearer token.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// HTTP transport: POSTs the run request and decodes the SSE response body
/// into protocol events.
pub struct HttpAgentTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl HttpAgentTransport {
    /// Create a transport from the given configuration.
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl AgentTransport for HttpAgentTransport {
    async fn open(&self, input: &RunAgentInput) -> Result<EventStream, TransportError> {
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(input);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!(endpoint = %self.config.endpoint, run_id = %input.run_id, "run opened");

        let frames = response.bytes_stream().eventsource();
        Ok(Box::pin(frames.filter_map(|frame| async move {
            match frame {
                Ok(frame) => decode_frame(&frame.data),
                Err(e) => Some(Err(TransportError::Read(e.to_string()).into())),
            }
        })))
    }
}

/// Decode one SSE data payload into a protocol event.
///
/// Blank keep-alive frames and the `[DONE]` sentinel are skipped; anything
/// else must parse as a known event frame.
fn decode_frame(data: &str) -> Option<Result<Event, ClientError>> {
    let trimmed = data.trim();
    if trimmed.is_empty() || trimmed == "[DONE]" {
        return None;
    }
    Some(
        serde_json::from_str::<Event>(trimmed).map_err(|e| {
            ClientError::Protocol(ProtocolViolation::MalformedFrame {
                reason: e.to_string(),
            })
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_frame_skips_keepalives_and_done() {
        assert!(decode_frame("").is_none());
        assert!(decode_frame("   ").is_none());
        assert!(decode_frame("[DONE]").is_none());
    }

    #[test]
    fn test_decode_frame_parses_events() {
        let decoded = decode_frame(r#"{"type":"RUN_STARTED","threadId":"t1","runId":"r1"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, Event::run_started("t1", "r1"));
    }

    #[test]
    fn test_decode_frame_rejects_malformed_json() {
        let err = decode_frame("{oops").unwrap().unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolViolation::MalformedFrame { .. })
        ));
    }

    #[test]
    fn test_decode_frame_rejects_unknown_discriminator() {
        let err = decode_frame(r#"{"type":"STATE_DELTA","delta":[]}"#)
            .unwrap()
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolViolation::MalformedFrame { .. })
        ));
    }
}

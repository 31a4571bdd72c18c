//! Error taxonomy for the AG-UI client bridge.
//!
//! Protocol and transport failures unwind the whole run; tool failures are
//! always absorbed into function-result entries and never surface here.

use kestrel_protocol_ag_ui::MappingError;
use thiserror::Error;

/// Malformed event ordering, ids, or frame shape. Fatal to the current run;
/// never retried by this layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolViolation {
    #[error("unexpected {event} while {state}")]
    UnexpectedEvent { event: &'static str, state: String },

    #[error("{event} references `{got}` while `{expected}` is open")]
    IdMismatch {
        event: &'static str,
        expected: String,
        got: String,
    },

    #[error("tool call `{call_id}` arguments are not valid JSON: {reason}")]
    MalformedArguments { call_id: String, reason: String },

    #[error("undecodable event frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("event stream ended while `{open}` was still open")]
    TruncatedStream { open: String },
}

/// Connection or status failure opening or reading the stream. Retry is an
/// external concern.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid transport configuration: {0}")]
    Config(String),

    #[error("failed to reach agent endpoint: {0}")]
    Connect(String),

    #[error("agent endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("event stream read failed: {0}")]
    Read(String),
}

/// Thread-state errors: foreign blobs and shape violations fail fast at
/// call time.
#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("thread blob kind mismatch: expected `{expected}`, got `{got}`")]
    KindMismatch { expected: String, got: String },

    #[error("malformed thread blob: {0}")]
    Malformed(String),

    #[error("thread serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Umbrella error surfaced by the client bridge.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("thread state error: {0}")]
    Thread(#[from] ThreadError),

    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("run cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_violation_display_carries_ids() {
        let err = ProtocolViolation::IdMismatch {
            event: "TEXT_MESSAGE_CONTENT",
            expected: "msg1".to_string(),
            got: "msg2".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("msg1"));
        assert!(text.contains("msg2"));
        assert!(text.contains("TEXT_MESSAGE_CONTENT"));
    }

    #[test]
    fn test_transport_status_display() {
        let err = TransportError::Status {
            status: 503,
            body: "upstream busy".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "agent endpoint returned HTTP 503: upstream busy"
        );
    }

    #[test]
    fn test_client_error_from_conversions() {
        let protocol: ClientError = ProtocolViolation::MalformedFrame {
            reason: "not json".to_string(),
        }
        .into();
        assert!(matches!(protocol, ClientError::Protocol(_)));

        let thread: ClientError = ThreadError::Malformed("missing kind".to_string()).into();
        assert!(matches!(thread, ClientError::Thread(_)));
    }
}

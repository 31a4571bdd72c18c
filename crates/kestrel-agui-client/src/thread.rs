//! Thread state: canonical conversation history plus the wire thread id.
//!
//! A thread is a caller-owned handle passed explicitly into each run — there
//! is no process-wide thread registry. History is mutated only at turn
//! boundaries, never mid-stream.

use crate::error::ThreadError;
use kestrel_contract::Message;
use serde_json::{json, Value};

/// Blob discriminator for persisted AG-UI threads.
pub const THREAD_KIND: &str = "ag-ui";

/// A persistent conversation spanning multiple runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgUiThread {
    id: String,
    messages: Vec<Message>,
}

impl AgUiThread {
    /// Create a thread with a fresh UUID v7 wire thread id.
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            messages: Vec::new(),
        }
    }

    /// Create a thread with an existing wire thread id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
        }
    }

    /// The wire thread identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The canonical message history.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages in the history.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Append a completed turn to the history.
    ///
    /// Called exactly at turn boundaries: after a fully resolved run, and
    /// after each tool sub-turn inside the orchestrator loop.
    pub fn append_turn(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// Serialize to a persistable blob.
    ///
    /// The blob carries the thread kind, the wire thread id, and the full
    /// history; the round trip is lossless for both.
    pub fn serialize(&self) -> Result<Value, ThreadError> {
        Ok(json!({
            "kind": THREAD_KIND,
            "threadId": self.id,
            "messages": serde_json::to_value(&self.messages)?,
        }))
    }

    /// Restore a thread from a persisted blob.
    ///
    /// Blobs produced by an incompatible thread kind are rejected with
    /// [`ThreadError::KindMismatch`] rather than silently adapted.
    pub fn deserialize(blob: &Value) -> Result<Self, ThreadError> {
        let kind = blob
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| ThreadError::Malformed("missing `kind`".to_string()))?;
        if kind != THREAD_KIND {
            return Err(ThreadError::KindMismatch {
                expected: THREAD_KIND.to_string(),
                got: kind.to_string(),
            });
        }

        let id = blob
            .get("threadId")
            .and_then(Value::as_str)
            .ok_or_else(|| ThreadError::Malformed("missing `threadId`".to_string()))?
            .to_string();

        let messages: Vec<Message> = match blob.get("messages") {
            Some(value) => serde_json::from_value(value.clone())?,
            None => Vec::new(),
        };

        Ok(Self { id, messages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ThreadError;
    use serde_json::json;

    #[test]
    fn test_new_thread_has_uuid_v7_id() {
        let thread = AgUiThread::new();
        assert_eq!(thread.id().len(), 36);
        assert_eq!(&thread.id()[14..15], "7");
        assert_eq!(thread.message_count(), 0);
    }

    #[test]
    fn test_append_turn() {
        let mut thread = AgUiThread::with_id("t1");
        thread.append_turn([Message::user("Hello"), Message::assistant("Hi!")]);
        assert_eq!(thread.message_count(), 2);
        assert_eq!(thread.messages()[0].content, "Hello");
    }

    #[test]
    fn test_serialize_round_trip_is_lossless() {
        let mut thread = AgUiThread::with_id("t1");
        thread.append_turn([
            Message::user("What's the weather?"),
            Message::assistant("Sunny."),
            Message::tool("call_1", r#"{"conditions":"sunny"}"#),
        ]);

        let blob = thread.serialize().unwrap();
        assert_eq!(blob["kind"], THREAD_KIND);
        assert_eq!(blob["threadId"], "t1");

        let restored = AgUiThread::deserialize(&blob).unwrap();
        assert_eq!(restored.id(), thread.id());
        assert_eq!(restored.messages(), thread.messages());
    }

    #[test]
    fn test_deserialize_rejects_foreign_kind() {
        let blob = json!({
            "kind": "assistant-api",
            "threadId": "t1",
            "messages": []
        });
        let err = AgUiThread::deserialize(&blob).unwrap_err();
        assert!(matches!(
            err,
            ThreadError::KindMismatch { expected, got }
                if expected == THREAD_KIND && got == "assistant-api"
        ));
    }

    #[test]
    fn test_deserialize_rejects_missing_kind() {
        let blob = json!({"threadId": "t1", "messages": []});
        assert!(matches!(
            AgUiThread::deserialize(&blob).unwrap_err(),
            ThreadError::Malformed(_)
        ));
    }

    #[test]
    fn test_deserialize_rejects_missing_thread_id() {
        let blob = json!({"kind": THREAD_KIND, "messages": []});
        assert!(matches!(
            AgUiThread::deserialize(&blob).unwrap_err(),
            ThreadError::Malformed(_)
        ));
    }

    #[test]
    fn test_deserialize_tolerates_absent_history() {
        let blob = json!({"kind": THREAD_KIND, "threadId": "t1"});
        let thread = AgUiThread::deserialize(&blob).unwrap();
        assert_eq!(thread.id(), "t1");
        assert_eq!(thread.message_count(), 0);
    }
}

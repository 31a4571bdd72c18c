//! Streaming AG-UI client bridge.
//!
//! Connects a local unified chat/agent abstraction to a remote AG-UI agent
//! endpoint: opens one run per request, folds the streamed event frames into
//! ordered [`kestrel_contract::AgentUpdate`]s, executes locally registered
//! tools, and loops until the remote agent stops requesting calls.

pub mod agent;
pub mod aggregator;
pub mod error;
pub mod thread;
pub mod transport;

pub use agent::{AgUiAgent, AgentStreamEvent};
pub use aggregator::EventAggregator;
pub use error::{ClientError, ProtocolViolation, ThreadError, TransportError};
pub use thread::AgUiThread;
pub use transport::{AgentTransport, EventStream, HttpAgentTransport, TransportConfig};

//! Background location tracking agent.
//!
//! Filters raw position fixes, keeps accepted points in a durable local
//! buffer, duty-cycles high-frequency sampling by movement and uploads the
//! buffer in chunks to a collection server.

pub mod agent;
pub mod buffer;
pub mod config;
pub mod control_server;
pub mod duty_cycle;
pub mod error;
pub mod filter;
pub mod network;
pub mod notifier;
pub mod replay;
pub mod source;
pub mod status;
pub mod store;
pub mod types;
pub mod upload;

pub use agent::{AgentParts, TrackingAgent};
pub use config::{BufferCapacity, TrackerTuning, TrackingConfig};
pub use error::{AgentError, AgentResult};
pub use source::{ChannelSource, PositionSource, SourceError};
pub use status::AgentStatus;
pub use types::{Fix, PositionRecord, Visit};
pub use upload::{FlushOutcome, HttpTransport};

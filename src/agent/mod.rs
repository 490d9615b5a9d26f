//! Voice-agent side of a call: the per-call settings message and the
//! websocket client that carries it.

pub mod config;
pub mod connection;

pub use config::{AgentConfigSource, FileAgentConfig};
pub use connection::AgentWsConnector;

//! Per-call bridge between the telephony media stream and the voice agent.

pub mod forwarder;
pub mod inbound;
pub mod relay;
pub mod session;
pub mod tracker;
pub mod transport;

#[cfg(test)]
pub mod testing;

pub use session::{BridgeSettings, SessionOrchestrator};
pub use tracker::END_INTERVIEW_FUNCTION;
pub use transport::TelephonySink;

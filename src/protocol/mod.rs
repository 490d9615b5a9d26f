//! # Wire Protocols
//!
//! Boundary decoding for the two sockets a call touches:
//! - **telephony**: JSON media-stream events to and from the phone provider
//! - **agent**: JSON control events emitted by the voice agent
//!
//! Everything is decoded into closed enums here so the bridge never looks up
//! JSON keys dynamically.

pub mod agent;
pub mod telephony;

pub use agent::{ControlEvent, FunctionCall};
pub use telephony::{InboundTelephonyEvent, MediaTrack, OutboundTelephonyEvent};

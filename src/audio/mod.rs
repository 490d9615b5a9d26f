//! # Audio Framing
//!
//! Telephony audio (8kHz mu-law) is treated as opaque bytes: the bridge never
//! decodes samples, it only regroups packets into the fixed-size frames the
//! agent connection expects.

pub mod buffer;

pub use buffer::{AudioFrame, FrameBuffer};

//! Telephony provider integration: placing outbound calls and scheduling them.

pub mod client;
pub mod scheduler;

pub use client::{CallPlacer, CallbackParams, TwilioClient};
pub use scheduler::{CallJob, CallScheduler};

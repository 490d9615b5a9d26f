//! Telephony media-stream messages (Twilio Media Streams JSON).
//!
//! Inbound, one JSON object per websocket text message:
//! - `{"event":"start","start":{"streamSid":"MZ..."}}`
//! - `{"event":"media","media":{"track":"inbound","payload":"<base64>"}}`
//! - `{"event":"stop"}`
//!
//! Outbound:
//! - `{"event":"media","streamSid":"MZ...","media":{"payload":"<base64>"}}`
//! - `{"event":"clear","streamSid":"MZ..."}`

use crate::error::BridgeError;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Which leg of the call a media packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaTrack {
    Inbound,
    Outbound,
    #[serde(other)]
    Unknown,
}

/// A decoded telephony event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundTelephonyEvent {
    Start { stream_sid: String },
    Media { track: MediaTrack, payload: Vec<u8> },
    Stop,
    /// Events the bridge has no use for (`connected`, `mark`, `dtmf`, ...).
    Ignored,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum WireEvent {
    Start { start: StartPayload },
    Media { media: MediaPayload },
    Stop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StartPayload {
    #[serde(rename = "streamSid")]
    stream_sid: String,
}

#[derive(Debug, Deserialize)]
struct MediaPayload {
    track: MediaTrack,
    payload: String,
}

impl InboundTelephonyEvent {
    /// Decode one websocket text message.
    ///
    /// Any failure is a framing violation: the caller ends the session.
    pub fn decode(text: &str) -> Result<Self, BridgeError> {
        let wire: WireEvent = serde_json::from_str(text)
            .map_err(|e| BridgeError::MalformedTelephonyFrame(e.to_string()))?;

        Ok(match wire {
            WireEvent::Start { start } => InboundTelephonyEvent::Start {
                stream_sid: start.stream_sid,
            },
            WireEvent::Media { media } => {
                let payload = B64.decode(media.payload.as_bytes()).map_err(|e| {
                    BridgeError::MalformedTelephonyFrame(format!("invalid media payload: {}", e))
                })?;
                InboundTelephonyEvent::Media {
                    track: media.track,
                    payload,
                }
            }
            WireEvent::Stop => InboundTelephonyEvent::Stop,
            WireEvent::Other => InboundTelephonyEvent::Ignored,
        })
    }
}

/// Messages sent back to the telephony side.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundTelephonyEvent<'a> {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: &'a str,
        media: OutboundMedia,
    },
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: &'a str,
    },
}

#[derive(Debug, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

impl<'a> OutboundTelephonyEvent<'a> {
    /// Agent audio addressed to the caller's stream.
    pub fn media(stream_sid: &'a str, audio: &[u8]) -> Self {
        OutboundTelephonyEvent::Media {
            stream_sid,
            media: OutboundMedia {
                payload: B64.encode(audio),
            },
        }
    }

    /// Drop whatever agent audio the telephony side still has queued.
    pub fn clear(stream_sid: &'a str) -> Self {
        OutboundTelephonyEvent::Clear { stream_sid }
    }

    pub fn to_json(&self) -> String {
        // Serialization of these plain string structs cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_decode_start() {
        let event = InboundTelephonyEvent::decode(
            r#"{"event":"start","sequenceNumber":"1","start":{"streamSid":"SID1","callSid":"CA1"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            InboundTelephonyEvent::Start {
                stream_sid: "SID1".to_string()
            }
        );
    }

    #[test]
    fn test_decode_media() {
        let payload = B64.encode([0xffu8, 0x7f, 0x00]);
        let text = format!(
            r#"{{"event":"media","media":{{"track":"inbound","chunk":"1","payload":"{}"}}}}"#,
            payload
        );
        let event = InboundTelephonyEvent::decode(&text).unwrap();
        assert_eq!(
            event,
            InboundTelephonyEvent::Media {
                track: MediaTrack::Inbound,
                payload: vec![0xff, 0x7f, 0x00],
            }
        );
    }

    #[test]
    fn test_decode_stop_and_ignored_events() {
        assert_eq!(
            InboundTelephonyEvent::decode(r#"{"event":"stop","stop":{"callSid":"CA1"}}"#).unwrap(),
            InboundTelephonyEvent::Stop
        );
        assert_eq!(
            InboundTelephonyEvent::decode(r#"{"event":"connected","protocol":"Call"}"#).unwrap(),
            InboundTelephonyEvent::Ignored
        );
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        assert!(matches!(
            InboundTelephonyEvent::decode("not json"),
            Err(BridgeError::MalformedTelephonyFrame(_))
        ));
        assert!(matches!(
            InboundTelephonyEvent::decode(r#"{"event":"start"}"#),
            Err(BridgeError::MalformedTelephonyFrame(_))
        ));
        assert!(matches!(
            InboundTelephonyEvent::decode(
                r#"{"event":"media","media":{"track":"inbound","payload":"%%%"}}"#
            ),
            Err(BridgeError::MalformedTelephonyFrame(_))
        ));
    }

    #[test]
    fn test_outbound_media_shape() {
        let json = OutboundTelephonyEvent::media("SID1", &[1, 2, 3]).to_json();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "media");
        assert_eq!(value["streamSid"], "SID1");
        assert_eq!(value["media"]["payload"], B64.encode([1u8, 2, 3]));
    }

    #[test]
    fn test_outbound_clear_shape() {
        let json = OutboundTelephonyEvent::clear("SID1").to_json();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, serde_json::json!({"event": "clear", "streamSid": "SID1"}));
    }
}

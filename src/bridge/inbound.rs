//! # Inbound Capture
//!
//! Reads the caller's media stream, publishes the stream id, and turns inbound
//! audio packets into frames for the forwarder.
//!
//! ## Failure policy:
//! A telephony message that cannot be decoded ends the capture loop with an
//! error. The media-stream contract is strict JSON, so a bad frame means the
//! stream can no longer be trusted.

use crate::audio::{AudioFrame, FrameBuffer};
use crate::bridge::transport::{with_idle_timeout, TelephonySource};
use crate::error::BridgeError;
use crate::protocol::{InboundTelephonyEvent, MediaTrack};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// How the capture loop ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundExit {
    /// The provider sent `stop`.
    Stopped,
    /// The caller's socket went away without `stop`.
    Disconnected,
    /// The forwarder is gone, nobody consumes frames anymore.
    FramesDropped,
}

pub struct InboundCapture<T> {
    source: T,
    buffer: FrameBuffer,
    frames: mpsc::Sender<AudioFrame>,
    stream_id: Option<oneshot::Sender<String>>,
    idle_timeout: Option<Duration>,
}

impl<T: TelephonySource> InboundCapture<T> {
    pub fn new(
        source: T,
        frame_size: usize,
        frames: mpsc::Sender<AudioFrame>,
        stream_id: oneshot::Sender<String>,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            source,
            buffer: FrameBuffer::new(frame_size),
            frames,
            stream_id: Some(stream_id),
            idle_timeout,
        }
    }

    pub async fn run(mut self) -> Result<InboundExit, BridgeError> {
        loop {
            let message =
                with_idle_timeout(self.source.recv(), self.idle_timeout, "telephony").await?;

            let Some(text) = message else {
                info!("Telephony socket disconnected");
                return Ok(InboundExit::Disconnected);
            };

            let event = InboundTelephonyEvent::decode(&text).map_err(|err| {
                warn!(error = %err, "Error parsing telephony message");
                err
            })?;

            match event {
                InboundTelephonyEvent::Start { stream_sid } => self.publish_stream_id(stream_sid),
                InboundTelephonyEvent::Media {
                    track: MediaTrack::Inbound,
                    payload,
                } => {
                    self.buffer.push(&payload);
                    for frame in self.buffer.drain() {
                        // A full channel suspends capture until the forwarder catches up.
                        if self.frames.send(frame).await.is_err() {
                            return Ok(InboundExit::FramesDropped);
                        }
                    }
                }
                InboundTelephonyEvent::Media { track, .. } => {
                    debug!(?track, "Ignoring media from non-inbound track");
                }
                InboundTelephonyEvent::Stop => {
                    debug!(
                        pending_bytes = self.buffer.pending_len(),
                        "Telephony stream stopped"
                    );
                    return Ok(InboundExit::Stopped);
                }
                InboundTelephonyEvent::Ignored => {}
            }
        }
    }

    /// First `start` wins; later ones are logged and ignored.
    fn publish_stream_id(&mut self, stream_sid: String) {
        match self.stream_id.take() {
            Some(slot) => {
                info!(stream_sid = %stream_sid, "Telephony stream started");
                // The relay may already be gone during teardown; nothing to do then.
                let _ = slot.send(stream_sid);
            }
            None => warn!(stream_sid = %stream_sid, "Ignoring duplicate start event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as B64;
    use base64::Engine as _;
    use serde_json::json;

    fn media(payload: &[u8]) -> String {
        json!({"event": "media", "media": {"track": "inbound", "payload": B64.encode(payload)}})
            .to_string()
    }

    fn start(sid: &str) -> String {
        json!({"event": "start", "start": {"streamSid": sid}}).to_string()
    }

    struct Harness {
        telephony: mpsc::Sender<String>,
        frames: mpsc::Receiver<AudioFrame>,
        stream_id: oneshot::Receiver<String>,
        capture: InboundCapture<mpsc::Receiver<String>>,
    }

    fn harness(frame_size: usize) -> Harness {
        let (telephony, source) = mpsc::channel(16);
        let (frames_tx, frames) = mpsc::channel(16);
        let (sid_tx, stream_id) = oneshot::channel();
        Harness {
            telephony,
            frames,
            stream_id,
            capture: InboundCapture::new(source, frame_size, frames_tx, sid_tx, None),
        }
    }

    #[tokio::test]
    async fn test_capture_frames_and_stop() {
        let mut h = harness(4);
        h.telephony.try_send(start("SID1")).unwrap();
        h.telephony.try_send(media(&[1, 2, 3])).unwrap();
        h.telephony.try_send(media(&[4, 5, 6, 7, 8, 9])).unwrap();
        h.telephony.try_send(json!({"event": "stop"}).to_string()).unwrap();

        assert_eq!(h.capture.run().await, Ok(InboundExit::Stopped));
        assert_eq!(h.stream_id.await.unwrap(), "SID1");
        assert_eq!(h.frames.recv().await.unwrap().as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(h.frames.recv().await.unwrap().as_bytes(), &[5, 6, 7, 8]);
        assert!(h.frames.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_start_first_wins() {
        let h = harness(4);
        h.telephony.try_send(start("FIRST")).unwrap();
        h.telephony.try_send(start("SECOND")).unwrap();
        h.telephony.try_send(json!({"event": "stop"}).to_string()).unwrap();

        assert_eq!(h.capture.run().await, Ok(InboundExit::Stopped));
        assert_eq!(h.stream_id.await.unwrap(), "FIRST");
    }

    #[tokio::test]
    async fn test_outbound_track_is_ignored() {
        let mut h = harness(2);
        let outbound = json!({"event": "media", "media": {"track": "outbound", "payload": B64.encode([1u8, 2])}});
        h.telephony.try_send(outbound.to_string()).unwrap();
        h.telephony.try_send(json!({"event": "mark", "mark": {"name": "x"}}).to_string()).unwrap();
        drop(h.telephony);

        assert_eq!(h.capture.run().await, Ok(InboundExit::Disconnected));
        assert!(h.frames.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_frame_is_fatal() {
        let h = harness(4);
        h.telephony.try_send("{\"event\":".to_string()).unwrap();
        h.telephony.try_send(json!({"event": "stop"}).to_string()).unwrap();

        assert!(matches!(
            h.capture.run().await,
            Err(BridgeError::MalformedTelephonyFrame(_))
        ));
    }

    #[tokio::test]
    async fn test_idle_timeout_ends_capture() {
        let (_telephony, source) = mpsc::channel::<String>(1);
        let (frames_tx, _frames) = mpsc::channel(1);
        let (sid_tx, _sid) = oneshot::channel();
        let capture = InboundCapture::new(
            source,
            4,
            frames_tx,
            sid_tx,
            Some(Duration::from_millis(10)),
        );
        assert_eq!(
            capture.run().await,
            Err(BridgeError::IdleTimeout("telephony"))
        );
    }
}

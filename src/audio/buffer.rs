//! # Frame Buffer
//!
//! Accumulates raw telephony audio and cuts it into fixed-size frames for the
//! agent connection. Telephony packets are small (160 bytes per 20ms at 8kHz
//! mu-law) while the agent receives larger frames, so leftover bytes are kept
//! between pushes until a full frame is available.
//!
//! ## Framing guarantee:
//! The concatenation of every frame ever drained equals the longest prefix of
//! the pushed bytes whose length is a multiple of the frame size. A frame is
//! never shorter than the frame size.

/// One fixed-size chunk of audio, consumed exactly once by the forwarder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame(Vec<u8>);

impl AudioFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Byte accumulator that emits complete frames in FIFO order.
///
/// ## Memory Management:
/// The accumulator never holds more than one frame's worth of leftover bytes
/// after a `drain`; everything else has already been handed out as frames.
#[derive(Debug)]
pub struct FrameBuffer {
    pending: Vec<u8>,
    frame_size: usize,
}

impl FrameBuffer {
    /// Create a buffer that emits frames of `frame_size` bytes.
    ///
    /// `frame_size` is validated by `AppConfig::validate`; a zero size is
    /// bumped to one byte so `drain` always terminates.
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            pending: Vec::with_capacity(frame_size * 2),
            frame_size,
        }
    }

    /// Append raw audio bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Remove and return every complete frame, keeping the remainder.
    pub fn drain(&mut self) -> Vec<AudioFrame> {
        let complete = self.pending.len() / self.frame_size;
        if complete == 0 {
            return Vec::new();
        }

        let remainder = self.pending.split_off(complete * self.frame_size);
        let ready = std::mem::replace(&mut self.pending, remainder);

        ready
            .chunks_exact(self.frame_size)
            .map(|chunk| AudioFrame(chunk.to_vec()))
            .collect()
    }

    /// Bytes waiting for the next frame boundary.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_keeps_remainder() {
        let mut buffer = FrameBuffer::new(4);
        buffer.push(&[1, 2, 3]);
        assert!(buffer.drain().is_empty());
        assert_eq!(buffer.pending_len(), 3);

        buffer.push(&[4, 5, 6, 7, 8, 9]);
        let frames = buffer.drain();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(frames[1].as_bytes(), &[5, 6, 7, 8]);
        assert_eq!(buffer.pending_len(), 1);
    }

    #[test]
    fn test_framing_preserves_byte_order_across_uneven_pushes() {
        let frame_size = 3200;
        let mut buffer = FrameBuffer::new(frame_size);
        let pushed: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let mut drained = Vec::new();
        // Telephony-sized packets plus a few odd sizes
        for chunk in pushed.chunks(157) {
            buffer.push(chunk);
            for frame in buffer.drain() {
                assert_eq!(frame.len(), frame_size);
                drained.extend(frame.into_bytes());
            }
        }

        let expected_frames = pushed.len() / frame_size;
        assert_eq!(drained.len(), expected_frames * frame_size);
        assert_eq!(buffer.pending_len(), pushed.len() % frame_size);
        assert_eq!(&drained[..], &pushed[..drained.len()]);
    }

    #[test]
    fn test_exact_frame_push() {
        let mut buffer = FrameBuffer::new(160);
        buffer.push(&[7u8; 160]);
        let frames = buffer.drain();
        assert_eq!(frames.len(), 1);
        assert_eq!(buffer.pending_len(), 0);
        assert!(buffer.drain().is_empty());
    }
}

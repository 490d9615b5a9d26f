//! Outbound Forwarder: moves framed caller audio to the agent connection.

use crate::audio::AudioFrame;
use crate::bridge::transport::AgentSender;
use crate::error::BridgeError;
use tokio::sync::mpsc;
use tracing::debug;

/// Forward frames until the capture side closes the channel.
///
/// A failed write ends the session; there is no retry and no reconnect.
pub async fn forward_audio<A>(
    frames: &mut mpsc::Receiver<AudioFrame>,
    agent: &mut A,
) -> Result<(), BridgeError>
where
    A: AgentSender + ?Sized,
{
    while let Some(frame) = frames.recv().await {
        agent.send_audio(frame).await?;
    }
    debug!("Audio channel closed, forwarder done");
    Ok(())
}

/// Send frames that were already queued when capture ended normally.
///
/// Never waits for new frames, so it cannot outlive teardown.
pub async fn flush_queued<A>(
    frames: &mut mpsc::Receiver<AudioFrame>,
    agent: &mut A,
) -> Result<usize, BridgeError>
where
    A: AgentSender + ?Sized,
{
    let mut flushed = 0;
    while let Ok(frame) = frames.try_recv() {
        agent.send_audio(frame).await?;
        flushed += 1;
    }
    Ok(flushed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FrameBuffer;
    use crate::bridge::testing::{AgentLog, RecordingAgentSender};
    use std::sync::{Arc, Mutex};

    fn frames(count: usize) -> Vec<AudioFrame> {
        let mut buffer = FrameBuffer::new(2);
        let bytes: Vec<u8> = (0..(count * 2) as u8).collect();
        buffer.push(&bytes);
        buffer.drain()
    }

    #[tokio::test]
    async fn test_forwards_in_order_until_closed() {
        let (tx, mut rx) = mpsc::channel(8);
        for frame in frames(3) {
            tx.send(frame).await.unwrap();
        }
        drop(tx);

        let log = Arc::new(Mutex::new(AgentLog::default()));
        let mut agent = RecordingAgentSender::new(log.clone());
        forward_audio(&mut rx, &mut agent).await.unwrap();

        let log = log.lock().unwrap();
        let sent: Vec<Vec<u8>> = log.frames.iter().map(|f| f.as_bytes().to_vec()).collect();
        assert_eq!(sent, vec![vec![0u8, 1], vec![2, 3], vec![4, 5]]);
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(frames(1).remove(0)).await.unwrap();

        let log = Arc::new(Mutex::new(AgentLog::default()));
        let mut agent = RecordingAgentSender::failing(log);
        let result = forward_audio(&mut rx, &mut agent).await;
        assert!(matches!(result, Err(BridgeError::AgentConnection(_))));
    }

    #[tokio::test]
    async fn test_flush_does_not_wait() {
        let (tx, mut rx) = mpsc::channel(8);
        for frame in frames(2) {
            tx.send(frame).await.unwrap();
        }

        let log = Arc::new(Mutex::new(AgentLog::default()));
        let mut agent = RecordingAgentSender::new(log.clone());
        // The sender is still alive: flush must return instead of waiting.
        assert_eq!(flush_queued(&mut rx, &mut agent).await.unwrap(), 2);
        assert_eq!(log.lock().unwrap().frames.len(), 2);
        drop(tx);
    }
}

//! Audio capture pipeline.
//!
//! Pulls fixed-size blocks of mono f32 samples from an [`AudioSource`],
//! converts each block to 16-bit signed PCM and hands it to the transport
//! without waiting on the network. A frame the transport cannot accept right
//! now is dropped; capture never stalls on send.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::base::{AudioFrame, LiveResult, TransportSession, pcm_mime_type};

/// A stream of captured audio blocks.
///
/// Dropping the source releases the underlying device.
#[async_trait]
pub trait AudioSource: Send {
    /// Wait for the next block of mono samples in [-1, 1).
    ///
    /// Returns `None` once the input has ended.
    async fn next_block(&mut self) -> Option<Vec<f32>>;
}

/// Something that can hand out an exclusive capture stream.
pub trait AudioInput: Send + Sync {
    /// Acquire the input device at the given rate and block size.
    ///
    /// Permission or device errors surface here, before any session opens.
    fn open(&self, sample_rate: u32, block_size: usize) -> LiveResult<Box<dyn AudioSource>>;
}

/// Convert one sample to 16-bit PCM.
///
/// The producer is expected to stay within [-1, 1); values outside that
/// range are not guarded.
#[inline]
pub fn sample_to_pcm16(sample: f32) -> i16 {
    (sample * 32768.0) as i16
}

/// Encode a block as a little-endian PCM frame tagged with its sample rate.
pub fn encode_frame(samples: &[f32], sample_rate: u32) -> AudioFrame {
    let mut buf = BytesMut::with_capacity(samples.len() * 2);
    for &sample in samples {
        buf.put_i16_le(sample_to_pcm16(sample));
    }
    AudioFrame {
        data: buf.freeze(),
        mime_type: pcm_mime_type(sample_rate),
    }
}

/// Decode little-endian PCM bytes back to samples.
pub fn pcm16_le_to_i16(data: &Bytes) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

/// Counters reported when a capture pipeline stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Frames accepted by the transport
    pub frames_sent: u64,
    /// Frames dropped because the transport was not ready
    pub frames_dropped: u64,
}

/// A running capture task bound to one transport session.
pub struct CapturePipeline {
    cancel: CancellationToken,
    handle: Option<JoinHandle<CaptureStats>>,
}

impl CapturePipeline {
    /// Spawn the capture loop.
    ///
    /// The loop owns `source` and drops it when cancelled or when the input
    /// ends.
    pub fn start(
        mut source: Box<dyn AudioSource>,
        session: Arc<dyn TransportSession>,
        sample_rate: u32,
        cancel: CancellationToken,
    ) -> Self {
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut stats = CaptureStats::default();

            loop {
                let block = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    block = source.next_block() => block,
                };

                let Some(block) = block else {
                    debug!("Capture input ended");
                    break;
                };

                let frame = encode_frame(&block, sample_rate);
                match session.send_audio(frame) {
                    Ok(()) => stats.frames_sent += 1,
                    Err(e) => {
                        stats.frames_dropped += 1;
                        trace!("Dropped capture frame: {}", e);
                    }
                }
            }

            drop(source);
            debug!(
                "Capture stopped: {} frames sent, {} dropped",
                stats.frames_sent, stats.frames_dropped
            );
            stats
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Cancel the loop and wait for the input device to be released.
    ///
    /// Returns `None` if the pipeline was already stopped.
    pub async fn stop(&mut self) -> Option<CaptureStats> {
        self.cancel.cancel();
        let handle = self.handle.take()?;
        match handle.await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("Capture task ended abnormally: {}", e);
                None
            }
        }
    }

    /// Check whether the capture loop is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::live::base::{CAPTURE_SAMPLE_RATE, LiveError};
    use crate::core::live::test_support::{PendingSource, RecordingSession, ScriptedSource};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    async fn wait_until_finished(pipeline: &CapturePipeline) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while pipeline.is_running() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_sample_conversion() {
        assert_eq!(sample_to_pcm16(0.0), 0);
        assert_eq!(sample_to_pcm16(0.5), 16384);
        assert_eq!(sample_to_pcm16(-0.5), -16384);
        assert_eq!(sample_to_pcm16(-1.0), -32768);
        assert_eq!(sample_to_pcm16(0.25), 8192);
    }

    #[test]
    fn test_encode_frame_little_endian() {
        let frame = encode_frame(&[0.5, -0.25], CAPTURE_SAMPLE_RATE);
        assert_eq!(frame.mime_type, "audio/pcm;rate=16000");
        assert_eq!(frame.data.len(), 4);
        // 16384 = 0x4000, -8192 = 0xE000
        assert_eq!(&frame.data[..], &[0x00, 0x40, 0x00, 0xE0]);
        assert_eq!(pcm16_le_to_i16(&frame.data), vec![16384, -8192]);
    }

    #[tokio::test]
    async fn test_pipeline_sends_every_block() {
        let session = Arc::new(RecordingSession::default());
        let source = ScriptedSource::new(vec![vec![0.0; 4096], vec![0.5; 4096], vec![-0.5; 4096]]);

        let mut pipeline = CapturePipeline::start(
            Box::new(source),
            session.clone(),
            CAPTURE_SAMPLE_RATE,
            CancellationToken::new(),
        );

        // Source ends after three blocks; the loop exits on its own.
        wait_until_finished(&pipeline).await;
        let stats = pipeline.stop().await.unwrap();
        let frames = session.audio_frames();
        assert_eq!(stats.frames_sent, 3);
        assert_eq!(frames.len(), 3);
        for frame in &frames {
            assert_eq!(frame.data.len(), 4096 * 2);
        }
    }

    #[tokio::test]
    async fn test_pipeline_drops_frames_when_transport_busy() {
        let session = Arc::new(RecordingSession::default());
        session.reject_audio_with(Some(LiveError::Backpressure));
        let source = ScriptedSource::new(vec![vec![0.1; 16]; 5]);

        let mut pipeline = CapturePipeline::start(
            Box::new(source),
            session.clone(),
            CAPTURE_SAMPLE_RATE,
            CancellationToken::new(),
        );

        wait_until_finished(&pipeline).await;
        let stats = pipeline.stop().await.unwrap();
        assert_eq!(stats.frames_sent, 0);
        assert_eq!(stats.frames_dropped, 5);
        assert!(session.audio_frames().is_empty());
    }

    #[tokio::test]
    async fn test_stop_releases_blocked_source() {
        let session = Arc::new(RecordingSession::default());
        let source = PendingSource::default();
        let released = source.released.clone();

        let mut pipeline = CapturePipeline::start(
            Box::new(source),
            session,
            CAPTURE_SAMPLE_RATE,
            CancellationToken::new(),
        );
        assert!(pipeline.is_running());

        let stats = pipeline.stop().await;
        assert_eq!(stats, Some(CaptureStats::default()));
        assert!(released.load(Ordering::SeqCst));

        // Second stop is a no-op.
        assert_eq!(pipeline.stop().await, None);
    }
}

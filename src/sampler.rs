//! Periodic frame sampling.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use image::RgbaImage;
use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::Error;
use crate::media::{Camera, MediaCapture};

/// Compressed frame ready for transport.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EncodedFrame {
    pub const FILE_NAME: &'static str = "frame.jpg";
    pub const MIME: &'static str = "image/jpeg";
}

/// A sampled frame: the raster it was taken from plus its encoding.
///
/// `sequence` increases by one per sampled frame, in sampling order.
#[derive(Debug, Clone)]
pub struct SampledFrame {
    pub sequence: u64,
    pub image: Arc<RgbaImage>,
    pub encoded: EncodedFrame,
}

/// Receives sampled frames. Must not block: slow work belongs in a spawned task.
pub trait FrameSink: Send + Sync + 'static {
    fn submit(&self, frame: SampledFrame);
}

/// Encodes raster frames to JPEG.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    quality: u8,
}

impl FrameEncoder {
    #[must_use]
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::Encode`] if the JPEG encoder rejects the frame.
    pub fn encode(&self, image: &RgbaImage) -> Result<EncodedFrame, Error> {
        let rgb: image::RgbImage = image.convert();
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, self.quality).encode_image(&rgb)?;
        Ok(EncodedFrame {
            bytes,
            width: image.width(),
            height: image.height(),
        })
    }
}

struct TickState {
    encoder: FrameEncoder,
    next_sequence: AtomicU64,
}

impl TickState {
    fn tick<C: Camera>(
        &self,
        capture: &MediaCapture<C>,
        sink: &dyn FrameSink,
    ) -> Result<bool, Error> {
        // Video not ready (or stopped): nothing to sample, not an error.
        let Some(image) = capture.snapshot() else {
            return Ok(false);
        };
        let encoded = self.encoder.encode(&image)?;
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed) + 1;
        sink.submit(SampledFrame {
            sequence,
            image: Arc::new(image),
            encoded,
        });
        Ok(true)
    }
}

/// Drives sampling on a fixed cadence.
///
/// The first tick fires immediately on `start_loop`. Ticks do not wait for
/// the sink: overlapping downstream work is the sink's concern.
pub struct FrameSampler {
    state: Arc<TickState>,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl FrameSampler {
    #[must_use]
    pub fn new(interval: Duration, jpeg_quality: u8) -> Self {
        Self {
            state: Arc::new(TickState {
                encoder: FrameEncoder::new(jpeg_quality),
                next_sequence: AtomicU64::new(0),
            }),
            interval,
            task: None,
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Sample once, outside the loop.
    ///
    /// Returns `Ok(false)` when the video has no frame yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if the frame could not be encoded.
    pub fn tick<C: Camera>(
        &self,
        capture: &MediaCapture<C>,
        sink: &dyn FrameSink,
    ) -> Result<bool, Error> {
        self.state.tick(capture, sink)
    }

    /// Start the periodic loop. A loop already running is aborted first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_loop<C: Camera, S: FrameSink>(
        &mut self,
        capture: Arc<MediaCapture<C>>,
        sink: Arc<S>,
    ) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let state = self.state.clone();
        let interval = self.interval;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = state.tick(&capture, sink.as_ref()) {
                    tracing::warn!(error = %e, "Frame sampling failed");
                }
            }
        }));
    }

    /// Cancel the loop and wait for it to wind down. No tick fires after this returns.
    pub async fn stop_loop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for FrameSampler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

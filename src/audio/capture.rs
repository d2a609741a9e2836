use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::device::{AudioBackend, AudioSource, StreamSpec};
use super::ring::SampleRing;
use crate::error::{CaptureError, PipelineError};

/// Full-scale value of a signed 16-bit sample
pub(crate) const I16_SCALE: f32 = 32768.0;

/// Consecutive failures between two `warn` lines while a read error streak lasts
const WARN_EVERY: u64 = 100;

/// Background thread that moves device blocks into the [`SampleRing`].
pub struct CaptureLoop {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureLoop {
    /// Spawn the capture thread and wait until it has opened the input.
    ///
    /// The device is opened on the capture thread and stays there until the thread exits, which
    /// is when it gets closed.
    pub fn spawn(
        backend: Arc<dyn AudioBackend>,
        spec: StreamSpec,
        ring: Arc<SampleRing>,
        max_backoff: Duration,
    ) -> Result<Self, PipelineError> {
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded(1);

        let handle = {
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("specpipe-capture".into())
                .spawn(move || {
                    let source = match backend.open(&spec) {
                        Ok(source) => {
                            let _ = ready_tx.send(Ok(()));
                            source
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    run(source, &spec, &ring, &running, max_backoff);
                })
                .map_err(PipelineError::Spawn)?
        };

        let mut capture = Self {
            running,
            handle: Some(handle),
        };

        // Any early return drops `capture`, which stops and joins the thread
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(capture),
            Ok(Err(e)) => {
                capture.stop();
                Err(PipelineError::Device(e))
            }
            Err(_) => {
                capture.stop();
                Err(PipelineError::CaptureThreadExited)
            }
        }
    }

    /// False once stopped, or when the thread has exited on its own.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Ask the thread to stop and wait for its current read to return. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Capture thread panicked");
            }
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    mut source: Box<dyn AudioSource>,
    spec: &StreamSpec,
    ring: &SampleRing,
    running: &AtomicBool,
    max_backoff: Duration,
) {
    let mut raw = vec![0i16; spec.block_len()];
    let mut block = vec![0.0f32; ring.capacity()];
    let mut failures = FailureStreak::new(max_backoff);

    log::debug!("Capture loop started ({} frames per block)", spec.block_frames);

    while running.load(Ordering::Acquire) {
        match source.read(&mut raw) {
            Ok(()) => {
                failures.recovered();
                downmix_normalize(&raw, spec.channels as usize, &mut block);
                ring.publish(&block);
            }
            Err(e) => {
                if let Some(delay) = failures.failed(&e) {
                    thread::sleep(delay);
                }
            }
        }
    }

    log::debug!("Capture loop stopped after {} blocks", ring.sequence());
    // `source` drops here, closing the device on this thread
}

/// Convert interleaved i16 frames to mono floats in [-1, 1).
pub(crate) fn downmix_normalize(raw: &[i16], channels: usize, out: &mut [f32]) {
    if channels == 1 {
        for (dst, &src) in out.iter_mut().zip(raw) {
            *dst = src as f32 / I16_SCALE;
        }
        return;
    }
    for (dst, frame) in out.iter_mut().zip(raw.chunks_exact(channels)) {
        let sum: f32 = frame.iter().map(|&s| s as f32 / I16_SCALE).sum();
        *dst = sum / channels as f32;
    }
}

/// Tracks consecutive read failures for backoff and log throttling.
struct FailureStreak {
    count: u64,
    max_backoff: Duration,
}

impl FailureStreak {
    fn new(max_backoff: Duration) -> Self {
        Self {
            count: 0,
            max_backoff,
        }
    }

    /// Record a failure and return how long to wait before the next read.
    fn failed(&mut self, err: &CaptureError) -> Option<Duration> {
        self.count += 1;
        if self.count == 1 || self.count % WARN_EVERY == 0 {
            log::warn!("Audio read error ({} in a row): {}", self.count, err);
        } else {
            log::debug!("Audio read error ({} in a row): {}", self.count, err);
        }
        self.backoff()
    }

    fn recovered(&mut self) {
        if self.count > 0 {
            log::info!("Audio input recovered after {} failed reads", self.count);
            self.count = 0;
        }
    }

    /// 1ms doubling per consecutive failure, capped at `max_backoff`.
    fn backoff(&self) -> Option<Duration> {
        if self.max_backoff.is_zero() || self.count == 0 {
            return None;
        }
        let shift = (self.count - 1).min(16) as u32;
        Some(Duration::from_millis(1u64 << shift).min(self.max_backoff))
    }
}

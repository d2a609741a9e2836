use std::sync::Arc;
use std::time::Duration;

use crate::audio::analysis::{self, SpectrumAnalyzer};
use crate::audio::capture::CaptureLoop;
use crate::audio::device::{AudioBackend, CpalBackend, StreamSpec};
use crate::audio::features::BandLevels;
use crate::audio::file::FileBackend;
use crate::audio::ring::SampleRing;
use crate::config::AudioConfig;
use crate::error::PipelineError;

/// Capture-to-spectrum pipeline owned by the renderer.
///
/// `initialize` starts capturing, `update` is called once per frame, `magnitudes` exposes the
/// smoothed spectrum and `shutdown` (or drop) tears everything down.
pub struct Pipeline {
    config: AudioConfig,
    running: Option<Running>,
}

struct Running {
    capture: CaptureLoop,
    analyzer: SpectrumAnalyzer,
    ring: Arc<SampleRing>,
}

impl Pipeline {
    /// Validate `config`, allocate the buffers and FFT plan, then open the input on a fresh
    /// capture thread.
    ///
    /// On error everything acquired so far has already been released.
    pub fn initialize(
        config: AudioConfig,
        backend: Arc<dyn AudioBackend>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let ring = Arc::new(SampleRing::new(config.buffer_size));
        let analyzer = SpectrumAnalyzer::new(config.fft_size, config.sample_rate, config.smoothing);

        let spec = StreamSpec {
            sample_rate: config.sample_rate,
            channels: config.channels,
            block_frames: config.buffer_size,
            source: config.source.clone(),
        };
        let capture = CaptureLoop::spawn(
            backend,
            spec,
            Arc::clone(&ring),
            Duration::from_millis(config.max_retry_backoff_ms),
        )?;

        log::info!(
            "Audio initialized: {} Hz, {} samples, {} FFT bins",
            config.sample_rate,
            config.buffer_size,
            config.bin_count()
        );

        Ok(Self {
            config,
            running: Some(Running {
                capture,
                analyzer,
                ring,
            }),
        })
    }

    /// Pick the input from `config`: file replay when `input_file` is set, otherwise cpal.
    pub fn start(mut config: AudioConfig) -> Result<Self, PipelineError> {
        let backend: Arc<dyn AudioBackend> = match config.input_file.clone() {
            Some(path) => {
                let file = FileBackend::new(&path)?;
                if file.sample_rate() != config.sample_rate {
                    log::info!(
                        "Using the file's sample rate {}Hz instead of {}Hz",
                        file.sample_rate(),
                        config.sample_rate
                    );
                    config.sample_rate = file.sample_rate();
                }
                Arc::new(file)
            }
            None => Arc::new(CpalBackend),
        };
        Self::initialize(config, backend)
    }

    /// Analyze the latest captured block. Call once per rendered frame; no-op after shutdown.
    pub fn update(&mut self) {
        if let Some(running) = &mut self.running {
            running.analyzer.update(&running.ring);
        }
    }

    /// Smoothed spectrum, `bin_count()` values in [0, 1]. Empty after shutdown.
    pub fn magnitudes(&self) -> &[f32] {
        match &self.running {
            Some(running) => running.analyzer.magnitudes(),
            None => &[],
        }
    }

    pub fn bin_count(&self) -> usize {
        self.config.bin_count()
    }

    /// Centre frequency of bin `index` in Hz.
    pub fn bin_frequency(&self, index: usize) -> f32 {
        analysis::bin_frequency(index, self.config.sample_rate, self.config.fft_size)
    }

    /// Bin nearest to `freq_hz`.
    pub fn frequency_bin(&self, freq_hz: f32) -> usize {
        analysis::frequency_bin(freq_hz, self.config.sample_rate, self.config.fft_size)
    }

    pub fn peak_bin(&self) -> Option<usize> {
        self.running.as_ref().and_then(|r| r.analyzer.peak_bin())
    }

    pub fn bands(&self) -> BandLevels {
        self.running
            .as_ref()
            .map(|r| r.analyzer.bands())
            .unwrap_or_default()
    }

    /// Blocks published by the capture thread so far.
    pub fn blocks_captured(&self) -> u64 {
        self.running.as_ref().map_or(0, |r| r.ring.sequence())
    }

    pub fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|r| r.capture.is_running())
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Stop capturing and release the input, FFT plan and buffers. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        let Some(Running {
            mut capture,
            analyzer,
            ring,
        }) = self.running.take()
        else {
            return;
        };

        // Joining the thread closes the device on its way out
        capture.stop();
        let blocks = ring.sequence();
        drop(analyzer);
        drop(ring);

        log::info!("Audio shut down after {} captured blocks", blocks);
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

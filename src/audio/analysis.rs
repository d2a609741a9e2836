use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

use super::features::BandLevels;
use super::ring::SampleRing;

/// Bottom of the displayed dynamic range; 0 dB maps to 1.0
pub const DB_RANGE: f32 = 80.0;

/// Added to magnitudes before taking the log
pub const MAGNITUDE_EPSILON: f32 = 1e-10;

/// Windowed real FFT with dB normalization and per-bin exponential smoothing.
///
/// Owns the transform plan and every buffer it touches, so `update` never allocates. The
/// smoothed magnitudes persist across calls and are the only state read back from a previous
/// frame.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    input: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    smoothing: f32,
    sample_rate: u32,
}

impl SpectrumAnalyzer {
    /// `fft_size` must be even; callers validate through `AudioConfig::validate`.
    pub fn new(fft_size: usize, sample_rate: u32, smoothing: f32) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);

        Self {
            window: hann_window(fft_size),
            input: fft.make_input_vec(),
            spectrum: fft.make_output_vec(),
            scratch: fft.make_scratch_vec(),
            magnitudes: vec![0.0; fft_size / 2],
            fft,
            smoothing,
            sample_rate,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.window.len()
    }

    /// Analyze the ring's latest block. The ring lock is only held for the copy.
    pub fn update(&mut self, ring: &SampleRing) {
        ring.copy_into(&mut self.input);
        self.analyze();
    }

    /// Analyze caller-supplied samples, repeating them if shorter than the FFT.
    pub fn process(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            self.input.fill(0.0);
        } else {
            for chunk in self.input.chunks_mut(samples.len()) {
                chunk.copy_from_slice(&samples[..chunk.len()]);
            }
        }
        self.analyze();
    }

    fn analyze(&mut self) {
        for (sample, w) in self.input.iter_mut().zip(&self.window) {
            *sample *= w;
        }

        // Buffers come from the plan itself, so lengths always match
        if let Err(e) = self
            .fft
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
        {
            log::error!("FFT failed: {}", e);
            return;
        }

        let alpha = self.smoothing;
        for (out, bin) in self.magnitudes.iter_mut().zip(&self.spectrum) {
            *out = smooth(*out, normalize_db(bin.norm()), alpha);
        }
    }

    /// Smoothed, normalized magnitudes, `fft_size / 2` values in [0, 1].
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    /// Index of the loudest smoothed bin, `None` while everything is at the floor.
    pub fn peak_bin(&self) -> Option<usize> {
        self.magnitudes
            .iter()
            .enumerate()
            .filter(|(_, m)| **m > 0.0)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
    }

    pub fn bands(&self) -> BandLevels {
        BandLevels::from_magnitudes(&self.magnitudes, self.sample_rate, self.fft_size())
    }
}

/// Centre frequency of bin `index` in Hz.
pub fn bin_frequency(index: usize, sample_rate: u32, fft_size: usize) -> f32 {
    index as f32 * sample_rate as f32 / fft_size as f32
}

/// Bin nearest to `freq_hz`.
pub fn frequency_bin(freq_hz: f32, sample_rate: u32, fft_size: usize) -> usize {
    (freq_hz * fft_size as f32 / sample_rate as f32).round() as usize
}

/// Map a linear magnitude onto [0, 1] over the -80..0 dB range.
pub fn normalize_db(magnitude: f32) -> f32 {
    let db = 20.0 * (magnitude + MAGNITUDE_EPSILON).log10();
    ((db + DB_RANGE) / DB_RANGE).clamp(0.0, 1.0)
}

/// One EMA step; `alpha` is the weight kept from the previous value.
pub fn smooth(previous: f32, current: f32, alpha: f32) -> f32 {
    previous * alpha + current * (1.0 - alpha)
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MIN_FFT_SIZE: usize = 16;
pub const MAX_FFT_SIZE: usize = 65536;
pub const MAX_CHANNELS: u16 = 32;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
}

/// Capture and analysis settings, the `[audio]` table of the config file.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    /// Capture block size in frames
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    /// EMA coefficient, closer to 1.0 responds slower
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    /// Input device name; `None` picks the system default input
    #[serde(default)]
    pub source: Option<String>,
    /// Cap for the capture retry backoff, 0 retries immediately
    #[serde(default = "default_max_retry_backoff_ms")]
    pub max_retry_backoff_ms: u64,
    /// Replay an audio file instead of capturing from a device
    #[serde(default)]
    pub input_file: Option<PathBuf>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("sample rate must be positive")]
    ZeroSampleRate,
    #[error("channel count {0} is outside 1..=32")]
    Channels(u16),
    #[error("buffer size must be positive")]
    ZeroBufferSize,
    #[error("FFT size {0} must be an even number between 16 and 65536")]
    FftSize(usize),
    #[error("smoothing coefficient {0} must lie in [0, 1)")]
    Smoothing(f32),
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            buffer_size: default_buffer_size(),
            fft_size: default_fft_size(),
            smoothing: default_smoothing(),
            source: None,
            max_retry_backoff_ms: default_max_retry_backoff_ms(),
            input_file: None,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(ConfigError::Channels(self.channels));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        if self.fft_size % 2 != 0 || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&self.fft_size) {
            return Err(ConfigError::FftSize(self.fft_size));
        }
        // NaN fails the range check too
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(ConfigError::Smoothing(self.smoothing));
        }
        Ok(())
    }

    /// Number of magnitude bins exposed to the renderer.
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }
}

fn default_sample_rate() -> u32 { 44100 }
fn default_channels() -> u16 { 1 }
fn default_buffer_size() -> usize { 2048 }
fn default_fft_size() -> usize { 2048 }
fn default_smoothing() -> f32 { 0.8 }
fn default_max_retry_backoff_ms() -> u64 { 50 }

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Explicit path first, then `./specpipe.toml`, then `~/.config/specpipe/config.toml`, then
/// the platform config dir.
pub fn find_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("specpipe.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("specpipe").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    let platform = dirs::config_dir()?.join("specpipe").join("config.toml");
    platform.exists().then_some(platform)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_settings() {
        let audio = AudioConfig::default();
        assert_eq!(audio.sample_rate, 44100);
        assert_eq!(audio.buffer_size, 2048);
        assert_eq!(audio.fft_size, 2048);
        assert_eq!(audio.bin_count(), 1024);
        assert!((audio.smoothing - 0.8).abs() < f32::EPSILON);
        assert!(audio.source.is_none());
        assert!(audio.validate().is_ok());
    }

    #[test]
    fn parses_partial_audio_table() {
        let config: Config = toml::from_str(
            r#"
            [audio]
            fft_size = 4096
            smoothing = 0.5
            source = "alsa_output.analog-stereo.monitor"
            "#,
        )
        .unwrap();
        assert_eq!(config.audio.fft_size, 4096);
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(
            config.audio.source.as_deref(),
            Some("alsa_output.analog-stereo.monitor")
        );
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn rejects_bad_values() {
        let base = AudioConfig::default();

        let cfg = AudioConfig { fft_size: 1023, ..base.clone() };
        assert_eq!(cfg.validate(), Err(ConfigError::FftSize(1023)));

        let cfg = AudioConfig { fft_size: 8, ..base.clone() };
        assert_eq!(cfg.validate(), Err(ConfigError::FftSize(8)));

        let cfg = AudioConfig { smoothing: 1.0, ..base.clone() };
        assert_eq!(cfg.validate(), Err(ConfigError::Smoothing(1.0)));

        let cfg = AudioConfig { smoothing: -0.1, ..base.clone() };
        assert!(cfg.validate().is_err());

        let cfg = AudioConfig { smoothing: f32::NAN, ..base.clone() };
        assert!(cfg.validate().is_err());

        let cfg = AudioConfig { sample_rate: 0, ..base.clone() };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroSampleRate));

        let cfg = AudioConfig { channels: 0, ..base.clone() };
        assert_eq!(cfg.validate(), Err(ConfigError::Channels(0)));

        let cfg = AudioConfig { buffer_size: 0, ..base };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroBufferSize));
    }

    #[test]
    fn explicit_path_wins() {
        let path = PathBuf::from("/tmp/somewhere.toml");
        assert_eq!(find_config_path(Some(path.as_path())), Some(path));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config(Path::new("/nonexistent/specpipe.toml")).is_err());
    }
}

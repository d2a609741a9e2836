use clap::Parser;
use std::path::PathBuf;

use specpipe::config::AudioConfig;

#[derive(Parser, Debug)]
#[command(name = "specpipe", about = "Live audio spectrum analyzer")]
pub struct Cli {
    /// Config file (defaults to ./specpipe.toml, then the per-user config)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Replay an audio file (WAV, MP3, FLAC, OGG) instead of capturing
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Input device name (see --list-devices); system default when omitted
    #[arg(short, long)]
    pub source: Option<String>,

    /// Capture sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Capture channels, downmixed to mono
    #[arg(long)]
    pub channels: Option<u16>,

    /// Capture block size in frames
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// FFT length (even, 16-65536)
    #[arg(long)]
    pub fft_size: Option<usize>,

    /// Smoothing factor for the spectrum (0.0-1.0, higher = slower)
    #[arg(long)]
    pub smoothing: Option<f32>,

    /// Spectrum updates per second
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// Stop after this many seconds (runs until killed when omitted)
    #[arg(short, long)]
    pub duration: Option<f32>,

    /// Width of the terminal spectrum in columns
    #[arg(long, default_value_t = 64)]
    pub width: usize,

    /// List available input devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

impl Cli {
    /// Command-line values take precedence over the config file.
    pub fn apply_overrides(&self, audio: &mut AudioConfig) {
        if let Some(path) = &self.input {
            audio.input_file = Some(path.clone());
        }
        if let Some(source) = &self.source {
            audio.source = Some(source.clone());
        }
        if let Some(rate) = self.sample_rate {
            audio.sample_rate = rate;
        }
        if let Some(channels) = self.channels {
            audio.channels = channels;
        }
        if let Some(size) = self.buffer_size {
            audio.buffer_size = size;
        }
        if let Some(size) = self.fft_size {
            audio.fft_size = size;
        }
        if let Some(smoothing) = self.smoothing {
            audio.smoothing = smoothing;
        }
    }
}

//! Live audio spectrum pipeline: capture → sample ring → windowed FFT → smoothed magnitudes.
//!
//! A renderer creates a [`Pipeline`], calls [`Pipeline::update`] once per frame and reads
//! [`Pipeline::magnitudes`].

pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;

pub use audio::device::{AudioBackend, AudioSource, CpalBackend, StreamSpec};
pub use audio::features::BandLevels;
pub use config::AudioConfig;
pub use error::{CaptureError, DeviceError, PipelineError};
pub use pipeline::Pipeline;

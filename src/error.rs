use thiserror::Error;

use crate::config::ConfigError;

/// Opening an input failed. Surfaces from `Pipeline::initialize`.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no default input device available")]
    NoDefaultInput,
    #[error("input device not found: {0}")]
    NotFound(String),
    #[error("failed to enumerate input devices: {0}")]
    Enumerate(String),
    #[error("failed to query input config: {0}")]
    Config(String),
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
    #[error("device does not support {sample_rate} Hz with {channels} channel(s); supported: {supported}")]
    UnsupportedConfig {
        sample_rate: u32,
        channels: u16,
        supported: String,
    },
    #[error("failed to build input stream: {0}")]
    Build(String),
    #[error("failed to start input stream: {0}")]
    Play(String),
    #[error("failed to decode audio file: {0}")]
    Decode(String),
}

/// A single failed block read. The capture loop logs these and keeps going.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CaptureError {
    #[error("input stream error: {0}")]
    Stream(String),
    #[error("timed out waiting for input samples")]
    Timeout,
    #[error("input stream ended")]
    EndOfStream,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid audio config: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("failed to open audio input: {0}")]
    Device(#[from] DeviceError),
    #[error("failed to start capture thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("capture thread exited before the input was opened")]
    CaptureThreadExited,
}

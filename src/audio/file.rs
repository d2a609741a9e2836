//! Replays a decoded audio file as if it were a live input, paced at real time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::capture::I16_SCALE;
use super::device::{AudioBackend, AudioSource, StreamSpec};
use crate::error::{CaptureError, DeviceError};

/// File-backed input. The file is decoded once up front and looped forever.
pub struct FileBackend {
    path: PathBuf,
    samples: Arc<[i16]>,
    sample_rate: u32,
}

impl FileBackend {
    pub fn new(path: &Path) -> Result<Self, DeviceError> {
        let (mono, sample_rate) = decode_mono(path)?;
        if mono.is_empty() {
            return Err(DeviceError::Decode(format!("{} contains no samples", path.display())));
        }

        log::info!(
            "Decoded {}: {} samples, {}Hz, {:.1}s",
            path.display(),
            mono.len(),
            sample_rate,
            mono.len() as f32 / sample_rate as f32
        );

        let samples: Arc<[i16]> = mono.iter().map(|&s| to_i16(s)).collect();

        Ok(Self {
            path: path.to_path_buf(),
            samples,
            sample_rate,
        })
    }

    /// Native rate of the decoded file.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl AudioBackend for FileBackend {
    fn open(&self, spec: &StreamSpec) -> Result<Box<dyn AudioSource>, DeviceError> {
        if spec.sample_rate != self.sample_rate {
            log::warn!(
                "{} is {}Hz but the pipeline runs at {}Hz; bins will be mislabelled",
                self.path.display(),
                self.sample_rate,
                spec.sample_rate
            );
        }
        let block_period = Duration::from_secs_f64(spec.block_frames as f64 / spec.sample_rate as f64);
        Ok(Box::new(FileSource {
            samples: Arc::clone(&self.samples),
            channels: spec.channels as usize,
            position: 0,
            block_period,
            next_due: Instant::now(),
        }))
    }
}

struct FileSource {
    samples: Arc<[i16]>,
    channels: usize,
    position: usize,
    block_period: Duration,
    next_due: Instant,
}

impl AudioSource for FileSource {
    fn read(&mut self, block: &mut [i16]) -> Result<(), CaptureError> {
        let now = Instant::now();
        if self.next_due > now {
            std::thread::sleep(self.next_due - now);
        }
        self.next_due = self.next_due.max(now) + self.block_period;

        // Mono file, so every channel of a frame gets the same sample
        for frame in block.chunks_mut(self.channels) {
            frame.fill(self.samples[self.position]);
            self.position = (self.position + 1) % self.samples.len();
        }
        Ok(())
    }
}

/// Decode every packet of the first audio track, downmixed to mono.
fn decode_mono(path: &Path) -> Result<(Vec<f32>, u32), DeviceError> {
    let decode_err = |what: &str, e: SymphoniaError| {
        DeviceError::Decode(format!("{}: {what}: {e}", path.display()))
    };

    let file = std::fs::File::open(path)
        .map_err(|e| DeviceError::Decode(format!("{}: {e}", path.display())))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| decode_err("unrecognized format", e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DeviceError::Decode(format!("{}: no audio tracks", path.display())))?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count());
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DeviceError::Decode(format!("{}: unknown sample rate", path.display())))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err("no decoder", e))?;

    let mut mono = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(decode_err("read failed", e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(decode_err("decode failed", e)),
        };

        let mut buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        buf.copy_interleaved_ref(decoded);
        mono.extend(
            buf.samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    Ok((mono, sample_rate))
}

/// Inverse of the capture path's normalization, saturating at the i16 range.
fn to_i16(sample: f32) -> i16 {
    (sample * I16_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
